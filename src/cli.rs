use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::*;
use stencil_cache::CompilationCache;
use stencil_config::{RuntimeConfig, WorkerConfig};
use stencil_engine::{Engine, ScriptCompiler, StencilCompiler};
use stencil_metrics::CompileProfiler;
use stencil_runtime::{DriverReport, JobError, ScriptSource, WorkerDriver};

use crate::demo;

#[derive(Debug, Parser)]
#[command(
    name = "stencilcache",
    about = "Run scripts on worker threads sharing one compiled-script cache",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,

    /// TOML configuration file (requires the `toml-config` feature)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Native stack quota granted to each compile, in bytes
    #[arg(long, global = true, value_name = "BYTES")]
    stack_quota: Option<usize>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the built-in demo scripts
    Demo {
        #[command(flatten)]
        workers: WorkerArgs,
    },
    /// Run script files, each compiled from line 1
    Run {
        #[arg(required = true, value_name = "FILE")]
        files: Vec<PathBuf>,

        #[command(flatten)]
        workers: WorkerArgs,
    },
}

#[derive(Debug, Clone, Copy, Args)]
struct WorkerArgs {
    /// Worker threads (0 = one per CPU)
    #[arg(long)]
    threads: Option<usize>,

    /// Passes each worker makes over the script list
    #[arg(long)]
    iterations: Option<usize>,
}

impl WorkerArgs {
    fn apply(self, config: &mut WorkerConfig) {
        if let Some(threads) = self.threads {
            config.worker_threads = threads;
        }
        if let Some(iterations) = self.iterations {
            config.iterations = iterations;
        }
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let mut config = RuntimeConfig::load(cli.config.as_deref())?;
    if let Some(stack_quota) = cli.stack_quota {
        config.compile.stack_quota = stack_quota;
    }

    let (scripts, workers, strict) = match cli.command {
        Command::Demo { workers } => (demo::scripts(), workers, false),
        Command::Run { files, workers } => (load_scripts(&files)?, workers, true),
    };
    workers.apply(&mut config.workers);
    tracing::debug!(?config, "Loaded configuration");

    let report = execute(&config, &scripts)?;
    print_errors(&report, &scripts);
    print_summary(&report);

    if strict && report.failed() > 0 {
        anyhow::bail!("{} of {} jobs failed", report.failed(), report.jobs.len());
    }
    Ok(())
}

fn load_scripts(files: &[PathBuf]) -> Result<Vec<ScriptSource>> {
    files
        .iter()
        .map(|path| {
            let source = fs::read_to_string(path)
                .with_context(|| format!("failed to read script {}", path.display()))?;
            Ok(ScriptSource::new(source, path.display().to_string(), 1))
        })
        .collect()
}

fn execute(config: &RuntimeConfig, scripts: &[ScriptSource]) -> Result<DriverReport> {
    let compiler: Arc<dyn ScriptCompiler> = Arc::new(StencilCompiler::new(config.compile.clone()));
    let driver = WorkerDriver::new(
        Engine::init(config.context.clone()),
        Arc::new(CompilationCache::new()),
        compiler,
        Arc::new(CompileProfiler::new()),
        config.workers.clone(),
    );
    let report = driver.run(scripts)?;
    Ok(report)
}

/// One report per failing script, however many workers hit the error.
fn print_errors(report: &DriverReport, scripts: &[ScriptSource]) {
    for (index, script) in scripts.iter().enumerate() {
        let Some(error) = report.first_error_for(index) else {
            continue;
        };
        match error {
            JobError::Compile(compile) => match compile.diagnostic() {
                Some(diagnostic) => eprint!("{}", diagnostic.render(&script.source)),
                None => eprintln!(
                    "{} {}:{}: {compile}",
                    "error:".red().bold(),
                    script.filename,
                    script.line
                ),
            },
            other => eprintln!("{} {other}", format!("{}:", other.class()).red().bold()),
        }
    }
}

fn print_summary(report: &DriverReport) {
    let failed = report.failed();
    let jobs = format!(
        "{} jobs, {} ok, {} failed",
        report.jobs.len(),
        report.succeeded(),
        failed
    );

    println!();
    println!("{}", "Summary".bold());
    println!("  {:<10} {}", "threads", report.threads);
    println!(
        "  {:<10} {}",
        "jobs",
        if failed == 0 { jobs.green() } else { jobs.yellow() }
    );
    println!(
        "  {:<10} {} scripts, {} hits, {} misses, {} duplicate inserts ({:.0}% hit rate)",
        "cache",
        report.cache.entries,
        report.cache.hits,
        report.cache.misses,
        report.cache.duplicates,
        report.cache.hit_rate() * 100.0
    );
    println!(
        "  {:<10} {} attempts, {} failed, avg {:.1}us",
        "compiles",
        report.compiles.attempts,
        report.compiles.failures,
        report.compiles.avg_time_us()
    );
    for (class, count) in report.failures_by_class() {
        println!("  {:<10} {} x {}", "", count, class.red());
    }
    println!("  {:<10} {:.2?}", "elapsed", report.elapsed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::try_parse_from([
            "stencilcache",
            "demo",
            "--threads",
            "4",
            "--stack-quota",
            "65536",
        ])
        .unwrap();

        assert_eq!(cli.stack_quota, Some(65536));
        let Command::Demo { workers } = cli.command else {
            panic!("expected demo command");
        };
        let mut config = WorkerConfig::default();
        workers.apply(&mut config);
        assert_eq!(config.worker_threads, 4);
        assert_eq!(config.iterations, WorkerConfig::default().iterations);
    }

    #[test]
    fn test_run_requires_files() {
        assert!(Cli::try_parse_from(["stencilcache", "run"]).is_err());
    }

    #[test]
    fn test_missing_script_file() {
        let err = load_scripts(&[PathBuf::from("/nonexistent/script.js")]).unwrap_err();
        assert!(err.to_string().contains("failed to read script"));
    }

    #[test]
    fn test_execute_demo() {
        let mut config = RuntimeConfig::default();
        config.context.install_print = false;
        config.workers.worker_threads = 2;
        let report = execute(&config, &demo::scripts()).unwrap();

        assert_eq!(report.jobs.len(), 12);
        assert_eq!(report.failures_by_class().get("SyntaxError"), Some(&4));
        // Without `print` the valid scripts cannot instantiate.
        assert_eq!(report.failures_by_class().get("InstantiateError"), Some(&8));
        assert_eq!(report.cache.entries, 2);
    }
}
