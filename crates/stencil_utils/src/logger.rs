use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

const DEFAULT_FILTER: &str = "stencilcache=info,stencil_runtime=info,stencil_cache=info";

/// Initialise tracing subscriber once per process.
///
/// Thread names and ids are part of every line so the output shows which
/// worker hit the cache and which one compiled.
pub fn init_logging() {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_names(true)
            .with_thread_ids(true)
            .compact()
            .init();
    });
}
