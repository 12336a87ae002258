//! Built-in scripts for `stencilcache demo`.

use stencil_runtime::ScriptSource;

const FILENAME: &str = "none";

const SCRIPTS: [&str; 3] = [
    r#"
        print(`JS log one: ${typeof print} ${6 * 7}`);
        "#,
    // top-level await does not parse in a classic script
    r#"
        await print(`JS log two: ${6 * 7}`);
        "#,
    r#"
        print(`JS log three: ${"stencil" + "s"}`);
        "#,
];

/// The demo scripts, numbered from line 1 in submission order.
pub fn scripts() -> Vec<ScriptSource> {
    SCRIPTS
        .iter()
        .zip(1..)
        .map(|(source, line)| ScriptSource::new(*source, FILENAME, line))
        .collect()
}
