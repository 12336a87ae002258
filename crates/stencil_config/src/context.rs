use serde::{Deserialize, Serialize};

use crate::parse_or;

/// Configuration for a per-thread execution context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Longest string (in bytes) a running script may build
    pub max_string_bytes: usize,

    /// Register the `print` host function on new contexts
    pub install_print: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_string_bytes: 8 * 1024 * 1024,
            install_print: true,
        }
    }
}

impl ContextConfig {
    pub(crate) fn apply_overrides<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.max_string_bytes = parse_or(lookup("STENCIL_MAX_STRING_BYTES"), self.max_string_bytes);
    }
}
