use serde::{Deserialize, Serialize};

use crate::parse_or;

/// Default native stack quota for one compile: 128 KiB per pointer byte,
/// i.e. 1 MiB on 64-bit targets.
pub const DEFAULT_STACK_QUOTA: usize = 128 * std::mem::size_of::<usize>() * 1024;

/// Smallest quota a frontend context can be created with.
pub const MIN_STACK_QUOTA: usize = 64 * 1024;

/// Configuration for the compile frontend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileConfig {
    /// Native stack quota granted to each frontend context (bytes)
    pub stack_quota: usize,

    /// Maximum number of frontend contexts alive at once for one compiler
    pub max_live_frontends: usize,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            stack_quota: DEFAULT_STACK_QUOTA,
            max_live_frontends: 64,
        }
    }
}

impl CompileConfig {
    pub(crate) fn apply_overrides<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.stack_quota = parse_or(lookup("STENCIL_STACK_QUOTA"), self.stack_quota);
        self.max_live_frontends = parse_or(lookup("STENCIL_MAX_FRONTENDS"), self.max_live_frontends);
    }

    pub fn with_stack_quota(mut self, stack_quota: usize) -> Self {
        self.stack_quota = stack_quota;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_quota_scales_with_pointer_width() {
        assert_eq!(DEFAULT_STACK_QUOTA % 1024, 0);
        assert!(DEFAULT_STACK_QUOTA >= MIN_STACK_QUOTA);
    }

    #[test]
    fn test_with_stack_quota() {
        let config = CompileConfig::default().with_stack_quota(MIN_STACK_QUOTA);
        assert_eq!(config.stack_quota, MIN_STACK_QUOTA);
        assert_eq!(config.max_live_frontends, 64);
    }
}
