//! The allowed-call authorization policy consulted by a server acceptor
//! before it spawns an executor for an incoming request (§4.4).

use ahash::HashSet;

/// Which modules an acceptor will dispatch to. Checked once per request,
/// against the module name only — function-level filtering is left to the
/// invoked module itself.
#[derive(Debug, Clone)]
pub enum CallPolicy {
    /// No restriction; every module is dispatched.
    Off,
    /// Only the named modules may be called; everything else is rejected.
    Whitelist(HashSet<String>),
    /// Every module may be called except the named ones.
    Blacklist(HashSet<String>),
}

impl CallPolicy {
    pub fn whitelist(modules: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Whitelist(modules.into_iter().map(Into::into).collect())
    }

    pub fn blacklist(modules: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Blacklist(modules.into_iter().map(Into::into).collect())
    }

    pub fn is_allowed(&self, module: &str) -> bool {
        match self {
            Self::Off => true,
            Self::Whitelist(modules) => modules.contains(module),
            Self::Blacklist(modules) => !modules.contains(module),
        }
    }
}

impl Default for CallPolicy {
    fn default() -> Self {
        Self::Off
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn off_allows_everything() {
        assert!(CallPolicy::Off.is_allowed("anything"));
    }

    #[test]
    fn whitelist_allows_only_named_modules() {
        let policy = CallPolicy::whitelist(["math"]);
        assert!(policy.is_allowed("math"));
        assert!(!policy.is_allowed("shell"));
    }

    #[test]
    fn blacklist_blocks_only_named_modules() {
        let policy = CallPolicy::blacklist(["shell"]);
        assert!(!policy.is_allowed("shell"));
        assert!(policy.is_allowed("math"));
    }
}
