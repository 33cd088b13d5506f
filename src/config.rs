/// Upper bound on inheritance and nesting walks. Metadata is expected to form a
/// simple chain; the cap only stops a walk over malformed (cyclic) metadata.
pub const DEFAULT_HIERARCHY_DEPTH: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Maximum number of types visited when walking base or nested type chains.
    pub hierarchy_depth_limit: usize,
    /// Run the fragment verifier before lowering generated code.
    pub verify_fragments: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            hierarchy_depth_limit: DEFAULT_HIERARCHY_DEPTH,
            verify_fragments: true,
        }
    }
}

impl RuntimeConfig {
    pub fn with_depth_limit(mut self, limit: usize) -> Self {
        self.hierarchy_depth_limit = limit.max(1);
        self
    }

    pub fn with_fragment_verification(mut self, enabled: bool) -> Self {
        self.verify_fragments = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_limit_never_zero() {
        let config = RuntimeConfig::default().with_depth_limit(0);
        assert_eq!(config.hierarchy_depth_limit, 1);
        assert!(config.verify_fragments);
    }
}
