//! Engine configuration shared by the decoder, patch engine and session.

use crate::patch::PatchPolicy;

/// Default cap on elements in one array (protects against absurd decoded counts).
pub const DEFAULT_MAX_ARRAY_ELEMENTS: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub patch_policy: PatchPolicy,
    pub max_array_elements: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            patch_policy: PatchPolicy::Strict,
            max_array_elements: DEFAULT_MAX_ARRAY_ELEMENTS,
        }
    }
}

impl EngineConfig {
    pub fn with_patch_policy(mut self, policy: PatchPolicy) -> Self {
        self.patch_policy = policy;
        self
    }

    pub fn with_max_array_elements(mut self, max: usize) -> Self {
        self.max_array_elements = max;
        self
    }
}
