//! Card Control Rules - document mutation, request building, idempotency
//!
//! Pure logic over control documents. Nothing here performs I/O; the
//! orchestration in `cardctl-engine` fetches documents, runs these functions
//! on private copies and decides what to send back to the rules store.

use std::collections::HashSet;

pub mod mutator;
pub mod builder;
pub mod comparator;
pub mod view;

pub use mutator::*;
pub use builder::*;
pub use comparator::*;
pub use view::*;

/// Runtime on/off switch per control type
///
/// Keys are control-type identifiers such as `MCT_GAMBLING`.
pub trait FeatureGate: Send + Sync {
    /// Whether the control type may be created
    fn is_enabled(&self, key: &str) -> bool;
}

/// Feature gate backed by a fixed set of disabled keys
#[derive(Debug, Clone, Default)]
pub struct StaticFeatureGate {
    disabled: HashSet<String>,
}

impl StaticFeatureGate {
    /// Every control type enabled
    pub fn all_enabled() -> Self {
        Self::default()
    }

    /// Everything enabled except `keys`
    pub fn with_disabled<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            disabled: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Switch a key off
    pub fn disable(&mut self, key: impl Into<String>) {
        self.disabled.insert(key.into());
    }

    /// Switch a key back on
    pub fn enable(&mut self, key: &str) {
        self.disabled.remove(key);
    }
}

impl FeatureGate for StaticFeatureGate {
    fn is_enabled(&self, key: &str) -> bool {
        !self.disabled.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_gate_toggles() {
        let mut gate = StaticFeatureGate::all_enabled();
        assert!(gate.is_enabled("MCT_GAMBLING"));
        gate.disable("MCT_GAMBLING");
        assert!(!gate.is_enabled("MCT_GAMBLING"));
        assert!(gate.is_enabled("MCT_ALCOHOL"));
        gate.enable("MCT_GAMBLING");
        assert!(gate.is_enabled("MCT_GAMBLING"));
    }
}
