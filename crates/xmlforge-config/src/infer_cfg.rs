use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Which sources feed the unified schema.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceMode {
    /// Infer from sampled records only.
    #[default]
    Auto,
    /// Use the externally referenced schema only; fail if unavailable.
    External,
    /// Construct the schema from user overrides only.
    Manual,
    /// External (if present) merged with sampled, then overrides applied.
    Hybrid,
}

/// Schema discovery configuration.
///
/// # Example
///
/// ```yaml
/// inference:
///   mode: hybrid
///   sample_size: 1000
///   resolver:
///     enabled: true
///     timeout_secs: 30
///   force_arrays: [book]
///   type_hints:
///     year: int
///     price: decimal
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceCfg {
    pub mode: InferenceMode,

    /// Upper bound on records consumed for inference.
    pub sample_size: usize,

    /// External schema resolver settings.
    pub resolver: ResolverCfg,

    /// Paths whose top-level field gets `repeating = true`. Multi-segment
    /// paths (`a/b/c`) are accepted but applied at the top-level key only.
    pub force_arrays: Vec<String>,

    /// Path to type-name overrides, same type-name table as the external
    /// schema parser. Unknown top-level paths create a new nullable field.
    pub type_hints: BTreeMap<String, String>,
}

impl Default for InferenceCfg {
    fn default() -> Self {
        Self {
            mode: InferenceMode::Auto,
            sample_size: 1000,
            resolver: ResolverCfg::default(),
            force_arrays: Vec::new(),
            type_hints: BTreeMap::new(),
        }
    }
}

/// External schema resolver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverCfg {
    /// When false, the embedded schema location is never fetched.
    pub enabled: bool,

    /// HTTP timeout for the schema download, in seconds.
    pub timeout_secs: u64,
}

impl Default for ResolverCfg {
    fn default() -> Self {
        Self { enabled: true, timeout_secs: 30 }
    }
}
