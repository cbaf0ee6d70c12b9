//! Proxy configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Default bound on nested calls of the same operation on the same proxy.
pub const DEFAULT_MAX_REENTRANCY_DEPTH: usize = 1;

/// What happens when a handler returns without forwarding or answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardPolicy {
    /// Forward the call once the handler returns.
    #[default]
    Auto,
    /// Leave it unanswered; the call fails with `NoReturnValue`.
    Explicit,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid proxy config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Settings of a single proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Name used in logs and snapshots; defaults to one derived from the target
    pub label: Option<String>,
    /// How many nested calls of one operation a thread may have in flight
    pub max_reentrancy_depth: usize,
    pub forward_policy: ForwardPolicy,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            label: None,
            max_reentrancy_depth: DEFAULT_MAX_REENTRANCY_DEPTH,
            forward_policy: ForwardPolicy::Auto,
        }
    }
}

impl ProxyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_max_reentrancy_depth(mut self, depth: usize) -> Self {
        self.max_reentrancy_depth = depth;
        self
    }

    pub fn with_forward_policy(mut self, policy: ForwardPolicy) -> Self {
        self.forward_policy = policy;
        self
    }

    /// The effective reentrancy limit; zero would refuse every call, so it
    /// counts as one.
    pub fn reentrancy_limit(&self) -> usize {
        self.max_reentrancy_depth.max(1)
    }

    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }
}
