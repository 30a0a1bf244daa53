//! Filter configuration with validation.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Default namespace for replies this filter recognises.
pub const DEFAULT_NAMESPACE: &str = "db";

/// Configuration for a [`SyncMessageFilter`](crate::SyncMessageFilter).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Replies in this namespace are consumed by the filter; others pass through.
    pub namespace: String,
    /// First value handed out by the request ID generator.
    pub first_request_id: u64,
    /// Maximum number of outstanding calls (0 = unbounded).
    pub max_pending: usize,
    /// Drop every pending slot when the channel errors or closes.
    pub drain_on_disarm: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            first_request_id: 0,
            max_pending: 0,
            drain_on_disarm: true,
        }
    }
}

impl FilterConfig {
    /// Configuration for the given namespace, defaults elsewhere.
    pub fn for_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() {
            return Err(ConfigError::EmptyNamespace);
        }

        if self.namespace.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidNamespace(self.namespace.clone()));
        }

        Ok(())
    }

    /// Table capacity, `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        (self.max_pending > 0).then_some(self.max_pending)
    }
}
