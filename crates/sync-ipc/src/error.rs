//! Error types.
//!
//! None of these cross the blocking call boundary: `send_and_wait` resolves
//! every failure to the caller's default result. They surface from the
//! lower-level operations and in logs.

use crate::id::RequestId;
use crate::lifecycle::LifecycleState;
use thiserror::Error;

/// Errors from the filter, its table and its lifecycle.
#[derive(Debug, Error)]
pub enum FilterError {
    /// An entry with this ID is already outstanding.
    #[error("request id {0} is already pending")]
    DuplicateRequestId(RequestId),

    /// The pending table reached its configured capacity.
    #[error("pending table full (capacity: {capacity})")]
    TableFull { capacity: usize },

    /// No transport is attached (or it was torn down).
    #[error("filter not armed (state: {0:?})")]
    NotArmed(LifecycleState),

    /// Lifecycle transition not allowed from the current state.
    #[error("invalid lifecycle transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },

    /// The transport refused the message.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors reported by a [`Transport`](crate::Transport).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The peer end of the channel is gone.
    #[error("channel closed")]
    Closed,

    #[error("send failed: {0}")]
    SendFailed(String),

    /// The channel's delivery thread could not be started.
    #[error("failed to start delivery thread: {0}")]
    DeliveryThread(String),
}

/// Errors while delivering a reply into a pending slot.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The reply payload does not decode into the type the caller registered.
    #[error("reply payload does not match the registered result type: {0}")]
    Decode(#[from] serde_json::Error),

    /// The waiting caller already returned.
    #[error("caller no longer waiting")]
    CallerGone,
}

/// Configuration validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("namespace cannot be empty")]
    EmptyNamespace,

    #[error("invalid namespace {0:?}: must not contain whitespace")]
    InvalidNamespace(String),
}

/// Result alias for filter operations.
pub type FilterResult<T> = Result<T, FilterError>;
