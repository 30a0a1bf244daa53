//! Filter lifecycle: which transport (if any) outbound messages go through.
//!
//! ```text
//!   Detached ──attach──▶ Armed ──error / closing──▶ Disarmed
//!       └──────────────error / closing─────────────────┘
//! ```
//!
//! `Disarmed` is terminal. Sends consult the state under the same lock that
//! guards transitions, so nothing is sent through a transport after it has
//! been dropped.

use crate::error::{FilterError, FilterResult};
use crate::message::Message;
use crate::transport::Transport;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

/// Lifecycle state of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Not yet attached to a channel.
    Detached,
    /// Attached; sends go through the recorded transport.
    Armed,
    /// Channel errored or closed. Terminal.
    Disarmed,
}

struct Inner {
    state: LifecycleState,
    transport: Option<Arc<dyn Transport>>,
}

/// Owner of the transport handle.
pub struct Lifecycle {
    inner: Mutex<Inner>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: LifecycleState::Detached,
                transport: None,
            }),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.lock().state
    }

    pub fn is_armed(&self) -> bool {
        self.state() == LifecycleState::Armed
    }

    /// Record `transport` and move to `Armed`. Only valid from `Detached`.
    pub fn attach(&self, transport: Arc<dyn Transport>) -> FilterResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != LifecycleState::Detached {
            return Err(FilterError::InvalidTransition {
                from: inner.state,
                to: LifecycleState::Armed,
            });
        }

        inner.state = LifecycleState::Armed;
        inner.transport = Some(transport);
        info!("Filter armed");
        Ok(())
    }

    /// Move to `Disarmed` and drop the transport.
    ///
    /// Returns `false` if already disarmed.
    pub fn disarm(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state == LifecycleState::Disarmed {
            return false;
        }

        let from = inner.state;
        inner.state = LifecycleState::Disarmed;
        inner.transport = None;
        info!(from = ?from, "Filter disarmed");
        true
    }

    /// Send `message` through the attached transport.
    ///
    /// The lock is held for the duration of the send, so a transport that
    /// disarmed this lifecycle from inside `Transport::send` would deadlock.
    pub fn send(&self, message: Message) -> FilterResult<()> {
        let inner = self.inner.lock();
        match (&inner.state, &inner.transport) {
            (LifecycleState::Armed, Some(transport)) => {
                transport.send(message)?;
                Ok(())
            }
            (state, _) => {
                debug!(state = ?state, "Dropping outbound message, filter not armed");
                Err(FilterError::NotArmed(*state))
            }
        }
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::id::RequestId;
    use crate::message::Reply;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<Message>>,
    }

    impl Transport for RecordingTransport {
        fn send(&self, message: Message) -> Result<(), TransportError> {
            self.sent.lock().push(message);
            Ok(())
        }
    }

    struct FailingTransport;

    impl Transport for FailingTransport {
        fn send(&self, _message: Message) -> Result<(), TransportError> {
            Err(TransportError::Closed)
        }
    }

    fn message() -> Message {
        Reply::new("db", RequestId::new(1), json!(null)).into()
    }

    #[test]
    fn test_detached_refuses_send() {
        let lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.state(), LifecycleState::Detached);
        assert!(matches!(
            lifecycle.send(message()),
            Err(FilterError::NotArmed(LifecycleState::Detached))
        ));
    }

    #[test]
    fn test_attach_then_send() {
        let lifecycle = Lifecycle::new();
        let transport = Arc::new(RecordingTransport::default());
        lifecycle.attach(transport.clone()).unwrap();

        assert!(lifecycle.is_armed());
        lifecycle.send(message()).unwrap();
        assert_eq!(transport.sent.lock().len(), 1);
    }

    #[test]
    fn test_disarm_is_terminal() {
        let lifecycle = Lifecycle::new();
        let transport = Arc::new(RecordingTransport::default());
        lifecycle.attach(transport.clone()).unwrap();

        assert!(lifecycle.disarm());
        assert!(!lifecycle.disarm());
        assert_eq!(lifecycle.state(), LifecycleState::Disarmed);

        assert!(matches!(
            lifecycle.send(message()),
            Err(FilterError::NotArmed(LifecycleState::Disarmed))
        ));
        assert!(matches!(
            lifecycle.attach(transport.clone()),
            Err(FilterError::InvalidTransition {
                from: LifecycleState::Disarmed,
                to: LifecycleState::Armed
            })
        ));
        assert!(transport.sent.lock().is_empty());
    }

    #[test]
    fn test_double_attach_rejected() {
        let lifecycle = Lifecycle::new();
        lifecycle.attach(Arc::new(RecordingTransport::default())).unwrap();
        assert!(lifecycle
            .attach(Arc::new(RecordingTransport::default()))
            .is_err());
        assert!(lifecycle.is_armed());
    }

    #[test]
    fn test_disarm_from_detached() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.disarm());
        assert_eq!(lifecycle.state(), LifecycleState::Disarmed);
    }

    #[test]
    fn test_transport_failure_propagates() {
        let lifecycle = Lifecycle::new();
        lifecycle.attach(Arc::new(FailingTransport)).unwrap();
        assert!(matches!(
            lifecycle.send(message()),
            Err(FilterError::Transport(TransportError::Closed))
        ));
    }
}
