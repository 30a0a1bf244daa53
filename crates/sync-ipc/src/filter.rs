//! The synchronous message filter.
//!
//! Bridges blocking callers onto an asynchronous channel:
//!
//! 1. Caller takes a fresh ID (`next_request_id` / `request`)
//! 2. `send_and_wait` registers a pending entry, then transmits the request
//! 3. The channel's delivery thread hands the reply to `on_message_received`
//! 4. The reply is decoded into the caller's slot, which wakes the caller
//! 5. If shutdown is raised first, the caller returns its default instead

use crate::config::FilterConfig;
use crate::error::{ConfigError, DispatchError, FilterResult};
use crate::id::{RequestId, RequestIdGenerator};
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::message::{Message, Reply, Request};
use crate::pending::{PendingRequest, PendingRequestTable, PendingStats};
use crate::shutdown::ShutdownSignal;
use crate::transport::{MessageFilter, Transport};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Thread-safe filter that sends requests and blocks callers until the
/// matching reply arrives.
///
/// One instance per channel. Construct it explicitly, wrap it in an `Arc`,
/// add it to the channel with
/// [`ChannelProxy::add_filter`](crate::ChannelProxy::add_filter) and hand
/// clones of the same `Arc` to the threads that issue calls.
pub struct SyncMessageFilter {
    config: FilterConfig,
    ids: RequestIdGenerator,
    pending: PendingRequestTable,
    lifecycle: Lifecycle,
    shutdown: ShutdownSignal,
}

impl SyncMessageFilter {
    /// Create a detached filter.
    ///
    /// # Arguments
    ///
    /// * `config` - Validated before use
    /// * `shutdown` - Process-wide signal; raising it releases every waiting caller
    pub fn new(config: FilterConfig, shutdown: ShutdownSignal) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            ids: RequestIdGenerator::starting_at(config.first_request_id),
            pending: PendingRequestTable::with_capacity(config.capacity()),
            lifecycle: Lifecycle::new(),
            shutdown,
            config,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    /// Return an ID no other call on this filter has been given.
    pub fn next_request_id(&self) -> RequestId {
        self.ids.next_id()
    }

    /// Build a request in this filter's namespace with a fresh ID.
    pub fn request(&self, method: impl Into<String>, params: serde_json::Value) -> Request {
        Request::new(
            self.config.namespace.clone(),
            self.next_request_id(),
            method,
            params,
        )
    }

    /// Send a message without waiting for anything.
    pub fn send(&self, message: Message) -> FilterResult<()> {
        self.lifecycle.send(message)
    }

    /// Send `request` and block the calling thread until its reply arrives.
    ///
    /// Returns the reply's result decoded as `T`, or `default_result` if the
    /// process shuts down first, the request cannot be registered or sent, or
    /// the channel is torn down while waiting.
    ///
    /// Must not be called from inside an async runtime; use [`call`](Self::call)
    /// there instead.
    pub fn send_and_wait<T>(&self, request: Request, default_result: T) -> T
    where
        T: DeserializeOwned + Send + 'static,
    {
        futures::executor::block_on(self.call(request, default_result))
    }

    /// Async form of [`send_and_wait`](Self::send_and_wait).
    pub async fn call<T>(&self, request: Request, default_result: T) -> T
    where
        T: DeserializeOwned + Send + 'static,
    {
        let id = request.request_id;

        if request.namespace != self.config.namespace {
            warn!(
                request_id = %id,
                namespace = %request.namespace,
                expected = %self.config.namespace,
                "Request namespace does not match filter, reply would never be matched"
            );
            return default_result;
        }

        let (tx, mut rx) = oneshot::channel::<T>();
        let entry = PendingRequest::with_sender(id, request.method.as_str(), tx);

        // Registered before sending, so the reply always finds it.
        if let Err(e) = self.pending.insert(id, entry) {
            warn!(request_id = %id, error = %e, "Could not register request");
            return default_result;
        }

        if let Err(e) = self.lifecycle.send(Message::Request(request)) {
            self.pending.remove(id);
            warn!(request_id = %id, error = %e, "Send failed, returning default result");
            return default_result;
        }

        tokio::select! {
            biased;
            reply = &mut rx => match reply {
                Ok(value) => value,
                Err(_) => {
                    debug!(request_id = %id, "Pending slot dropped without a reply");
                    default_result
                }
            },
            _ = self.shutdown.raised() => {
                self.pending.remove(id);
                debug!(request_id = %id, "Shutdown while waiting for reply");
                default_result
            }
        }
    }

    /// Deliver a reply to the caller waiting on its ID.
    ///
    /// Replies nobody is waiting for (late, duplicate, or after a drain) are
    /// dropped.
    pub fn on_reply(&self, reply: &Reply) {
        let Some(entry) = self.pending.lookup_and_remove(reply.request_id) else {
            debug!(
                request_id = %reply.request_id,
                "Dropping reply for unknown or completed request"
            );
            return;
        };

        let method = entry.method().to_owned();
        let elapsed_ms = entry.elapsed().as_millis();

        let outcome = entry.complete(reply.result.clone());
        self.pending.record_delivery(&outcome);

        match outcome {
            Ok(()) => debug!(
                request_id = %reply.request_id,
                method = %method,
                elapsed_ms = elapsed_ms,
                "Completed pending request"
            ),
            Err(DispatchError::CallerGone) => debug!(
                request_id = %reply.request_id,
                method = %method,
                "Caller stopped waiting before the reply arrived"
            ),
            Err(e) => warn!(
                request_id = %reply.request_id,
                method = %method,
                error = %e,
                "Reply did not decode, caller gets its default result"
            ),
        }
    }

    /// Attach to a transport. Only valid once, before any teardown.
    pub fn attach(&self, transport: Arc<dyn Transport>) -> FilterResult<()> {
        self.lifecycle.attach(transport)
    }

    /// Remove every pending entry, waking its caller with the default result.
    ///
    /// Returns the number of entries dropped.
    pub fn drain_pending(&self) -> usize {
        let drained = self.pending.clear_all();
        let count = drained.len();
        drained.into_iter().for_each(PendingRequest::abandon);
        count
    }

    fn teardown(&self, reason: &'static str) {
        if self.lifecycle.disarm() {
            info!(
                namespace = %self.config.namespace,
                reason = reason,
                "Channel gone, filter disarmed"
            );
        }

        if self.config.drain_on_disarm {
            let drained = self.drain_pending();
            if drained > 0 {
                info!(drained = drained, "Drained pending requests");
            }
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, id: RequestId) -> bool {
        self.pending.contains(id)
    }

    pub fn stats(&self) -> &PendingStats {
        self.pending.stats()
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }
}

impl MessageFilter for SyncMessageFilter {
    fn on_filter_added(&self, transport: Arc<dyn Transport>) {
        if let Err(e) = self.attach(transport) {
            warn!(error = %e, "Ignoring attach");
        }
    }

    fn on_message_received(&self, message: &Message) -> bool {
        match message {
            Message::Reply(reply) if reply.namespace == self.config.namespace => {
                self.on_reply(reply);
                true
            }
            _ => false,
        }
    }

    fn on_channel_error(&self) {
        self.teardown("channel error");
    }

    fn on_channel_closing(&self) {
        self.teardown("channel closing");
    }
}

impl std::fmt::Debug for SyncMessageFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncMessageFilter")
            .field("namespace", &self.config.namespace)
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .finish()
    }
}
