//! Shared harness: a filter attached to a `ChannelProxy`, with the test
//! playing the peer on the other end of both queues.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use sync_ipc::{
    ChannelProxy, FilterConfig, Message, Reply, Request, RequestId, ShutdownSignal,
    SyncMessageFilter,
};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub filter: Arc<SyncMessageFilter>,
    pub shutdown: ShutdownSignal,
    pub proxy: ChannelProxy,
    /// Requests the filter sent towards the peer.
    pub to_peer: mpsc::UnboundedReceiver<Message>,
    /// Messages the peer delivers back.
    pub from_peer: mpsc::UnboundedSender<Message>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(FilterConfig::default())
    }

    pub fn with_config(config: FilterConfig) -> Self {
        init_tracing();

        let shutdown = ShutdownSignal::new();
        let filter = Arc::new(SyncMessageFilter::new(config, shutdown.clone()).unwrap());

        let (out_tx, to_peer) = mpsc::unbounded_channel();
        let (from_peer, in_rx) = mpsc::unbounded_channel();
        let proxy = ChannelProxy::new(out_tx, in_rx).unwrap();
        proxy.add_filter(filter.clone());

        Self {
            filter,
            shutdown,
            proxy,
            to_peer,
            from_peer,
        }
    }

    /// Block until the next request reaches the peer.
    pub fn next_request(&mut self) -> Request {
        match self.to_peer.blocking_recv() {
            Some(Message::Request(request)) => request,
            other => panic!("expected a request, got {other:?}"),
        }
    }

    /// Deliver a reply from the peer.
    pub fn reply(&self, request_id: RequestId, result: serde_json::Value) {
        let reply = Reply::new(self.filter.namespace(), request_id, result);
        self.from_peer.send(reply.into()).unwrap();
    }

    /// Spawn a thread blocked in `send_and_wait`.
    pub fn spawn_call<T>(&self, request: Request, default_result: T) -> thread::JoinHandle<T>
    where
        T: serde::de::DeserializeOwned + Send + 'static,
    {
        let filter = Arc::clone(&self.filter);
        thread::spawn(move || filter.send_and_wait(request, default_result))
    }
}

/// Poll `condition` until it holds, failing the test after five seconds.
pub fn wait_until(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}
