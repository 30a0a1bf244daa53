//! Channel seams and the in-process channel endpoint.
//!
//! [`Transport`] is the outbound half a filter sends through. [`MessageFilter`]
//! is the inbound half: the channel offers every received message to its
//! filters in order until one reports it handled, and notifies them when the
//! channel fails or closes.
//!
//! [`ChannelProxy`] wires both to a pair of `tokio::sync::mpsc` queues and runs
//! inbound delivery on its own thread, so filters observe replies on a thread
//! other than the callers blocked on them.

use crate::error::TransportError;
use crate::message::Message;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Outbound side of a channel.
pub trait Transport: Send + Sync {
    /// Queue `message` for transmission. Must not block on the peer.
    ///
    /// Runs with the sending filter's lifecycle lock held, so it must not call
    /// back into that filter (for example by reporting a channel error on the
    /// sending thread). Report failures by returning an error instead.
    fn send(&self, message: Message) -> Result<(), TransportError>;
}

/// Participant in a channel's inbound filter chain.
pub trait MessageFilter: Send + Sync {
    /// Called once when the filter is added to a channel.
    fn on_filter_added(&self, _transport: Arc<dyn Transport>) {}

    /// Offer an inbound message. Return `true` if it was consumed.
    fn on_message_received(&self, message: &Message) -> bool;

    /// The channel failed (peer gone). No more messages will be delivered.
    fn on_channel_error(&self) {}

    /// The channel is closing. No more messages will be delivered.
    fn on_channel_closing(&self) {}
}

/// Transport backed by an unbounded mpsc sender.
#[derive(Debug, Clone)]
pub struct QueueTransport {
    tx: mpsc::UnboundedSender<Message>,
}

impl QueueTransport {
    pub fn new(tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { tx }
    }
}

impl Transport for QueueTransport {
    fn send(&self, message: Message) -> Result<(), TransportError> {
        self.tx.send(message).map_err(|_| TransportError::Closed)
    }
}

/// Delivery counters for a channel.
#[derive(Debug, Default)]
pub struct ChannelStats {
    /// Inbound messages consumed by some filter
    pub messages_handled: AtomicU64,
    /// Inbound messages no filter consumed
    pub messages_unhandled: AtomicU64,
}

/// How the channel ended, if it has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelEnd {
    Open,
    Errored,
    Closed,
}

struct FilterChain {
    filters: Vec<Arc<dyn MessageFilter>>,
    ended: ChannelEnd,
}

impl FilterChain {
    /// Mark the channel ended and return the filters to notify.
    ///
    /// Done under the chain's write lock: a filter added afterwards sees the
    /// marker and notifies itself.
    fn end(&mut self, how: ChannelEnd) -> Vec<Arc<dyn MessageFilter>> {
        self.ended = how;
        self.filters.clone()
    }
}

type SharedChain = Arc<RwLock<FilterChain>>;

enum Inbound {
    Message(Message),
    PeerGone,
    Closing,
}

/// In-process channel endpoint with a filter chain and a delivery thread.
pub struct ChannelProxy {
    transport: Arc<QueueTransport>,
    chain: SharedChain,
    closing: watch::Sender<bool>,
    stats: Arc<ChannelStats>,
    delivery: Option<JoinHandle<()>>,
}

impl ChannelProxy {
    /// Create the endpoint and start its delivery thread.
    ///
    /// * `outbound` - queue towards the peer
    /// * `inbound` - queue of messages from the peer
    pub fn new(
        outbound: mpsc::UnboundedSender<Message>,
        inbound: mpsc::UnboundedReceiver<Message>,
    ) -> Result<Self, TransportError> {
        let chain: SharedChain = Arc::new(RwLock::new(FilterChain {
            filters: Vec::new(),
            ended: ChannelEnd::Open,
        }));
        let stats = Arc::new(ChannelStats::default());
        let (closing, closing_rx) = watch::channel(false);

        let delivery = {
            let chain = Arc::clone(&chain);
            let stats = Arc::clone(&stats);
            thread::Builder::new()
                .name("ipc-delivery".to_string())
                .spawn(move || run_delivery(inbound, closing_rx, chain, stats))
                .map_err(|e| TransportError::DeliveryThread(e.to_string()))?
        };

        Ok(Self {
            transport: Arc::new(QueueTransport::new(outbound)),
            chain,
            closing,
            stats,
            delivery: Some(delivery),
        })
    }

    /// Outbound transport of this channel.
    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    /// Append `filter` to the chain and hand it the transport.
    ///
    /// If the channel has already failed or closed, the filter is told so
    /// straight after `on_filter_added`, exactly as the filters already in the
    /// chain were.
    pub fn add_filter(&self, filter: Arc<dyn MessageFilter>) {
        filter.on_filter_added(self.transport());

        let ended = {
            let mut chain = self.chain.write();
            chain.filters.push(Arc::clone(&filter));
            chain.ended
        };

        match ended {
            ChannelEnd::Open => {}
            ChannelEnd::Errored => {
                debug!("Filter added after peer hung up");
                filter.on_channel_error();
            }
            ChannelEnd::Closed => {
                debug!("Filter added after channel closed");
                filter.on_channel_closing();
            }
        }
    }

    /// Whether the channel is still delivering messages.
    pub fn is_open(&self) -> bool {
        self.chain.read().ended == ChannelEnd::Open
    }

    pub fn stats(&self) -> &ChannelStats {
        &self.stats
    }

    /// Tell the filters the channel is closing and stop delivery.
    ///
    /// Blocks until the delivery thread has exited. Idempotent.
    pub fn close(&mut self) {
        self.closing.send_replace(true);
        if let Some(handle) = self.delivery.take() {
            if handle.join().is_err() {
                warn!("Delivery thread panicked");
            }
        }
    }
}

impl Drop for ChannelProxy {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_delivery(
    mut inbound: mpsc::UnboundedReceiver<Message>,
    mut closing: watch::Receiver<bool>,
    chain: SharedChain,
    stats: Arc<ChannelStats>,
) {
    info!("Delivery thread started");

    loop {
        let next = futures::executor::block_on(async {
            tokio::select! {
                biased;
                _ = closing.wait_for(|closed| *closed) => Inbound::Closing,
                message = inbound.recv() => match message {
                    Some(message) => Inbound::Message(message),
                    None => Inbound::PeerGone,
                },
            }
        });

        // Callbacks run on a snapshot, never under the chain lock.
        match next {
            Inbound::Message(message) => {
                let filters = chain.read().filters.clone();
                if filters.iter().any(|filter| filter.on_message_received(&message)) {
                    stats.messages_handled.fetch_add(1, Ordering::Relaxed);
                } else {
                    stats.messages_unhandled.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        namespace = message.namespace(),
                        request_id = ?message.request_id(),
                        "No filter handled inbound message"
                    );
                }
            }
            Inbound::PeerGone => {
                warn!("Peer hung up, reporting channel error");
                let filters = chain.write().end(ChannelEnd::Errored);
                filters.iter().for_each(|filter| filter.on_channel_error());
                break;
            }
            Inbound::Closing => {
                info!("Channel closing");
                let filters = chain.write().end(ChannelEnd::Closed);
                filters.iter().for_each(|filter| filter.on_channel_closing());
                break;
            }
        }
    }

    info!("Delivery thread stopped");
}
