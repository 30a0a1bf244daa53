//! # Sync IPC - Blocking Calls over an Asynchronous Channel
//!
//! Lets threads send a request over a one-way, asynchronous message channel
//! and block until the correlated reply comes back, the process shuts down,
//! or the channel fails.
//!
//! ## Call Flow
//!
//! ```text
//! ┌──────────────┐  1. next_request_id     ┌──────────────────────┐
//! │ Caller       │ ──────────────────────▶ │ SyncMessageFilter    │
//! │ thread       │  2. insert pending      │  ┌────────────────┐  │
//! │              │  3. send request ──┐    │  │ PendingRequest │  │
//! │  (blocked)   │                    │    │  │     Table      │  │
//! │              │ ◀── 6. wake ──┐    │    │  └────────────────┘  │
//! └──────────────┘               │    │    └──────────▲───────────┘
//!                                │    ▼               │ 5. lookup + remove
//!                        ┌───────┴────────────────────┴──┐
//!                        │ ChannelProxy delivery thread  │ ◀── 4. reply
//!                        └───────────────────────────────┘
//! ```
//!
//! A caller blocks on whichever comes first: its own reply or the
//! process-wide [`ShutdownSignal`]. Every failure (send refused, channel torn
//! down, shutdown) resolves to the default result the caller supplied.
//!
//! ## Lifecycle
//!
//! `Detached → Armed → Disarmed`. A filter is armed when added to a channel and
//! disarmed, for good, when the channel errors or closes. Disarming drops
//! every pending entry so no caller is left waiting on a dead channel.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod config;
pub mod error;
pub mod filter;
pub mod id;
pub mod lifecycle;
pub mod message;
pub mod pending;
pub mod shutdown;
pub mod transport;

// Re-export main types
pub use config::FilterConfig;
pub use error::{ConfigError, DispatchError, FilterError, FilterResult, TransportError};
pub use filter::SyncMessageFilter;
pub use id::{RequestId, RequestIdGenerator};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use message::{Message, Notification, Reply, Request};
pub use pending::{PendingRequest, PendingRequestTable, PendingStats, StatsSnapshot};
pub use shutdown::ShutdownSignal;
pub use transport::{ChannelProxy, ChannelStats, MessageFilter, QueueTransport, Transport};
