//! Messages exchanged over the channel.
//!
//! Payloads are opaque JSON values. The only structure the filter relies on is
//! the namespace (which filter a reply belongs to) and the request ID.

use crate::id::RequestId;
use serde::{Deserialize, Serialize};

/// A request that expects exactly one reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Filter namespace the reply will be routed to.
    pub namespace: String,
    /// Correlation ID, echoed back in the reply.
    pub request_id: RequestId,
    /// Operation name (used for logging only).
    pub method: String,
    /// Opaque parameters.
    pub params: serde_json::Value,
}

impl Request {
    pub fn new(
        namespace: impl Into<String>,
        request_id: RequestId,
        method: impl Into<String>,
        params: serde_json::Value,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            request_id,
            method: method.into(),
            params,
        }
    }

    /// Build the reply to this request carrying `result`.
    pub fn reply(&self, result: serde_json::Value) -> Reply {
        Reply {
            namespace: self.namespace.clone(),
            request_id: self.request_id,
            result,
        }
    }
}

/// A reply to an earlier [`Request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub namespace: String,
    pub request_id: RequestId,
    /// Opaque result; decoded into the type the caller registered.
    pub result: serde_json::Value,
}

impl Reply {
    pub fn new(
        namespace: impl Into<String>,
        request_id: RequestId,
        result: serde_json::Value,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            request_id,
            result,
        }
    }
}

/// Uncorrelated traffic sharing the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub namespace: String,
    pub topic: String,
    pub body: serde_json::Value,
}

/// Anything that travels over the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Message {
    Request(Request),
    Reply(Reply),
    Notification(Notification),
}

impl Message {
    /// Namespace of the message, whatever its kind.
    pub fn namespace(&self) -> &str {
        match self {
            Message::Request(r) => &r.namespace,
            Message::Reply(r) => &r.namespace,
            Message::Notification(n) => &n.namespace,
        }
    }

    /// Request ID for correlated messages.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Message::Request(r) => Some(r.request_id),
            Message::Reply(r) => Some(r.request_id),
            Message::Notification(_) => None,
        }
    }
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Message::Request(request)
    }
}

impl From<Reply> for Message {
    fn from(reply: Reply) -> Self {
        Message::Reply(reply)
    }
}

impl From<Notification> for Message {
    fn from(notification: Notification) -> Self {
        Message::Notification(notification)
    }
}
