#![warn(
    rust_2018_idioms,
    future_incompatible,
    missing_copy_implementations,
    trivial_numeric_casts,
    unsafe_code,
    unused,
    unused_qualifications
)]

//! Shared types and HTTP plumbing used by both the `fastqueue-server` and `fastqueue-client`
//! crates: the method+path router, the JSON-lines logger, the `Status` -> HTTP status mapping,
//! and the wire format of topics, queues, and messages.

#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

use chrono::{DateTime, Utc};
use hyper::{
    body::{Buf, HttpBody},
    header::{HeaderMap, HeaderName, HeaderValue},
    Body,
};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

pub mod logger;
pub mod router;
pub mod status;

pub use status::Status;

/// The default maximum size (in bytes) of a request body this service will read before
/// responding with `413 Payload Too Large`.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// The `x-trace-id` header used to correlate a request across logs.
pub const TRACE_ID_HEADER: TraceIdHeader = TraceIdHeader {};

/// Typed accessor for the `x-trace-id` header.
pub struct TraceIdHeader {}

impl TraceIdHeader {
    /// The header's name.
    pub fn name(&self) -> HeaderName {
        HeaderName::from_static("x-trace-id")
    }

    /// Read a trace id from a header map, if present and parseable.
    pub fn get(&self, headers: &HeaderMap<HeaderValue>) -> Option<Uuid> {
        headers
            .get(self.name())
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok())
    }
}

/// Read an entire hyper body into memory, rejecting it once it exceeds `max_size` bytes.
///
/// Returns `Ok(None)` if the body was larger than `max_size`.
pub async fn read_body(body: &mut Body, max_size: Option<usize>) -> Result<Option<Vec<u8>>, hyper::Error> {
    let mut chunks = Vec::new();
    let mut total_length = 0;

    while let Some(chunk) = body.data().await {
        let bytes = chunk?;
        total_length += bytes.len();
        if let Some(max_length) = max_size {
            if total_length > max_length {
                return Ok(None);
            }
        }
        chunks.push(bytes);
    }

    let mut result = Vec::with_capacity(total_length);
    for chunk in chunks {
        result.extend_from_slice(chunk.chunk());
    }

    Ok(Some(result))
}

/// The identity pattern shared by topic ids, queue ids, and dead-queue/destination references.
pub const ID_PATTERN_DESCRIPTION: &str = "must match ^[A-Za-z0-9._-]+$ and be at most 128 characters";

/// Validate an id (topic id or queue id) against the shared identity rules.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_' || b == b'-')
}

/// Request body for `POST /topics`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TopicIn {
    /// The id of the new topic.
    pub id: String,
}

/// Response body for topic endpoints.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TopicOut {
    /// The topic's id.
    pub id:         String,
    /// When the topic was created.
    pub created_at: DateTime<Utc>,
}

/// Request body for `POST /queues` and `PUT /queues/{id}`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct QueueIn {
    /// The id of the new queue. Only read on `POST /queues`; `PUT /queues/{id}` takes the id
    /// from the path and ignores this field, so it defaults to empty rather than rejecting the
    /// request body.
    #[serde(default)]
    pub id:                        String,
    /// The topic this queue subscribes to, if any.
    pub topic_id:                  Option<String>,
    /// The dead queue messages are routed to once `message_max_deliveries` is exceeded.
    pub dead_queue_id:             Option<String>,
    /// The visibility timeout, in seconds.
    pub ack_deadline_seconds:      i32,
    /// How long a message survives before it is discarded, in seconds.
    pub message_retention_seconds: i64,
    /// Optional attribute filters a publish must satisfy to be admitted to this queue.
    pub message_filters:           Option<HashMap<String, HashSet<String>>>,
    /// Maximum delivery attempts before dead-letter migration.
    pub message_max_deliveries:    Option<i32>,
    /// Initial scheduling delay applied to newly published messages, in seconds.
    pub delivery_delay_seconds:    Option<i32>,
}

/// Response body for queue endpoints.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct QueueOut {
    /// The queue's id.
    pub id:                        String,
    /// The topic this queue subscribes to, if any.
    pub topic_id:                  Option<String>,
    /// The dead queue messages are routed to once `message_max_deliveries` is exceeded.
    pub dead_queue_id:             Option<String>,
    /// The visibility timeout, in seconds.
    pub ack_deadline_seconds:      i32,
    /// How long a message survives before it is discarded, in seconds.
    pub message_retention_seconds: i64,
    /// Optional attribute filters a publish must satisfy to be admitted to this queue.
    pub message_filters:           Option<HashMap<String, HashSet<String>>>,
    /// Maximum delivery attempts before dead-letter migration.
    pub message_max_deliveries:    Option<i32>,
    /// Initial scheduling delay applied to newly published messages, in seconds.
    pub delivery_delay_seconds:    Option<i32>,
    /// When the queue was created.
    pub created_at:                DateTime<Utc>,
    /// When the queue was last updated.
    pub updated_at:                DateTime<Utc>,
}

/// Response body for `GET /queues/{id}/stats`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Number of messages currently eligible for a lease.
    pub num_undelivered_messages:          i64,
    /// Age, in seconds, of the oldest currently-eligible message. `0` if there are none.
    pub oldest_unacked_message_age_seconds: i64,
}

/// Request body for `PUT /queues/{id}/redrive`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RedriveIn {
    /// The queue to move currently-consumable messages to.
    pub destination_queue_id: String,
}

/// Request body for `POST /topics/{id}/messages`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MessageIn {
    /// The opaque payload of the message.
    pub data:       serde_json::Value,
    /// Attributes used by the filter engine and visible to consumers.
    pub attributes: Option<HashMap<String, String>>,
}

/// Response body for message endpoints.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MessageOut {
    /// The message's id.
    pub id:                Uuid,
    /// The queue this message currently resides in.
    pub queue_id:          String,
    /// The opaque payload of the message.
    pub data:              serde_json::Value,
    /// Attributes used by the filter engine and visible to consumers.
    pub attributes:        Option<HashMap<String, String>>,
    /// How many times this message has been leased.
    pub delivery_attempts: i32,
    /// When this message becomes eligible for discard.
    pub expired_at:        DateTime<Utc>,
    /// When this message next becomes visible to a lease.
    pub scheduled_at:      DateTime<Utc>,
    /// When this message was created (or last redriven/dead-lettered).
    pub created_at:        DateTime<Utc>,
    /// When this message was last mutated.
    pub updated_at:        DateTime<Utc>,
}

/// A generic `{"data": [...]}` envelope used by every list endpoint in this service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ListResponse<T> {
    /// The page of results.
    pub data: Vec<T>,
}

/// Structured error body returned alongside non-2xx responses.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    /// A human readable description of what went wrong.
    pub error: String,
}

/// Test-only helpers shared by the router, logger, and server test suites.
#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use hyper::Body;
    use tokio::runtime::{Builder, Runtime};

    /// Build a single-threaded tokio runtime suitable for blocking on async test code.
    pub fn make_runtime() -> Runtime {
        Builder::new_current_thread().enable_all().build().unwrap()
    }

    /// Drain a hyper body synchronously, for use in tests.
    pub fn read_body(body: &mut Body) -> Vec<u8> {
        make_runtime().block_on(async { crate::read_body(body, None).await.unwrap().unwrap() })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn id_validation() {
        assert!(is_valid_id("my-topic.v1_2"));
        assert!(!is_valid_id(""));
        assert!(!is_valid_id("has a space"));
        assert!(!is_valid_id("has/slash"));
        assert!(!is_valid_id(&"a".repeat(129)));
        assert!(is_valid_id(&"a".repeat(128)));
    }
}
