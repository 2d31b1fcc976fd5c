//! Replicated mutation events.
//!
//! An [`Envelope`] is the unit placed on the bus. Its routing header
//! (`method`) lets consumers dispatch without deserializing the payload:
//! `POST.USER`, `PUT.ROLE`, `DELETE.USER`...
pub mod driver;
#[cfg(test)]
pub mod memory;
pub mod publisher;
pub mod subscriber;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};

use crate::config::Topics;

pub use driver::{DriverState, ReplicationDriver};
pub use publisher::{Delivery, EventPublisher, PublishError};
pub use subscriber::{EventSubscriber, Outcome, ReplicationError};

/// Header carrying the routing key.
pub const METHOD_HEADER: &str = "method";

/// Replicated entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Role,
}

impl EntityKind {
    fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "USER",
            EntityKind::Role => "ROLE",
        }
    }

    /// Topic carrying events of this kind.
    pub fn topic<'a>(&self, topics: &'a Topics) -> &'a str {
        match self {
            EntityKind::User => &topics.users,
            EntityKind::Role => &topics.roles,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutation carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    fn verb(&self) -> &'static str {
        match self {
            Operation::Insert => "POST",
            Operation::Update => "PUT",
            Operation::Delete => "DELETE",
        }
    }
}

/// `<VERB>.<ENTITY>` routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoutingKey {
    pub kind: EntityKind,
    pub operation: Operation,
}

impl RoutingKey {
    /// Parse a `method` header value. Unknown keys yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        let (verb, entity) = value.trim().split_once('.')?;
        let operation = match verb {
            "POST" => Operation::Insert,
            "PUT" => Operation::Update,
            "DELETE" => Operation::Delete,
            _ => return None,
        };
        let kind = match entity {
            "USER" => EntityKind::User,
            "ROLE" => EntityKind::Role,
            _ => return None,
        };

        Some(Self { kind, operation })
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.operation.verb(), self.kind)
    }
}

/// Snapshot of a committed local mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub entity_kind: EntityKind,
    pub operation: Operation,
    pub payload: Value,
}

impl Envelope {
    /// Full record snapshot for inserts and updates.
    pub fn snapshot<T: Serialize>(
        entity_kind: EntityKind,
        operation: Operation,
        record: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            entity_kind,
            operation,
            payload: serde_json::to_value(record)?,
        })
    }

    /// Deletions only carry the identity.
    pub fn deletion(entity_kind: EntityKind, id: &str) -> Self {
        Self {
            entity_kind,
            operation: Operation::Delete,
            payload: json!({ "id": id }),
        }
    }

    pub fn routing_key(&self) -> RoutingKey {
        RoutingKey {
            kind: self.entity_kind,
            operation: self.operation,
        }
    }
}

/// Message handed to the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRecord {
    pub topic: String,
    /// Partition key; events of one kind share a partition to keep order.
    pub key: String,
    pub method: String,
    pub payload: Vec<u8>,
}

/// Message received from the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub method: Option<String>,
    pub payload: Vec<u8>,
}

/// Result of one publish attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Acknowledgment {
    Delivered { partition: i32, offset: i64 },
    Failed { reason: String },
}

/// Errors raised by the bus transport.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to create client: {0}")]
    Client(String),
    #[error("subscription failed: {0}")]
    Subscription(String),
    #[error("failed to consume: {0}")]
    Consume(String),
    #[error("failed to commit offset: {0}")]
    Commit(String),
}

/// Sending side of the bus.
#[async_trait]
pub trait Producer: Send + Sync {
    /// Send one record and wait for its single acknowledgment.
    async fn send(
        &self,
        record: OutboundRecord,
        timeout: Duration,
    ) -> Acknowledgment;
}

/// Receiving side of the bus, owned by the replication loop.
#[async_trait]
pub trait Consumer: Send {
    fn subscribe(&mut self, topics: &[String]) -> Result<(), BusError>;

    /// Wait at most `timeout` for the next message.
    async fn poll(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<InboundMessage>, BusError>;

    /// Mark a message as processed so its offset gets committed.
    fn commit(&mut self, message: &InboundMessage) -> Result<(), BusError>;

    /// Release the consumer.
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_keys() {
        let key = RoutingKey::parse("POST.USER").unwrap();
        assert_eq!(key.kind, EntityKind::User);
        assert_eq!(key.operation, Operation::Insert);
        assert_eq!(key.to_string(), "POST.USER");

        let key = RoutingKey::parse("DELETE.ROLE").unwrap();
        assert_eq!(key.to_string(), "DELETE.ROLE");
        assert_eq!(
            RoutingKey::parse("PUT.ROLE").map(|k| k.operation),
            Some(Operation::Update)
        );

        for unknown in ["", "POST", "PATCH.USER", "POST.GROUP", "post.user"] {
            assert_eq!(RoutingKey::parse(unknown), None, "{unknown}");
        }
    }

    #[test]
    fn test_deletion_carries_only_identity() {
        let envelope = Envelope::deletion(EntityKind::Role, "r1");
        assert_eq!(envelope.payload, json!({ "id": "r1" }));
        assert_eq!(envelope.routing_key().to_string(), "DELETE.ROLE");
    }

    #[test]
    fn test_topic_derived_from_kind() {
        let topics = Topics::default();
        assert_eq!(EntityKind::User.topic(&topics), "users");
        assert_eq!(EntityKind::Role.topic(&topics), "roles");
    }
}
