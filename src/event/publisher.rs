use std::sync::Arc;
use std::time::Duration;

use crate::config::Topics;
use crate::event::{Acknowledgment, Envelope, OutboundRecord, Producer};

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to serialize event")]
    Serialize(#[from] serde_json::Error),
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Fate of the event announcing a committed mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Delivered,
    Failed(String),
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }
}

/// Announce committed local mutations on the bus.
#[derive(Clone)]
pub struct EventPublisher {
    producer: Arc<dyn Producer>,
    topics: Topics,
    timeout: Duration,
}

impl EventPublisher {
    /// Create a new [`EventPublisher`].
    ///
    /// `timeout` bounds how long a publish waits for its acknowledgment.
    pub fn new(
        producer: Arc<dyn Producer>,
        topics: Topics,
        timeout: Duration,
    ) -> Self {
        Self {
            producer,
            topics,
            timeout,
        }
    }

    /// Send an envelope and wait for its acknowledgment.
    ///
    /// Must only be called once the mutation is committed locally.
    pub async fn publish(&self, envelope: &Envelope) -> Result<(), PublishError> {
        let method = envelope.routing_key().to_string();
        let record = OutboundRecord {
            topic: envelope.entity_kind.topic(&self.topics).to_owned(),
            key: envelope.entity_kind.to_string(),
            method: method.clone(),
            payload: serde_json::to_vec(&envelope.payload)?,
        };
        let topic = record.topic.clone();

        match self.producer.send(record, self.timeout).await {
            Acknowledgment::Delivered { partition, offset } => {
                metrics::counter!("events_published_total", "method" => method.clone(), "status" => "delivered")
                    .increment(1);
                tracing::debug!(%topic, %method, partition, offset, "event delivered");
                Ok(())
            },
            Acknowledgment::Failed { reason } => {
                metrics::counter!("events_published_total", "method" => method, "status" => "failed")
                    .increment(1);
                Err(PublishError::Delivery(reason))
            },
        }
    }

    /// Publish without failing the caller.
    ///
    /// The local write stays committed whatever happens to its event.
    pub async fn announce(&self, envelope: Envelope) -> Delivery {
        match self.publish(&envelope).await {
            Ok(()) => Delivery::Delivered,
            Err(err) => {
                tracing::warn!(
                    method = %envelope.routing_key(),
                    error = %err,
                    "event not published, replicas will miss this mutation"
                );
                Delivery::Failed(err.to_string())
            },
        }
    }
}
