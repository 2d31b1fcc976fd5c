//! Replication run-loop.
use std::time::Duration;

use tokio::sync::watch;

use crate::event::{BusError, Consumer, EventSubscriber, InboundMessage};

/// Lifecycle of a [`ReplicationDriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Starting,
    Subscribed,
    Polling,
    Draining,
    Closed,
}

/// Feed bus messages to an [`EventSubscriber`], one at a time, in order.
pub struct ReplicationDriver {
    consumer: Box<dyn Consumer>,
    subscriber: EventSubscriber,
    topics: Vec<String>,
    poll_interval: Duration,
    state: watch::Sender<DriverState>,
}

impl ReplicationDriver {
    /// Create a new [`ReplicationDriver`].
    pub fn new(
        consumer: Box<dyn Consumer>,
        subscriber: EventSubscriber,
        topics: Vec<String>,
        poll_interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(DriverState::Starting);

        Self {
            consumer,
            subscriber,
            topics,
            poll_interval,
            state,
        }
    }

    /// Observe lifecycle transitions.
    pub fn state(&self) -> watch::Receiver<DriverState> {
        self.state.subscribe()
    }

    fn transition(&self, state: DriverState) {
        tracing::debug!(?state, "replication driver transition");
        self.state.send_replace(state);
    }

    /// Subscribe, then poll until `shutdown` turns `true`.
    ///
    /// The flag is read once per iteration, so a message being applied is
    /// always finished before the consumer is released. Only a failed
    /// subscription is returned as an error.
    pub async fn run(
        mut self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<(), BusError> {
        if let Err(err) = self.consumer.subscribe(&self.topics) {
            tracing::error!(topics = ?self.topics, error = %err, "cannot subscribe to topics");
            self.consumer.close();
            self.transition(DriverState::Closed);
            return Err(err);
        }
        self.transition(DriverState::Subscribed);
        tracing::info!(topics = ?self.topics, "replication subscribed");

        self.transition(DriverState::Polling);
        while !*shutdown.borrow() {
            match self.consumer.poll(self.poll_interval).await {
                Ok(Some(message)) => self.process(&message).await,
                Ok(None) => {},
                Err(err) => {
                    tracing::warn!(error = %err, "failed to poll events");
                    tokio::time::sleep(self.poll_interval).await;
                },
            }
        }

        self.transition(DriverState::Draining);
        self.consumer.close();
        self.transition(DriverState::Closed);
        tracing::info!("replication consumer closed");

        Ok(())
    }

    async fn process(&mut self, message: &InboundMessage) {
        if let Err(err) = self.subscriber.handle(message).await {
            tracing::error!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                method = ?message.method,
                error = %err,
                "event dropped"
            );
        }

        // dropped events are committed as well, redelivery would fail again.
        if let Err(err) = self.consumer.commit(message) {
            tracing::warn!(offset = message.offset, error = %err, "offset not committed");
        }
    }
}
