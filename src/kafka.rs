//! Kafka transport for replicated events.
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer as _, StreamConsumer};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as _};
use rdkafka::util::Timeout;

use crate::config::Kafka;
use crate::event::{
    Acknowledgment, BusError, Consumer, InboundMessage, METHOD_HEADER,
    OutboundRecord, Producer,
};

/// Producer awaiting one delivery report per record.
#[derive(Clone)]
pub struct KafkaProducer {
    producer: FutureProducer,
}

impl KafkaProducer {
    /// Create a new [`KafkaProducer`].
    pub fn new(config: &Kafka) -> Result<Self, BusError> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("broker.address.family", &config.address_family)
            .set("message.timeout.ms", config.delivery_timeout.to_string())
            .create::<FutureProducer>()
            .map_err(|err| BusError::Client(err.to_string()))?;

        tracing::info!(brokers = %config.brokers, "kafka producer created");

        Ok(Self { producer })
    }

    /// Wait for queued records before exiting.
    pub fn flush(&self, timeout: Duration) {
        if let Err(err) = self.producer.flush(Timeout::After(timeout)) {
            tracing::warn!(error = %err, "kafka producer not flushed");
        }
    }
}

#[async_trait]
impl Producer for KafkaProducer {
    async fn send(
        &self,
        record: OutboundRecord,
        timeout: Duration,
    ) -> Acknowledgment {
        let headers = OwnedHeaders::new().insert(Header {
            key: METHOD_HEADER,
            value: Some(record.method.as_str()),
        });
        let message = FutureRecord::to(&record.topic)
            .key(&record.key)
            .payload(&record.payload)
            .headers(headers);

        match self.producer.send(message, Timeout::After(timeout)).await {
            Ok((partition, offset)) => {
                Acknowledgment::Delivered { partition, offset }
            },
            Err((err, _)) => Acknowledgment::Failed {
                reason: err.to_string(),
            },
        }
    }
}

/// Group consumer committing offsets of processed messages only.
pub struct KafkaConsumer {
    consumer: StreamConsumer,
}

impl KafkaConsumer {
    /// Create a new [`KafkaConsumer`].
    pub fn new(config: &Kafka) -> Result<Self, BusError> {
        let consumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.consumer_group)
            .set("broker.address.family", &config.address_family)
            .set("session.timeout.ms", config.session_timeout.to_string())
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .create::<StreamConsumer>()
            .map_err(|err| BusError::Client(err.to_string()))?;

        tracing::info!(
            brokers = %config.brokers,
            group = %config.consumer_group,
            "kafka consumer created"
        );

        Ok(Self { consumer })
    }
}

#[async_trait]
impl Consumer for KafkaConsumer {
    fn subscribe(&mut self, topics: &[String]) -> Result<(), BusError> {
        let topics = topics.iter().map(String::as_str).collect::<Vec<_>>();
        self.consumer
            .subscribe(&topics)
            .map_err(|err| BusError::Subscription(err.to_string()))
    }

    async fn poll(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<InboundMessage>, BusError> {
        let message =
            match tokio::time::timeout(timeout, self.consumer.recv()).await {
                Err(_) => return Ok(None),
                Ok(result) => {
                    result.map_err(|err| BusError::Consume(err.to_string()))?
                },
            };

        let method = message.headers().and_then(|headers| {
            headers
                .iter()
                .find(|header| header.key == METHOD_HEADER)
                .and_then(|header| header.value)
                .map(|value| String::from_utf8_lossy(value).into_owned())
        });

        Ok(Some(InboundMessage {
            topic: message.topic().to_owned(),
            partition: message.partition(),
            offset: message.offset(),
            method,
            payload: message.payload().unwrap_or_default().to_vec(),
        }))
    }

    fn commit(&mut self, message: &InboundMessage) -> Result<(), BusError> {
        // the stored offset is the next one to read.
        self.consumer
            .store_offset(&message.topic, message.partition, message.offset + 1)
            .map_err(|err| BusError::Commit(err.to_string()))
    }

    fn close(&mut self) {
        self.consumer.unsubscribe();
    }
}
