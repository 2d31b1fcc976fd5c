//! In-process bus used by tests.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::event::{
    Acknowledgment, BusError, Consumer, InboundMessage, METHOD_HEADER,
    OutboundRecord, Producer,
};

#[derive(Debug, Default)]
struct State {
    published: Vec<OutboundRecord>,
    rejection: Option<String>,
    inbox: VecDeque<Result<InboundMessage, BusError>>,
    next_offset: i64,
    subscribed: Vec<String>,
    refuse_subscription: bool,
    committed: Vec<i64>,
    closed: bool,
}

impl State {
    fn enqueue(
        &mut self,
        topic: String,
        method: Option<String>,
        payload: Vec<u8>,
    ) -> i64 {
        let offset = self.next_offset;
        self.next_offset += 1;
        self.inbox.push_back(Ok(InboundMessage {
            topic,
            partition: 0,
            offset,
            method,
            payload,
        }));
        offset
    }
}

/// Shared handle on an in-process bus. Clones see the same state.
#[derive(Debug, Default, Clone)]
pub struct MemoryBus(Arc<Mutex<State>>);

impl MemoryBus {
    /// Records handed to the producer side.
    pub fn published(&self) -> Vec<OutboundRecord> {
        self.0.lock().unwrap().published.clone()
    }

    /// Fail every following delivery.
    pub fn reject_deliveries(&self, reason: &str) {
        self.0.lock().unwrap().rejection = Some(reason.to_owned());
    }

    /// Make the next subscription attempt fail.
    pub fn refuse_subscription(&self) {
        self.0.lock().unwrap().refuse_subscription = true;
    }

    /// Queue a message for the consumer side.
    pub fn push(&self, topic: &str, method: Option<&str>, payload: &[u8]) {
        self.0.lock().unwrap().enqueue(
            topic.to_owned(),
            method.map(str::to_owned),
            payload.to_vec(),
        );
    }

    /// Queue a consume error.
    pub fn push_error(&self, err: BusError) {
        self.0.lock().unwrap().inbox.push_back(Err(err));
    }

    pub fn consumer(&self) -> MemoryConsumer {
        MemoryConsumer(self.clone())
    }

    pub fn subscribed(&self) -> Vec<String> {
        self.0.lock().unwrap().subscribed.clone()
    }

    pub fn committed(&self) -> Vec<i64> {
        self.0.lock().unwrap().committed.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.0.lock().unwrap().closed
    }
}

#[async_trait]
impl Producer for MemoryBus {
    async fn send(
        &self,
        record: OutboundRecord,
        _timeout: Duration,
    ) -> Acknowledgment {
        let mut state = self.0.lock().unwrap();
        if let Some(reason) = &state.rejection {
            return Acknowledgment::Failed {
                reason: reason.clone(),
            };
        }

        assert!(!record.method.is_empty(), "{METHOD_HEADER} header missing");
        state.published.push(record.clone());

        // published records reach every consumer of their topic.
        let offset = state.enqueue(
            record.topic,
            Some(record.method),
            record.payload,
        );
        Acknowledgment::Delivered {
            partition: 0,
            offset,
        }
    }
}

/// Consumer side of a [`MemoryBus`].
#[derive(Debug)]
pub struct MemoryConsumer(MemoryBus);

#[async_trait]
impl Consumer for MemoryConsumer {
    fn subscribe(&mut self, topics: &[String]) -> Result<(), BusError> {
        let mut state = self.0.0.lock().unwrap();
        if state.refuse_subscription {
            return Err(BusError::Subscription("unknown topic".into()));
        }
        state.subscribed = topics.to_vec();
        Ok(())
    }

    async fn poll(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<InboundMessage>, BusError> {
        let next = {
            let mut state = self.0.0.lock().unwrap();
            loop {
                match state.inbox.pop_front() {
                    Some(Ok(message))
                        if !state.subscribed.contains(&message.topic) =>
                    {
                        continue;
                    },
                    next => break next,
                }
            }
        };
        match next {
            Some(message) => message.map(Some),
            None => {
                tokio::time::sleep(timeout).await;
                Ok(None)
            },
        }
    }

    fn commit(&mut self, message: &InboundMessage) -> Result<(), BusError> {
        self.0.0.lock().unwrap().committed.push(message.offset);
        Ok(())
    }

    fn close(&mut self) {
        self.0.0.lock().unwrap().closed = true;
    }
}
