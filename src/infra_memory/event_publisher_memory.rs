use crate::domain_port::EventPublisher;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::info;

const RETAINED_EVENTS: usize = 1024;

type Sent = (String, Vec<u8>, Vec<u8>);

/// Keeps the most recent events in memory and echoes them to the log. Stands
/// in for the broker when no Kafka cluster is configured.
#[derive(Debug, Default)]
pub struct MemoryEventPublisher {
    sent: Mutex<VecDeque<Sent>>,
}

impl MemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(topic, key, payload)` in publish order, oldest dropped first.
    pub fn events(&self) -> Vec<Sent> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl EventPublisher for MemoryEventPublisher {
    async fn publish(&self, topic: &str, key: &[u8], payload: &[u8]) -> anyhow::Result<()> {
        info!(topic, payload = %String::from_utf8_lossy(payload), "event");
        let mut sent = self
            .sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if sent.len() == RETAINED_EVENTS {
            sent.pop_front();
        }
        sent.push_back((topic.to_owned(), key.to_vec(), payload.to_vec()));
        Ok(())
    }
}
