use crate::domain_port::EventPublisher;
use rdkafka::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::Duration;

/// Audit events are advisory, so the producer favours latency over
/// delivery guarantees: leader ack only and a short queue timeout.
pub struct KafkaPublisher {
    inner: FutureProducer,
    queue_timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(bootstrap_servers: &str, client_id: &str, queue_timeout: Duration) -> anyhow::Result<Self> {
        let inner = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("client.id", client_id)
            .set("acks", "1")
            .set("message.timeout.ms", queue_timeout.as_millis().to_string())
            .set("compression.type", "lz4")
            .create()?;
        Ok(Self {
            inner,
            queue_timeout,
        })
    }
}

#[async_trait::async_trait]
impl EventPublisher for KafkaPublisher {
    async fn publish(&self, topic: &str, key: &[u8], payload: &[u8]) -> anyhow::Result<()> {
        let rec = FutureRecord::to(topic).key(key).payload(payload);
        self.inner
            .send(rec, self.queue_timeout)
            .await
            .map(|_delivery| ())
            .map_err(|(e, _msg)| anyhow::anyhow!(e))
    }
}
