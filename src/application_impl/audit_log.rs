use crate::domain_model::AuditEvent;
use crate::domain_port::EventPublisher;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Best-effort audit trail on the event bus.
///
/// Emission is bounded by `timeout` and never fails the caller: by the time
/// an event is emitted the session change it describes is already durable.
pub struct AuditLog {
    publisher: Arc<dyn EventPublisher>,
    topic: String,
    timeout: Duration,
}

impl AuditLog {
    pub fn new(publisher: Arc<dyn EventPublisher>, topic: &str, timeout: Duration) -> Self {
        Self {
            publisher,
            topic: topic.to_owned(),
            timeout,
        }
    }

    pub async fn emit(&self, event: AuditEvent) {
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "audit event not serializable");
                return;
            }
        };

        let publish = self
            .publisher
            .publish(&self.topic, event.key().as_bytes(), &payload);
        match tokio::time::timeout(self.timeout, publish).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, message = %event.message, "audit event dropped"),
            Err(_) => warn!(message = %event.message, "audit event timed out"),
        }
    }
}
