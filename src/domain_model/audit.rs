use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

pub const AUDIT_SERVICE: &str = "auth";

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Info,
    Warn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub level: AuditLevel,
    pub message: String,
    pub service: String,
    pub time: String,
}

impl AuditEvent {
    pub fn info(message: impl Into<String>) -> Self {
        AuditEvent {
            level: AuditLevel::Info,
            message: message.into(),
            service: AUDIT_SERVICE.to_string(),
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Partition key for the event bus.
    pub fn key(&self) -> &str {
        &self.service
    }
}
