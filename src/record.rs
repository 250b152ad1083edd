use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One persisted telemetry message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRecord {
    pub device_id: String,
    pub payload: String,
    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub timestamp: DateTime<Utc>,
}

impl SensorRecord {
    /// Builds the record for a message received at `received_at`. Invalid UTF-8 in
    /// the payload is replaced rather than rejected.
    pub fn from_message(topic: &str, payload: &[u8], received_at: DateTime<Utc>) -> Self {
        Self {
            device_id: device_id_from_topic(topic).to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            timestamp: received_at,
        }
    }
}

/// Last `/`-separated segment of the topic, or the whole topic when it has none.
pub fn device_id_from_topic(topic: &str) -> &str {
    topic.rsplit('/').next().unwrap_or(topic)
}
