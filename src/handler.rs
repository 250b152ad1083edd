
use crate::config::Config;
use crate::record::SensorRecord;
use crate::storage::{RecordSink, StoreError};
use crate::transform::{PayloadTransformer, TransformClient, TransformError};
use chrono::Utc;
use std::sync::Arc;

/// Whether payloads go through the transform service before storage.
#[derive(Clone)]
pub enum TransformStage {
    Disabled,
    Enabled(Arc<dyn PayloadTransformer>),
    /// Transform was requested without an endpoint. Messages are dropped rather
    /// than stored untransformed.
    Unconfigured,
}

impl TransformStage {
    pub fn from_config(config: &Config) -> Result<Self, TransformError> {
        if !config.transform_enabled {
            return Ok(Self::Disabled);
        }
        match config.transform_endpoint() {
            Some(endpoint) => {
                let client = TransformClient::new(endpoint, config.transform_timeout())?;
                tracing::info!(
                    component = "transform",
                    endpoint = client.endpoint(),
                    "payload transform enabled"
                );
                Ok(Self::Enabled(Arc::new(client)))
            }
            None => {
                tracing::warn!(
                    component = "transform",
                    "ENCRYPTION enabled but ENCRYPT_API_URL not set; messages will be dropped"
                );
                Ok(Self::Unconfigured)
            }
        }
    }
}

#[derive(Debug)]
pub enum Delivery {
    Stored,
    Dropped(DropReason),
}

#[derive(Debug, thiserror::Error)]
pub enum DropReason {
    #[error("transform enabled but endpoint not set")]
    TransformUnconfigured,

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Turns one inbound message into a stored record. Holds only shared handles, so
/// clones can run concurrently.
#[derive(Clone)]
pub struct MessageHandler {
    sink: Arc<dyn RecordSink>,
    transform: TransformStage,
}

impl MessageHandler {
    pub fn new(sink: Arc<dyn RecordSink>, transform: TransformStage) -> Self {
        Self { sink, transform }
    }

    /// Every failure ends here as a dropped message; nothing is reported back to
    /// the broker.
    pub async fn handle(&self, topic: &str, payload: &[u8]) -> Delivery {
        let record = SensorRecord::from_message(topic, payload, Utc::now());
        tracing::info!(
            component = "mqtt",
            device_id = %record.device_id,
            payload = %record.payload,
            "received"
        );

        match self.persist(record).await {
            Ok(()) => Delivery::Stored,
            Err(reason) => Delivery::Dropped(reason),
        }
    }

    async fn persist(&self, mut record: SensorRecord) -> Result<(), DropReason> {
        match &self.transform {
            TransformStage::Disabled => {}
            TransformStage::Unconfigured => {
                tracing::warn!(
                    component = "transform",
                    device_id = %record.device_id,
                    "encryption enabled but API URL not set; dropping message"
                );
                return Err(DropReason::TransformUnconfigured);
            }
            TransformStage::Enabled(transformer) => {
                match transformer.transform(&record.payload).await {
                    Ok(transformed) => record.payload = transformed,
                    Err(err) => {
                        tracing::warn!(
                            component = "transform",
                            device_id = %record.device_id,
                            error = %err,
                            "transform failed; dropping message"
                        );
                        return Err(err.into());
                    }
                }
            }
        }

        if let Err(err) = self.sink.insert(&record).await {
            tracing::warn!(
                component = "mongodb",
                device_id = %record.device_id,
                error = %err,
                "insert failed; dropping message"
            );
            return Err(err.into());
        }
        tracing::debug!(component = "mongodb", device_id = %record.device_id, "stored");
        Ok(())
    }
}
