/// Conditions that stop the bridge. Returned to `main`, which exits non-zero.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("MQTT connection to {broker} failed: {source}")]
    BusConnect {
        broker: String,
        #[source]
        source: rumqttc::ConnectionError,
    },

    #[error("MQTT subscribe to {filter} failed: {reason}")]
    BusSubscribe { filter: String, reason: String },

    #[error("MongoDB connection failed: {0}")]
    StoreConnect(String),
}
