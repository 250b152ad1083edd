use crate::error::StartupError;
use crate::record::SensorRecord;
use async_trait::async_trait;
use mongodb::bson::doc;
use mongodb::options::{Acknowledgment, ClientOptions, WriteConcern};
use mongodb::{Client, Collection};
use std::future::IntoFuture;
use std::time::Duration;
use tokio::time::timeout;

const APP_NAME: &str = "mqtt-orchestrator";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("insert timed out after {0:?}")]
    Timeout(Duration),

    #[error("insert failed: {0}")]
    Mongo(#[from] mongodb::error::Error),
}

/// Write-only destination for records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn insert(&self, record: &SensorRecord) -> Result<(), StoreError>;
}

#[derive(Clone, Debug)]
pub struct MongoSink {
    collection: Collection<SensorRecord>,
    insert_timeout: Duration,
}

impl MongoSink {
    /// Opens the client with majority write concern and pings the database, all
    /// within `setup_timeout`. The driver connects lazily, so the ping is what
    /// proves the store is reachable.
    pub async fn connect(
        uri: &str,
        database: &str,
        collection: &str,
        setup_timeout: Duration,
        insert_timeout: Duration,
    ) -> Result<Self, StartupError> {
        let opened = timeout(
            setup_timeout,
            open_collection(uri, database, collection, setup_timeout),
        )
        .await;
        let collection = match opened {
            Ok(Ok(collection)) => collection,
            Ok(Err(err)) => return Err(StartupError::StoreConnect(err.to_string())),
            Err(_) => {
                return Err(StartupError::StoreConnect(format!(
                    "timed out after {setup_timeout:?}"
                )))
            }
        };
        tracing::info!(
            component = "mongodb",
            database,
            collection = collection.name(),
            "connected"
        );
        Ok(Self {
            collection,
            insert_timeout,
        })
    }
}

/// Majority write concern, with both connect and server selection bounded by
/// `setup_timeout`.
async fn client_options(
    uri: &str,
    setup_timeout: Duration,
) -> mongodb::error::Result<ClientOptions> {
    let mut options = ClientOptions::parse(uri).await?;
    options.app_name = Some(APP_NAME.to_string());
    options.write_concern = Some(WriteConcern::builder().w(Acknowledgment::Majority).build());
    options.connect_timeout = Some(setup_timeout);
    options.server_selection_timeout = Some(setup_timeout);
    Ok(options)
}

async fn open_collection(
    uri: &str,
    database: &str,
    collection: &str,
    setup_timeout: Duration,
) -> mongodb::error::Result<Collection<SensorRecord>> {
    let options = client_options(uri, setup_timeout).await?;
    let client = Client::with_options(options)?;
    let db = client.database(database);
    db.run_command(doc! { "ping": 1 }).await?;
    Ok(db.collection(collection))
}

#[async_trait]
impl RecordSink for MongoSink {
    async fn insert(&self, record: &SensorRecord) -> Result<(), StoreError> {
        match timeout(
            self.insert_timeout,
            self.collection.insert_one(record).into_future(),
        )
        .await
        {
            Ok(result) => {
                result?;
                Ok(())
            }
            Err(_) => Err(StoreError::Timeout(self.insert_timeout)),
        }
    }
}
