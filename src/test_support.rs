use crate::record::SensorRecord;
use crate::storage::{RecordSink, StoreError};
use async_trait::async_trait;
use axum::Router;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Serves `router` on an ephemeral local port and returns its base URL with a trailing `/`.
pub async fn spawn_transform_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    format!("http://{addr}/")
}

/// In-memory sink that records every insert. Inserts for device IDs listed in
/// `fail_devices` are counted but rejected.
#[derive(Default)]
pub struct MemorySink {
    pub records: Mutex<Vec<SensorRecord>>,
    pub attempts: AtomicUsize,
    pub fail_devices: Vec<String>,
}

impl MemorySink {
    pub fn failing_for(devices: &[&str]) -> Self {
        Self {
            fail_devices: devices.iter().map(|d| d.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn stored(&self) -> Vec<SensorRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn insert(&self, record: &SensorRecord) -> Result<(), StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_devices.iter().any(|d| d == &record.device_id) {
            return Err(StoreError::Timeout(std::time::Duration::from_millis(1)));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}
