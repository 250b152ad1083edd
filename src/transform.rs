//! Client for the external payload transformation (encryption) service.
//!
//! The service takes `{"text": ...}` on `POST <base>encrypt` and answers
//! `{"result": ...}` with status 200. Anything else is a failure and the
//! message carrying the payload is dropped by the caller.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("transform request timed out")]
    Timeout,

    #[error("transform request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("transform returned non-200 response: {0}")]
    Status(StatusCode),

    #[error("transform response decode failed: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Rewrites a payload before it is stored.
#[async_trait]
pub trait PayloadTransformer: Send + Sync {
    async fn transform(&self, payload: &str) -> Result<String, TransformError>;
}

#[derive(Serialize)]
struct TransformRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct TransformResponse {
    result: String,
}

#[derive(Clone, Debug)]
pub struct TransformClient {
    client: Client,
    endpoint: String,
}

impl TransformClient {
    /// `endpoint` is the full URL, `<base>encrypt`. `timeout` bounds the whole
    /// exchange including reading the body.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, TransformError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransformError::Request)?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl PayloadTransformer for TransformClient {
    async fn transform(&self, payload: &str) -> Result<String, TransformError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&TransformRequest { text: payload })
            .send()
            .await
            .map_err(|err| classify(err, TransformError::Request))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(TransformError::Status(status));
        }

        let body: TransformResponse = response
            .json()
            .await
            .map_err(|err| classify(err, TransformError::Decode))?;
        Ok(body.result)
    }
}

fn classify(err: reqwest::Error, otherwise: fn(reqwest::Error) -> TransformError) -> TransformError {
    if err.is_timeout() {
        TransformError::Timeout
    } else {
        otherwise(err)
    }
}
