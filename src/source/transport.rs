//! Sends GraphQL request bodies and returns the decoded JSON response.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::{IngestError, Result};

#[allow(async_fn_in_trait)]
pub trait Transport {
    async fn post(&self, body: &Value) -> Result<Value>;
}

/// HTTP transport with a per-request timeout fixed at construction.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpTransport {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

impl Transport for HttpTransport {
    async fn post(&self, body: &Value) -> Result<Value> {
        debug!(endpoint = %self.endpoint, "POST graphql");
        let response = self.client.post(&self.endpoint).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IngestError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<Value>().await?)
    }
}
