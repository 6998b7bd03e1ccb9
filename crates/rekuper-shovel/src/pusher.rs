//! Pushes records to the record store's upsert endpoints

use rekuper_core::{Error, RecordPayload, Result};
use reqwest::StatusCode;
use tracing::warn;

pub struct RecordPusher {
    client: reqwest::Client,
    server: String,
}

impl RecordPusher {
    pub fn new(server: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            server: server.trim_end_matches('/').to_string(),
        }
    }

    /// One upsert. A 409 means a concurrent writer created the same entity
    /// between our read and write; the store merges on the second attempt, so
    /// a conflict is retried exactly once.
    pub async fn push(&self, endpoint: &str, payload: &RecordPayload) -> Result<()> {
        match self.attempt(endpoint, payload).await {
            Err(Error::Conflict(reason)) => {
                warn!(endpoint, reason, "conflict on push, retrying once");
                self.attempt(endpoint, payload).await
            }
            other => other,
        }
    }

    async fn attempt(&self, endpoint: &str, payload: &RecordPayload) -> Result<()> {
        let url = format!("{}{}", self.server, endpoint);
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("record store unreachable: {e}")))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status == StatusCode::BAD_REQUEST {
            Err(Error::Validation(body_message(response).await))
        } else if status == StatusCode::CONFLICT {
            Err(Error::Conflict(body_message(response).await))
        } else {
            Err(Error::Upstream(format!("record store answered {status}")))
        }
    }
}

async fn body_message(response: reqwest::Response) -> String {
    response
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| body["message"].as_str().map(String::from))
        .unwrap_or_else(|| "no detail".to_string())
}
