//! Range-query client for the metrics backend

use rekuper_core::config::PrometheusSettings;
use rekuper_core::{Error, RangeResponse, Result};

pub struct PrometheusClient {
    client: reqwest::Client,
    api_url: String,
    step_seconds: u64,
}

impl PrometheusClient {
    pub fn new(settings: &PrometheusSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!settings.ssl_verify)
            .build()
            .map_err(|e| Error::Internal(format!("cannot build http client: {e}")))?;
        Ok(Self {
            client,
            api_url: settings.api_url.clone(),
            step_seconds: settings.step_seconds,
        })
    }

    /// One range query over `[start, end]` in unix seconds. Any failure here
    /// is an upstream error; the caller decides whether to skip the batch.
    pub async fn range_query(&self, query: &str, start: i64, end: i64) -> Result<RangeResponse> {
        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("query", query.to_string()),
                ("start", start.to_string()),
                ("end", end.to_string()),
                ("step", self.step_seconds.to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::Upstream(format!("metrics backend unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Upstream(format!(
                "metrics backend answered {}",
                response.status()
            )));
        }
        let parsed: RangeResponse = response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("unreadable range response: {e}")))?;
        if parsed.status != "success" {
            return Err(Error::Upstream(format!(
                "range query failed with status {}",
                parsed.status
            )));
        }
        Ok(parsed)
    }
}
