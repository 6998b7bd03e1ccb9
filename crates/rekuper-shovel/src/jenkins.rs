//! Resolves version metadata from CI builds
//!
//! A correlation id label is a URL pointing below a Jenkins build. The
//! resolver canonicalizes it, fetches the build's JSON API once and reads the
//! satellite and snap versions out of the CI_MESSAGE build parameter. Results
//! are memoized per correlation id so a run touches each build at most once
//! per distinct label value.

use rekuper_core::config::JenkinsSettings;
use rekuper_core::{Error, ResolvedVersion, Result};
use std::collections::HashMap;
use tracing::debug;

pub struct VersionResolver {
    client: reqwest::Client,
    username: String,
    token: String,
    api_suffix: String,
    cache: HashMap<String, ResolvedVersion>,
}

impl VersionResolver {
    pub fn new(settings: &JenkinsSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!settings.ssl_verify)
            .build()
            .map_err(|e| Error::Internal(format!("cannot build http client: {e}")))?;
        Ok(Self {
            client,
            username: settings.username.clone(),
            token: settings.token.clone(),
            api_suffix: settings.api_suffix.clone(),
            cache: HashMap::new(),
        })
    }

    pub async fn resolve(&mut self, correlation_id: &str) -> Result<ResolvedVersion> {
        if let Some(hit) = self.cache.get(correlation_id) {
            debug!(correlation_id, "build metadata cache hit");
            return Ok(hit.clone());
        }

        let url = format!(
            "{}/{}",
            canonical_build_url(correlation_id),
            self.api_suffix
        );
        let response = self
            .client
            .get(&url)
            .basic_auth(&self.username, Some(&self.token))
            .send()
            .await
            .map_err(|e| Error::MetadataLookup(format!("build fetch failed for {url}: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::MetadataLookup(format!(
                "build api answered {} for {url}",
                response.status()
            )));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::MetadataLookup(format!("unreadable build response: {e}")))?;

        let resolved = parse_build_parameters(&body)?;
        self.cache
            .insert(correlation_id.to_string(), resolved.clone());
        Ok(resolved)
    }
}

/// Drops the last path segment. Correlation ids point at a page below the
/// build (a console log or artifact path), so the parent is the build itself.
fn canonical_build_url(correlation_id: &str) -> &str {
    correlation_id
        .rsplit_once('/')
        .map(|(build, _)| build)
        .unwrap_or("")
}

/// Digs the CI_MESSAGE parameter out of the build's actions. Jenkins emits
/// the message with single quotes, so it is normalized before JSON parsing.
fn parse_build_parameters(body: &serde_json::Value) -> Result<ResolvedVersion> {
    let parameters = body["actions"]
        .as_array()
        .into_iter()
        .flatten()
        .find(|action| action["_class"] == "hudson.model.ParametersAction")
        .and_then(|action| action["parameters"].as_array())
        .ok_or_else(|| Error::MetadataLookup("build has no parameters action".into()))?;

    let raw_message = parameters
        .iter()
        .find(|p| p["name"] == "CI_MESSAGE")
        .and_then(|p| p["value"].as_str())
        .ok_or_else(|| Error::MetadataLookup("build has no CI_MESSAGE parameter".into()))?;

    let message: serde_json::Value = serde_json::from_str(&raw_message.replace('\'', "\""))
        .map_err(|e| Error::MetadataLookup(format!("CI_MESSAGE is not valid JSON: {e}")))?;

    let field = |name: &str| {
        message[name]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| Error::MetadataLookup(format!("CI_MESSAGE is missing {name}")))
    };
    Ok(ResolvedVersion {
        sat_version: field("satellite_version")?,
        snap_version: field("snap_version")?,
    })
}
