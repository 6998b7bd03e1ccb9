//! Settings for the shovel pipeline and the record store
//!
//! A single TOML file carries both processes' configuration; each command
//! reads the sections it needs. `load` only parses; ingestion-specific
//! validation runs in [`Settings::validate_ingest`] so the store can be
//! served from a file that omits the `[prometheus]`/`[jenkins]` sections.

use crate::error::{Error, Result};
use crate::types::ResourceKind;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

fn default_lookback_hours() -> u64 {
    24
}

fn default_batch_hours() -> u64 {
    6
}

fn default_step_seconds() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_api_suffix() -> String {
    "api/json".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub prometheus: Option<PrometheusSettings>,
    #[serde(default)]
    pub jenkins: Option<JenkinsSettings>,
    pub store: StoreSettings,
}

/// Range-query settings for the metrics backend.
#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusSettings {
    pub api_url: String,
    /// Range query per resource kind; only configured kinds are scraped.
    pub query: HashMap<ResourceKind, String>,
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u64,
    #[serde(default = "default_batch_hours")]
    pub batch_hours: u64,
    #[serde(default = "default_step_seconds")]
    pub step_seconds: u64,
    #[serde(default = "default_true")]
    pub ssl_verify: bool,
}

/// Credentials and endpoint shape for the CI system.
#[derive(Debug, Clone, Deserialize)]
pub struct JenkinsSettings {
    pub username: String,
    pub token: String,
    #[serde(default = "default_api_suffix")]
    pub api_suffix: String,
    #[serde(default = "default_true")]
    pub ssl_verify: bool,
}

/// Record store settings: where the pipeline pushes to, and where `serve`
/// persists and listens.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub db_path: Option<String>,
    #[serde(default)]
    pub listen_addr: Option<String>,
    #[serde(default)]
    pub kinds: HashMap<ResourceKind, KindSettings>,
}

/// Per-kind upsert endpoint and payload-field to metric-label mapping.
#[derive(Debug, Clone, Deserialize)]
pub struct KindSettings {
    #[serde(default)]
    pub endpoint: Option<String>,
    pub payload: HashMap<String, String>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfiguration(format!("cannot read {}: {e}", path.display()))
        })?;
        toml::from_str(&raw).map_err(|e| {
            Error::InvalidConfiguration(format!("cannot parse {}: {e}", path.display()))
        })
    }

    pub fn prometheus(&self) -> Result<&PrometheusSettings> {
        self.prometheus.as_ref().ok_or_else(|| {
            Error::InvalidConfiguration("[prometheus] section is required for ingestion".into())
        })
    }

    pub fn jenkins(&self) -> Result<&JenkinsSettings> {
        self.jenkins.as_ref().ok_or_else(|| {
            Error::InvalidConfiguration("[jenkins] section is required for ingestion".into())
        })
    }

    /// Resource kinds this run covers, in a stable order.
    pub fn kinds(&self) -> Vec<ResourceKind> {
        let Some(prometheus) = &self.prometheus else {
            return Vec::new();
        };
        ResourceKind::ALL
            .into_iter()
            .filter(|kind| prometheus.query.contains_key(kind))
            .collect()
    }

    /// Database path for `serve`, warning when the default is assumed.
    pub fn db_path(&self) -> String {
        match &self.store.db_path {
            Some(path) => path.clone(),
            None => {
                warn!("store.db_path not set, defaulting to rekuper.db");
                "rekuper.db".to_string()
            }
        }
    }

    /// Listen address for `serve`, warning when the default is assumed.
    pub fn listen_addr(&self) -> String {
        match &self.store.listen_addr {
            Some(addr) => addr.clone(),
            None => {
                warn!("store.listen_addr not set, defaulting to 127.0.0.1:8000");
                "127.0.0.1:8000".to_string()
            }
        }
    }

    /// Upsert endpoint for one kind, defaulting to `/<kind>`.
    pub fn endpoint(&self, kind: ResourceKind) -> String {
        self.store
            .kinds
            .get(&kind)
            .and_then(|k| k.endpoint.clone())
            .unwrap_or_else(|| format!("/{}", kind.as_str()))
    }

    /// Everything an ingestion run needs, checked before any I/O happens.
    pub fn validate_ingest(&self) -> Result<()> {
        let prometheus = self.prometheus()?;
        let jenkins = self.jenkins()?;

        if prometheus.lookback_hours == 0 || prometheus.batch_hours == 0 {
            return Err(Error::InvalidConfiguration(
                "prometheus.lookback_hours and prometheus.batch_hours must be positive".into(),
            ));
        }
        if prometheus.query.is_empty() {
            return Err(Error::InvalidConfiguration(
                "no resource kinds configured under prometheus.query".into(),
            ));
        }
        if jenkins.username.is_empty() || jenkins.token.is_empty() {
            return Err(Error::InvalidConfiguration(
                "jenkins.username and jenkins.token are required".into(),
            ));
        }
        if self.store.server.is_empty() {
            return Err(Error::InvalidConfiguration(
                "store.server is required for ingestion".into(),
            ));
        }
        if !prometheus.ssl_verify {
            warn!("TLS verification disabled for the metrics backend");
        }

        for kind in self.kinds() {
            let kind_settings = self.store.kinds.get(&kind).ok_or_else(|| {
                Error::InvalidConfiguration(format!("store.kinds.{kind} payload mapping missing"))
            })?;
            if !kind_settings.payload.contains_key("jenkins_url") {
                return Err(Error::InvalidConfiguration(format!(
                    "store.kinds.{kind}.payload must map jenkins_url to a label"
                )));
            }
        }
        Ok(())
    }
}
