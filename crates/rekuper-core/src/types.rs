//! Core types for observed resources and their records

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Resource kinds tracked by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    #[serde(rename = "instances")]
    Instance,
    #[serde(rename = "containers")]
    Container,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 2] = [ResourceKind::Instance, ResourceKind::Container];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Instance => "instances",
            ResourceKind::Container => "containers",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `[first_seen, last_seen]` interval (unix seconds) during which a
/// metrics series reported an entity as present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObservationWindow {
    pub first_seen: Option<i64>,
    pub last_seen: Option<i64>,
}

impl ObservationWindow {
    pub fn new(first_seen: i64, last_seen: i64) -> Self {
        Self {
            first_seen: Some(first_seen),
            last_seen: Some(last_seen),
        }
    }

    /// Fold a newly observed window into this one. `first_seen` is only ever
    /// lowered and `last_seen` only ever raised, so the stored window stays
    /// the union of everything observed regardless of arrival order.
    pub fn merge(&mut self, new: ObservationWindow) {
        self.first_seen = match (self.first_seen, new.first_seen) {
            (Some(old), Some(incoming)) => Some(old.min(incoming)),
            (old, incoming) => old.or(incoming),
        };
        self.last_seen = match (self.last_seen, new.last_seen) {
            (Some(old), Some(incoming)) => Some(old.max(incoming)),
            (old, incoming) => old.or(incoming),
        };
    }
}

/// One matched series reduced to its label set and observation window.
#[derive(Debug, Clone)]
pub struct SeriesWindow {
    pub labels: HashMap<String, String>,
    pub window: ObservationWindow,
}

/// Version metadata resolved from a CI build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedVersion {
    pub sat_version: String,
    pub snap_version: String,
}

impl ResolvedVersion {
    /// Composite `<sat>-<snap>` string pushed to the record store.
    pub fn composite(&self) -> String {
        format!("{}-{}", self.sat_version, self.snap_version)
    }
}

/// Upsert payload for both resource kinds. Everything is optional on the wire;
/// required-field validation is the record store's job so that a malformed
/// push fails with 400 instead of a deserialization error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordPayload {
    pub name: Option<String>,
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,
    pub jenkins_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_sat_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<i64>,
}
