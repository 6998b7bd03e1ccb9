//! One ingestion run over all configured resource kinds

use crate::jenkins::VersionResolver;
use crate::prometheus::PrometheusClient;
use crate::pusher::RecordPusher;
use rekuper_core::config::Settings;
use rekuper_core::{
    extract_windows, BatchWindows, Error, RecordPayload, Result, SeriesWindow,
};
use std::collections::HashMap;
use tracing::{info, warn};

/// Per-run counters, reported once at the end.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub batches: usize,
    pub empty_batches: usize,
    pub failed_batches: usize,
    pub pushed: usize,
    pub skipped: usize,
}

/// Runs the pipeline over the configured lookback ending now.
pub async fn run(settings: &Settings) -> Result<RunSummary> {
    run_at(settings, chrono::Utc::now().timestamp()).await
}

/// A batch that cannot be queried or whose store pushes hit an outage is
/// logged as a data gap and abandoned; the run itself keeps going so one bad
/// range does not cost the whole lookback. Per-record failures (unresolvable
/// build metadata, rejected payloads) only skip that record.
pub async fn run_at(settings: &Settings, now: i64) -> Result<RunSummary> {
    settings.validate_ingest()?;
    let prometheus_settings = settings.prometheus()?;
    let prometheus = PrometheusClient::new(prometheus_settings)?;
    let mut resolver = VersionResolver::new(settings.jenkins()?)?;
    let pusher = RecordPusher::new(&settings.store.server);

    let mut summary = RunSummary::default();
    for kind in settings.kinds() {
        let (Some(query), Some(kind_settings)) = (
            prometheus_settings.query.get(&kind),
            settings.store.kinds.get(&kind),
        ) else {
            continue;
        };
        let endpoint = settings.endpoint(kind);

        let windows = BatchWindows::new(
            prometheus_settings.lookback_hours,
            prometheus_settings.batch_hours,
            now,
        )?;
        for (start, end) in windows {
            summary.batches += 1;
            let response = match prometheus.range_query(query, start, end).await {
                Ok(response) => response,
                Err(err) => {
                    warn!(%kind, start, end, %err, "batch query failed, leaving a data gap");
                    summary.failed_batches += 1;
                    continue;
                }
            };

            let series = extract_windows(&response);
            if series.is_empty() {
                info!(%kind, start, end, "no series observed in batch");
                summary.empty_batches += 1;
                continue;
            }

            for window in &series {
                match push_one(&pusher, &mut resolver, &endpoint, &kind_settings.payload, window)
                    .await
                {
                    Ok(()) => summary.pushed += 1,
                    Err(Error::Upstream(reason)) => {
                        warn!(%kind, start, end, reason, "record store unavailable, abandoning batch");
                        summary.failed_batches += 1;
                        break;
                    }
                    Err(err) => {
                        warn!(%kind, %err, "skipping record");
                        summary.skipped += 1;
                    }
                }
            }
        }
    }

    info!(
        batches = summary.batches,
        pushed = summary.pushed,
        skipped = summary.skipped,
        failed_batches = summary.failed_batches,
        "ingestion run finished"
    );
    Ok(summary)
}

async fn push_one(
    pusher: &RecordPusher,
    resolver: &mut VersionResolver,
    endpoint: &str,
    mapping: &HashMap<String, String>,
    series: &SeriesWindow,
) -> Result<()> {
    let mut payload = build_payload(mapping, series);
    let correlation_id = payload
        .jenkins_url
        .clone()
        .ok_or_else(|| Error::MetadataLookup("series carries no correlation id label".into()))?;

    let resolved = resolver.resolve(&correlation_id).await?;
    payload.job_sat_version = Some(resolved.composite());
    pusher.push(endpoint, &payload).await
}

/// Maps metric labels into payload fields per the configured mapping. Absent
/// labels stay `None`; the record store decides which fields are required.
fn build_payload(mapping: &HashMap<String, String>, series: &SeriesWindow) -> RecordPayload {
    let label = |field: &str| {
        mapping
            .get(field)
            .and_then(|name| series.labels.get(name))
            .cloned()
    };
    RecordPayload {
        name: label("name"),
        image: label("image"),
        flavor: label("flavor"),
        jenkins_url: label("jenkins_url"),
        project: label("project"),
        job_sat_version: None,
        first_seen: series.window.first_seen,
        last_seen: series.window.last_seen,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rekuper_core::ObservationWindow;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn series(labels: &[(&str, &str)], first: i64, last: i64) -> SeriesWindow {
        SeriesWindow {
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            window: ObservationWindow::new(first, last),
        }
    }

    fn mapping(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_build_payload_from_mapping() {
        let payload = build_payload(
            &mapping(&[
                ("name", "vm_name"),
                ("image", "image"),
                ("jenkins_url", "correlation_id"),
            ]),
            &series(
                &[
                    ("vm_name", "vm-1"),
                    ("image", "rhel-9"),
                    ("correlation_id", "https://ci.example.com/job/sat/42/console"),
                    ("ignored", "x"),
                ],
                100,
                200,
            ),
        );
        assert_eq!(payload.name.as_deref(), Some("vm-1"));
        assert_eq!(payload.image.as_deref(), Some("rhel-9"));
        assert_eq!(payload.flavor, None);
        assert_eq!(payload.first_seen, Some(100));
        assert_eq!(payload.last_seen, Some(200));
    }

    #[test]
    fn test_build_payload_missing_label_stays_none() {
        let payload = build_payload(
            &mapping(&[("name", "vm_name"), ("flavor", "flavor")]),
            &series(&[("vm_name", "vm-1")], 100, 200),
        );
        assert_eq!(payload.name.as_deref(), Some("vm-1"));
        assert_eq!(payload.flavor, None);
    }

    fn run_settings(prometheus_url: &str, store_url: &str) -> Settings {
        let raw = format!(
            r#"
            [prometheus]
            api_url = "{prometheus_url}/api/v1/query_range"
            lookback_hours = 2
            batch_hours = 1

            [prometheus.query]
            instances = "openstack_nova_server_status"

            [jenkins]
            username = "robot"
            token = "secret"

            [store]
            server = "{store_url}"

            [store.kinds.instances.payload]
            name = "vm_name"
            image = "image"
            jenkins_url = "correlation_id"
            "#
        );
        toml::from_str(&raw).unwrap()
    }

    fn range_body(correlation_id: &str, first: f64, last: f64) -> serde_json::Value {
        serde_json::json!({
            "status": "success",
            "data": {"result": [{
                "metric": {
                    "vm_name": "vm-1",
                    "image": "rhel-9",
                    "correlation_id": correlation_id
                },
                "values": [[first, "1"], [last, "1"]]
            }]}
        })
    }

    fn jenkins_build() -> serde_json::Value {
        serde_json::json!({
            "actions": [{
                "_class": "hudson.model.ParametersAction",
                "parameters": [{
                    "name": "CI_MESSAGE",
                    "value": "{'satellite_version': '6.15.0', 'snap_version': '3.0'}"
                }]
            }]
        })
    }

    #[tokio::test]
    async fn test_run_pushes_each_batch_and_memoizes_builds() {
        let prometheus = MockServer::start().await;
        let jenkins = MockServer::start().await;
        let store = MockServer::start().await;

        let correlation_id = format!("{}/job/sat/42/console", jenkins.uri());
        Mock::given(method("GET"))
            .and(path("/api/v1/query_range"))
            .and(query_param("start", "0"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(range_body(&correlation_id, 100.0, 200.0)),
            )
            .expect(1)
            .mount(&prometheus)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/query_range"))
            .and(query_param("start", "3600"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(range_body(&correlation_id, 3700.0, 3900.0)),
            )
            .expect(1)
            .mount(&prometheus)
            .await;

        // One build fetch for two batches proves the memoized resolver
        Mock::given(method("GET"))
            .and(path("/job/sat/42/api/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jenkins_build()))
            .expect(1)
            .mount(&jenkins)
            .await;

        Mock::given(method("POST"))
            .and(path("/instances"))
            .respond_with(ResponseTemplate::new(201))
            .expect(2)
            .mount(&store)
            .await;

        let settings = run_settings(&prometheus.uri(), &store.uri());
        let summary = run_at(&settings, 7200).await.unwrap();
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.pushed, 2);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.failed_batches, 0);
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_gap_and_run_continues() {
        let prometheus = MockServer::start().await;
        let jenkins = MockServer::start().await;
        let store = MockServer::start().await;

        let correlation_id = format!("{}/job/sat/42/console", jenkins.uri());
        Mock::given(method("GET"))
            .and(path("/api/v1/query_range"))
            .and(query_param("start", "0"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&prometheus)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/query_range"))
            .and(query_param("start", "3600"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(range_body(&correlation_id, 3700.0, 3900.0)),
            )
            .expect(1)
            .mount(&prometheus)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jenkins_build()))
            .mount(&jenkins)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&store)
            .await;

        let settings = run_settings(&prometheus.uri(), &store.uri());
        let summary = run_at(&settings, 7200).await.unwrap();
        assert_eq!(summary.failed_batches, 1);
        assert_eq!(summary.pushed, 1);
    }

    fn two_series_body(correlation_id: &str, first: f64, last: f64) -> serde_json::Value {
        serde_json::json!({
            "status": "success",
            "data": {"result": [
                {
                    "metric": {
                        "vm_name": "vm-1",
                        "image": "rhel-9",
                        "correlation_id": correlation_id
                    },
                    "values": [[first, "1"], [last, "1"]]
                },
                {
                    "metric": {
                        "vm_name": "vm-2",
                        "image": "rhel-9",
                        "correlation_id": correlation_id
                    },
                    "values": [[first, "1"], [last, "1"]]
                }
            ]}
        })
    }

    #[tokio::test]
    async fn test_store_outage_abandons_batch_but_not_run() {
        let prometheus = MockServer::start().await;
        let jenkins = MockServer::start().await;
        let store = MockServer::start().await;

        let correlation_id = format!("{}/job/sat/42/console", jenkins.uri());
        Mock::given(method("GET"))
            .and(path("/api/v1/query_range"))
            .and(query_param("start", "0"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(two_series_body(&correlation_id, 100.0, 200.0)),
            )
            .expect(1)
            .mount(&prometheus)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/query_range"))
            .and(query_param("start", "3600"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(two_series_body(&correlation_id, 3700.0, 3900.0)),
            )
            .expect(1)
            .mount(&prometheus)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jenkins_build()))
            .mount(&jenkins)
            .await;

        // One failed push abandons the batch, so the second series of each
        // batch is never attempted: two batches, two POSTs total
        Mock::given(method("POST"))
            .and(path("/instances"))
            .respond_with(ResponseTemplate::new(500))
            .expect(2)
            .mount(&store)
            .await;

        let settings = run_settings(&prometheus.uri(), &store.uri());
        let summary = run_at(&settings, 7200).await.unwrap();

        // Both batches were still queried; the outage cost the batches only
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.failed_batches, 2);
        assert_eq!(summary.pushed, 0);
        assert_eq!(summary.skipped, 0);
    }

    #[tokio::test]
    async fn test_unresolvable_build_skips_record_only() {
        let prometheus = MockServer::start().await;
        let jenkins = MockServer::start().await;
        let store = MockServer::start().await;

        let correlation_id = format!("{}/job/gone/1/console", jenkins.uri());
        Mock::given(method("GET"))
            .and(path("/api/v1/query_range"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(range_body(&correlation_id, 100.0, 200.0)),
            )
            .mount(&prometheus)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&jenkins)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&store)
            .await;

        let settings = run_settings(&prometheus.uri(), &store.uri());
        let summary = run_at(&settings, 7200).await.unwrap();
        assert_eq!(summary.pushed, 0);
        assert_eq!(summary.skipped, 2);
    }

    #[tokio::test]
    async fn test_empty_batches_counted() {
        let prometheus = MockServer::start().await;
        let store = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "success",
                "data": {"result": []}
            })))
            .mount(&prometheus)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&store)
            .await;

        let settings = run_settings(&prometheus.uri(), &store.uri());
        let summary = run_at(&settings, 7200).await.unwrap();
        assert_eq!(summary.batches, 2);
        assert_eq!(summary.empty_batches, 2);
        assert_eq!(summary.pushed, 0);
    }

    #[tokio::test]
    async fn test_invalid_configuration_fails_before_io() {
        let settings: Settings = toml::from_str(
            r#"
            [store]
            server = "http://rekuper.example.com"
            "#,
        )
        .unwrap();
        let err = run_at(&settings, 7200).await.unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }
}
