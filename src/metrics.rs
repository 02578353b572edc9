//! Prometheus metrics for pipeline runs and operator repositories.
//!
//! Each [`MetricsRegistry`] owns its own recorder instead of installing a
//! process-wide one, so the HTTP handlers, the scrapers and tests can share or
//! isolate registries explicitly. Every write is a single atomic update of one
//! label set; callers never lock.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder};

use crate::operators::RepositoryReport;
use crate::tekton::PipelineRunSummary;

pub const PIPELINERUN_COUNTER: &str = "isv_pipelinerun_counter";
pub const PIPELINERUN_DURATION: &str = "isv_pipelinerun_duration_seconds";
pub const MIGRATION_STATUS: &str = "operator_migration_status";
pub const MIGRATED_OPERATORS: &str = "migrated_operators";
pub const OPERATORS_IN_REPOSITORY: &str = "operators_in_repository";
pub const BUNDLES_IN_REPOSITORY: &str = "bundles_in_repository";
pub const OPERATOR_LAST_SEEN: &str = "operator_last_seen_timestamp_seconds";
pub const SCRAPE_FAILURES: &str = "repository_scrape_failures_total";

/// Duration buckets in seconds: 1, 5, 10, 20, 40, 50 and 60 minutes.
pub const DURATION_BUCKETS: &[f64] = &[60.0, 300.0, 600.0, 1200.0, 2400.0, 3000.0, 3600.0];

#[derive(Clone)]
pub struct MetricsRegistry {
    recorder: Arc<PrometheusRecorder>,
    handle: PrometheusHandle,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, BuildError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(Matcher::Full(PIPELINERUN_DURATION.to_string()), DURATION_BUCKETS)?
            .build_recorder();
        let handle = recorder.handle();
        let registry = Self {
            recorder: Arc::new(recorder),
            handle,
        };
        registry.describe();
        Ok(registry)
    }

    fn with_recorder<T>(&self, f: impl FnOnce() -> T) -> T {
        metrics::with_local_recorder(self.recorder.as_ref(), f)
    }

    fn describe(&self) {
        self.with_recorder(|| {
            describe_counter!(PIPELINERUN_COUNTER, "ISV pipeline run counter.");
            describe_histogram!(PIPELINERUN_DURATION, "ISV pipeline duration histogram");
            describe_gauge!(MIGRATION_STATUS, "Status of migration to FBC of an Operator.");
            describe_gauge!(MIGRATED_OPERATORS, "Number of migrated operators");
            describe_gauge!(OPERATORS_IN_REPOSITORY, "Number of operators in a repository.");
            describe_gauge!(BUNDLES_IN_REPOSITORY, "Number of bundles in a repository");
            describe_gauge!(
                OPERATOR_LAST_SEEN,
                "Unix time an operator was last found in its repository."
            );
            describe_counter!(SCRAPE_FAILURES, "Failed repository scrape cycles by stage.");
        });
    }

    /// Count one pipeline run and observe its duration.
    pub fn record_pipeline_run(&self, run: &PipelineRunSummary) {
        let labels = [
            ("pipeline", run.pipeline_name.clone()),
            ("status", run.status.as_str().to_string()),
            ("namespace", run.namespace.clone()),
        ];
        self.with_recorder(|| {
            counter!(PIPELINERUN_COUNTER, &labels).increment(1);
            histogram!(PIPELINERUN_DURATION, &labels).record(run.duration_seconds);
        });
    }

    /// Publish the per-operator and per-repository gauges of one extraction.
    ///
    /// Operators that disappeared since the previous scrape keep their last
    /// values; `operator_last_seen_timestamp_seconds` tells them apart.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_repository(&self, report: &RepositoryReport) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        let repository = report.stats.repository.clone();
        self.with_recorder(|| {
            for op in &report.operators {
                let labels = [
                    ("repository", op.repository.clone()),
                    ("operator", op.operator.clone()),
                ];
                gauge!(BUNDLES_IN_REPOSITORY, &labels).set(op.bundle_count as f64);
                gauge!(MIGRATION_STATUS, &labels).set(if op.is_migrated { 1.0 } else { 0.0 });
                gauge!(OPERATOR_LAST_SEEN, &labels).set(now);
            }
            gauge!(OPERATORS_IN_REPOSITORY, "repository" => repository.clone())
                .set(report.stats.operator_count as f64);
            gauge!(MIGRATED_OPERATORS, "repository" => repository.clone())
                .set(report.stats.migrated_count as f64);
        });
    }

    pub fn record_scrape_failure(&self, repository: &str, stage: &'static str) {
        self.with_recorder(|| {
            counter!(SCRAPE_FAILURES, "repository" => repository.to_string(), "stage" => stage)
                .increment(1);
        });
    }

    /// Current state in the Prometheus text exposition format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Value of the sample `name{labels}` in a rendered exposition. Label order is
/// ignored and numeric label values (`le`) compare as numbers.
#[cfg(test)]
pub(crate) fn sample(rendered: &str, name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    let same = |a: &str, b: &str| {
        a == b || matches!((a.parse::<f64>(), b.parse::<f64>()), (Ok(x), Ok(y)) if x == y)
    };
    let prefix = format!("{name}{{");
    rendered.lines().find_map(|line| {
        let (label_set, value) = line.strip_prefix(&prefix)?.rsplit_once("} ")?;
        let found: Vec<(&str, &str)> = label_set
            .split(',')
            .filter_map(|pair| {
                let (k, v) = pair.split_once('=')?;
                Some((k, v.trim_matches('"')))
            })
            .collect();
        let matches = found.len() == labels.len()
            && labels
                .iter()
                .all(|(k, v)| found.iter().any(|(fk, fv)| fk == k && same(fv, v)));
        matches.then(|| value.trim().parse().ok()).flatten()
    })
}
