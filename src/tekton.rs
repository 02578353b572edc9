//! Tekton `PipelineRun` payloads and the summary recorded for each of them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::MalformedEventError;

const PIPELINE_LABEL: &str = "tekton.dev/pipeline";

/// The subset of a `PipelineRun` resource the service reads. Every field is
/// optional on the wire; [`PipelineRunEvent::interpret`] decides what is required.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PipelineRunEvent {
    #[serde(deserialize_with = "null_as_default")]
    pub metadata: Metadata,
    #[serde(deserialize_with = "null_as_default")]
    pub status: Status,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub name: Option<String>,
    pub namespace: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Status {
    pub start_time: Option<String>,
    pub completion_time: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Condition {
    pub status: Option<String>,
}

/// Explicit `null` reads the same as an absent key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
    Unknown,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
            RunStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineRunSummary {
    pub pipeline_name: String,
    pub run_name: String,
    pub namespace: String,
    pub duration_seconds: f64,
    pub status: RunStatus,
}

impl PipelineRunEvent {
    pub fn interpret(&self) -> Result<PipelineRunSummary, MalformedEventError> {
        self.interpret_at(Utc::now())
    }

    /// Interpret the event as observed at `now`. A run without
    /// `completionTime` is still going and is measured up to `now`.
    pub fn interpret_at(&self, now: DateTime<Utc>) -> Result<PipelineRunSummary, MalformedEventError> {
        let pipeline_name = self
            .metadata
            .labels
            .get(PIPELINE_LABEL)
            .cloned()
            .ok_or(MalformedEventError::MissingField("metadata.labels.tekton.dev/pipeline"))?;
        let run_name = self
            .metadata
            .name
            .clone()
            .ok_or(MalformedEventError::MissingField("metadata.name"))?;
        let namespace = self
            .metadata
            .namespace
            .clone()
            .ok_or(MalformedEventError::MissingField("metadata.namespace"))?;

        let start = self
            .status
            .start_time
            .as_deref()
            .ok_or(MalformedEventError::MissingField("status.startTime"))
            .and_then(|v| parse_timestamp("status.startTime", v))?;
        let end = match self.status.completion_time.as_deref() {
            Some(v) => parse_timestamp("status.completionTime", v)?,
            None => now,
        };

        Ok(PipelineRunSummary {
            pipeline_name,
            run_name,
            namespace,
            duration_seconds: seconds_between(start, end),
            status: self.run_status(),
        })
    }

    fn run_status(&self) -> RunStatus {
        match self.status.conditions.first() {
            None => RunStatus::Unknown,
            Some(c) if c.status.as_deref() == Some("True") => RunStatus::Success,
            Some(_) => RunStatus::Failed,
        }
    }
}

fn parse_timestamp(field: &'static str, value: &str) -> Result<DateTime<Utc>, MalformedEventError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|source| MalformedEventError::Timestamp {
            field,
            value: value.to_string(),
            source,
        })
}

/// Non-negative; clock skew between the cluster and this host clamps to zero.
fn seconds_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let delta = end - start;
    let seconds = delta
        .num_microseconds()
        .map(|us| us as f64 / 1_000_000.0)
        .unwrap_or_else(|| delta.num_seconds() as f64);
    seconds.max(0.0)
}
