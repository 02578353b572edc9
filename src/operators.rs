//! Operator/bundle statistics for a synchronized operator repository.
//!
//! Layout: `<repo>/operators/<operator>/ci.yaml` plus one subdirectory per
//! bundle version under each operator directory.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ExtractionError;

const OPERATORS_DIR_NAME: &str = "operators";
const CI_FILE_NAME: &str = "ci.yaml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorRecord {
    pub repository: String,
    pub operator: String,
    pub bundle_count: usize,
    pub is_migrated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryStats {
    pub repository: String,
    pub operator_count: usize,
    pub migrated_count: usize,
}

/// Result of one extraction. Operators whose CI config could not be read are
/// left out of `operators` and the totals, and reported in `skipped`.
#[derive(Debug)]
pub struct RepositoryReport {
    pub stats: RepositoryStats,
    pub operators: Vec<OperatorRecord>,
    pub skipped: Vec<ExtractionError>,
}

#[derive(Debug, Default, Deserialize)]
struct CiConfig {
    #[serde(default)]
    fbc: FbcConfig,
}

#[derive(Debug, Default, Deserialize)]
struct FbcConfig {
    #[serde(default)]
    enabled: serde_yaml::Value,
}

impl FbcConfig {
    /// Null and absent mean disabled; other scalars follow YAML truthiness
    /// (non-zero numbers and non-empty strings count as enabled).
    fn is_enabled(&self) -> bool {
        truthy(&self.enabled)
    }
}

fn truthy(value: &serde_yaml::Value) -> bool {
    use serde_yaml::Value;
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Sequence(seq) => !seq.is_empty(),
        Value::Mapping(map) => !map.is_empty(),
        Value::Tagged(tagged) => truthy(&tagged.value),
    }
}

/// Walk `<repo>/operators` and compute per-operator and per-repository stats.
pub fn extract(repository: &str, repo_path: &Path) -> Result<RepositoryReport, ExtractionError> {
    let operators_dir = repo_path.join(OPERATORS_DIR_NAME);
    if !operators_dir.is_dir() {
        return Err(ExtractionError::MissingPath(operators_dir));
    }

    let mut operators = Vec::new();
    let mut skipped = Vec::new();
    for operator_dir in subdirectories(&operators_dir)? {
        let name = operator_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let record = read_ci_config(&operator_dir.join(CI_FILE_NAME)).and_then(|ci| {
            Ok(OperatorRecord {
                repository: repository.to_string(),
                operator: name,
                bundle_count: subdirectories(&operator_dir)?.len(),
                is_migrated: ci.fbc.is_enabled(),
            })
        });
        match record {
            Ok(record) => operators.push(record),
            Err(e) => {
                tracing::warn!(repository, err = %e, "skipping operator");
                skipped.push(e);
            }
        }
    }
    operators.sort_by(|a, b| a.operator.cmp(&b.operator));

    let stats = RepositoryStats {
        repository: repository.to_string(),
        operator_count: operators.len(),
        migrated_count: operators.iter().filter(|o| o.is_migrated).count(),
    };
    Ok(RepositoryReport {
        stats,
        operators,
        skipped,
    })
}

/// Missing file means "not migrated"; so does an empty one.
fn read_ci_config(path: &Path) -> Result<CiConfig, ExtractionError> {
    if !path.exists() {
        return Ok(CiConfig::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|source| ExtractionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if contents.trim().is_empty() {
        return Ok(CiConfig::default());
    }
    serde_yaml::from_str::<Option<CiConfig>>(&contents)
        .map(Option::unwrap_or_default)
        .map_err(|source| ExtractionError::CiConfig {
            path: path.to_path_buf(),
            source,
        })
}

/// Immediate subdirectories of `dir`. Plain files (README, ci.yaml) are ignored.
fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>, ExtractionError> {
    let io_err = |source| ExtractionError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        if entry.file_type().map_err(io_err)?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}
