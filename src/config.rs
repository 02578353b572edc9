//! Operator repository registrations, loaded once at startup.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// A registered operator repository. `name` is the metric label and the
/// directory name of the local clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub name: String,
    pub url: String,
    pub branch: Option<String>,
}

/// A config entry is either a bare remote URL or a table with an optional branch.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RepositoryEntry {
    Url(String),
    Detailed(DetailedEntry),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DetailedEntry {
    url: String,
    branch: Option<String>,
}

/// Load `name -> remote` registrations from a YAML file.
pub fn load_repositories(path: &Path) -> Result<Vec<Repository>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_repositories(&contents, path)
}

fn parse_repositories(contents: &str, path: &Path) -> Result<Vec<Repository>, ConfigError> {
    // An empty file means no repositories, not an error.
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    let entries: Option<BTreeMap<String, RepositoryEntry>> = serde_yaml::from_str(contents)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    entries
        .unwrap_or_default()
        .into_iter()
        .map(|(name, entry)| {
            let (url, branch) = match entry {
                RepositoryEntry::Url(url) => (url, None),
                RepositoryEntry::Detailed(DetailedEntry { url, branch }) => (url, branch),
            };
            let invalid = |reason| ConfigError::Invalid {
                name: name.clone(),
                reason,
            };
            if name.trim().is_empty() || name.contains(['/', '\\']) || name == ".." {
                return Err(invalid("name must be a plain directory name"));
            }
            if url.trim().is_empty() {
                return Err(invalid("remote url is empty"));
            }
            if branch.as_deref().is_some_and(|b| b.trim().is_empty()) {
                return Err(invalid("branch is empty"));
            }
            Ok(Repository { name, url, branch })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse(contents: &str) -> Result<Vec<Repository>, ConfigError> {
        parse_repositories(contents, Path::new("repos.yml"))
    }

    #[test]
    fn test_bare_url_and_detailed_entries() {
        let repos = parse(
            r#"
community-operators: https://github.com/k8s-operatorhub/community-operators.git
certified-operators:
  url: https://github.com/redhat-openshift-ecosystem/certified-operators.git
  branch: stage
"#,
        )
        .unwrap();

        assert_eq!(
            repos,
            vec![
                Repository {
                    name: "certified-operators".to_string(),
                    url: "https://github.com/redhat-openshift-ecosystem/certified-operators.git"
                        .to_string(),
                    branch: Some("stage".to_string()),
                },
                Repository {
                    name: "community-operators".to_string(),
                    url: "https://github.com/k8s-operatorhub/community-operators.git".to_string(),
                    branch: None,
                },
            ]
        );
    }

    #[test]
    fn test_empty_file_has_no_repositories() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("  \n").unwrap().is_empty());
    }

    #[test]
    fn test_rejects_invalid_entries() {
        assert!(matches!(
            parse("repo: ''\n"),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            parse("repo:\n  url: https://example.com/r.git\n  branch: ''\n"),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            parse("../escape: https://example.com/r.git\n"),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = parse("repo:\n  url: https://example.com/r.git\n  branh: stage\n").unwrap_err();

        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_malformed_yaml_reports_path() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "- just\n- a list\n").unwrap();

        match load_repositories(file.path()) {
            Err(ConfigError::Parse { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_repositories(Path::new("/nonexistent/repos.yml")),
            Err(ConfigError::Read { .. })
        ));
    }
}
