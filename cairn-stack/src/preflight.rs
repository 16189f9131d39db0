//! Build-spec pre-flight check
//!
//! Synthesis only records build-spec filenames; a missing or malformed file
//! surfaces when the pipeline first runs. This check looks at the files
//! ahead of time. It is never part of synthesis.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use cairn_core::domain::config::StackConfig;

#[derive(Debug, Error)]
pub enum BuildSpecError {
    #[error("build spec not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not a valid build spec: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{path} has no '{key}' key")]
    MissingKey { path: PathBuf, key: &'static str },

    #[error("{0} has no phases")]
    NoPhases(PathBuf),
}

/// What a valid build spec declares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSpecSummary {
    pub path: PathBuf,
    pub version: String,
    /// Phase names in file order
    pub phases: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawBuildSpec {
    version: Option<serde_yaml::Value>,
    phases: Option<serde_yaml::Mapping>,
}

/// Check one build-spec file
pub fn check_buildspec(path: &Path) -> Result<BuildSpecSummary, BuildSpecError> {
    if !path.is_file() {
        return Err(BuildSpecError::NotFound(path.to_path_buf()));
    }

    let contents = std::fs::read_to_string(path).map_err(|source| BuildSpecError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let raw: RawBuildSpec =
        serde_yaml::from_str(&contents).map_err(|source| BuildSpecError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;

    let version = match raw.version {
        Some(serde_yaml::Value::String(v)) => v,
        Some(serde_yaml::Value::Number(v)) => v.to_string(),
        _ => {
            return Err(BuildSpecError::MissingKey {
                path: path.to_path_buf(),
                key: "version",
            });
        }
    };

    let phases = raw.phases.ok_or_else(|| BuildSpecError::MissingKey {
        path: path.to_path_buf(),
        key: "phases",
    })?;
    if phases.is_empty() {
        return Err(BuildSpecError::NoPhases(path.to_path_buf()));
    }
    let phases: Vec<String> = phases
        .keys()
        .filter_map(|k| k.as_str().map(str::to_string))
        .collect();

    debug!("{} declares phases {:?}", path.display(), phases);

    Ok(BuildSpecSummary {
        path: path.to_path_buf(),
        version,
        phases,
    })
}

/// Result of checking each project's build spec
#[derive(Debug)]
pub struct PreflightReport {
    /// `(project id, outcome)` in pipeline order
    pub checks: Vec<(String, Result<BuildSpecSummary, BuildSpecError>)>,
}

impl PreflightReport {
    pub fn is_ok(&self) -> bool {
        self.checks.iter().all(|(_, outcome)| outcome.is_ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &BuildSpecError)> {
        self.checks.iter().filter_map(|(project, outcome)| {
            outcome.as_ref().err().map(|e| (project.as_str(), e))
        })
    }
}

/// Check the build and deploy build specs, resolved against `source_root`
pub fn check_buildspecs(config: &StackConfig, source_root: &Path) -> PreflightReport {
    let checks = [&config.build, &config.deploy]
        .into_iter()
        .map(|project| {
            let path = source_root.join(&project.buildspec);
            (project.id.clone(), check_buildspec(&path))
        })
        .collect();
    PreflightReport { checks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const BUILD_SPEC: &str = r#"
version: 0.2
phases:
  pre_build:
    commands:
      - aws ecr get-login-password | docker login --username AWS --password-stdin $REPO_ECR
  build:
    commands:
      - docker build -t $REPO_ECR:latest .
  post_build:
    commands:
      - docker push $REPO_ECR:latest
"#;

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_valid_buildspec() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "build-pipeline.yml", BUILD_SPEC);

        let summary = check_buildspec(&path).unwrap();
        assert_eq!(summary.version, "0.2");
        assert_eq!(summary.phases, vec!["pre_build", "build", "post_build"]);
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = check_buildspec(&dir.path().join("missing.yml")).unwrap_err();
        assert!(matches!(err, BuildSpecError::NotFound(_)));
    }

    #[test]
    fn test_invalid_yaml() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "bad.yml", "version: [0.2\nphases: {");
        assert!(matches!(
            check_buildspec(&path).unwrap_err(),
            BuildSpecError::Yaml { .. }
        ));
    }

    #[test]
    fn test_missing_keys() {
        let dir = TempDir::new().unwrap();

        let path = write(&dir, "no-version.yml", "phases:\n  build:\n    commands: []\n");
        assert!(matches!(
            check_buildspec(&path).unwrap_err(),
            BuildSpecError::MissingKey { key: "version", .. }
        ));

        let path = write(&dir, "no-phases.yml", "version: 0.2\n");
        assert!(matches!(
            check_buildspec(&path).unwrap_err(),
            BuildSpecError::MissingKey { key: "phases", .. }
        ));

        let path = write(&dir, "empty-phases.yml", "version: 0.2\nphases: {}\n");
        assert!(matches!(
            check_buildspec(&path).unwrap_err(),
            BuildSpecError::NoPhases(_)
        ));
    }

    #[test]
    fn test_empty_phases_message_names_file() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "empty-phases.yml", "version: 0.2\nphases: {}\n");

        let message = check_buildspec(&path).unwrap_err().to_string();
        assert!(message.ends_with("empty-phases.yml has no phases"), "{}", message);
    }

    #[test]
    fn test_report_covers_both_projects() {
        let dir = TempDir::new().unwrap();
        write(&dir, "build-pipeline.yml", BUILD_SPEC);

        let report = check_buildspecs(&StackConfig::default(), dir.path());
        assert!(!report.is_ok());
        let projects: Vec<_> = report.checks.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(projects, vec!["DockerBuild", "Deploy"]);

        let failures: Vec<_> = report.failures().map(|(p, _)| p).collect();
        assert_eq!(failures, vec!["Deploy"]);

        write(&dir, "deploy-pipeline.yml", BUILD_SPEC);
        assert!(check_buildspecs(&StackConfig::default(), dir.path()).is_ok());
    }
}
