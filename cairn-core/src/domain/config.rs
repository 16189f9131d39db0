//! Stack configuration
//!
//! Everything that was a literal in the deployment definition lives here as
//! a named input. `StackConfig::default()` describes the production
//! application stack.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SynthError};

/// Deployment target of a stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub region: String,
    #[serde(default)]
    pub account: Option<String>,
}

impl Environment {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            account: None,
        }
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    /// `aws://<account>/<region>`, with `unknown-account` when unset
    pub fn uri(&self) -> String {
        format!(
            "aws://{}/{}",
            self.account.as_deref().unwrap_or("unknown-account"),
            self.region
        )
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new("us-east-2")
    }
}

/// Source repository watched by the pipeline webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Secret-store name holding the OAuth token
    pub oauth_secret: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            owner: "HiHashoom".to_string(),
            repo: "application".to_string(),
            branch: "main".to_string(),
            oauth_secret: "github".to_string(),
        }
    }
}

/// Cluster settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub id: String,
    pub version: String,
    /// Subnets for the control plane; empty means "ask at deploy time"
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    pub admin_role_id: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            id: "application-cluster".to_string(),
            version: "1.23".to_string(),
            subnet_ids: Vec::new(),
            admin_role_id: "eks-application-role".to_string(),
        }
    }
}

/// One build-execution project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub id: String,
    pub buildspec: String,
}

/// Full input of the application stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    pub stack_name: String,
    pub env: Environment,
    pub source: SourceConfig,
    pub cluster: ClusterConfig,
    pub registry_name: String,
    pub pipeline_name: String,
    pub build: ProjectConfig,
    pub deploy: ProjectConfig,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            stack_name: "ApplicationProduction".to_string(),
            env: Environment::default(),
            source: SourceConfig::default(),
            cluster: ClusterConfig::default(),
            registry_name: "application-repo".to_string(),
            pipeline_name: "application-pipeline".to_string(),
            build: ProjectConfig {
                id: "DockerBuild".to_string(),
                buildspec: "build-pipeline.yml".to_string(),
            },
            deploy: ProjectConfig {
                id: "Deploy".to_string(),
                buildspec: "deploy-pipeline.yml".to_string(),
            },
        }
    }
}

impl StackConfig {
    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("stack_name", &self.stack_name),
            ("env.region", &self.env.region),
            ("source.owner", &self.source.owner),
            ("source.repo", &self.source.repo),
            ("source.branch", &self.source.branch),
            ("source.oauth_secret", &self.source.oauth_secret),
            ("cluster.id", &self.cluster.id),
            ("cluster.version", &self.cluster.version),
            ("cluster.admin_role_id", &self.cluster.admin_role_id),
            ("registry_name", &self.registry_name),
            ("pipeline_name", &self.pipeline_name),
            ("build.id", &self.build.id),
            ("build.buildspec", &self.build.buildspec),
            ("deploy.id", &self.deploy.id),
            ("deploy.buildspec", &self.deploy.buildspec),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(SynthError::InvalidConfig(format!("{} cannot be empty", field)));
            }
        }

        if !self
            .stack_name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            || !self
                .stack_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(SynthError::InvalidConfig(format!(
                "stack_name '{}' must start with a letter and contain only letters, digits and '-'",
                self.stack_name
            )));
        }

        // ECR repository names are lowercase
        if self.registry_name != self.registry_name.to_lowercase() {
            return Err(SynthError::InvalidConfig(format!(
                "registry_name '{}' must be lowercase",
                self.registry_name
            )));
        }

        if self.build.id == self.deploy.id {
            return Err(SynthError::InvalidConfig(format!(
                "build and deploy projects share the id '{}'",
                self.build.id
            )));
        }

        if let Some(account) = &self.env.account {
            if account.len() != 12 || !account.chars().all(|c| c.is_ascii_digit()) {
                return Err(SynthError::InvalidConfig(format!(
                    "env.account '{}' must be a 12-digit account id",
                    account
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StackConfig::default();
        assert_eq!(config.stack_name, "ApplicationProduction");
        assert_eq!(config.env.region, "us-east-2");
        assert_eq!(config.source.oauth_secret, "github");
        assert_eq!(config.build.buildspec, "build-pipeline.yml");
        assert_eq!(config.deploy.buildspec, "deploy-pipeline.yml");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = StackConfig::default();

        config.source.branch = "  ".to_string();
        assert!(config.validate().is_err());
        config.source.branch = "main".to_string();

        config.registry_name = "Application-Repo".to_string();
        assert!(config.validate().is_err());
        config.registry_name = "application-repo".to_string();

        config.deploy.id = config.build.id.clone();
        assert!(config.validate().is_err());
        config.deploy.id = "Deploy".to_string();

        config.stack_name = "1stack".to_string();
        assert!(config.validate().is_err());
        config.stack_name = "ApplicationProduction".to_string();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_environment_uri() {
        assert_eq!(Environment::default().uri(), "aws://unknown-account/us-east-2");

        let env = Environment::new("eu-west-1").with_account("123456789012");
        assert_eq!(env.uri(), "aws://123456789012/eu-west-1");

        let mut config = StackConfig::default();
        config.env = Environment::new("eu-west-1").with_account("12345");
        assert!(config.validate().is_err());
    }
}
