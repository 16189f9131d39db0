//! Container image repository

use serde_json::Value;

use crate::constructs::iam::Grantable;
use crate::domain::intrinsic::sub;
use crate::domain::policy::PolicyStatement;
use crate::domain::template::Resource;
use crate::error::Result;
use crate::stack::{ResourceRef, Stack};

pub const PULL_ACTIONS: [&str; 3] = [
    "ecr:BatchCheckLayerAvailability",
    "ecr:GetDownloadUrlForLayer",
    "ecr:BatchGetImage",
];

pub const PUSH_ACTIONS: [&str; 4] = [
    "ecr:CompleteLayerUpload",
    "ecr:UploadLayerPart",
    "ecr:InitiateLayerUpload",
    "ecr:PutImage",
];

/// A named ECR repository
#[derive(Debug, Clone)]
pub struct Repository {
    name: String,
    resource: ResourceRef,
}

impl Repository {
    pub fn new(stack: &mut Stack, id: &str, repository_name: &str) -> Result<Self> {
        let resource = Resource::new("AWS::ECR::Repository")
            .property("RepositoryName", repository_name)
            .retain();
        let resource = stack.add_resource(&format!("{}/Resource", id), resource)?;

        Ok(Self {
            name: repository_name.to_string(),
            resource,
        })
    }

    pub fn repository_name(&self) -> &str {
        &self.name
    }

    pub fn logical_id(&self) -> &str {
        self.resource.logical_id()
    }

    pub fn arn(&self) -> Value {
        self.resource.att("Arn")
    }

    /// `<account>.dkr.ecr.<region>.<suffix>/<name>`
    pub fn uri(&self) -> Value {
        sub(&format!(
            "${{AWS::AccountId}}.dkr.ecr.${{AWS::Region}}.${{AWS::URLSuffix}}/${{{}}}",
            self.resource.logical_id()
        ))
    }

    pub fn grant_pull(&self, grantee: &mut impl Grantable) -> Result<()> {
        let role = grantee.grant_principal();
        role.add_to_policy(
            PolicyStatement::allow()
                .actions(PULL_ACTIONS)
                .resource(self.arn()),
        )?;
        role.add_to_policy(authorization_token())
    }

    /// Pull and push on this repository, plus registry login
    pub fn grant_pull_push(&self, grantee: &mut impl Grantable) -> Result<()> {
        let role = grantee.grant_principal();
        role.add_to_policy(
            PolicyStatement::allow()
                .actions(PULL_ACTIONS)
                .actions(PUSH_ACTIONS)
                .resource(self.arn()),
        )?;
        role.add_to_policy(authorization_token())
    }
}

/// `docker login` needs a token that cannot be scoped to one repository
fn authorization_token() -> PolicyStatement {
    PolicyStatement::allow()
        .action("ecr:GetAuthorizationToken")
        .resource("*")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructs::iam::{CODEBUILD_SERVICE, RoleBuilder};
    use crate::domain::config::Environment;
    use crate::domain::intrinsic::references;
    use crate::domain::policy::Principal;

    #[test]
    fn test_uri_references_repository() {
        let mut stack = Stack::new("EcrTest", Environment::default()).unwrap();
        let repo = Repository::new(&mut stack, "application-repo", "application-repo").unwrap();

        let uri = repo.uri();
        let text = uri["Fn::Sub"].as_str().unwrap();
        assert!(text.starts_with("${AWS::AccountId}.dkr.ecr.${AWS::Region}"));
        assert!(references(&uri).contains(repo.logical_id()));
    }

    #[test]
    fn test_grant_pull_push() {
        let mut stack = Stack::new("EcrTest", Environment::default()).unwrap();
        let repo = Repository::new(&mut stack, "application-repo", "application-repo").unwrap();
        let mut role = RoleBuilder::new("Builder")
            .assumed_by(Principal::service(CODEBUILD_SERVICE))
            .build(&mut stack)
            .unwrap();

        repo.grant_pull_push(&mut role).unwrap();

        let statements = &role.policy().statements;
        assert_eq!(statements.len(), 2);
        for action in PULL_ACTIONS.iter().chain(PUSH_ACTIONS.iter()) {
            assert!(statements[0].allows(action), "missing {}", action);
        }
        assert_eq!(statements[0].resources, vec![repo.arn()]);
        assert!(statements[1].allows("ecr:GetAuthorizationToken"));
    }

    #[test]
    fn test_grant_pull_is_read_only() {
        let mut stack = Stack::new("EcrTest", Environment::default()).unwrap();
        let repo = Repository::new(&mut stack, "images", "images").unwrap();
        let mut role = RoleBuilder::new("Reader")
            .assumed_by(Principal::service(CODEBUILD_SERVICE))
            .build(&mut stack)
            .unwrap();

        repo.grant_pull(&mut role).unwrap();
        assert!(!role.policy().statements[0].allows("ecr:PutImage"));
    }
}
