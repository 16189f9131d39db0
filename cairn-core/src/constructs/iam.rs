//! IAM roles and their default policies
//!
//! A role's trust policy is fixed when the role is built: every principal
//! that may assume it is collected on the `RoleBuilder` first. Permission
//! statements, on the other hand, accumulate on the built `Role` and are
//! emitted once as a `<role>/DefaultPolicy` resource by `finalize`.

use serde_json::{Value, json};
use tracing::debug;

use crate::domain::intrinsic::{Pseudo, join};
use crate::domain::policy::{PolicyDocument, PolicyStatement, Principal};
use crate::domain::template::Resource;
use crate::error::{Result, SynthError};
use crate::stack::{ResourceRef, Stack, logical_id};

pub const CODEBUILD_SERVICE: &str = "codebuild.amazonaws.com";
pub const CODEPIPELINE_SERVICE: &str = "codepipeline.amazonaws.com";
pub const EKS_SERVICE: &str = "eks.amazonaws.com";

/// Anything that owns an identity permissions can be granted to
pub trait Grantable {
    fn grant_principal(&mut self) -> &mut Role;
}

/// Collects the trust relationship of a role before it exists
#[derive(Debug, Clone)]
pub struct RoleBuilder {
    id: String,
    trusted: Vec<Principal>,
    managed_policies: Vec<String>,
    description: Option<String>,
}

impl RoleBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            trusted: Vec::new(),
            managed_policies: Vec::new(),
            description: None,
        }
    }

    /// Allow a service or ARN principal to assume the role
    pub fn assumed_by(mut self, principal: Principal) -> Self {
        if !self.trusted.contains(&principal) {
            self.trusted.push(principal);
        }
        self
    }

    /// Allow another role to assume this one
    pub fn trusted_by(self, role: &Role) -> Self {
        self.assumed_by(role.principal())
    }

    /// Attach an AWS managed policy by name (e.g. `AmazonEKSClusterPolicy`)
    pub fn managed_policy(mut self, name: impl Into<String>) -> Self {
        self.managed_policies.push(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare the role at `<id>/Resource`
    pub fn build(self, stack: &mut Stack) -> Result<Role> {
        if self.trusted.is_empty() {
            return Err(SynthError::InvalidConfig(format!(
                "role '{}' has no trusted principals",
                self.id
            )));
        }

        let mut trust = PolicyDocument::new();
        for principal in &self.trusted {
            trust.add_statement(
                PolicyStatement::allow()
                    .action("sts:AssumeRole")
                    .principal(principal.clone()),
            );
        }

        let mut resource =
            Resource::new("AWS::IAM::Role").property("AssumeRolePolicyDocument", trust.to_json());

        if !self.managed_policies.is_empty() {
            let arns: Vec<Value> = self
                .managed_policies
                .iter()
                .map(|name| {
                    join(
                        "",
                        vec![
                            json!("arn:"),
                            Pseudo::Partition.value(),
                            json!(format!(":iam::aws:policy/{}", name)),
                        ],
                    )
                })
                .collect();
            resource = resource.property("ManagedPolicyArns", arns);
        }

        if let Some(description) = self.description {
            resource = resource.property("Description", description);
        }

        let path = format!("{}/Resource", self.id);
        let resource = stack.add_resource(&path, resource)?;

        Ok(Role {
            id: self.id,
            resource,
            trusted: self.trusted,
            policy: PolicyDocument::new(),
            finalized: false,
        })
    }
}

/// A declared IAM role
#[derive(Debug)]
pub struct Role {
    id: String,
    resource: ResourceRef,
    trusted: Vec<Principal>,
    policy: PolicyDocument,
    finalized: bool,
}

impl Role {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn logical_id(&self) -> &str {
        self.resource.logical_id()
    }

    pub fn arn(&self) -> Value {
        self.resource.att("Arn")
    }

    /// Role name as a `Ref`
    pub fn name(&self) -> Value {
        self.resource.reference()
    }

    /// This role as a principal in someone else's policy
    pub fn principal(&self) -> Principal {
        Principal::Aws(self.arn())
    }

    /// Principals in the trust policy
    pub fn trusted(&self) -> &[Principal] {
        &self.trusted
    }

    /// Statements that will be emitted into the default policy
    pub fn policy(&self) -> &PolicyDocument {
        &self.policy
    }

    pub fn add_to_policy(&mut self, statement: PolicyStatement) -> Result<()> {
        if self.finalized {
            return Err(SynthError::RoleFinalized(self.id.clone()));
        }
        self.policy.add_statement(statement);
        Ok(())
    }

    /// Let `grantee` call `sts:AssumeRole` on this role
    ///
    /// Only the grantee's side is written here; the trust side must already
    /// be on this role through `RoleBuilder::trusted_by`.
    pub fn grant_assume_role(&self, grantee: &mut impl Grantable) -> Result<()> {
        grantee.grant_principal().add_to_policy(
            PolicyStatement::allow()
                .action("sts:AssumeRole")
                .resource(self.arn()),
        )
    }

    /// Emit the default policy, if any statement was granted
    ///
    /// Returns the policy resource so dependents can wait on it.
    pub fn finalize(&mut self, stack: &mut Stack) -> Result<Option<ResourceRef>> {
        if self.finalized {
            return Err(SynthError::RoleFinalized(self.id.clone()));
        }
        self.finalized = true;

        if self.policy.is_empty() {
            debug!("Role {} has no granted permissions", self.id);
            return Ok(None);
        }

        let path = format!("{}/DefaultPolicy/Resource", self.id);
        let policy = Resource::new("AWS::IAM::Policy")
            .property("PolicyDocument", self.policy.to_json())
            .property("PolicyName", logical_id(&path))
            .property("Roles", vec![self.name()]);

        stack.add_resource(&path, policy).map(Some)
    }
}

impl Grantable for Role {
    fn grant_principal(&mut self) -> &mut Role {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::Environment;

    fn stack() -> Stack {
        Stack::new("IamTest", Environment::default()).unwrap()
    }

    #[test]
    fn test_trust_collected_before_build() {
        let mut stack = stack();
        let consumer = RoleBuilder::new("Consumer")
            .assumed_by(Principal::service(CODEBUILD_SERVICE))
            .build(&mut stack)
            .unwrap();

        let admin = RoleBuilder::new("Admin")
            .assumed_by(Principal::service(CODEBUILD_SERVICE))
            .trusted_by(&consumer)
            .build(&mut stack)
            .unwrap();

        assert_eq!(admin.trusted().len(), 2);

        let resource = stack.template().resource(admin.logical_id()).unwrap();
        let statements = resource.properties["AssumeRolePolicyDocument"]["Statement"]
            .as_array()
            .unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1]["Principal"]["AWS"], consumer.arn());
    }

    #[test]
    fn test_role_without_principals_rejected() {
        let mut stack = stack();
        assert!(RoleBuilder::new("Lonely").build(&mut stack).is_err());
    }

    #[test]
    fn test_finalize_emits_default_policy_once() {
        let mut stack = stack();
        let mut role = RoleBuilder::new("Worker")
            .assumed_by(Principal::service(CODEBUILD_SERVICE))
            .build(&mut stack)
            .unwrap();

        role.add_to_policy(PolicyStatement::allow().action("s3:GetObject").resource("*"))
            .unwrap();
        let policy = role.finalize(&mut stack).unwrap().unwrap();

        let resource = stack.template().resource(policy.logical_id()).unwrap();
        assert_eq!(resource.resource_type, "AWS::IAM::Policy");
        assert_eq!(resource.properties["PolicyName"], json!(policy.logical_id()));
        assert_eq!(resource.properties["Roles"], json!([role.name()]));

        let late = role.add_to_policy(PolicyStatement::allow().action("s3:PutObject"));
        assert!(matches!(late, Err(SynthError::RoleFinalized(_))));
        assert!(role.finalize(&mut stack).is_err());
    }

    #[test]
    fn test_empty_policy_emits_nothing() {
        let mut stack = stack();
        let mut role = RoleBuilder::new("Idle")
            .assumed_by(Principal::service(EKS_SERVICE))
            .managed_policy("AmazonEKSClusterPolicy")
            .build(&mut stack)
            .unwrap();

        assert!(role.finalize(&mut stack).unwrap().is_none());
        assert_eq!(stack.template().resources.len(), 1);
    }

    #[test]
    fn test_grant_assume_role_writes_grantee_policy() {
        let mut stack = stack();
        let mut deployer = RoleBuilder::new("Deployer")
            .assumed_by(Principal::service(CODEBUILD_SERVICE))
            .build(&mut stack)
            .unwrap();
        let admin = RoleBuilder::new("Admin")
            .trusted_by(&deployer)
            .build(&mut stack)
            .unwrap();

        admin.grant_assume_role(&mut deployer).unwrap();
        let stmt = &deployer.policy().statements[0];
        assert!(stmt.allows("sts:AssumeRole"));
        assert_eq!(stmt.resources, vec![admin.arn()]);
    }
}
