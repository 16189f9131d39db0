//! Build projects driven by a pipeline
//!
//! A `PipelineProject` takes its source from, and hands its output back to,
//! the pipeline that invokes it. Each project owns a service role which
//! receives every permission granted to the project.

use serde_json::{Value, json};
use std::collections::BTreeMap;

use crate::constructs::iam::{CODEBUILD_SERVICE, Grantable, Role, RoleBuilder};
use crate::domain::intrinsic::{Pseudo, join};
use crate::domain::policy::{PolicyStatement, Principal};
use crate::domain::template::Resource;
use crate::error::Result;
use crate::stack::{ResourceRef, Stack};

/// Managed Linux build images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinuxBuildImage {
    AmazonLinux2_3,
    AmazonLinux2_4,
    AmazonLinux2_5,
    Standard5,
    Standard7,
}

impl LinuxBuildImage {
    pub fn image_id(&self) -> &'static str {
        match self {
            LinuxBuildImage::AmazonLinux2_3 => "aws/codebuild/amazonlinux2-x86_64-standard:3.0",
            LinuxBuildImage::AmazonLinux2_4 => "aws/codebuild/amazonlinux2-x86_64-standard:4.0",
            LinuxBuildImage::AmazonLinux2_5 => "aws/codebuild/amazonlinux2-x86_64-standard:5.0",
            LinuxBuildImage::Standard5 => "aws/codebuild/standard:5.0",
            LinuxBuildImage::Standard7 => "aws/codebuild/standard:7.0",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeType {
    Small,
    Medium,
    Large,
}

impl ComputeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputeType::Small => "BUILD_GENERAL1_SMALL",
            ComputeType::Medium => "BUILD_GENERAL1_MEDIUM",
            ComputeType::Large => "BUILD_GENERAL1_LARGE",
        }
    }
}

/// Where the build runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildEnvironment {
    pub image: LinuxBuildImage,
    pub compute_type: ComputeType,
    /// Needed when the build itself runs a container daemon
    pub privileged: bool,
}

impl Default for BuildEnvironment {
    fn default() -> Self {
        Self {
            image: LinuxBuildImage::Standard7,
            compute_type: ComputeType::Small,
            privileged: false,
        }
    }
}

/// Build instructions
///
/// Only the filename is recorded; its content is never read here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildSpec {
    /// A file in the source artifact, read by the build service at run time
    FromSourceFilename(String),
}

impl BuildSpec {
    pub fn from_source_filename(filename: impl Into<String>) -> Self {
        BuildSpec::FromSourceFilename(filename.into())
    }

    pub fn filename(&self) -> &str {
        match self {
            BuildSpec::FromSourceFilename(name) => name,
        }
    }
}

/// Inputs of `PipelineProject::new`
#[derive(Debug)]
pub struct PipelineProjectProps {
    pub environment: BuildEnvironment,
    /// Plain-text variables, by name
    pub environment_variables: BTreeMap<String, Value>,
    pub build_spec: BuildSpec,
    /// Service role declared ahead of time; a fresh `<id>/Role` otherwise
    pub role: Option<Role>,
}

/// A declared CodeBuild project with its service role
#[derive(Debug)]
pub struct PipelineProject {
    id: String,
    resource: ResourceRef,
    role: Role,
    build_spec: BuildSpec,
}

impl PipelineProject {
    pub fn new(stack: &mut Stack, id: &str, props: PipelineProjectProps) -> Result<Self> {
        let mut role = match props.role {
            Some(role) => role,
            None => service_role(stack, id)?,
        };

        let variables: Vec<Value> = props
            .environment_variables
            .iter()
            .map(|(name, value)| json!({ "Name": name, "Type": "PLAINTEXT", "Value": value }))
            .collect();

        let mut environment = json!({
            "ComputeType": props.environment.compute_type.as_str(),
            "Image": props.environment.image.image_id(),
            "ImagePullCredentialsType": "CODEBUILD",
            "PrivilegedMode": props.environment.privileged,
            "Type": "LINUX_CONTAINER",
        });
        if !variables.is_empty() {
            environment["EnvironmentVariables"] = Value::Array(variables);
        }

        let project = Resource::new("AWS::CodeBuild::Project")
            .property("Artifacts", json!({ "Type": "CODEPIPELINE" }))
            .property("Environment", environment)
            .property("ServiceRole", role.arn())
            .property(
                "Source",
                json!({ "BuildSpec": props.build_spec.filename(), "Type": "CODEPIPELINE" }),
            )
            .property("EncryptionKey", "alias/aws/s3");
        let resource = stack.add_resource(&format!("{}/Resource", id), project)?;

        role.add_to_policy(
            PolicyStatement::allow()
                .actions(["logs:CreateLogGroup", "logs:CreateLogStream", "logs:PutLogEvents"])
                .resource(log_group_arn(&resource, false))
                .resource(log_group_arn(&resource, true)),
        )?;

        Ok(Self {
            id: id.to_string(),
            resource,
            role,
            build_spec: props.build_spec,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn logical_id(&self) -> &str {
        self.resource.logical_id()
    }

    /// Project name as a `Ref`
    pub fn name(&self) -> Value {
        self.resource.reference()
    }

    pub fn arn(&self) -> Value {
        self.resource.att("Arn")
    }

    pub fn build_spec(&self) -> &BuildSpec {
        &self.build_spec
    }

    pub fn role(&self) -> &Role {
        &self.role
    }

    /// Emit the project role's default policy
    pub fn finalize(&mut self, stack: &mut Stack) -> Result<Option<ResourceRef>> {
        self.role.finalize(stack)
    }
}

impl Grantable for PipelineProject {
    fn grant_principal(&mut self) -> &mut Role {
        &mut self.role
    }
}

/// The default `<id>/Role` a project runs as
pub fn service_role(stack: &mut Stack, project_id: &str) -> Result<Role> {
    RoleBuilder::new(format!("{}/Role", project_id))
        .assumed_by(Principal::service(CODEBUILD_SERVICE))
        .build(stack)
}

/// `arn:<partition>:logs:<region>:<account>:log-group:/aws/codebuild/<project>[:*]`
fn log_group_arn(project: &ResourceRef, streams: bool) -> Value {
    join(
        "",
        vec![
            json!("arn:"),
            Pseudo::Partition.value(),
            json!(":logs:"),
            Pseudo::Region.value(),
            json!(":"),
            Pseudo::AccountId.value(),
            json!(":log-group:/aws/codebuild/"),
            project.reference(),
            json!(if streams { ":*" } else { "" }),
        ],
    )
}
