//! Construct tree root
//!
//! A `Stack` owns the template being built and the mapping from construct
//! paths (`cluster/Role`, `application-repo/Resource`, ...) to logical ids.
//! Resources are accepted only once everything they reference is already
//! declared, so declaration order is checked rather than assumed.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::debug;

use crate::domain::config::Environment;
use crate::domain::intrinsic;
use crate::domain::template::{Output, PATH_METADATA_KEY, Parameter, Resource, Template};
use crate::error::{Result, SynthError};

/// Path components left out of the readable part of a logical id
const HIDDEN_PATH_COMPONENTS: [&str; 2] = ["Resource", "Default"];

/// Longest readable prefix, leaving room for the hash suffix
const MAX_HUMAN_LEN: usize = 240;

/// Handle to a declared resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    logical_id: String,
    path: String,
}

impl ResourceRef {
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// `{ "Ref": <logical id> }`
    pub fn reference(&self) -> Value {
        intrinsic::reference(&self.logical_id)
    }

    /// `{ "Fn::GetAtt": [<logical id>, attribute] }`
    pub fn att(&self, attribute: &str) -> Value {
        intrinsic::get_att(&self.logical_id, attribute)
    }
}

/// A stack under construction
#[derive(Debug)]
pub struct Stack {
    name: String,
    env: Environment,
    template: Template,
    paths: BTreeMap<String, String>,
}

impl Stack {
    pub fn new(name: impl Into<String>, env: Environment) -> Result<Self> {
        let name = name.into();
        validate_construct_id(&name)?;
        Ok(Self {
            name,
            env,
            template: Template::default(),
            paths: BTreeMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.template.description = Some(description.into());
    }

    /// Whether `logical_id` names a declared resource or parameter
    pub fn is_declared(&self, logical_id: &str) -> bool {
        self.template.resources.contains_key(logical_id)
            || self.template.parameters.contains_key(logical_id)
    }

    /// Declare a resource at `path`
    ///
    /// # Errors
    /// - `InvalidConstructId` if a path component is empty
    /// - `DuplicateConstruct` if the path (or its logical id) is taken
    /// - `UnresolvedReference` if a property refers to an undeclared logical id
    pub fn add_resource(&mut self, path: &str, mut resource: Resource) -> Result<ResourceRef> {
        for component in path.split('/') {
            validate_construct_id(component)?;
        }

        if self.paths.contains_key(path) {
            return Err(SynthError::DuplicateConstruct(path.to_string()));
        }

        let logical_id = logical_id(path);
        if self.template.resources.contains_key(&logical_id) {
            return Err(SynthError::DuplicateConstruct(path.to_string()));
        }

        for target in resource.references() {
            if !self.is_declared(&target) {
                return Err(SynthError::UnresolvedReference {
                    from: path.to_string(),
                    target,
                });
            }
        }

        resource.metadata.insert(
            PATH_METADATA_KEY.to_string(),
            Value::String(format!("{}/{}", self.name, path)),
        );

        debug!(
            "Declared {} at {} as {}",
            resource.resource_type, path, logical_id
        );

        self.paths.insert(path.to_string(), logical_id.clone());
        self.template.resources.insert(logical_id.clone(), resource);

        Ok(ResourceRef {
            logical_id,
            path: path.to_string(),
        })
    }

    /// Declare a template parameter and return a `Ref` to it
    pub fn add_parameter(&mut self, name: &str, parameter: Parameter) -> Result<Value> {
        validate_logical_name(name)?;
        if self.is_declared(name) {
            return Err(SynthError::DuplicateConstruct(name.to_string()));
        }
        self.template.parameters.insert(name.to_string(), parameter);
        Ok(intrinsic::reference(name))
    }

    /// Declare a template output
    pub fn add_output(&mut self, name: &str, output: Output) -> Result<()> {
        validate_logical_name(name)?;
        if self.template.outputs.contains_key(name) {
            return Err(SynthError::DuplicateConstruct(format!("Outputs/{}", name)));
        }
        for target in intrinsic::references(&output.value) {
            if !self.is_declared(&target) {
                return Err(SynthError::UnresolvedReference {
                    from: format!("Outputs/{}", name),
                    target,
                });
            }
        }
        self.template.outputs.insert(name.to_string(), output);
        Ok(())
    }

    /// Finish the stack, re-checking every reference
    pub fn synth(self) -> Result<SynthesizedStack> {
        for (logical_id, resource) in &self.template.resources {
            for target in resource.references() {
                if !self.is_declared(&target) {
                    return Err(SynthError::UnresolvedReference {
                        from: resource.path().unwrap_or(logical_id.as_str()).to_string(),
                        target,
                    });
                }
            }
        }

        debug!(
            "Synthesized stack {} with {} resources",
            self.name,
            self.template.resources.len()
        );

        Ok(SynthesizedStack {
            name: self.name,
            env: self.env,
            template: self.template,
        })
    }
}

/// A finished stack, ready to be written into a cloud assembly
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedStack {
    pub name: String,
    pub env: Environment,
    pub template: Template,
}

/// Deterministic logical id for a construct path
///
/// Readable path components with non-alphanumerics removed, then the first
/// eight hex digits of the SHA-256 of the full path.
pub fn logical_id(path: &str) -> String {
    let mut human: String = path
        .split('/')
        .filter(|c| !HIDDEN_PATH_COMPONENTS.contains(c))
        .flat_map(|c| c.chars().filter(char::is_ascii_alphanumeric))
        .collect();
    human.truncate(MAX_HUMAN_LEN);

    let digest = Sha256::digest(path.as_bytes());
    format!("{}{}", human, hex::encode_upper(&digest[..4]))
}

fn validate_construct_id(id: &str) -> Result<()> {
    if id.trim().is_empty() || id.contains('/') {
        return Err(SynthError::InvalidConstructId(id.to_string()));
    }
    Ok(())
}

fn validate_logical_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(SynthError::InvalidConstructId(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stack() -> Stack {
        Stack::new("TestStack", Environment::default()).unwrap()
    }

    #[test]
    fn test_logical_id_is_stable_and_readable() {
        let id = logical_id("application-repo/Resource");
        assert!(id.starts_with("applicationrepo"));
        assert_eq!(id.len(), "applicationrepo".len() + 8);
        assert_eq!(id, logical_id("application-repo/Resource"));
        assert_ne!(id, logical_id("application-repo/Other"));
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_add_resource_records_path() {
        let mut stack = stack();
        let bucket = stack
            .add_resource("Artifacts/Resource", Resource::new("AWS::S3::Bucket"))
            .unwrap();

        let (id, resource) = stack
            .template()
            .resource_at_path("TestStack/Artifacts/Resource")
            .unwrap();
        assert_eq!(id, bucket.logical_id());
        assert_eq!(resource.resource_type, "AWS::S3::Bucket");
        assert_eq!(bucket.reference(), json!({ "Ref": bucket.logical_id() }));
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let mut stack = stack();
        stack
            .add_resource("Repo", Resource::new("AWS::ECR::Repository"))
            .unwrap();
        let err = stack
            .add_resource("Repo", Resource::new("AWS::ECR::Repository"))
            .unwrap_err();
        assert!(matches!(err, SynthError::DuplicateConstruct(_)));
    }

    #[test]
    fn test_forward_reference_rejected() {
        let mut stack = stack();
        let err = stack
            .add_resource(
                "Project",
                Resource::new("AWS::CodeBuild::Project")
                    .property("ServiceRole", intrinsic::get_att("RoleNotYetDeclared", "Arn")),
            )
            .unwrap_err();
        assert!(err.is_ordering_error());
        assert!(err.to_string().contains("RoleNotYetDeclared"));
    }

    #[test]
    fn test_parameter_can_be_referenced() {
        let mut stack = stack();
        let subnets = stack
            .add_parameter(
                "ClusterSubnetIds",
                Parameter {
                    parameter_type: "List<AWS::EC2::Subnet::Id>".into(),
                    description: None,
                },
            )
            .unwrap();
        stack
            .add_resource(
                "Cluster",
                Resource::new("AWS::EKS::Cluster").property("SubnetIds", subnets),
            )
            .unwrap();
        assert!(stack.synth().is_ok());
    }

    #[test]
    fn test_output_reference_checked() {
        let mut stack = stack();
        let err = stack
            .add_output(
                "Missing",
                Output {
                    value: intrinsic::reference("Nope"),
                    description: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, SynthError::UnresolvedReference { .. }));
    }

    #[test]
    fn test_invalid_construct_ids() {
        assert!(Stack::new("", Environment::default()).is_err());
        let mut stack = stack();
        assert!(matches!(
            stack.add_resource("a//b", Resource::new("AWS::S3::Bucket")),
            Err(SynthError::InvalidConstructId(_))
        ));
    }
}
