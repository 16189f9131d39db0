//! Managed Kubernetes cluster
//!
//! Declares the control plane, its service role, and a cluster-admin access
//! entry for the designated administrative role.

use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;

use crate::constructs::iam::{EKS_SERVICE, Role, RoleBuilder};
use crate::domain::policy::Principal;
use crate::domain::template::Resource;
use crate::error::{Result, SynthError};
use crate::stack::{ResourceRef, Stack};

const CLUSTER_ADMIN_POLICY: &str = "arn:aws:eks::aws:cluster-access-policy/AmazonEKSClusterAdminPolicy";

/// Kubernetes control-plane versions the cluster construct accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum KubernetesVersion {
    V1_23,
    V1_24,
    V1_25,
    V1_26,
    V1_27,
    V1_28,
    V1_29,
    V1_30,
    V1_31,
}

impl KubernetesVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            KubernetesVersion::V1_23 => "1.23",
            KubernetesVersion::V1_24 => "1.24",
            KubernetesVersion::V1_25 => "1.25",
            KubernetesVersion::V1_26 => "1.26",
            KubernetesVersion::V1_27 => "1.27",
            KubernetesVersion::V1_28 => "1.28",
            KubernetesVersion::V1_29 => "1.29",
            KubernetesVersion::V1_30 => "1.30",
            KubernetesVersion::V1_31 => "1.31",
        }
    }
}

impl FromStr for KubernetesVersion {
    type Err = SynthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "1.23" => Ok(KubernetesVersion::V1_23),
            "1.24" => Ok(KubernetesVersion::V1_24),
            "1.25" => Ok(KubernetesVersion::V1_25),
            "1.26" => Ok(KubernetesVersion::V1_26),
            "1.27" => Ok(KubernetesVersion::V1_27),
            "1.28" => Ok(KubernetesVersion::V1_28),
            "1.29" => Ok(KubernetesVersion::V1_29),
            "1.30" => Ok(KubernetesVersion::V1_30),
            "1.31" => Ok(KubernetesVersion::V1_31),
            other => Err(SynthError::UnsupportedVersion(other.to_string())),
        }
    }
}

impl fmt::Display for KubernetesVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Inputs of `Cluster::new`
pub struct ClusterProps<'a> {
    pub version: KubernetesVersion,
    /// Role granted cluster-admin through an access entry
    pub masters_role: &'a Role,
    /// Control-plane subnets: a literal list or a parameter `Ref`
    pub subnet_ids: Value,
}

/// A declared EKS cluster
#[derive(Debug)]
pub struct Cluster {
    version: KubernetesVersion,
    resource: ResourceRef,
    service_role: Role,
    masters_access: ResourceRef,
}

impl Cluster {
    pub fn new(stack: &mut Stack, id: &str, props: ClusterProps<'_>) -> Result<Self> {
        let service_role = RoleBuilder::new(format!("{}/Role", id))
            .assumed_by(Principal::service(EKS_SERVICE))
            .managed_policy("AmazonEKSClusterPolicy")
            .build(stack)?;

        let cluster = Resource::new("AWS::EKS::Cluster")
            .property("Version", props.version.as_str())
            .property("RoleArn", service_role.arn())
            .property(
                "ResourcesVpcConfig",
                json!({
                    "EndpointPrivateAccess": false,
                    "EndpointPublicAccess": true,
                    "SubnetIds": props.subnet_ids,
                }),
            )
            .property(
                "AccessConfig",
                json!({
                    "AuthenticationMode": "API_AND_CONFIG_MAP",
                    "BootstrapClusterCreatorAdminPermissions": true,
                }),
            );
        let resource = stack.add_resource(&format!("{}/Resource", id), cluster)?;

        let access_entry = Resource::new("AWS::EKS::AccessEntry")
            .property("ClusterName", resource.reference())
            .property("PrincipalArn", props.masters_role.arn())
            .property(
                "AccessPolicies",
                json!([{
                    "AccessScope": { "Type": "cluster" },
                    "PolicyArn": CLUSTER_ADMIN_POLICY,
                }]),
            );
        let masters_access =
            stack.add_resource(&format!("{}/MastersAccess/Resource", id), access_entry)?;

        Ok(Self {
            version: props.version,
            resource,
            service_role,
            masters_access,
        })
    }

    pub fn version(&self) -> KubernetesVersion {
        self.version
    }

    pub fn logical_id(&self) -> &str {
        self.resource.logical_id()
    }

    /// Cluster name as a `Ref`
    pub fn name(&self) -> Value {
        self.resource.reference()
    }

    pub fn arn(&self) -> Value {
        self.resource.att("Arn")
    }

    pub fn endpoint(&self) -> Value {
        self.resource.att("Endpoint")
    }

    pub fn service_role(&self) -> &Role {
        &self.service_role
    }

    pub fn masters_access(&self) -> &ResourceRef {
        &self.masters_access
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructs::iam::CODEBUILD_SERVICE;
    use crate::domain::config::Environment;

    #[test]
    fn test_version_parsing() {
        assert_eq!("1.23".parse::<KubernetesVersion>().unwrap(), KubernetesVersion::V1_23);
        assert_eq!(KubernetesVersion::V1_30.to_string(), "1.30");
        assert!(matches!(
            "1.5".parse::<KubernetesVersion>(),
            Err(SynthError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_cluster_grants_masters_role_admin_access() {
        let mut stack = Stack::new("EksTest", Environment::default()).unwrap();
        let admin = RoleBuilder::new("eks-application-role")
            .assumed_by(Principal::service(CODEBUILD_SERVICE))
            .build(&mut stack)
            .unwrap();

        let cluster = Cluster::new(
            &mut stack,
            "application-cluster",
            ClusterProps {
                version: KubernetesVersion::V1_23,
                masters_role: &admin,
                subnet_ids: json!(["subnet-a", "subnet-b"]),
            },
        )
        .unwrap();

        let template = stack.template();
        let resource = template.resource(cluster.logical_id()).unwrap();
        assert_eq!(resource.properties["Version"], json!("1.23"));
        assert_eq!(resource.properties["RoleArn"], cluster.service_role().arn());
        assert_eq!(
            resource.properties["ResourcesVpcConfig"]["SubnetIds"],
            json!(["subnet-a", "subnet-b"])
        );

        let entry = template
            .resource(cluster.masters_access().logical_id())
            .unwrap();
        assert_eq!(entry.properties["PrincipalArn"], admin.arn());
        assert_eq!(entry.properties["ClusterName"], cluster.name());
    }

    #[test]
    fn test_cluster_requires_masters_role_declared_first() {
        let mut other = Stack::new("Other", Environment::default()).unwrap();
        let foreign = RoleBuilder::new("foreign")
            .assumed_by(Principal::service(CODEBUILD_SERVICE))
            .build(&mut other)
            .unwrap();

        let mut stack = Stack::new("EksTest", Environment::default()).unwrap();
        let err = Cluster::new(
            &mut stack,
            "cluster",
            ClusterProps {
                version: KubernetesVersion::V1_23,
                masters_role: &foreign,
                subnet_ids: json!([]),
            },
        )
        .unwrap_err();
        assert!(err.is_ordering_error());
    }
}
