//! S3 bucket used as the pipeline artifact store

use serde_json::{Value, json};

use crate::constructs::iam::Grantable;
use crate::domain::intrinsic::join;
use crate::domain::policy::PolicyStatement;
use crate::domain::template::Resource;
use crate::error::Result;
use crate::stack::{ResourceRef, Stack};

const READ_ACTIONS: [&str; 3] = ["s3:GetObject*", "s3:GetBucket*", "s3:List*"];
const WRITE_ACTIONS: [&str; 4] = [
    "s3:DeleteObject*",
    "s3:PutObject",
    "s3:PutObjectLegalHold",
    "s3:Abort*",
];

/// Encrypted, non-public bucket that survives stack deletion
#[derive(Debug, Clone)]
pub struct Bucket {
    resource: ResourceRef,
}

impl Bucket {
    pub fn new(stack: &mut Stack, id: &str) -> Result<Self> {
        let resource = Resource::new("AWS::S3::Bucket")
            .property(
                "BucketEncryption",
                json!({
                    "ServerSideEncryptionConfiguration": [
                        { "ServerSideEncryptionByDefault": { "SSEAlgorithm": "AES256" } }
                    ]
                }),
            )
            .property(
                "PublicAccessBlockConfiguration",
                json!({
                    "BlockPublicAcls": true,
                    "BlockPublicPolicy": true,
                    "IgnorePublicAcls": true,
                    "RestrictPublicBuckets": true
                }),
            )
            .retain();

        let resource = stack.add_resource(&format!("{}/Resource", id), resource)?;
        Ok(Self { resource })
    }

    pub fn logical_id(&self) -> &str {
        self.resource.logical_id()
    }

    pub fn name(&self) -> Value {
        self.resource.reference()
    }

    pub fn arn(&self) -> Value {
        self.resource.att("Arn")
    }

    /// `<bucket arn>/*`
    pub fn objects_arn(&self) -> Value {
        join("", vec![self.arn(), json!("/*")])
    }

    pub fn grant_read_write(&self, grantee: &mut impl Grantable) -> Result<()> {
        grantee.grant_principal().add_to_policy(
            PolicyStatement::allow()
                .actions(READ_ACTIONS)
                .actions(WRITE_ACTIONS)
                .resource(self.arn())
                .resource(self.objects_arn()),
        )
    }
}
