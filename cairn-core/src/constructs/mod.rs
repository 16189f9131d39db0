//! Typed constructs
//!
//! Each construct declares one or more resources into a `Stack` and hands
//! back a handle exposing the attributes other constructs need (names,
//! ARNs, URIs) as template values.

pub mod codebuild;
pub mod codepipeline;
pub mod ecr;
pub mod eks;
pub mod iam;
pub mod s3;
