//! The application deployment stack
//!
//! Wires the cluster, image registry, build projects and deployment pipeline
//! together from a `StackConfig`, and provides the build-spec pre-flight
//! check used by `cairn check`.

pub mod application;
pub mod build_project;
pub mod preflight;

pub use application::{ApplicationStack, synthesize_assembly};
pub use build_project::create_pipeline_project;
pub use preflight::{BuildSpecError, BuildSpecSummary, PreflightReport, check_buildspec, check_buildspecs};
