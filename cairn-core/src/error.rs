//! Error types for stack synthesis

use thiserror::Error;

/// Result type alias for synthesis operations
pub type Result<T> = std::result::Result<T, SynthError>;

/// Errors that can occur while building or synthesizing a stack
#[derive(Debug, Error)]
pub enum SynthError {
    /// Two constructs were declared under the same path
    #[error("Duplicate construct: '{0}' is already declared in this stack")]
    DuplicateConstruct(String),

    /// A resource references a logical id that has not been declared yet
    #[error("Unresolved reference: '{from}' refers to '{target}', which is not declared")]
    UnresolvedReference {
        /// Path of the construct holding the reference
        from: String,
        /// Logical id that could not be found
        target: String,
    },

    /// Construct id is empty or contains a path separator
    #[error("Invalid construct id: '{0}'")]
    InvalidConstructId(String),

    /// Pipeline structure rejected before emission
    #[error("Invalid pipeline '{pipeline}': {message}")]
    InvalidPipeline {
        /// Construct id of the pipeline
        pipeline: String,
        /// What is wrong with it
        message: String,
    },

    /// An action consumes an artifact that no earlier stage produces
    #[error("Artifact consumed by action '{action}' is not produced by any earlier stage")]
    ArtifactNotProduced {
        /// Name of the consuming action
        action: String,
    },

    /// A grant was added to a role whose policy has already been emitted
    #[error("Role '{0}' is finalized; its policy can no longer change")]
    RoleFinalized(String),

    /// Stack configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Kubernetes version string is not one the cluster construct knows
    #[error("Unsupported Kubernetes version: {0}")]
    UnsupportedVersion(String),

    /// Template could not be serialized
    #[error("Failed to serialize template: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SynthError {
    /// Create a pipeline validation error
    pub fn invalid_pipeline(pipeline: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPipeline {
            pipeline: pipeline.into(),
            message: message.into(),
        }
    }

    /// Check if this error comes from declaration order rather than content
    pub fn is_ordering_error(&self) -> bool {
        matches!(self, Self::UnresolvedReference { .. } | Self::ArtifactNotProduced { .. })
    }
}
