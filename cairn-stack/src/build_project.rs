//! Build-project factory
//!
//! Both pipeline projects run on the same image with the container daemon
//! available; only their variables and build-spec file differ.

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use cairn_core::Result;
use cairn_core::Stack;
use cairn_core::constructs::codebuild::{
    BuildEnvironment, BuildSpec, ComputeType, LinuxBuildImage, PipelineProject, PipelineProjectProps,
};
use cairn_core::constructs::iam::Role;

pub const BUILD_ENVIRONMENT: BuildEnvironment = BuildEnvironment {
    image: LinuxBuildImage::AmazonLinux2_3,
    compute_type: ComputeType::Small,
    privileged: true,
};

/// Declare a pipeline project
///
/// # Arguments
/// * `project_id` - Construct id, also the prefix of the project's paths
/// * `env_variables` - Plain-text variables visible to the build
/// * `build_spec_file_name` - Path of the build-spec inside the source
///   artifact; it is not read or checked here
/// * `role` - A service role declared earlier, when other resources must
///   reference the project's identity before the project exists
pub fn create_pipeline_project(
    stack: &mut Stack,
    project_id: &str,
    env_variables: BTreeMap<String, Value>,
    build_spec_file_name: &str,
    role: Option<Role>,
) -> Result<PipelineProject> {
    debug!(
        "Declaring project {} with build spec {}",
        project_id, build_spec_file_name
    );

    PipelineProject::new(
        stack,
        project_id,
        PipelineProjectProps {
            environment: BUILD_ENVIRONMENT,
            environment_variables: env_variables,
            build_spec: BuildSpec::from_source_filename(build_spec_file_name),
            role,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::constructs::codebuild::service_role;
    use cairn_core::domain::config::Environment;
    use serde_json::json;

    #[test]
    fn test_fixed_build_environment() {
        let mut stack = Stack::new("FactoryTest", Environment::default()).unwrap();
        let project =
            create_pipeline_project(&mut stack, "DockerBuild", BTreeMap::new(), "build-pipeline.yml", None)
                .unwrap();

        let resource = stack.template().resource(project.logical_id()).unwrap();
        let env = &resource.properties["Environment"];
        assert_eq!(env["Image"], json!("aws/codebuild/amazonlinux2-x86_64-standard:3.0"));
        assert_eq!(env["ComputeType"], json!("BUILD_GENERAL1_SMALL"));
        assert_eq!(env["PrivilegedMode"], json!(true));
        assert!(env.get("EnvironmentVariables").is_none());
    }

    #[test]
    fn test_variables_and_buildspec_are_per_project() {
        let mut stack = Stack::new("FactoryTest", Environment::default()).unwrap();

        let mut build_vars = BTreeMap::new();
        build_vars.insert("REPO_ECR".to_string(), json!("repo"));
        let mut deploy_vars = build_vars.clone();
        deploy_vars.insert("EKS_CLUSTER_NAME".to_string(), json!("cluster"));

        let build =
            create_pipeline_project(&mut stack, "DockerBuild", build_vars, "build-pipeline.yml", None)
                .unwrap();
        let role = service_role(&mut stack, "Deploy").unwrap();
        let deploy =
            create_pipeline_project(&mut stack, "Deploy", deploy_vars, "deploy-pipeline.yml", Some(role))
                .unwrap();

        let template = stack.template();
        let build_env = &template.resource(build.logical_id()).unwrap().properties["Environment"];
        let deploy_env = &template.resource(deploy.logical_id()).unwrap().properties["Environment"];
        assert_eq!(build_env["EnvironmentVariables"].as_array().unwrap().len(), 1);
        assert_eq!(deploy_env["EnvironmentVariables"].as_array().unwrap().len(), 2);
        assert_eq!(deploy.build_spec().filename(), "deploy-pipeline.yml");
    }
}
