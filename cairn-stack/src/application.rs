//! Application stack assembler
//!
//! Declaration order matters: a resource may only reference what was
//! declared before it. The deploy identity is declared ahead of its project
//! because the administrative role must trust it, and the project in turn
//! needs the administrative role's ARN and the cluster name.

use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::{debug, info};

use cairn_core::constructs::codebuild::{PipelineProject, service_role};
use cairn_core::constructs::codepipeline::{
    CodeBuildAction, GitHubSourceAction, GitHubTrigger, ManualApprovalAction, Pipeline, SecretValue,
};
use cairn_core::constructs::ecr::Repository;
use cairn_core::constructs::eks::{Cluster, ClusterProps, KubernetesVersion};
use cairn_core::constructs::iam::{CODEBUILD_SERVICE, Role, RoleBuilder};
use cairn_core::constructs::s3::Bucket;
use cairn_core::domain::config::StackConfig;
use cairn_core::domain::intrinsic::{Pseudo, join};
use cairn_core::domain::policy::{PolicyStatement, Principal};
use cairn_core::domain::template::{Output, Parameter};
use cairn_core::{CloudAssembly, Result, Stack, SynthesizedStack};

use crate::build_project::create_pipeline_project;

pub const SOURCE_STAGE: &str = "GitWebhook";
pub const BUILD_STAGE: &str = "DockerBuildAndPush";
pub const APPROVAL_STAGE: &str = "ManualApproval";
pub const DEPLOY_STAGE: &str = "AppDeploy";

pub const SOURCE_ACTION: &str = "GitCommit_Source";
pub const BUILD_ACTION: &str = "DockerBuildAndPush";
pub const APPROVAL_ACTION: &str = "ManualApproval";
pub const DEPLOY_ACTION: &str = "AppDeploy";

/// Parameter asked for at deploy time when no subnets are configured
pub const SUBNETS_PARAMETER: &str = "ClusterSubnetIds";

/// Construct id of the image registry; the repository name is a property
const REGISTRY_ID: &str = "Registry";

const DESCRIPTION: &str =
    "Application cluster, image registry and a gated build-and-deploy pipeline";

/// Cluster, registry and pipeline for one deployment target
pub struct ApplicationStack;

impl ApplicationStack {
    /// Build the stack described by `config`
    ///
    /// # Errors
    /// Configuration errors, an unsupported cluster version, or a wiring
    /// error in the declared topology
    pub fn synthesize(config: &StackConfig) -> Result<SynthesizedStack> {
        config.validate()?;
        let version: KubernetesVersion = config.cluster.version.parse()?;

        info!(
            "Synthesizing stack {} for {}",
            config.stack_name,
            config.env.uri()
        );

        let mut stack = Stack::new(&config.stack_name, config.env.clone())?;
        stack.set_description(DESCRIPTION);

        let artifacts = Bucket::new(&mut stack, &format!("{}/ArtifactsBucket", config.pipeline_name))?;
        let registry = Repository::new(&mut stack, REGISTRY_ID, &config.registry_name)?;

        // The administrative role trusts the deploy identity, so that
        // identity has to exist first.
        let deploy_identity = service_role(&mut stack, &config.deploy.id)?;
        let mut admin_role = RoleBuilder::new(&config.cluster.admin_role_id)
            .assumed_by(Principal::service(CODEBUILD_SERVICE))
            .trusted_by(&deploy_identity)
            .build(&mut stack)?;

        let subnet_ids = subnet_ids(&mut stack, config)?;
        let cluster = Cluster::new(
            &mut stack,
            &config.cluster.id,
            ClusterProps {
                version,
                masters_role: &admin_role,
                subnet_ids,
            },
        )?;

        let mut build_project = create_pipeline_project(
            &mut stack,
            &config.build.id,
            build_variables(&registry),
            &config.build.buildspec,
            None,
        )?;
        let mut deploy_project = create_pipeline_project(
            &mut stack,
            &config.deploy.id,
            deploy_variables(&registry, &cluster, &admin_role),
            &config.deploy.buildspec,
            Some(deploy_identity),
        )?;

        wire_permissions(
            &registry,
            &artifacts,
            &cluster,
            &mut admin_role,
            &mut build_project,
            &mut deploy_project,
        )?;

        // Policies are emitted only after every grant has been made
        build_project.finalize(&mut stack)?;
        deploy_project.finalize(&mut stack)?;
        admin_role.finalize(&mut stack)?;

        let pipeline = build_pipeline(config, &build_project, &deploy_project)?;
        let pipeline = pipeline.synth(&mut stack, &artifacts)?;
        debug!("Pipeline stages: {}", pipeline.stage_names().join(" -> "));

        stack.add_output(
            "RegistryUri",
            output(registry.uri(), "Image repository URI"),
        )?;
        stack.add_output("ClusterName", output(cluster.name(), "Cluster name"))?;
        stack.add_output("PipelineName", output(pipeline.name(), "Deployment pipeline name"))?;
        stack.add_output(
            "ClusterConfigCommand",
            output(
                join(
                    "",
                    vec![
                        json!("aws eks update-kubeconfig --name "),
                        cluster.name(),
                        json!(" --region "),
                        Pseudo::Region.value(),
                        json!(" --role-arn "),
                        admin_role.arn(),
                    ],
                ),
                "Configures kubectl with the administrative role",
            ),
        )?;

        let synthesized = stack.synth()?;
        info!(
            "Synthesized {} with {} resources",
            synthesized.name,
            synthesized.template.resources.len()
        );
        Ok(synthesized)
    }
}

/// Synthesize one stack into a cloud assembly
pub fn synthesize_assembly(config: &StackConfig) -> Result<CloudAssembly> {
    let mut assembly = CloudAssembly::new();
    assembly.add_stack(ApplicationStack::synthesize(config)?)?;
    Ok(assembly)
}

fn subnet_ids(stack: &mut Stack, config: &StackConfig) -> Result<Value> {
    if config.cluster.subnet_ids.is_empty() {
        stack.add_parameter(
            SUBNETS_PARAMETER,
            Parameter {
                parameter_type: "List<AWS::EC2::Subnet::Id>".to_string(),
                description: Some("Subnets for the cluster control plane".to_string()),
            },
        )
    } else {
        Ok(json!(config.cluster.subnet_ids))
    }
}

fn build_variables(registry: &Repository) -> BTreeMap<String, Value> {
    let mut variables = BTreeMap::new();
    variables.insert("REPO_ECR".to_string(), registry.uri());
    variables
}

fn deploy_variables(registry: &Repository, cluster: &Cluster, admin_role: &Role) -> BTreeMap<String, Value> {
    let mut variables = BTreeMap::new();
    variables.insert("REPO_ECR".to_string(), registry.uri());
    variables.insert("EKS_CLUSTER_NAME".to_string(), cluster.name());
    variables.insert("EKS_ROLE".to_string(), admin_role.arn());
    variables
}

fn wire_permissions(
    registry: &Repository,
    artifacts: &Bucket,
    cluster: &Cluster,
    admin_role: &mut Role,
    build_project: &mut PipelineProject,
    deploy_project: &mut PipelineProject,
) -> Result<()> {
    registry.grant_pull_push(build_project)?;
    artifacts.grant_read_write(build_project)?;
    artifacts.grant_read_write(deploy_project)?;

    admin_role.grant_assume_role(deploy_project)?;
    admin_role.add_to_policy(
        PolicyStatement::allow()
            .action("eks:DescribeCluster")
            .resource(cluster.arn()),
    )
}

fn build_pipeline(
    config: &StackConfig,
    build_project: &PipelineProject,
    deploy_project: &PipelineProject,
) -> Result<Pipeline> {
    let mut pipeline = Pipeline::new(&config.pipeline_name, &config.pipeline_name);
    let source_output = pipeline.artifact();
    let build_output = pipeline.artifact();
    let deploy_output = pipeline.artifact();

    pipeline.add_stage(
        SOURCE_STAGE,
        vec![
            GitHubSourceAction {
                action_name: SOURCE_ACTION.to_string(),
                owner: config.source.owner.clone(),
                repo: config.source.repo.clone(),
                branch: config.source.branch.clone(),
                oauth_token: SecretValue::secrets_manager(&config.source.oauth_secret),
                output: source_output,
                trigger: GitHubTrigger::WebHook,
            }
            .into(),
        ],
    )?;

    pipeline.add_stage(
        BUILD_STAGE,
        vec![
            CodeBuildAction::new(BUILD_ACTION, build_project, source_output)
                .output(build_output)
                .into(),
        ],
    )?;

    let commit = pipeline.source_variables(SOURCE_ACTION)?;
    pipeline.add_stage(
        APPROVAL_STAGE,
        vec![
            ManualApprovalAction {
                action_name: APPROVAL_ACTION.to_string(),
                additional_information: Some(format!("CommitId: {}", commit.commit_id())),
                external_entity_link: Some(commit.commit_url()),
            }
            .into(),
        ],
    )?;

    // Deploy works from the source checkout, not the build output
    pipeline.add_stage(
        DEPLOY_STAGE,
        vec![
            CodeBuildAction::new(DEPLOY_ACTION, deploy_project, source_output)
                .output(deploy_output)
                .into(),
        ],
    )?;

    Ok(pipeline)
}

fn output(value: Value, description: &str) -> Output {
    Output {
        value,
        description: Some(description.to_string()),
    }
}
