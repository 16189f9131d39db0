//! Deployment pipeline
//!
//! Stages are appended in order with `Pipeline::add_stage`. Structural rules
//! the pipeline service enforces at creation time are checked while stages
//! are added, so a bad pipeline fails synthesis instead of deployment:
//! - stage names are unique and every stage has at least one action
//! - the first stage holds only source actions, and no later stage holds one
//! - an action may only consume an artifact produced by an earlier stage
//! - there are at least two stages (checked by `synth`)

use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use tracing::debug;

use crate::constructs::codebuild::PipelineProject;
use crate::constructs::iam::{CODEPIPELINE_SERVICE, RoleBuilder};
use crate::constructs::s3::Bucket;
use crate::domain::policy::{PolicyStatement, Principal};
use crate::domain::template::Resource;
use crate::error::{Result, SynthError};
use crate::stack::{ResourceRef, Stack};

/// Handle to a file set passed between stages
///
/// Artifacts are named after the action that produces them
/// (`Artifact_<Stage>_<Action>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Artifact(usize);

/// A secret resolved by CloudFormation when the pipeline is created
///
/// Synthesis only records the dynamic reference; the secret need not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    /// Whole `SecretString` of a Secrets Manager secret
    pub fn secrets_manager(secret_id: &str) -> Self {
        SecretValue(format!(
            "{{{{resolve:secretsmanager:{}:SecretString:::}}}}",
            secret_id
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// How a GitHub source action learns about new commits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitHubTrigger {
    None,
    Poll,
    WebHook,
}

#[derive(Debug, Clone)]
pub struct GitHubSourceAction {
    pub action_name: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    pub oauth_token: SecretValue,
    pub output: Artifact,
    pub trigger: GitHubTrigger,
}

#[derive(Debug, Clone)]
pub struct CodeBuildAction {
    pub action_name: String,
    pub project_name: Value,
    pub project_arn: Value,
    pub input: Artifact,
    pub outputs: Vec<Artifact>,
}

impl CodeBuildAction {
    pub fn new(action_name: impl Into<String>, project: &PipelineProject, input: Artifact) -> Self {
        Self {
            action_name: action_name.into(),
            project_name: project.name(),
            project_arn: project.arn(),
            input,
            outputs: Vec::new(),
        }
    }

    pub fn output(mut self, artifact: Artifact) -> Self {
        self.outputs.push(artifact);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ManualApprovalAction {
    pub action_name: String,
    pub additional_information: Option<String>,
    pub external_entity_link: Option<String>,
}

/// One action inside a stage
#[derive(Debug, Clone)]
pub enum Action {
    GitHubSource(GitHubSourceAction),
    CodeBuild(CodeBuildAction),
    ManualApproval(ManualApprovalAction),
}

impl Action {
    pub fn name(&self) -> &str {
        match self {
            Action::GitHubSource(a) => &a.action_name,
            Action::CodeBuild(a) => &a.action_name,
            Action::ManualApproval(a) => &a.action_name,
        }
    }

    fn is_source(&self) -> bool {
        matches!(self, Action::GitHubSource(_))
    }

    fn inputs(&self) -> Vec<Artifact> {
        match self {
            Action::CodeBuild(a) => vec![a.input],
            _ => Vec::new(),
        }
    }

    fn outputs(&self) -> Vec<Artifact> {
        match self {
            Action::GitHubSource(a) => vec![a.output],
            Action::CodeBuild(a) => a.outputs.clone(),
            Action::ManualApproval(_) => Vec::new(),
        }
    }
}

impl From<GitHubSourceAction> for Action {
    fn from(action: GitHubSourceAction) -> Self {
        Action::GitHubSource(action)
    }
}

impl From<CodeBuildAction> for Action {
    fn from(action: CodeBuildAction) -> Self {
        Action::CodeBuild(action)
    }
}

impl From<ManualApprovalAction> for Action {
    fn from(action: ManualApprovalAction) -> Self {
        Action::ManualApproval(action)
    }
}

/// Variables a source action exports to later actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceVariables {
    namespace: String,
}

impl SourceVariables {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn commit_id(&self) -> String {
        format!("#{{{}.CommitId}}", self.namespace)
    }

    pub fn commit_url(&self) -> String {
        format!("#{{{}.CommitUrl}}", self.namespace)
    }

    pub fn commit_message(&self) -> String {
        format!("#{{{}.CommitMessage}}", self.namespace)
    }

    pub fn branch_name(&self) -> String {
        format!("#{{{}.BranchName}}", self.namespace)
    }
}

#[derive(Debug, Clone)]
struct Stage {
    name: String,
    actions: Vec<Action>,
}

/// A pipeline being assembled
#[derive(Debug)]
pub struct Pipeline {
    id: String,
    pipeline_name: String,
    stages: Vec<Stage>,
    next_artifact: usize,
    producers: BTreeMap<Artifact, String>,
}

impl Pipeline {
    pub fn new(id: impl Into<String>, pipeline_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pipeline_name: pipeline_name.into(),
            stages: Vec::new(),
            next_artifact: 0,
            producers: BTreeMap::new(),
        }
    }

    pub fn pipeline_name(&self) -> &str {
        &self.pipeline_name
    }

    /// Allocate an artifact; it gets its name from the action that outputs it
    pub fn artifact(&mut self) -> Artifact {
        let artifact = Artifact(self.next_artifact);
        self.next_artifact += 1;
        artifact
    }

    /// Names of the stages, in execution order
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Append a stage
    pub fn add_stage(&mut self, stage_name: &str, actions: Vec<Action>) -> Result<()> {
        if stage_name.trim().is_empty() {
            return Err(self.invalid("stage name cannot be empty"));
        }
        if self.stages.iter().any(|s| s.name == stage_name) {
            return Err(self.invalid(format!("duplicate stage '{}'", stage_name)));
        }
        if actions.is_empty() {
            return Err(self.invalid(format!("stage '{}' has no actions", stage_name)));
        }

        let first = self.stages.is_empty();
        for (i, action) in actions.iter().enumerate() {
            if actions[..i].iter().any(|a| a.name() == action.name()) {
                return Err(self.invalid(format!(
                    "duplicate action '{}' in stage '{}'",
                    action.name(),
                    stage_name
                )));
            }
            if first && !action.is_source() {
                return Err(self.invalid(format!(
                    "first stage '{}' may only contain source actions, found '{}'",
                    stage_name,
                    action.name()
                )));
            }
            if !first && action.is_source() {
                return Err(self.invalid(format!(
                    "source action '{}' must be in the first stage",
                    action.name()
                )));
            }
            for input in action.inputs() {
                if !self.producers.contains_key(&input) {
                    return Err(SynthError::ArtifactNotProduced {
                        action: action.name().to_string(),
                    });
                }
            }
        }

        // a rejected stage must leave no producers behind
        let mut produced: Vec<(Artifact, String)> = Vec::new();
        for action in &actions {
            for output in action.outputs() {
                if self.producers.contains_key(&output)
                    || produced.iter().any(|(a, _)| *a == output)
                {
                    return Err(self.invalid(format!(
                        "artifact written by '{}' is already produced by another action",
                        action.name()
                    )));
                }
                produced.push((output, artifact_name(stage_name, action.name())));
            }
        }
        self.producers.extend(produced);

        debug!(
            "Pipeline {}: stage {} with {} action(s)",
            self.id,
            stage_name,
            actions.len()
        );

        self.stages.push(Stage {
            name: stage_name.to_string(),
            actions,
        });
        Ok(())
    }

    /// Variables exported by a source action already added to the pipeline
    pub fn source_variables(&self, action_name: &str) -> Result<SourceVariables> {
        self.stages
            .iter()
            .flat_map(|stage| stage.actions.iter().map(move |a| (stage, a)))
            .find(|(_, a)| a.is_source() && a.name() == action_name)
            .map(|(stage, a)| SourceVariables {
                namespace: namespace(&stage.name, a.name()),
            })
            .ok_or_else(|| self.invalid(format!("no source action named '{}'", action_name)))
    }

    /// Declare the pipeline, its role and any webhooks
    ///
    /// The pipeline role receives read/write on `artifact_bucket` and the
    /// right to start every CodeBuild project used by an action.
    pub fn synth(self, stack: &mut Stack, artifact_bucket: &Bucket) -> Result<PipelineRef> {
        if self.stages.len() < 2 {
            return Err(self.invalid(format!(
                "a pipeline needs at least two stages, found {}",
                self.stages.len()
            )));
        }

        let mut role = RoleBuilder::new(format!("{}/Role", self.id))
            .assumed_by(Principal::service(CODEPIPELINE_SERVICE))
            .build(stack)?;
        artifact_bucket.grant_read_write(&mut role)?;

        for stage in &self.stages {
            for action in &stage.actions {
                if let Action::CodeBuild(build) = action {
                    role.add_to_policy(
                        PolicyStatement::allow()
                            .actions([
                                "codebuild:BatchGetBuilds",
                                "codebuild:StartBuild",
                                "codebuild:StopBuild",
                            ])
                            .resource(build.project_arn.clone()),
                    )?;
                }
            }
        }
        let role_policy = role.finalize(stack)?;

        let stages: Vec<Value> = self
            .stages
            .iter()
            .map(|stage| self.render_stage(stage))
            .collect::<Result<_>>()?;

        let mut pipeline = Resource::new("AWS::CodePipeline::Pipeline")
            .property(
                "ArtifactStore",
                json!({ "Location": artifact_bucket.name(), "Type": "S3" }),
            )
            .property("Name", self.pipeline_name.as_str())
            .property("RestartExecutionOnUpdate", false)
            .property("RoleArn", role.arn())
            .property("Stages", stages)
            .depends_on(role.logical_id());
        if let Some(policy) = &role_policy {
            pipeline = pipeline.depends_on(policy.logical_id());
        }
        let resource = stack.add_resource(&format!("{}/Resource", self.id), pipeline)?;

        let mut webhooks = Vec::new();
        for stage in &self.stages {
            for action in &stage.actions {
                if let Action::GitHubSource(source) = action {
                    if source.trigger == GitHubTrigger::WebHook {
                        webhooks.push(self.declare_webhook(stack, &resource, &stage.name, source)?);
                    }
                }
            }
        }

        Ok(PipelineRef {
            resource,
            stage_names: self.stages.into_iter().map(|s| s.name).collect(),
            webhooks,
        })
    }

    fn render_stage(&self, stage: &Stage) -> Result<Value> {
        let actions = stage
            .actions
            .iter()
            .map(|action| self.render_action(&stage.name, action))
            .collect::<Result<Vec<_>>>()?;
        Ok(json!({ "Actions": actions, "Name": stage.name }))
    }

    fn render_action(&self, stage_name: &str, action: &Action) -> Result<Value> {
        let mut rendered = Map::new();
        rendered.insert("Name".to_string(), json!(action.name()));
        rendered.insert("RunOrder".to_string(), json!(1));

        match action {
            Action::GitHubSource(source) => {
                rendered.insert(
                    "ActionTypeId".to_string(),
                    action_type("Source", "ThirdParty", "GitHub"),
                );
                rendered.insert(
                    "Configuration".to_string(),
                    json!({
                        "Branch": source.branch,
                        "OAuthToken": source.oauth_token.as_str(),
                        "Owner": source.owner,
                        "PollForSourceChanges": source.trigger == GitHubTrigger::Poll,
                        "Repo": source.repo,
                    }),
                );
                rendered.insert(
                    "Namespace".to_string(),
                    json!(namespace(stage_name, &source.action_name)),
                );
            }
            Action::CodeBuild(build) => {
                rendered.insert(
                    "ActionTypeId".to_string(),
                    action_type("Build", "AWS", "CodeBuild"),
                );
                rendered.insert(
                    "Configuration".to_string(),
                    json!({ "ProjectName": build.project_name }),
                );
            }
            Action::ManualApproval(approval) => {
                rendered.insert(
                    "ActionTypeId".to_string(),
                    action_type("Approval", "AWS", "Manual"),
                );
                let mut configuration = Map::new();
                if let Some(info) = &approval.additional_information {
                    configuration.insert("CustomData".to_string(), json!(info));
                }
                if let Some(link) = &approval.external_entity_link {
                    configuration.insert("ExternalEntityLink".to_string(), json!(link));
                }
                if !configuration.is_empty() {
                    rendered.insert("Configuration".to_string(), Value::Object(configuration));
                }
            }
        }

        let inputs = self.artifact_names(action.name(), &action.inputs())?;
        if !inputs.is_empty() {
            rendered.insert("InputArtifacts".to_string(), inputs.into());
        }
        let outputs = self.artifact_names(action.name(), &action.outputs())?;
        if !outputs.is_empty() {
            rendered.insert("OutputArtifacts".to_string(), outputs.into());
        }

        Ok(Value::Object(rendered))
    }

    fn artifact_names(&self, action_name: &str, artifacts: &[Artifact]) -> Result<Vec<Value>> {
        artifacts
            .iter()
            .map(|artifact| {
                self.producers
                    .get(artifact)
                    .map(|name| json!({ "Name": name }))
                    .ok_or_else(|| SynthError::ArtifactNotProduced {
                        action: action_name.to_string(),
                    })
            })
            .collect()
    }

    fn declare_webhook(
        &self,
        stack: &mut Stack,
        pipeline: &ResourceRef,
        stage_name: &str,
        source: &GitHubSourceAction,
    ) -> Result<ResourceRef> {
        let webhook = Resource::new("AWS::CodePipeline::Webhook")
            .property("Authentication", "GITHUB_HMAC")
            .property(
                "AuthenticationConfiguration",
                json!({ "SecretToken": source.oauth_token.as_str() }),
            )
            .property(
                "Filters",
                json!([{
                    "JsonPath": "$.ref",
                    "MatchEquals": format!("refs/heads/{}", source.branch),
                }]),
            )
            .property("RegisterWithThirdParty", true)
            .property("TargetAction", source.action_name.as_str())
            .property("TargetPipeline", pipeline.reference())
            .property("TargetPipelineVersion", 1);

        let path = format!(
            "{}/{}/{}/WebhookResource",
            self.id, stage_name, source.action_name
        );
        stack.add_resource(&path, webhook)
    }

    fn invalid(&self, message: impl Into<String>) -> SynthError {
        SynthError::invalid_pipeline(&self.id, message)
    }
}

/// A declared pipeline
#[derive(Debug, Clone)]
pub struct PipelineRef {
    resource: ResourceRef,
    stage_names: Vec<String>,
    webhooks: Vec<ResourceRef>,
}

impl PipelineRef {
    pub fn logical_id(&self) -> &str {
        self.resource.logical_id()
    }

    /// Pipeline name as a `Ref`
    pub fn name(&self) -> Value {
        self.resource.reference()
    }

    pub fn stage_names(&self) -> &[String] {
        &self.stage_names
    }

    pub fn webhooks(&self) -> &[ResourceRef] {
        &self.webhooks
    }
}

fn action_type(category: &str, owner: &str, provider: &str) -> Value {
    json!({
        "Category": category,
        "Owner": owner,
        "Provider": provider,
        "Version": "1",
    })
}

fn namespace(stage_name: &str, action_name: &str) -> String {
    format!("{}_{}_NS", sanitize(stage_name), sanitize(action_name))
}

fn artifact_name(stage_name: &str, action_name: &str) -> String {
    format!("Artifact_{}_{}", sanitize(stage_name), sanitize(action_name))
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constructs::codebuild::{BuildEnvironment, BuildSpec, PipelineProjectProps};
    use crate::domain::config::Environment;

    fn source(pipeline: &mut Pipeline) -> (GitHubSourceAction, Artifact) {
        let output = pipeline.artifact();
        let action = GitHubSourceAction {
            action_name: "GitCommit_Source".to_string(),
            owner: "owner".to_string(),
            repo: "repo".to_string(),
            branch: "main".to_string(),
            oauth_token: SecretValue::secrets_manager("github"),
            output,
            trigger: GitHubTrigger::WebHook,
        };
        (action, output)
    }

    fn project(stack: &mut Stack, id: &str) -> PipelineProject {
        PipelineProject::new(
            stack,
            id,
            PipelineProjectProps {
                environment: BuildEnvironment::default(),
                environment_variables: BTreeMap::new(),
                build_spec: BuildSpec::from_source_filename("buildspec.yml"),
                role: None,
            },
        )
        .unwrap()
    }

    fn approval(name: &str) -> Action {
        ManualApprovalAction {
            action_name: name.to_string(),
            ..Default::default()
        }
        .into()
    }

    #[test]
    fn test_secret_reference_is_dynamic() {
        assert_eq!(
            SecretValue::secrets_manager("github").as_str(),
            "{{resolve:secretsmanager:github:SecretString:::}}"
        );
    }

    #[test]
    fn test_first_stage_must_be_source() {
        let mut pipeline = Pipeline::new("p", "p");
        let err = pipeline.add_stage("Approve", vec![approval("Approve")]).unwrap_err();
        assert!(matches!(err, SynthError::InvalidPipeline { .. }));
    }

    #[test]
    fn test_source_only_in_first_stage() {
        let mut pipeline = Pipeline::new("p", "p");
        let (first, _) = source(&mut pipeline);
        pipeline.add_stage("Source", vec![first.into()]).unwrap();

        let (mut second, _) = source(&mut pipeline);
        second.action_name = "Other".to_string();
        assert!(pipeline.add_stage("Later", vec![second.into()]).is_err());
    }

    #[test]
    fn test_unproduced_artifact_rejected() {
        let mut stack = Stack::new("PipelineTest", Environment::default()).unwrap();
        let build = project(&mut stack, "Build");

        let mut pipeline = Pipeline::new("p", "p");
        let (src, _) = source(&mut pipeline);
        pipeline.add_stage("Source", vec![src.into()]).unwrap();

        let orphan = pipeline.artifact();
        let err = pipeline
            .add_stage("Build", vec![CodeBuildAction::new("Build", &build, orphan).into()])
            .unwrap_err();
        assert!(matches!(err, SynthError::ArtifactNotProduced { .. }));
    }

    #[test]
    fn test_rejected_stage_registers_no_outputs() {
        let mut pipeline = Pipeline::new("p", "p");
        let (first, output) = source(&mut pipeline);
        let (mut second, _) = source(&mut pipeline);
        second.action_name = "Second_Source".to_string();
        second.output = output;

        assert!(
            pipeline
                .add_stage("Source", vec![first.clone().into(), second.into()])
                .is_err()
        );
        assert!(pipeline.stage_names().is_empty());

        pipeline.add_stage("Source", vec![first.into()]).unwrap();
        assert_eq!(pipeline.stage_names(), vec!["Source"]);
    }

    #[test]
    fn test_duplicate_stage_rejected() {
        let mut pipeline = Pipeline::new("p", "p");
        let (src, _) = source(&mut pipeline);
        pipeline.add_stage("Source", vec![src.into()]).unwrap();
        pipeline.add_stage("Approve", vec![approval("Approve")]).unwrap();
        assert!(pipeline.add_stage("Approve", vec![approval("Again")]).is_err());
        assert!(pipeline.add_stage("Empty", vec![]).is_err());
    }

    #[test]
    fn test_single_stage_pipeline_rejected_at_synth() {
        let mut stack = Stack::new("PipelineTest", Environment::default()).unwrap();
        let bucket = Bucket::new(&mut stack, "Artifacts").unwrap();

        let mut pipeline = Pipeline::new("p", "p");
        let (src, _) = source(&mut pipeline);
        pipeline.add_stage("Source", vec![src.into()]).unwrap();
        assert!(pipeline.synth(&mut stack, &bucket).is_err());
    }

    #[test]
    fn test_synth_renders_artifacts_variables_and_webhook() {
        let mut stack = Stack::new("PipelineTest", Environment::default()).unwrap();
        let bucket = Bucket::new(&mut stack, "Artifacts").unwrap();
        let build = project(&mut stack, "Build");

        let mut pipeline = Pipeline::new("app-pipeline", "app");
        let (src, src_out) = source(&mut pipeline);
        pipeline.add_stage("GitWebhook", vec![src.into()]).unwrap();

        let vars = pipeline.source_variables("GitCommit_Source").unwrap();
        assert_eq!(vars.commit_id(), "#{GitWebhook_GitCommit_Source_NS.CommitId}");

        let build_out = pipeline.artifact();
        pipeline
            .add_stage(
                "Build",
                vec![CodeBuildAction::new("Build", &build, src_out).output(build_out).into()],
            )
            .unwrap();
        pipeline
            .add_stage(
                "Approve",
                vec![
                    ManualApprovalAction {
                        action_name: "Approve".to_string(),
                        additional_information: Some(format!("CommitId: {}", vars.commit_id())),
                        external_entity_link: Some(vars.commit_url()),
                    }
                    .into(),
                ],
            )
            .unwrap();

        let synthesized = pipeline.synth(&mut stack, &bucket).unwrap();
        assert_eq!(synthesized.stage_names(), ["GitWebhook", "Build", "Approve"]);
        assert_eq!(synthesized.webhooks().len(), 1);

        let template = stack.template();
        let resource = template.resource(synthesized.logical_id()).unwrap();
        let stages = resource.properties["Stages"].as_array().unwrap();

        let source_action = &stages[0]["Actions"][0];
        assert_eq!(source_action["Namespace"], json!("GitWebhook_GitCommit_Source_NS"));
        assert_eq!(source_action["Configuration"]["PollForSourceChanges"], json!(false));
        assert_eq!(
            source_action["OutputArtifacts"],
            json!([{ "Name": "Artifact_GitWebhook_GitCommit_Source" }])
        );

        let build_action = &stages[1]["Actions"][0];
        assert_eq!(
            build_action["InputArtifacts"],
            json!([{ "Name": "Artifact_GitWebhook_GitCommit_Source" }])
        );
        assert_eq!(build_action["Configuration"]["ProjectName"], build.name());

        let approval_action = &stages[2]["Actions"][0];
        assert_eq!(
            approval_action["Configuration"]["ExternalEntityLink"],
            json!("#{GitWebhook_GitCommit_Source_NS.CommitUrl}")
        );

        let webhook = template.resource(synthesized.webhooks()[0].logical_id()).unwrap();
        assert_eq!(webhook.properties["Filters"][0]["MatchEquals"], json!("refs/heads/main"));
        assert_eq!(webhook.properties["TargetPipeline"], synthesized.name());
    }
}
