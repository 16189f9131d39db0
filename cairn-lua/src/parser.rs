//! Stack definition parser
//!
//! Evaluates a Lua definition in the sandbox and reads it field by field
//! into a `StackConfig`. Any field left out keeps its production default.
//!
//! ```lua
//! return stack.define {
//!     name = "ApplicationProduction",
//!     region = env.get("CDK_DEFAULT_REGION", "us-east-2"),
//!     account = env.get("CDK_DEFAULT_ACCOUNT"),
//!     registry = "application-repo",
//!     pipeline = "application-pipeline",
//!     source = { owner = "HiHashoom", repo = "application", branch = "main", secret = "github" },
//!     cluster = { id = "application-cluster", version = "1.23", admin_role = "eks-application-role" },
//!     build = stack.project("DockerBuild", "build-pipeline.yml"),
//!     deploy = stack.project("Deploy", "deploy-pipeline.yml"),
//! }
//! ```

use anyhow::{Context, Result, bail};
use cairn_core::domain::config::{ProjectConfig, StackConfig};
use mlua::{Table, Value};
use tracing::debug;

use crate::module::ModuleRegistry;
use crate::sandbox::create_sandbox;

/// Parse a stack definition
///
/// `modules` are registered into the sandbox before the source runs.
/// `chunk_name` appears in Lua error messages.
///
/// # Errors
/// Returns an error if the source fails to evaluate, does not return a
/// table, or a field has the wrong type. Semantic checks are left to
/// `StackConfig::validate`.
pub fn parse_stack_definition(
    source: &str,
    chunk_name: &str,
    modules: &ModuleRegistry,
) -> Result<StackConfig> {
    let lua = create_sandbox().context("Failed to create definition sandbox")?;
    modules
        .register_all(&lua)
        .context("Failed to register definition modules")?;

    let value: Value = lua
        .load(source)
        .set_name(chunk_name)
        .eval()
        .context("Failed to evaluate stack definition")?;
    let definition = match value {
        Value::Table(table) => table,
        other => bail!(
            "Stack definition must return a table, got {}",
            other.type_name()
        ),
    };

    let mut config = StackConfig::default();

    if let Some(name) = string_field(&definition, "name")? {
        config.stack_name = name;
    }
    if let Some(region) = string_field(&definition, "region")? {
        config.env.region = region;
    }
    config.env.account = string_field(&definition, "account")?;
    if let Some(registry) = string_field(&definition, "registry")? {
        config.registry_name = registry;
    }
    if let Some(pipeline) = string_field(&definition, "pipeline")? {
        config.pipeline_name = pipeline;
    }

    if let Some(source) = table_field(&definition, "source")? {
        let target = &mut config.source;
        if let Some(owner) = string_field(&source, "owner")? {
            target.owner = owner;
        }
        if let Some(repo) = string_field(&source, "repo")? {
            target.repo = repo;
        }
        if let Some(branch) = string_field(&source, "branch")? {
            target.branch = branch;
        }
        if let Some(secret) = string_field(&source, "secret")? {
            target.oauth_secret = secret;
        }
    }

    if let Some(cluster) = table_field(&definition, "cluster")? {
        let target = &mut config.cluster;
        if let Some(id) = string_field(&cluster, "id")? {
            target.id = id;
        }
        if let Some(version) = string_field(&cluster, "version")? {
            target.version = version;
        }
        if let Some(role) = string_field(&cluster, "admin_role")? {
            target.admin_role_id = role;
        }
        target.subnet_ids = string_list_field(&cluster, "subnets")?;
    }

    if let Some(build) = table_field(&definition, "build")? {
        config.build = project(&build, config.build).context("Invalid 'build' project")?;
    }
    if let Some(deploy) = table_field(&definition, "deploy")? {
        config.deploy = project(&deploy, config.deploy).context("Invalid 'deploy' project")?;
    }

    debug!(stack = %config.stack_name, "Parsed stack definition");
    Ok(config)
}

fn project(table: &Table, default: ProjectConfig) -> Result<ProjectConfig> {
    Ok(ProjectConfig {
        id: string_field(table, "id")?.unwrap_or(default.id),
        buildspec: string_field(table, "buildspec")?.unwrap_or(default.buildspec),
    })
}

/// Optional string field; integers are accepted and converted
///
/// Floats are rejected: `1.30` would come back as `"1.3"`.
fn string_field(table: &Table, key: &str) -> Result<Option<String>> {
    let value: Value = table
        .get(key)
        .with_context(|| format!("Failed to read field '{}'", key))?;
    match value {
        Value::Nil => Ok(None),
        Value::String(s) => {
            let text = s
                .to_str()
                .with_context(|| format!("Field '{}' is not valid UTF-8", key))?;
            Ok(Some(String::from(&*text)))
        }
        Value::Integer(i) => Ok(Some(i.to_string())),
        Value::Number(_) => bail!(
            "Field '{}' must be a string, got a float; quote it to keep every digit",
            key
        ),
        other => bail!("Field '{}' must be a string, got {}", key, other.type_name()),
    }
}

fn table_field(table: &Table, key: &str) -> Result<Option<Table>> {
    let value: Value = table
        .get(key)
        .with_context(|| format!("Failed to read field '{}'", key))?;
    match value {
        Value::Nil => Ok(None),
        Value::Table(t) => Ok(Some(t)),
        other => bail!("Field '{}' must be a table, got {}", key, other.type_name()),
    }
}

fn string_list_field(table: &Table, key: &str) -> Result<Vec<String>> {
    let Some(list) = table_field(table, key)? else {
        return Ok(Vec::new());
    };
    let mut items = Vec::new();
    for item in list.sequence_values::<String>() {
        items.push(item.with_context(|| format!("Field '{}' must be a list of strings", key))?);
    }
    Ok(items)
}
