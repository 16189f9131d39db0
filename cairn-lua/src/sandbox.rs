//! Lua sandbox creation
//!
//! Definition files run with only the table, string and math libraries and
//! cannot load other code. The `stack` helper module is always present; the
//! caller registers `env` and `log` through a `ModuleRegistry`.

use mlua::{Lua, LuaOptions, Result as LuaResult, StdLib, Table, Value};

/// LuaLS annotations for the `stack` module
pub const STACK_STUBS: &str = r#"---@meta

---Stack definition helpers
---@class stack
stack = {}

---@class StackProject
---@field id string
---@field buildspec string

---@class StackSource
---@field owner? string
---@field repo? string
---@field branch? string
---@field secret? string Secrets Manager secret holding the OAuth token

---@class StackCluster
---@field id? string
---@field version? string
---@field admin_role? string
---@field subnets? string[] Leave empty to ask for subnets at deploy time

---@class StackDefinition
---@field name? string
---@field region? string
---@field account? string
---@field registry? string
---@field pipeline? string
---@field source? StackSource
---@field cluster? StackCluster
---@field build? StackProject
---@field deploy? StackProject

---Mark the returned table as a stack definition
---@param definition StackDefinition
---@return StackDefinition
function stack.define(definition) end

---@param id string
---@param buildspec string
---@return StackProject
function stack.project(id, buildspec) end

---@param ... string
---@return string[]
function stack.subnets(...) end
"#;

/// Create a restricted Lua sandbox
///
/// # Example
/// ```no_run
/// use cairn_lua::sandbox::create_sandbox;
///
/// let lua = create_sandbox()?;
/// let definition: mlua::Table = lua
///     .load(r#"return stack.define { name = "ApplicationStaging" }"#)
///     .eval()?;
/// let name: String = definition.get("name")?;
/// # Ok::<(), mlua::Error>(())
/// ```
pub fn create_sandbox() -> LuaResult<Lua> {
    // No IO, OS, PACKAGE or DEBUG
    let lua = unsafe {
        Lua::unsafe_new_with(
            StdLib::TABLE | StdLib::STRING | StdLib::MATH,
            LuaOptions::default(),
        )
    };

    lua.globals().set("require", mlua::Nil)?;
    lua.globals().set("dofile", mlua::Nil)?;
    lua.globals().set("loadfile", mlua::Nil)?;
    lua.globals().set("load", mlua::Nil)?;

    register_stack_module(&lua)?;

    Ok(lua)
}

fn register_stack_module(lua: &Lua) -> LuaResult<()> {
    let stack = lua.create_table()?;

    // stack.define(definition) returns the definition table unchanged
    let define_fn = lua.create_function(|_, definition: Value| match definition {
        Value::Table(table) => Ok(table),
        other => Err(mlua::Error::RuntimeError(format!(
            "stack.define expects a table, got {}",
            other.type_name()
        ))),
    })?;
    stack.set("define", define_fn)?;

    // stack.project(id, buildspec) builds a project entry
    let project_fn = lua.create_function(|lua, (id, buildspec): (String, String)| {
        let project = lua.create_table()?;
        project.set("id", id)?;
        project.set("buildspec", buildspec)?;
        Ok(project)
    })?;
    stack.set("project", project_fn)?;

    // stack.subnets("subnet-a", "subnet-b", ...) collects subnet ids
    let subnets_fn = lua.create_function(|lua, ids: mlua::Variadic<String>| -> LuaResult<Table> {
        lua.create_sequence_from(ids.into_iter())
    })?;
    stack.set("subnets", subnets_fn)?;

    lua.globals().set("stack", stack)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_basic_lua() {
        let lua = create_sandbox().unwrap();

        let result: String = lua
            .load(r#"return string.format("%s-%d", "app", 2)"#)
            .eval()
            .unwrap();
        assert_eq!(result, "app-2");

        let result: i32 = lua.load("return math.max(1, 3)").eval().unwrap();
        assert_eq!(result, 3);
    }

    #[test]
    fn test_sandbox_no_io() {
        let lua = create_sandbox().unwrap();

        let has_io: bool = lua.load("return io ~= nil").eval().unwrap();
        assert!(!has_io);

        let has_os: bool = lua.load("return os ~= nil").eval().unwrap();
        assert!(!has_os);
    }

    #[test]
    fn test_sandbox_cannot_load_code() {
        let lua = create_sandbox().unwrap();

        assert!(lua.load(r#"require("os")"#).exec().is_err());
        assert!(lua.load(r#"dofile("stack.lua")"#).exec().is_err());
        assert!(lua.load(r#"load("return 1")()"#).exec().is_err());
    }

    #[test]
    fn test_sandbox_has_no_host_modules_by_default() {
        let lua = create_sandbox().unwrap();

        let has_env: bool = lua.load("return env ~= nil").eval().unwrap();
        assert!(!has_env);
        let has_log: bool = lua.load("return log ~= nil").eval().unwrap();
        assert!(!has_log);
    }

    #[test]
    fn test_stack_define_passes_table_through() {
        let lua = create_sandbox().unwrap();

        let name: String = lua
            .load(
                r#"
            local def = stack.define { name = "ApplicationStaging" }
            return def.name
        "#,
            )
            .eval()
            .unwrap();
        assert_eq!(name, "ApplicationStaging");

        let err = lua.load(r#"stack.define("oops")"#).exec().unwrap_err();
        assert!(err.to_string().contains("expects a table"));
    }

    #[test]
    fn test_stack_helpers() {
        let lua = create_sandbox().unwrap();

        let (id, buildspec): (String, String) = lua
            .load(
                r#"
            local p = stack.project("Deploy", "deploy-pipeline.yml")
            return p.id, p.buildspec
        "#,
            )
            .eval()
            .unwrap();
        assert_eq!(id, "Deploy");
        assert_eq!(buildspec, "deploy-pipeline.yml");

        let subnets: Vec<String> = lua
            .load(r#"return stack.subnets("subnet-a", "subnet-b")"#)
            .eval()
            .unwrap();
        assert_eq!(subnets, vec!["subnet-a", "subnet-b"]);
    }
}
