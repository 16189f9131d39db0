//! `env` module: read-only variable lookup for definition files
//!
//! Definitions use it to pick up deployment coordinates such as the target
//! account without hard-coding them.

use crate::module::CairnModule;
use mlua::prelude::*;
use std::sync::{Arc, Mutex};

/// Source of variables visible to a definition
pub trait VarProvider: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;

    /// Names of every variable the provider exposes
    fn keys(&self) -> Vec<String>;
}

pub struct EnvModule<V: VarProvider> {
    provider: Arc<Mutex<V>>,
}

impl<V: VarProvider> EnvModule<V> {
    pub fn new(provider: V) -> Self {
        Self {
            provider: Arc::new(Mutex::new(provider)),
        }
    }
}

fn lock_error<E: std::fmt::Display>(e: E) -> LuaError {
    LuaError::RuntimeError(format!("Failed to lock provider: {}", e))
}

impl<V: VarProvider + 'static> CairnModule for EnvModule<V> {
    fn id(&self) -> &'static str {
        "env"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let env_table = lua.create_table()?;

        // env.get(name, default?)
        {
            let provider = self.provider.clone();
            env_table.set(
                "get",
                lua.create_function(move |_, (name, default): (String, Option<String>)| {
                    let value = provider.lock().map_err(lock_error)?.get(&name);
                    Ok(value.or(default))
                })?,
            )?;
        }

        // env.require(name)
        {
            let provider = self.provider.clone();
            env_table.set(
                "require",
                lua.create_function(move |_, name: String| {
                    provider
                        .lock()
                        .map_err(lock_error)?
                        .get(&name)
                        .ok_or_else(|| {
                            LuaError::RuntimeError(format!(
                                "Required environment variable '{}' is not set",
                                name
                            ))
                        })
                })?,
            )?;
        }

        // env.has(name)
        {
            let provider = self.provider.clone();
            env_table.set(
                "has",
                lua.create_function(move |_, name: String| {
                    Ok(provider.lock().map_err(lock_error)?.get(&name).is_some())
                })?,
            )?;
        }

        // env.keys()
        {
            let provider = self.provider.clone();
            env_table.set(
                "keys",
                lua.create_function(move |lua, ()| {
                    let mut keys = provider.lock().map_err(lock_error)?.keys();
                    keys.sort();
                    lua.create_sequence_from(keys)
                })?,
            )?;
        }

        lua.globals().set(self.id(), env_table)?;
        Ok(())
    }

    fn stubs(&self) -> String {
        r#"---@meta

---Read-only access to deployment variables
---@class env
env = {}

---Get a variable, or `default` when it is unset
---@param name string
---@param default? string
---@return string?
---
---@usage
---local account = env.get("CDK_DEFAULT_ACCOUNT")
---local region = env.get("CDK_DEFAULT_REGION", "us-east-2")
function env.get(name, default) end

---Get a variable, failing the definition when it is unset
---@param name string
---@return string
function env.require(name) end

---Whether a variable is set
---@param name string
---@return boolean
function env.has(name) end

---Names of the visible variables, sorted
---@return string[]
function env.keys() end
"#
        .to_string()
    }
}
