use mlua::prelude::*;

/// Host module exposed to stack definition files
///
/// A module registers one global table named after its `id()` and can
/// describe itself to the Lua language server through `stubs()`.
///
/// # Example
///
/// ```rust
/// use cairn_lua::CairnModule;
/// use mlua::prelude::*;
///
/// struct Greeting;
///
/// impl CairnModule for Greeting {
///     fn id(&self) -> &'static str {
///         "greeting"
///     }
///
///     fn register(&self, lua: &Lua) -> LuaResult<()> {
///         let table = lua.create_table()?;
///         table.set("text", "hello")?;
///         lua.globals().set(self.id(), table)?;
///         Ok(())
///     }
///
///     fn stubs(&self) -> String {
///         "---@meta\n---@class greeting\ngreeting = {}\n".to_string()
///     }
/// }
/// ```
pub trait CairnModule: Send + Sync {
    /// Global name of the module table
    ///
    /// Must be a valid Lua identifier and unique within a registry.
    fn id(&self) -> &'static str;

    /// Registers the module table into `lua`
    ///
    /// # Errors
    /// Returns `LuaError` if a function or table cannot be created
    fn register(&self, lua: &Lua) -> LuaResult<()>;

    /// LuaLS annotations for the module, starting with `---@meta`
    fn stubs(&self) -> String;
}

/// The set of modules made available to a definition file
pub struct ModuleRegistry {
    modules: Vec<Box<dyn CairnModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: Vec::new(),
        }
    }

    /// Registers a module
    ///
    /// # Panics
    /// Panics if a module with the same id is already registered
    pub fn register<M: CairnModule + 'static>(&mut self, module: M) {
        let id = module.id();
        if self.modules.iter().any(|m| m.id() == id) {
            panic!("Module with id '{}' is already registered", id);
        }
        self.modules.push(Box::new(module));
    }

    /// Registered modules, in registration order
    pub fn modules(&self) -> &[Box<dyn CairnModule>] {
        &self.modules
    }

    /// Registers every module into `lua`, stopping at the first failure
    pub fn register_all(&self, lua: &Lua) -> LuaResult<()> {
        for module in &self.modules {
            module.register(lua)?;
        }
        Ok(())
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
