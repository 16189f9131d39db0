//! `log` module: messages from definition files
//!
//! The sink decides where messages go; the CLI forwards them to `tracing`.

use crate::module::CairnModule;
use mlua::prelude::*;
use std::fmt;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    const ALL: [LogLevel; 4] = [
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warning,
        LogLevel::Error,
    ];

    /// Name of the Lua function logging at this level
    pub fn function_name(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.function_name())
    }
}

/// Destination of `log.*` calls
pub trait LogSink: Send + Sync {
    fn write(&mut self, level: LogLevel, message: &str);
}

pub struct LogModule<S: LogSink> {
    sink: Arc<Mutex<S>>,
}

impl<S: LogSink> LogModule<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
        }
    }
}

impl<S: LogSink + 'static> CairnModule for LogModule<S> {
    fn id(&self) -> &'static str {
        "log"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let log_table = lua.create_table()?;

        for level in LogLevel::ALL {
            let sink = self.sink.clone();
            log_table.set(
                level.function_name(),
                lua.create_function(move |_, msg: String| {
                    sink.lock()
                        .map_err(|e| LuaError::RuntimeError(format!("Failed to lock sink: {}", e)))?
                        .write(level, &msg);
                    Ok(())
                })?,
            )?;
        }

        lua.globals().set(self.id(), log_table)?;
        Ok(())
    }

    fn stubs(&self) -> String {
        r#"---@meta

---Messages emitted while a stack definition is evaluated
---@class log
log = {}

---@param msg string
function log.debug(msg) end

---@param msg string
function log.info(msg) end

---@param msg string
function log.warning(msg) end

---@param msg string
function log.error(msg) end
"#
        .to_string()
    }
}
