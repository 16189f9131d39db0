//! Cairn Lua definitions
//!
//! Stack definitions may be written as Lua files instead of relying on the
//! built-in defaults. This crate provides:
//! - Module trait and registry for host modules exposed to definitions
//! - A restricted sandbox with the `stack` helper module
//! - `env` and `log` modules with pluggable providers
//! - The definition parser producing a `StackConfig`

pub mod module;
pub mod modules;
pub mod parser;
pub mod sandbox;

pub use module::{CairnModule, ModuleRegistry};
pub use modules::{EnvModule, LogLevel, LogModule, LogSink, VarProvider};
pub use parser::parse_stack_definition;
pub use sandbox::{STACK_STUBS, create_sandbox};
