//! Host modules for stack definition files
//!
//! Each module is generic over a small provider trait so the CLI can supply
//! the process environment and a tracing sink while tests supply fixtures.

pub mod env;
pub mod log;

pub use env::{EnvModule, VarProvider};
pub use log::{LogLevel, LogModule, LogSink};
