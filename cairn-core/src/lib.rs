//! Cairn Core
//!
//! Core types and abstractions for the Cairn stack synthesizer.
//!
//! This crate contains:
//! - Domain types: template model, policy documents, stack configuration
//! - The construct tree root (`Stack`) with declaration-order checking
//! - Typed constructs for the managed services a stack wires together
//! - Cloud assembly rendering

pub mod assembly;
pub mod constructs;
pub mod domain;
pub mod error;
pub mod stack;

pub use assembly::{AssemblyFile, CloudAssembly};
pub use error::{Result, SynthError};
pub use stack::{ResourceRef, Stack, SynthesizedStack};
