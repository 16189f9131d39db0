//! Core domain types
//!
//! This module contains the template model, IAM policy documents, intrinsic
//! functions and the stack configuration shared by the definition loader
//! (cairn-lua) and the stack assembler (cairn-stack).

pub mod config;
pub mod intrinsic;
pub mod policy;
pub mod template;
