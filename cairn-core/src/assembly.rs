//! Cloud assembly
//!
//! The output directory of a synthesis run: one `<Stack>.template.json` per
//! stack plus a `manifest.json` describing them. Rendering is pure; writing
//! the files is left to the caller.

use serde_json::{Map, Value, json};
use std::path::PathBuf;

use crate::error::{Result, SynthError};
use crate::stack::SynthesizedStack;

pub const ASSEMBLY_VERSION: &str = "36.0.0";
pub const MANIFEST_FILE: &str = "manifest.json";

/// A rendered file, relative to the assembly directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyFile {
    pub relative_path: PathBuf,
    pub contents: String,
}

/// The set of stacks produced by one synthesis run
#[derive(Debug, Clone, Default)]
pub struct CloudAssembly {
    stacks: Vec<SynthesizedStack>,
}

impl CloudAssembly {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stack(&mut self, stack: SynthesizedStack) -> Result<()> {
        if self.stacks.iter().any(|s| s.name == stack.name) {
            return Err(SynthError::DuplicateConstruct(stack.name));
        }
        self.stacks.push(stack);
        Ok(())
    }

    pub fn stacks(&self) -> &[SynthesizedStack] {
        &self.stacks
    }

    pub fn template_file_name(stack_name: &str) -> String {
        format!("{}.template.json", stack_name)
    }

    pub fn manifest(&self) -> Value {
        let mut artifacts = Map::new();
        for stack in &self.stacks {
            artifacts.insert(
                stack.name.clone(),
                json!({
                    "displayName": stack.name,
                    "environment": stack.env.uri(),
                    "properties": {
                        "templateFile": Self::template_file_name(&stack.name),
                    },
                    "type": "aws:cloudformation:stack",
                }),
            );
        }
        json!({ "artifacts": artifacts, "version": ASSEMBLY_VERSION })
    }

    /// Templates in stack order, then the manifest
    pub fn files(&self) -> Result<Vec<AssemblyFile>> {
        let mut files = Vec::with_capacity(self.stacks.len() + 1);
        for stack in &self.stacks {
            files.push(AssemblyFile {
                relative_path: PathBuf::from(Self::template_file_name(&stack.name)),
                contents: stack.template.to_json_string()?,
            });
        }

        let mut manifest = serde_json::to_string_pretty(&self.manifest())?;
        manifest.push('\n');
        files.push(AssemblyFile {
            relative_path: PathBuf::from(MANIFEST_FILE),
            contents: manifest,
        });

        Ok(files)
    }
}
