//! Intrinsic functions and pseudo parameters
//!
//! Template values are plain `serde_json::Value`s. The helpers here build the
//! intrinsic-function shapes CloudFormation understands, and `references`
//! walks a value to find every logical id it depends on.

use serde_json::{Value, json};
use std::collections::BTreeSet;

/// Pseudo parameters resolved by CloudFormation at deploy time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pseudo {
    AccountId,
    Region,
    Partition,
    UrlSuffix,
    StackName,
}

impl Pseudo {
    /// Name as it appears in a `Ref`
    pub fn name(&self) -> &'static str {
        match self {
            Pseudo::AccountId => "AWS::AccountId",
            Pseudo::Region => "AWS::Region",
            Pseudo::Partition => "AWS::Partition",
            Pseudo::UrlSuffix => "AWS::URLSuffix",
            Pseudo::StackName => "AWS::StackName",
        }
    }

    pub fn value(&self) -> Value {
        json!({ "Ref": self.name() })
    }
}

/// `{ "Ref": logical_id }`
pub fn reference(logical_id: &str) -> Value {
    json!({ "Ref": logical_id })
}

/// `{ "Fn::GetAtt": [logical_id, attribute] }`
pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

/// `{ "Fn::Join": [delimiter, parts] }`
pub fn join(delimiter: &str, parts: Vec<Value>) -> Value {
    json!({ "Fn::Join": [delimiter, parts] })
}

/// `{ "Fn::Sub": template }`
pub fn sub(template: &str) -> Value {
    json!({ "Fn::Sub": template })
}

/// Collect every logical id referenced by `value`
///
/// Pseudo parameters (`AWS::*`) are not logical ids and are skipped.
pub fn references(value: &Value) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    collect_references(value, &mut found);
    found
}

fn collect_references(value: &Value, found: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(target)) = map.get("Ref") {
                    if !target.starts_with("AWS::") {
                        found.insert(target.clone());
                    }
                    return;
                }
                if let Some(att) = map.get("Fn::GetAtt") {
                    match att {
                        Value::Array(parts) => {
                            if let Some(Value::String(target)) = parts.first() {
                                found.insert(target.clone());
                            }
                        }
                        Value::String(dotted) => {
                            if let Some(target) = dotted.split('.').next() {
                                found.insert(target.to_string());
                            }
                        }
                        _ => {}
                    }
                    return;
                }
                if let Some(Value::String(template)) = map.get("Fn::Sub") {
                    found.extend(sub_references(template));
                    return;
                }
            }
            for nested in map.values() {
                collect_references(nested, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_references(item, found);
            }
        }
        _ => {}
    }
}

/// Variables named in a `Fn::Sub` template, minus pseudo parameters and `${!literal}` escapes
fn sub_references(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = &after[..end];
        if !name.starts_with('!') && !name.contains("::") {
            let logical_id = name.split('.').next().unwrap_or(name);
            if !logical_id.is_empty() {
                names.push(logical_id.to_string());
            }
        }
        rest = &after[end + 1..];
    }

    names
}
