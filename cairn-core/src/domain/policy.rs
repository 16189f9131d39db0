//! IAM policy documents
//!
//! Statements are built with a small fluent API and rendered to the JSON
//! shape IAM expects. Rendering is deterministic: statements keep insertion
//! order, actions keep insertion order with duplicates removed.

use serde_json::{Map, Value, json};

pub const POLICY_VERSION: &str = "2012-10-17";

/// Statement effect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Allow => "Allow",
            Effect::Deny => "Deny",
        }
    }
}

/// Who a statement applies to
#[derive(Debug, Clone, PartialEq)]
pub enum Principal {
    /// A service principal such as `codebuild.amazonaws.com`
    Service(String),
    /// An AWS principal given by ARN (usually a `Fn::GetAtt` of a role)
    Aws(Value),
}

impl Principal {
    pub fn service(name: impl Into<String>) -> Self {
        Principal::Service(name.into())
    }

    fn key(&self) -> &'static str {
        match self {
            Principal::Service(_) => "Service",
            Principal::Aws(_) => "AWS",
        }
    }

    fn value(&self) -> Value {
        match self {
            Principal::Service(name) => Value::String(name.clone()),
            Principal::Aws(arn) => arn.clone(),
        }
    }
}

/// A single policy statement
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStatement {
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<Value>,
    pub principals: Vec<Principal>,
}

impl PolicyStatement {
    /// Start an `Allow` statement
    pub fn allow() -> Self {
        Self {
            effect: Effect::Allow,
            actions: Vec::new(),
            resources: Vec::new(),
            principals: Vec::new(),
        }
    }

    /// Start a `Deny` statement
    pub fn deny() -> Self {
        Self {
            effect: Effect::Deny,
            ..Self::allow()
        }
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        let action = action.into();
        if !self.actions.contains(&action) {
            self.actions.push(action);
        }
        self
    }

    pub fn actions<I, S>(self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        actions.into_iter().fold(self, |stmt, a| stmt.action(a))
    }

    pub fn resource(mut self, resource: impl Into<Value>) -> Self {
        self.resources.push(resource.into());
        self
    }

    pub fn principal(mut self, principal: Principal) -> Self {
        self.principals.push(principal);
        self
    }

    /// Whether this statement allows `action`
    pub fn allows(&self, action: &str) -> bool {
        self.effect == Effect::Allow && self.actions.iter().any(|a| a == action)
    }

    pub fn to_json(&self) -> Value {
        let mut stmt = Map::new();
        stmt.insert("Action".to_string(), collapse(self.actions.iter().map(|a| json!(a)).collect()));
        stmt.insert("Effect".to_string(), json!(self.effect.as_str()));

        if !self.principals.is_empty() {
            let mut by_kind: Map<String, Value> = Map::new();
            for principal in &self.principals {
                let entry = by_kind
                    .entry(principal.key().to_string())
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Value::Array(values) = entry {
                    values.push(principal.value());
                }
            }
            for value in by_kind.values_mut() {
                if let Value::Array(values) = value {
                    *value = collapse(std::mem::take(values));
                }
            }
            stmt.insert("Principal".to_string(), Value::Object(by_kind));
        }

        if !self.resources.is_empty() {
            stmt.insert("Resource".to_string(), collapse(self.resources.clone()));
        }

        Value::Object(stmt)
    }
}

/// A list of statements with the IAM policy version header
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyDocument {
    pub statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_statement(&mut self, statement: PolicyStatement) {
        if !self.statements.contains(&statement) {
            self.statements.push(statement);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn to_json(&self) -> Value {
        json!({
            "Statement": self.statements.iter().map(PolicyStatement::to_json).collect::<Vec<_>>(),
            "Version": POLICY_VERSION,
        })
    }
}

/// IAM renders single-element lists as scalars
fn collapse(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::Array(values)
    }
}
