//! Outcome and trace types produced while executing a program.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use super::context::{ContextSnapshot, ExecutionContext, User};
use super::scope::ScopeChain;
use super::value::{Map, Value};

/// Signal returned by every statement and statement list.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FlowControl {
    #[default]
    Continue,
    Goto { target: String },
    Exit { code: i64 },
    Return { value: Value },
}

impl FlowControl {
    pub fn is_continue(&self) -> bool {
        matches!(self, FlowControl::Continue)
    }
}

/// Evaluated instruction arguments, keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    values: Map,
}

impl Arguments {
    pub fn new(values: Map) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// The named argument, `null` when absent.
    pub fn value(&self, name: &str) -> Value {
        self.values.get(name).cloned().unwrap_or(Value::Null)
    }

    pub fn require(&self, name: &str) -> Result<&Value, String> {
        self.values
            .get(name)
            .ok_or_else(|| format!("missing required argument '{}'", name))
    }

    pub fn require_str(&self, name: &str) -> Result<&str, String> {
        match self.require(name)? {
            Value::Str(s) => Ok(s),
            other => Err(format!(
                "argument '{}' must be a string, got {}",
                name,
                other.type_name()
            )),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn into_map(self) -> Map {
        self.values
    }
}

/// What a command handler reports back for one invocation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CommandOutcome {
    pub success: bool,
    pub value: Option<Value>,
    pub messages: Vec<String>,
    pub cost: f64,
    pub fatal_error: Option<String>,
    /// Only honored when `success` is true.
    pub flow: FlowControl,
}

impl CommandOutcome {
    pub fn ok(value: Value) -> Self {
        Self {
            success: true,
            value: Some(value),
            ..Self::default()
        }
    }

    /// Success with nothing to write.
    pub fn done() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            fatal_error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn with_flow(mut self, flow: FlowControl) -> Self {
        self.flow = flow;
        self
    }
}

/// One entry per executed instruction, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionLog {
    pub command: String,
    pub success: bool,
    /// Milliseconds since the Unix epoch.
    pub start: u64,
    pub end: u64,
    /// Milliseconds.
    pub duration: u64,
    pub messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<String>,
    pub cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub success: bool,
    pub message: String,
    pub actions: Vec<ActionLog>,
    pub total_cost: f64,
    pub duration: u64,
}

/// The serializable result of a whole program run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramResult {
    pub batches: Vec<Batch>,
    pub duration: u64,
    pub data: Map,
    pub cost: f64,
    pub user: User,
    pub scope_chain: ScopeChain,
    pub context: ContextSnapshot,
    pub exit_code: i64,
    pub exited_early: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exited_at: Option<usize>,
}

impl ProgramResult {
    /// Every action of every batch, in execution order.
    pub fn actions(&self) -> impl Iterator<Item = &ActionLog> {
        self.batches.iter().flat_map(|b| b.actions.iter())
    }
}

/// Result of executing a single instruction.
#[derive(Debug, Clone)]
pub struct StatementResult {
    pub context: ExecutionContext,
    /// `None` when the instruction's condition was falsy.
    pub log: Option<ActionLog>,
    pub flow: FlowControl,
}

/// Result of walking one statement list.
#[derive(Debug, Clone)]
pub struct ListOutcome {
    pub context: ExecutionContext,
    pub actions: Vec<ActionLog>,
    pub cost: f64,
    pub flow: FlowControl,
}

impl ListOutcome {
    pub fn empty(context: ExecutionContext) -> Self {
        Self {
            context,
            actions: Vec::new(),
            cost: 0.0,
            flow: FlowControl::Continue,
        }
    }

    /// Fold a nested list's trace into this one, adopting its context.
    pub fn absorb(&mut self, nested: ListOutcome) -> FlowControl {
        self.context = nested.context;
        self.actions.extend(nested.actions);
        self.cost += nested.cost;
        nested.flow
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
