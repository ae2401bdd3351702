pub mod context;
pub mod eval;
pub mod interpreter;
pub mod result;
pub mod scope;
pub mod value;

use std::future::Future;
use std::pin::Pin;

pub use context::{ContextSnapshot, ExecutionContext, MemoryStore, Status, StoreProvider, User};
pub use eval::{EvaluationError, Evaluator};
pub use interpreter::Interpreter;
pub use result::{
    ActionLog, Arguments, Batch, CommandOutcome, FlowControl, ListOutcome, ProgramResult,
    StatementResult,
};
pub use scope::{ScopeChain, ScopeError};
pub use value::{Map, Value};

use crate::verify::labels::LabelValidationError;

/// Boxed future used by the recursive async walkers.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors that abort a whole run. Handler-level failures are not here: they
/// are recorded in the action log and execution continues.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Unknown label: {0}")]
    UnknownLabel(String),

    #[error("forEach source must be an array, got {actual}")]
    NotAnArray { actual: &'static str },

    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Labels(#[from] LabelValidationError),

    #[error("{command}: {message}")]
    Command { command: String, message: String },
}
