//! Tree-walking executor.
//!
//! Statement lists are walked by explicit index so a `goto` can rewrite the
//! position mid-walk. Every level returns a [`FlowControl`]; a jump whose
//! target is not in the current list bubbles to the caller, which retries the
//! resolution against its own path.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::context::{ExecutionContext, Status};
use super::eval::Evaluator;
use super::result::{
    now_millis, ActionLog, Arguments, Batch, FlowControl, ListOutcome, ProgramResult,
    StatementResult,
};
use super::scope::ScopeChain;
use super::value::{set_path, Map, Value};
use super::{BoxFuture, RuntimeError};
use crate::ast::{Block, BlockKind, ForEachSpec, Instruction, Program, Statement};
use crate::registry::{CommandResolver, PipeResolver};
use crate::verify::labels::{build_label_index, validate_labels, LabelIndex, ValidationMode};

/// Output targets with this prefix write into the innermost scope frame.
pub const SCOPE_OUTPUT_PREFIX: &str = "scope.";

/// Bindings injected into every forEach iteration frame.
pub const LOOP_VARIABLES: [&str; 7] = ["_index", "_count", "_length", "_first", "_last", "_odd", "_even"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GotoResolution {
    /// Continue the current list at this index.
    Local(usize),
    /// Hand the jump to the enclosing list.
    Outer,
}

/// Decide whether `target` can be reached from the list at `path`.
pub fn resolve_goto(target: &str, labels: &LabelIndex, path: &[usize]) -> Result<GotoResolution, RuntimeError> {
    let entry = labels
        .get(target)
        .ok_or_else(|| RuntimeError::UnknownLabel(target.to_string()))?;
    if entry.path.len() == path.len() + 1 && entry.path.starts_with(path) {
        return Ok(GotoResolution::Local(entry.path[path.len()]));
    }
    if path.is_empty() {
        // nowhere left to bubble to
        return Err(RuntimeError::UnknownLabel(target.to_string()));
    }
    Ok(GotoResolution::Outer)
}

pub struct Interpreter {
    commands: Arc<dyn CommandResolver>,
    pipes: Option<Arc<dyn PipeResolver>>,
}

impl Interpreter {
    pub fn new(commands: Arc<dyn CommandResolver>) -> Self {
        Self {
            commands,
            pipes: None,
        }
    }

    pub fn with_pipes(mut self, pipes: Arc<dyn PipeResolver>) -> Self {
        self.pipes = Some(pipes);
        self
    }

    fn evaluator(&self) -> Evaluator<'_> {
        Evaluator::new(self.pipes.as_deref())
    }

    /// Run one instruction against a copy of `ctx`.
    pub async fn execute(
        &self,
        instr: &Instruction,
        ctx: &ExecutionContext,
    ) -> Result<StatementResult, RuntimeError> {
        let mut ctx = ctx.clone();
        let evaluator = self.evaluator();

        if let Some(condition) = &instr.condition {
            if !evaluator.evaluate(condition, &ctx).await?.is_truthy() {
                debug!(command = %instr.action, line = instr.loc.line, "condition is falsy, skipping");
                return Ok(StatementResult {
                    context: ctx,
                    log: None,
                    flow: FlowControl::Continue,
                });
            }
        }

        let mut values = Map::new();
        for arg in &instr.args {
            let value = evaluator.evaluate(&arg.value, &ctx).await?;
            values.insert(arg.name.clone(), value);
        }
        let args = Arguments::new(values);

        let command = instr.action.to_string();
        let handler = self
            .commands
            .resolve(&command)
            .ok_or_else(|| RuntimeError::CommandNotFound(command.clone()))?;

        let start = now_millis();
        let timer = Instant::now();
        let outcome = handler.run(&args, &mut ctx).await?;
        let duration = timer.elapsed().as_millis() as u64;

        if outcome.success {
            if let Some(target) = &instr.output {
                let value = outcome.value.clone().unwrap_or(Value::Null);
                write_output(&mut ctx, target, value);
            }
        } else {
            warn!(
                command = %command,
                line = instr.loc.line,
                error = outcome.fatal_error.as_deref().unwrap_or("unknown error"),
                "command failed"
            );
        }
        ctx.cost += outcome.cost;

        let flow = if outcome.success {
            outcome.flow
        } else {
            FlowControl::Continue
        };
        let log = ActionLog {
            command,
            success: outcome.success,
            start,
            end: start + duration,
            duration,
            messages: outcome.messages,
            fatal_error: outcome.fatal_error,
            cost: outcome.cost,
            output: instr.output.clone(),
            value: outcome.value,
        };

        Ok(StatementResult {
            context: ctx,
            log: Some(log),
            flow,
        })
    }

    /// Walk a statement list located at `path` in the program tree.
    pub fn execute_statements<'a>(
        &'a self,
        statements: &'a [Statement],
        path: Vec<usize>,
        labels: &'a LabelIndex,
        ctx: ExecutionContext,
    ) -> BoxFuture<'a, Result<ListOutcome, RuntimeError>> {
        Box::pin(async move {
            let mut outcome = ListOutcome::empty(ctx);
            let mut i = 0;

            while i < statements.len() {
                let flow = match &statements[i] {
                    Statement::Instruction(instr) => {
                        debug!(command = %instr.action, path = ?path, index = i, "instruction");
                        let result = self.execute(instr, &outcome.context).await?;
                        outcome.context = result.context;
                        if let Some(log) = result.log {
                            outcome.cost += log.cost;
                            outcome.actions.push(log);
                        }
                        result.flow
                    }
                    Statement::Block(block) => {
                        let mut block_path = path.clone();
                        block_path.push(i);
                        let nested = self
                            .execute_block(block, block_path, labels, outcome.context.clone())
                            .await?;
                        outcome.absorb(nested)
                    }
                };

                match flow {
                    FlowControl::Continue => i += 1,
                    FlowControl::Goto { target } => match resolve_goto(&target, labels, &path)? {
                        GotoResolution::Local(index) => {
                            debug!(target = %target, index, "goto");
                            i = index;
                        }
                        GotoResolution::Outer => {
                            outcome.flow = FlowControl::Goto { target };
                            return Ok(outcome);
                        }
                    },
                    other => {
                        outcome.flow = other;
                        return Ok(outcome);
                    }
                }
            }

            Ok(outcome)
        })
    }

    async fn execute_block(
        &self,
        block: &Block,
        path: Vec<usize>,
        labels: &LabelIndex,
        ctx: ExecutionContext,
    ) -> Result<ListOutcome, RuntimeError> {
        match &block.kind {
            BlockKind::Plain => self.execute_statements(&block.body, path, labels, ctx).await,
            BlockKind::Conditional(condition) => {
                // no scope frame: writes inside stay visible afterwards
                if !self.evaluator().evaluate(condition, &ctx).await?.is_truthy() {
                    return Ok(ListOutcome::empty(ctx));
                }
                self.execute_statements(&block.body, path, labels, ctx).await
            }
            BlockKind::ForEach(spec) => self.execute_for_each(block, spec, path, labels, ctx).await,
        }
    }

    async fn execute_for_each(
        &self,
        block: &Block,
        spec: &ForEachSpec,
        path: Vec<usize>,
        labels: &LabelIndex,
        ctx: ExecutionContext,
    ) -> Result<ListOutcome, RuntimeError> {
        let items = match self.evaluator().evaluate(&spec.source, &ctx).await? {
            Value::List(items) => items,
            other => {
                return Err(RuntimeError::NotAnArray {
                    actual: other.type_name(),
                })
            }
        };

        let length = items.len();
        let mut outcome = ListOutcome::empty(ctx);
        for (index, item) in items.into_iter().enumerate() {
            let mut iteration = outcome.context.clone();
            iteration.scope.push();
            bind_loop_variables(&mut iteration.scope, index, length);
            iteration.scope.write(&spec.item, item);

            let nested = self
                .execute_statements(&block.body, path.clone(), labels, iteration)
                .await?;
            let flow = outcome.absorb(nested);
            outcome.context.scope.pop()?;

            if !flow.is_continue() {
                outcome.flow = flow;
                break;
            }
        }
        Ok(outcome)
    }

    /// Validate labels, run the whole program and collect its result.
    pub async fn execute_program(
        &self,
        program: &Program,
        ctx: ExecutionContext,
    ) -> Result<ProgramResult, RuntimeError> {
        let timer = Instant::now();
        validate_labels(program, ValidationMode::CollectAll)?;
        let labels = build_label_index(program);

        let mut ctx = ctx;
        ctx.set_status(Status::Running);

        let ListOutcome {
            mut context,
            actions,
            cost,
            flow,
        } = self
            .execute_statements(&program.statements, Vec::new(), &labels, ctx)
            .await?;

        let (exit_code, exited_early, value, message) = match flow {
            FlowControl::Continue => (0, false, None, "Completed".to_string()),
            FlowControl::Exit { code } => (code, true, None, format!("Exited with code {}", code)),
            FlowControl::Return { value } => (0, true, Some(value), "Returned".to_string()),
            FlowControl::Goto { target } => return Err(RuntimeError::UnknownLabel(target)),
        };

        if context.status() != Status::Error {
            context.set_status(Status::Finished);
        }

        let duration = timer.elapsed().as_millis() as u64;
        let exited_at = if exited_early {
            actions.len().checked_sub(1)
        } else {
            None
        };

        info!(
            actions = actions.len(),
            cost,
            exit_code,
            exited_early,
            "program finished"
        );

        let batch = Batch {
            success: actions.iter().all(|a| a.success),
            message,
            actions,
            total_cost: cost,
            duration,
        };

        Ok(ProgramResult {
            batches: vec![batch],
            duration,
            data: context.data.clone(),
            cost: context.cost,
            user: context.user.clone(),
            scope_chain: context.scope.clone(),
            context: context.snapshot(),
            exit_code,
            exited_early,
            value,
            exited_at,
        })
    }
}

fn write_output(ctx: &mut ExecutionContext, target: &str, value: Value) {
    match target.strip_prefix(SCOPE_OUTPUT_PREFIX) {
        // the whole remainder is one key, `scope.a.b` binds "a.b"
        Some(key) => ctx.scope.write(key, value),
        None => set_path(&mut ctx.data, target, value),
    }
}

fn bind_loop_variables(scope: &mut ScopeChain, index: usize, length: usize) {
    let count = index + 1;
    scope.write("_index", Value::from(index));
    scope.write("_count", Value::from(count));
    scope.write("_length", Value::from(length));
    scope.write("_first", Value::Bool(index == 0));
    scope.write("_last", Value::Bool(count == length));
    scope.write("_odd", Value::Bool(count % 2 == 1));
    scope.write("_even", Value::Bool(count % 2 == 0));
}
