//! Commands whose successful outcome carries a flow directive.

use async_trait::async_trait;

use crate::registry::CommandHandler;
use crate::runtime::{Arguments, CommandOutcome, ExecutionContext, FlowControl, RuntimeError, Value};

/// `@flow/goto target="label"`
pub struct Goto;

#[async_trait]
impl CommandHandler for Goto {
    async fn run(
        &self,
        args: &Arguments,
        _ctx: &mut ExecutionContext,
    ) -> Result<CommandOutcome, RuntimeError> {
        match args.require_str("target") {
            Ok(target) => Ok(CommandOutcome::done()
                .with_message(format!("goto {}", target))
                .with_flow(FlowControl::Goto {
                    target: target.to_string(),
                })),
            Err(message) => Ok(CommandOutcome::failure(message)),
        }
    }
}

/// `@flow/exit code=N`, code defaults to 0.
pub struct Exit;

#[async_trait]
impl CommandHandler for Exit {
    async fn run(
        &self,
        args: &Arguments,
        _ctx: &mut ExecutionContext,
    ) -> Result<CommandOutcome, RuntimeError> {
        let code = match args.get("code") {
            None | Some(Value::Null) => 0,
            Some(value) => match value.as_integer() {
                Some(code) => code,
                None => {
                    return Ok(CommandOutcome::failure(format!(
                        "exit code must be an integer, got {}",
                        value
                    )))
                }
            },
        };
        Ok(CommandOutcome::done()
            .with_message(format!("exit {}", code))
            .with_flow(FlowControl::Exit { code }))
    }
}

/// `@flow/return value=<expr>`, value defaults to null.
pub struct Return;

#[async_trait]
impl CommandHandler for Return {
    async fn run(
        &self,
        args: &Arguments,
        _ctx: &mut ExecutionContext,
    ) -> Result<CommandOutcome, RuntimeError> {
        let value = args.value("value");
        Ok(CommandOutcome::ok(value.clone()).with_flow(FlowControl::Return { value }))
    }
}
