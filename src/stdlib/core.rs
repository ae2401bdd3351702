use async_trait::async_trait;
use tracing::info;

use crate::registry::CommandHandler;
use crate::runtime::{Arguments, CommandOutcome, ExecutionContext, RuntimeError};

/// `@core/set value=<expr>`: yields `value` so `output=` can store it.
pub struct Set;

#[async_trait]
impl CommandHandler for Set {
    async fn run(
        &self,
        args: &Arguments,
        _ctx: &mut ExecutionContext,
    ) -> Result<CommandOutcome, RuntimeError> {
        match args.require("value") {
            Ok(value) => Ok(CommandOutcome::ok(value.clone())),
            Err(message) => Ok(CommandOutcome::failure(message)),
        }
    }
}

/// `@core/log message=<expr>`: appends to the user log.
pub struct Log;

#[async_trait]
impl CommandHandler for Log {
    async fn run(
        &self,
        args: &Arguments,
        ctx: &mut ExecutionContext,
    ) -> Result<CommandOutcome, RuntimeError> {
        let message = match args.require("message") {
            Ok(value) => value.to_string(),
            Err(message) => return Ok(CommandOutcome::failure(message)),
        };
        info!(target: "oto::user", "{}", message);
        ctx.log(message.clone());
        Ok(CommandOutcome::ok(message.clone().into()).with_message(message))
    }
}
