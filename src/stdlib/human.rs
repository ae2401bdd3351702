//! Commands that suspend the program until a person answers an applet.

use async_trait::async_trait;
use tracing::warn;

use crate::applet::AppletKind;
use crate::registry::CommandHandler;
use crate::runtime::{Arguments, CommandOutcome, ExecutionContext, Map, RuntimeError, Status, Value};

pub const LAUNCHER_MISSING: &str = "AppletLauncher not configured";

/// `@human/validate message="..."`: yields the approval as a boolean.
pub struct Validate;

/// `@human/select items=[...] message="..."`: yields the chosen items, in
/// their original order.
pub struct Select;

#[async_trait]
impl CommandHandler for Validate {
    async fn run(
        &self,
        args: &Arguments,
        ctx: &mut ExecutionContext,
    ) -> Result<CommandOutcome, RuntimeError> {
        let message = match args.require_str("message") {
            Ok(message) => message.to_string(),
            Err(error) => return Ok(CommandOutcome::failure(error)),
        };
        let mut input = Map::new();
        input.insert("message".to_string(), Value::Str(message));

        let response = match ask(AppletKind::Validate, Value::Object(input), ctx).await {
            Ok(response) => response,
            Err(error) => return Ok(CommandOutcome::failure(error)),
        };

        let approved = match response.get("approved").and_then(Value::as_bool) {
            Some(approved) => approved,
            None => {
                return Ok(CommandOutcome::failure("applet response has no 'approved' boolean"))
            }
        };
        let mut outcome = CommandOutcome::ok(Value::Bool(approved))
            .with_message(if approved { "Approved" } else { "Rejected" });
        if let Some(comment) = response.get("comment").and_then(Value::as_str) {
            outcome = outcome.with_message(format!("Comment: {}", comment));
        }
        Ok(outcome)
    }
}

#[async_trait]
impl CommandHandler for Select {
    async fn run(
        &self,
        args: &Arguments,
        ctx: &mut ExecutionContext,
    ) -> Result<CommandOutcome, RuntimeError> {
        let items = match args.require("items") {
            Ok(Value::List(items)) if !items.is_empty() => items.clone(),
            Ok(Value::List(_)) => return Ok(CommandOutcome::failure("'items' must not be empty")),
            Ok(other) => {
                return Ok(CommandOutcome::failure(format!(
                    "'items' must be an array, got {}",
                    other.type_name()
                )))
            }
            Err(error) => return Ok(CommandOutcome::failure(error)),
        };
        let message = match args.get("message") {
            None | Some(Value::Null) => "Select items".to_string(),
            Some(Value::Str(message)) => message.clone(),
            Some(other) => {
                return Ok(CommandOutcome::failure(format!(
                    "'message' must be a string, got {}",
                    other.type_name()
                )))
            }
        };

        let mut input = Map::new();
        input.insert("message".to_string(), Value::Str(message));
        input.insert("items".to_string(), Value::List(items.clone()));

        let response = match ask(AppletKind::Select, Value::Object(input), ctx).await {
            Ok(response) => response,
            Err(error) => return Ok(CommandOutcome::failure(error)),
        };

        // indices are unique and in range once the wait has accepted them
        let indices = match selected_indices(&response) {
            Some(indices) => indices,
            None => {
                return Ok(CommandOutcome::failure("applet response has no 'selected' indices"))
            }
        };
        let selected: Vec<Value> = items
            .iter()
            .enumerate()
            .filter(|(i, _)| indices.contains(i))
            .map(|(_, item)| item.clone())
            .collect();

        let count = selected.len();
        Ok(CommandOutcome::ok(Value::List(selected))
            .with_message(format!("Selected {} of {} item(s)", count, items.len())))
    }
}

fn selected_indices(response: &Value) -> Option<Vec<usize>> {
    response
        .get("selected")?
        .as_list()?
        .iter()
        .map(|index| index.as_integer().and_then(|i| usize::try_from(i).ok()))
        .collect()
}

/// Launch an applet and block on its answer. Status is `waitingHumanValidation`
/// during the wait, `running` after an answer and `error` after a rejected
/// wait. The instance is terminated whichever way the wait ends.
async fn ask(kind: AppletKind, input: Value, ctx: &mut ExecutionContext) -> Result<Value, String> {
    let launcher = ctx
        .applet_launcher
        .clone()
        .ok_or_else(|| LAUNCHER_MISSING.to_string())?;

    let instance = match launcher.launch(kind, input, ctx).await {
        Ok(instance) => instance,
        Err(error) => {
            ctx.set_status(Status::Error);
            return Err(error.to_string());
        }
    };
    let terminator = instance.terminator.clone();

    ctx.set_status(Status::WaitingHumanValidation);
    let result = instance.wait_for_response().await;
    terminator.terminate();

    match result {
        Ok(response) => {
            ctx.set_status(Status::Running);
            Ok(response)
        }
        Err(error) => {
            warn!(kind = %kind, error = %error, "applet wait failed");
            ctx.set_status(Status::Error);
            Err(error.to_string())
        }
    }
}

