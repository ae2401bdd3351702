//! Built-in commands and pipes.
//!
//! Commands: `@core/*` (set, log), `@flow/*` (goto, exit, return) and
//! `@human/*` (validate, select). Pipes: the `core` bundle in [`pipes`].

pub mod core;
pub mod flow;
pub mod human;
pub mod pipes;

use std::sync::Arc;

use crate::registry::{Bundle, CommandHandler, CommandRegistry, PipeRegistry, Registry, RegistryError};

pub fn core_commands() -> Bundle<Arc<dyn CommandHandler>> {
    Bundle::new("core")
        .with("@core/set", Arc::new(core::Set) as Arc<dyn CommandHandler>)
        .with("@core/log", Arc::new(core::Log))
}

pub fn flow_commands() -> Bundle<Arc<dyn CommandHandler>> {
    Bundle::new("flow")
        .with("@flow/goto", Arc::new(flow::Goto) as Arc<dyn CommandHandler>)
        .with("@flow/exit", Arc::new(flow::Exit))
        .with("@flow/return", Arc::new(flow::Return))
}

pub fn human_commands() -> Bundle<Arc<dyn CommandHandler>> {
    Bundle::new("human")
        .with("@human/validate", Arc::new(human::Validate) as Arc<dyn CommandHandler>)
        .with("@human/select", Arc::new(human::Select))
}

/// Registry preloaded with every built-in command bundle.
pub fn command_registry() -> Result<CommandRegistry, RegistryError> {
    let mut registry = Registry::new("command");
    registry.load_bundle(core_commands())?;
    registry.load_bundle(flow_commands())?;
    registry.load_bundle(human_commands())?;
    Ok(registry)
}

/// Registry preloaded with the built-in pipes.
pub fn pipe_registry() -> Result<PipeRegistry, RegistryError> {
    let mut registry = Registry::new("pipe");
    registry.load_bundle(pipes::core_pipes())?;
    Ok(registry)
}
