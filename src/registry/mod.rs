//! Command and pipe registries.
//!
//! Both are loaded from named bundles. Loading is all-or-nothing: a key that
//! already exists (or appears twice in the incoming bundle) rejects the whole
//! bundle.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use crate::runtime::{Arguments, CommandOutcome, ExecutionContext, RuntimeError, Value};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("{kind} '{key}' from bundle '{incoming}' conflicts with bundle '{existing}'")]
    Conflict {
        kind: &'static str,
        key: String,
        existing: String,
        incoming: String,
    },
}

/// A command implementation, addressed by its `@namespace/name` id.
///
/// Returning `Err` aborts the run. Validation and upstream failures should be
/// reported as `Ok(CommandOutcome::failure(..))` instead.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn run(
        &self,
        args: &Arguments,
        ctx: &mut ExecutionContext,
    ) -> Result<CommandOutcome, RuntimeError>;
}

pub trait CommandResolver: Send + Sync {
    fn resolve(&self, id: &str) -> Option<Arc<dyn CommandHandler>>;
}

#[async_trait]
pub trait Pipe: Send + Sync {
    async fn execute(&self, input: Value, args: Vec<Value>) -> Result<Value, String>;
}

#[async_trait]
pub trait PipeResolver: Send + Sync {
    async fn get(&self, name: &str) -> Option<Arc<dyn Pipe>>;
}

/// Adapts a plain function into a [`Pipe`].
pub struct FnPipe<F>(pub F);

#[async_trait]
impl<F> Pipe for FnPipe<F>
where
    F: Fn(Value, Vec<Value>) -> Result<Value, String> + Send + Sync,
{
    async fn execute(&self, input: Value, args: Vec<Value>) -> Result<Value, String> {
        (self.0)(input, args)
    }
}

pub struct Bundle<T> {
    pub name: String,
    pub entries: Vec<(String, T)>,
}

impl<T> Bundle<T> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: Vec::new(),
        }
    }

    pub fn with(mut self, key: &str, entry: T) -> Self {
        self.entries.push((key.to_string(), entry));
        self
    }
}

pub struct Registry<T> {
    kind: &'static str,
    entries: HashMap<String, (String, T)>,
}

pub type CommandRegistry = Registry<Arc<dyn CommandHandler>>;
pub type PipeRegistry = Registry<Arc<dyn Pipe>>;

impl<T> Registry<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            entries: HashMap::new(),
        }
    }

    pub fn load_bundle(&mut self, bundle: Bundle<T>) -> Result<(), RegistryError> {
        let mut incoming = HashSet::new();
        for (key, _) in &bundle.entries {
            if let Some((existing, _)) = self.entries.get(key) {
                return Err(RegistryError::Conflict {
                    kind: self.kind,
                    key: key.clone(),
                    existing: existing.clone(),
                    incoming: bundle.name.clone(),
                });
            }
            if !incoming.insert(key.as_str()) {
                return Err(RegistryError::Conflict {
                    kind: self.kind,
                    key: key.clone(),
                    existing: bundle.name.clone(),
                    incoming: bundle.name.clone(),
                });
            }
        }

        let Bundle { name, entries } = bundle;
        for (key, entry) in entries {
            self.entries.insert(key, (name.clone(), entry));
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.entries.get(key).map(|(_, entry)| entry)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Name of the bundle that provided `key`.
    pub fn bundle_of(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|(bundle, _)| bundle.as_str())
    }

    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CommandResolver for CommandRegistry {
    fn resolve(&self, id: &str) -> Option<Arc<dyn CommandHandler>> {
        self.get(id).cloned()
    }
}

#[async_trait]
impl PipeResolver for PipeRegistry {
    async fn get(&self, name: &str) -> Option<Arc<dyn Pipe>> {
        Registry::get(self, name).cloned()
    }
}
