use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;

use super::scope::ScopeChain;
use super::value::{Map, Value};
use crate::applet::AppletLauncher;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Status {
    Running,
    WaitingHumanValidation,
    Finished,
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Running => "running",
            Status::WaitingHumanValidation => "waitingHumanValidation",
            Status::Finished => "finished",
            Status::Error => "error",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct User {
    pub id: String,
    pub extra: Map,
}

impl User {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            extra: Map::new(),
        }
    }
}

/// Backing store for `store.a.b` member access.
#[async_trait]
pub trait StoreProvider: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;
}

/// In-memory store: a dotted key matches an exact entry first, then is
/// walked as a path through nested objects.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Map,
}

impl MemoryStore {
    pub fn new(values: Map) -> Self {
        Self { values }
    }
}

#[async_trait]
impl StoreProvider for MemoryStore {
    async fn get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.values.get(key) {
            return Some(value.clone());
        }
        let mut parts = key.split('.');
        let mut current = self.values.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        Some(current.clone())
    }
}

/// State threaded through a program run.
///
/// Every instruction works on its own clone, so holders of an older context
/// never observe later writes to `data` or `scope`. The store, the applet
/// launcher and the status channel are shared by reference across clones.
#[derive(Clone)]
pub struct ExecutionContext {
    pub env: BTreeMap<String, String>,
    pub data: Map,
    pub scope: ScopeChain,
    pub user: User,
    pub cost: f64,
    pub user_logs: Vec<String>,
    pub store: Option<Arc<dyn StoreProvider>>,
    pub applet_launcher: Option<Arc<dyn AppletLauncher>>,
    status: Status,
    status_tx: Arc<watch::Sender<Status>>,
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("data", &self.data)
            .field("scope", &self.scope)
            .field("user", &self.user)
            .field("status", &self.status)
            .field("cost", &self.cost)
            .field("user_logs", &self.user_logs)
            .field("store", &self.store.is_some())
            .field("applet_launcher", &self.applet_launcher.is_some())
            .finish()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        let (status_tx, _) = watch::channel(Status::Running);
        Self {
            env: BTreeMap::new(),
            data: Map::new(),
            scope: ScopeChain::new(),
            user: User::default(),
            cost: 0.0,
            user_logs: Vec::new(),
            store: None,
            applet_launcher: None,
            status: Status::Running,
            status_tx: Arc::new(status_tx),
        }
    }

    pub fn with_data(mut self, data: Map) -> Self {
        self.data = data;
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_user(mut self, user: User) -> Self {
        self.user = user;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn StoreProvider>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_applet_launcher(mut self, launcher: Arc<dyn AppletLauncher>) -> Self {
        self.applet_launcher = Some(launcher);
        self
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Update the status and publish it to every observer.
    pub fn set_status(&mut self, status: Status) {
        self.status = status;
        self.status_tx.send_replace(status);
    }

    /// Follow status changes while a run is in flight (e.g. to show that the
    /// program is waiting on a human).
    pub fn observe_status(&self) -> watch::Receiver<Status> {
        self.status_tx.subscribe()
    }

    pub fn log(&mut self, message: impl Into<String>) {
        self.user_logs.push(message.into());
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            env: self.env.clone(),
            status: self.status,
            user_logs: self.user_logs.clone(),
            cost: self.cost,
        }
    }
}

/// Serializable view of the parts of a context that survive a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub env: BTreeMap<String, String>,
    pub status: Status,
    pub user_logs: Vec<String>,
    pub cost: f64,
}
