//! Human-in-the-loop applets.
//!
//! An applet is a single-use endpoint that collects exactly one response for
//! a suspended instruction. The instruction side only sees [`AppletInstance`]:
//! it waits on the response, and whoever holds the [`AppletResponder`]
//! delivers it.

pub mod server;

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{oneshot, watch};

use crate::runtime::{ExecutionContext, Map, Value};

pub use server::LocalAppletLauncher;

#[derive(Debug, thiserror::Error)]
pub enum AppletError {
    #[error("applet {id} timed out after {}s waiting for a response", .timeout.as_secs())]
    Timeout { id: String, timeout: Duration },

    #[error("applet {id} was terminated before a response arrived")]
    Terminated { id: String },

    #[error("failed to launch applet: {0}")]
    Launch(String),

    #[error("applet {id} received an invalid response: {message}")]
    InvalidResponse { id: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AppletKind {
    Validate,
    Select,
}

impl fmt::Display for AppletKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppletKind::Validate => write!(f, "validate"),
            AppletKind::Select => write!(f, "select"),
        }
    }
}

impl AppletKind {
    /// Check a submitted payload against this kind's schema and return its
    /// normalized form.
    ///
    /// * `validate`: `{approved: bool, comment?: string}`
    /// * `select`: `{selected: [index...]}`, unique indices into `input.items`
    pub fn validate_response(&self, input: &Value, response: &Value) -> Result<Value, String> {
        let fields = response
            .as_object()
            .ok_or_else(|| format!("response must be an object, got {}", response.type_name()))?;

        match self {
            AppletKind::Validate => {
                let approved = fields
                    .get("approved")
                    .and_then(Value::as_bool)
                    .ok_or("'approved' must be a boolean")?;
                let mut normalized = Map::new();
                normalized.insert("approved".to_string(), Value::Bool(approved));
                match fields.get("comment") {
                    None | Some(Value::Null) => {}
                    Some(Value::Str(comment)) => {
                        normalized.insert("comment".to_string(), Value::Str(comment.clone()));
                    }
                    Some(other) => {
                        return Err(format!("'comment' must be a string, got {}", other.type_name()))
                    }
                }
                Ok(Value::Object(normalized))
            }
            AppletKind::Select => {
                let available = input.get("items").and_then(Value::as_list).map_or(0, <[Value]>::len);
                let selected = fields
                    .get("selected")
                    .and_then(Value::as_list)
                    .ok_or("'selected' must be an array of indices")?;

                let mut indices: Vec<usize> = Vec::with_capacity(selected.len());
                for entry in selected {
                    let index = entry
                        .as_integer()
                        .filter(|i| *i >= 0 && (*i as usize) < available)
                        .ok_or_else(|| format!("invalid selection index {}", entry))?
                        as usize;
                    if indices.contains(&index) {
                        return Err(format!("index {} selected more than once", index));
                    }
                    indices.push(index);
                }

                let mut normalized = Map::new();
                normalized.insert(
                    "selected".to_string(),
                    Value::List(indices.into_iter().map(Value::from).collect()),
                );
                Ok(Value::Object(normalized))
            }
        }
    }
}

/// Cancellation handle shared by an applet, its server and its waiter.
#[derive(Debug, Clone)]
pub struct Terminator {
    inner: Arc<TerminatorState>,
}

#[derive(Debug)]
struct TerminatorState {
    terminated: AtomicBool,
    terminate_calls: AtomicUsize,
    requests: AtomicUsize,
    signal: watch::Sender<bool>,
}

impl Default for Terminator {
    fn default() -> Self {
        Self::new()
    }
}

impl Terminator {
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            inner: Arc::new(TerminatorState {
                terminated: AtomicBool::new(false),
                terminate_calls: AtomicUsize::new(0),
                requests: AtomicUsize::new(0),
                signal,
            }),
        }
    }

    /// Idempotent: only the first call releases anything.
    pub fn terminate(&self) {
        self.inner.terminate_calls.fetch_add(1, Ordering::SeqCst);
        if !self.inner.terminated.swap(true, Ordering::SeqCst) {
            self.inner.signal.send_replace(true);
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.terminated.load(Ordering::SeqCst)
    }

    /// Resolves once `terminate` has been called.
    pub async fn terminated(&self) {
        let mut rx = self.inner.signal.subscribe();
        // the sender lives in `inner`, so this only errors if it was dropped
        let _ = rx.wait_for(|terminated| *terminated).await;
    }

    pub fn terminate_calls(&self) -> usize {
        self.inner.terminate_calls.load(Ordering::SeqCst)
    }

    pub fn record_request(&self) {
        self.inner.requests.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of HTTP requests the applet has served.
    pub fn requests(&self) -> usize {
        self.inner.requests.load(Ordering::SeqCst)
    }
}

/// Delivers the single response to a waiting [`AppletInstance`].
#[derive(Debug, Clone)]
pub struct AppletResponder {
    slot: Arc<Mutex<Option<oneshot::Sender<Value>>>>,
}

impl AppletResponder {
    /// Returns false when a response was already delivered or nobody is
    /// waiting anymore.
    pub fn respond(&self, value: Value) -> bool {
        let sender = match self.slot.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    pub fn is_answered(&self) -> bool {
        match self.slot.lock() {
            Ok(slot) => slot.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

#[derive(Debug)]
pub struct AppletInstance {
    pub id: String,
    pub url: String,
    pub terminator: Terminator,
    kind: AppletKind,
    input: Value,
    timeout: Duration,
    response: oneshot::Receiver<Value>,
}

impl AppletInstance {
    /// `kind` and `input` define the schema a response must satisfy.
    pub fn new(
        id: &str,
        url: &str,
        kind: AppletKind,
        input: Value,
        timeout: Duration,
    ) -> (Self, AppletResponder) {
        let (tx, rx) = oneshot::channel();
        let instance = Self {
            id: id.to_string(),
            url: url.to_string(),
            terminator: Terminator::new(),
            kind,
            input,
            timeout,
            response: rx,
        };
        let responder = AppletResponder {
            slot: Arc::new(Mutex::new(Some(tx))),
        };
        (instance, responder)
    }

    pub fn kind(&self) -> AppletKind {
        self.kind
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Wait for the first response, bounded by the instance's timeout, and
    /// return it in the normalized form of the kind's schema. Termination, or
    /// every responder being dropped, rejects the wait; so does a response
    /// that does not match the schema.
    pub async fn wait_for_response(self) -> Result<Value, AppletError> {
        let AppletInstance {
            id,
            terminator,
            kind,
            input,
            timeout,
            response,
            ..
        } = self;

        let received = tokio::select! {
            received = response => received.map_err(|_| AppletError::Terminated { id: id.clone() })?,
            _ = terminator.terminated() => return Err(AppletError::Terminated { id }),
            _ = tokio::time::sleep(timeout) => return Err(AppletError::Timeout { id, timeout }),
        };
        kind.validate_response(&input, &received)
            .map_err(|message| AppletError::InvalidResponse { id, message })
    }
}

#[async_trait]
pub trait AppletLauncher: Send + Sync {
    async fn launch(
        &self,
        kind: AppletKind,
        input: Value,
        ctx: &ExecutionContext,
    ) -> Result<AppletInstance, AppletError>;
}
