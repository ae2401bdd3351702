//! Loopback HTTP launcher: one short-lived axum server per applet.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::{AppletError, AppletInstance, AppletKind, AppletLauncher, AppletResponder, Terminator};
use crate::config::RunConfig;
use crate::runtime::{ExecutionContext, Value};

pub struct LocalAppletLauncher {
    host: String,
    timeout: Duration,
    launched: AtomicU64,
}

impl LocalAppletLauncher {
    pub fn new(host: &str, timeout: Duration) -> Self {
        Self {
            host: host.to_string(),
            timeout,
            launched: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(&config.applet_host, config.applet_timeout)
    }
}

struct AppletState {
    id: String,
    kind: AppletKind,
    input: Value,
    responder: AppletResponder,
    terminator: Terminator,
}

fn applet_id(kind: AppletKind, sequence: u64) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut hasher = Sha256::new();
    hasher.update(kind.to_string().as_bytes());
    hasher.update(nanos.to_le_bytes());
    hasher.update(sequence.to_le_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

#[async_trait]
impl AppletLauncher for LocalAppletLauncher {
    async fn launch(
        &self,
        kind: AppletKind,
        input: Value,
        ctx: &ExecutionContext,
    ) -> Result<AppletInstance, AppletError> {
        let id = applet_id(kind, self.launched.fetch_add(1, Ordering::SeqCst));

        let listener = TcpListener::bind((self.host.as_str(), 0))
            .await
            .map_err(|e| AppletError::Launch(format!("failed to bind {}: {}", self.host, e)))?;
        let addr = listener
            .local_addr()
            .map_err(|e| AppletError::Launch(e.to_string()))?;

        let url = format!("http://{}/applet/{}", addr, id);
        let (instance, responder) = AppletInstance::new(&id, &url, kind, input.clone(), self.timeout);

        let state = Arc::new(AppletState {
            id: id.clone(),
            kind,
            input,
            responder,
            terminator: instance.terminator.clone(),
        });
        let app = Router::new()
            .route(&format!("/applet/{}", id), get(show_applet))
            .route(&format!("/applet/{}/respond", id), post(submit_response))
            .with_state(state);

        let shutdown = instance.terminator.clone();
        let server_id = id.clone();
        tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.terminated().await })
                .await;
            match served {
                Ok(()) => debug!(applet = %server_id, "applet server stopped"),
                Err(e) => warn!(applet = %server_id, error = %e, "applet server failed"),
            }
        });

        info!(
            applet = %id,
            kind = %kind,
            user = %ctx.user.id,
            url = %url,
            "waiting for a human response"
        );
        Ok(instance)
    }
}

async fn show_applet(State(state): State<Arc<AppletState>>) -> Json<serde_json::Value> {
    state.terminator.record_request();
    Json(json!({
        "id": state.id,
        "kind": state.kind,
        "input": state.input.to_json(),
    }))
}

async fn submit_response(
    State(state): State<Arc<AppletState>>,
    Json(payload): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    state.terminator.record_request();

    if state.responder.is_answered() || state.terminator.is_terminated() {
        return (
            StatusCode::GONE,
            Json(json!({ "error": "this applet has already been answered" })),
        );
    }

    let response = match state
        .kind
        .validate_response(&state.input, &Value::from_json(&payload))
    {
        Ok(response) => response,
        Err(message) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": message })),
            )
        }
    };

    if state.responder.respond(response) {
        (StatusCode::OK, Json(json!({ "status": "received" })))
    } else {
        (
            StatusCode::GONE,
            Json(json!({ "error": "this applet has already been answered" })),
        )
    }
}
