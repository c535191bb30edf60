//! Sync Tool Facade (C8): §4.8. Exposes the Tool Server's (C7)
//! JSON-RPC-over-stdio surface as a synchronous API to the Voice
//! Orchestrators (C12), which are themselves plain synchronous state
//! machines (§9: this is the only place async and sync are allowed to
//! mix).
//!
//! `SyncToolClient` owns exactly one `tokio::runtime::Runtime`
//! (current-thread flavor), created lazily on first call via
//! `once_cell::sync::OnceCell` and torn down on `disconnect()`/`Drop`.
//! Every public method is a thin `self.runtime().block_on(...)` wrapper
//! around [`AsyncToolClient`], which holds the spawned `facegate-server`
//! child process's stdio handles and re-issues a bearer token on
//! `unauthenticated` exactly once before giving up.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use base64::Engine as _;
use once_cell::sync::OnceCell;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::runtime::{Builder, Runtime};

use facegate_config::OrchestratorConfig;

use crate::error::FlowError;

/// The async inner client: one spawned `facegate-server` child process,
/// its stdio pipes, and the bearer token currently held.
struct AsyncToolClient {
    child: Child,
    stdin: ChildStdin,
    lines: Lines<BufReader<ChildStdout>>,
    next_id: AtomicI64,
    access_token: Option<String>,
    deadline: Duration,
    client_id: String,
    client_secret: String,
}

impl AsyncToolClient {
    async fn spawn(settings: &OrchestratorConfig) -> Result<Self, FlowError> {
        let mut child = Command::new(&settings.server_binary_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| FlowError::ServerSpawnFailed(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| FlowError::ServerSpawnFailed("child has no stdin pipe".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FlowError::ServerSpawnFailed("child has no stdout pipe".to_string()))?;

        let mut client = AsyncToolClient {
            child,
            stdin,
            lines: BufReader::new(stdout).lines(),
            next_id: AtomicI64::new(1),
            access_token: None,
            deadline: Duration::from_millis(settings.tool_call_deadline_ms),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
        };
        client.refresh_token().await?;
        Ok(client)
    }

    async fn send_raw(&mut self, method: &str, params: Value) -> Result<Value, FlowError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        let mut line = serde_json::to_vec(&request).map_err(|e| FlowError::Transport(e.to_string()))?;
        line.push(b'\n');

        tokio::time::timeout(self.deadline, self.stdin.write_all(&line))
            .await
            .map_err(|_| FlowError::Timeout(self.deadline))?
            .map_err(|e| FlowError::Transport(e.to_string()))?;
        tokio::time::timeout(self.deadline, self.stdin.flush())
            .await
            .map_err(|_| FlowError::Timeout(self.deadline))?
            .map_err(|e| FlowError::Transport(e.to_string()))?;

        let line = tokio::time::timeout(self.deadline, self.lines.next_line())
            .await
            .map_err(|_| FlowError::Timeout(self.deadline))?
            .map_err(|e| FlowError::Transport(e.to_string()))?
            .ok_or(FlowError::ServerGone)?;

        let response: Value = serde_json::from_str(&line).map_err(|e| FlowError::Transport(e.to_string()))?;
        if let Some(error) = response.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("transport error")
                .to_string();
            return Err(FlowError::Transport(message));
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn refresh_token(&mut self) -> Result<(), FlowError> {
        let result = self
            .send_raw(
                "issue_token",
                json!({"client_id": self.client_id, "client_secret": self.client_secret}),
            )
            .await?;
        if result.get("status").and_then(Value::as_str) == Some("error") {
            return Err(tool_error(&result));
        }
        let token = result
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| FlowError::Transport("issue_token response missing access_token".to_string()))?;
        self.access_token = Some(token.to_string());
        Ok(())
    }

    async fn call_tool(&mut self, method: &str, mut params: Value) -> Result<Value, FlowError> {
        if self.access_token.is_none() {
            self.refresh_token().await?;
        }
        params["access_token"] = json!(self.access_token.clone().expect("refreshed above"));

        let result = self.send_raw(method, params.clone()).await?;
        if result.get("status").and_then(Value::as_str) != Some("error") {
            return Ok(result);
        }

        // Retry exactly once on an expired/invalid token (§4.1).
        if result.get("kind").and_then(Value::as_str) != Some("unauthenticated") {
            return Err(tool_error(&result));
        }
        self.refresh_token().await?;
        params["access_token"] = json!(self.access_token.clone().expect("refreshed above"));
        let retried = self.send_raw(method, params).await?;
        if retried.get("status").and_then(Value::as_str) == Some("error") {
            return Err(tool_error(&retried));
        }
        Ok(retried)
    }
}

fn tool_error(result: &Value) -> FlowError {
    FlowError::Tool {
        kind: result.get("kind").and_then(Value::as_str).unwrap_or("internal").to_string(),
        message: result.get("message").and_then(Value::as_str).unwrap_or("").to_string(),
    }
}

/// Synchronous facade over the Tool Server, for consumption by the plain
/// synchronous Voice Orchestrators (C12). See module docs.
pub struct SyncToolClient {
    settings: OrchestratorConfig,
    runtime: OnceCell<Runtime>,
    inner: Mutex<Option<AsyncToolClient>>,
}

impl SyncToolClient {
    pub fn new(settings: OrchestratorConfig) -> Self {
        SyncToolClient {
            settings,
            runtime: OnceCell::new(),
            inner: Mutex::new(None),
        }
    }

    fn runtime(&self) -> &Runtime {
        self.runtime.get_or_init(|| {
            Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build the facade's single tokio runtime")
        })
    }

    fn ensure_connected(&self) -> Result<(), FlowError> {
        let mut guard = self.inner.lock().expect("facade mutex poisoned");
        if guard.is_none() {
            let client = self.runtime().block_on(AsyncToolClient::spawn(&self.settings))?;
            *guard = Some(client);
        }
        Ok(())
    }

    fn call(&self, method: &str, params: Value) -> Result<Value, FlowError> {
        self.ensure_connected()?;
        self.runtime().block_on(async {
            let mut guard = self.inner.lock().expect("facade mutex poisoned");
            let client = guard.as_mut().expect("ensure_connected just populated this");
            client.call_tool(method, params).await
        })
    }

    /// Drive an arbitrary future (a C9/C10/C11 async primitive) to
    /// completion on the facade's single runtime. This is the only other
    /// place C12 flows ever cross the async/sync boundary (§9).
    pub fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        self.runtime().block_on(fut)
    }

    pub fn register_user(
        &self,
        name: &str,
        image_bytes: &[u8],
        metadata: Option<HashMap<String, String>>,
    ) -> Result<Value, FlowError> {
        let image_data = base64::engine::general_purpose::STANDARD.encode(image_bytes);
        let mut params = json!({"name": name, "image_data": image_data});
        if let Some(metadata) = metadata {
            params["metadata"] = serde_json::to_value(metadata).expect("map serializes");
        }
        self.call("register_user", params)
    }

    pub fn recognize_face(&self, image_bytes: &[u8], confidence_threshold: Option<f32>) -> Result<Value, FlowError> {
        let image_data = base64::engine::general_purpose::STANDARD.encode(image_bytes);
        let mut params = json!({"image_data": image_data});
        if let Some(threshold) = confidence_threshold {
            params["confidence_threshold"] = json!(threshold);
        }
        self.call("recognize_face", params)
    }

    pub fn list_users(&self, limit: Option<u32>, offset: Option<u32>) -> Result<Value, FlowError> {
        let mut params = json!({});
        if let Some(limit) = limit {
            params["limit"] = json!(limit);
        }
        if let Some(offset) = offset {
            params["offset"] = json!(offset);
        }
        self.call("list_users", params)
    }

    pub fn get_user_profile(&self, user_id: &str) -> Result<Value, FlowError> {
        self.call("get_user_profile", json!({"user_id": user_id}))
    }

    pub fn update_user(
        &self,
        user_id: &str,
        name: Option<&str>,
        metadata: Option<HashMap<String, String>>,
    ) -> Result<Value, FlowError> {
        let mut params = json!({"user_id": user_id});
        if let Some(name) = name {
            params["name"] = json!(name);
        }
        if let Some(metadata) = metadata {
            params["metadata"] = serde_json::to_value(metadata).expect("map serializes");
        }
        self.call("update_user", params)
    }

    pub fn delete_user(&self, user_id: &str) -> Result<Value, FlowError> {
        self.call("delete_user", json!({"user_id": user_id}))
    }

    pub fn get_database_stats(&self) -> Result<Value, FlowError> {
        self.call("get_database_stats", json!({}))
    }

    pub fn get_health_status(&self) -> Result<Value, FlowError> {
        self.call("get_health_status", json!({}))
    }

    /// Close the spawned `facegate-server` child and forget the bearer
    /// token. A later call reconnects lazily, spawning a fresh child.
    pub fn disconnect(&self) {
        let mut guard = self.inner.lock().expect("facade mutex poisoned");
        *guard = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_error_extracts_kind_and_message() {
        let result = json!({"status": "error", "kind": "unavailable", "message": "degraded"});
        let err = tool_error(&result);
        match err {
            FlowError::Tool { kind, message } => {
                assert_eq!(kind, "unavailable");
                assert_eq!(message, "degraded");
            }
            other => panic!("expected Tool error, got {other:?}"),
        }
    }

    #[test]
    fn tool_error_defaults_to_internal_when_kind_missing() {
        let err = tool_error(&json!({"status": "error"}));
        assert!(matches!(err, FlowError::Tool { kind, .. } if kind == "internal"));
    }
}
