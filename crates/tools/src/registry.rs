//! The eight-tool biometric surface (§6): named tools wrapped behind
//! a per-call timeout. Each [`Tool`] declares a [`Capability`] requirement
//! and an `execute` method; [`ToolServer::handle`] authenticates, gates on
//! capability, then dispatches with a timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use facegate_audit::AuditSink;
use facegate_core::{AuditEvent, AuditOutcome, HealthSnapshot};
use facegate_health::HealthRegistry;
use facegate_identity::{IdentityService, RecognizeOutcome, RegisterOutcome};
use facegate_keystore::Keystore;

use crate::protocol::ToolError;

/// Minimum base64-encoded length accepted for `image_data` (§3, §6).
const MIN_BASE64_IMAGE_LEN: usize = 100;

/// The capability gate a tool is evaluated against (§3's capability
/// formulas, §4.7's "each tool declares a capability requirement").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Always,
    CanRegister,
    CanRecognize,
    /// `register_user` is additionally permitted when only
    /// `can_queue_registration` holds (§4.7).
    CanRegisterOrQueue,
}

impl Capability {
    fn satisfied(self, snapshot: &HealthSnapshot) -> bool {
        match self {
            Capability::Always => true,
            Capability::CanRegister => snapshot.capabilities.can_register,
            Capability::CanRecognize => snapshot.capabilities.can_recognize,
            Capability::CanRegisterOrQueue => {
                snapshot.capabilities.can_register || snapshot.capabilities.can_queue_registration
            }
        }
    }
}

/// One named tool in the surface: a `name`/`execute` pair generalized with
/// a capability requirement instead of a JSON schema validator, since every
/// tool here has a small, fixed parameter shape validated inline.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn capability(&self) -> Capability;
    async fn execute(&self, client_id: &str, params: Value) -> Result<Value, ToolError>;
}

/// Shared state every tool needs: the Identity Service (C6) and, for
/// `get_health_status`, a direct read of the Health Registry (C3).
pub struct ToolServer {
    keystore: Arc<Keystore>,
    health: HealthRegistry,
    audit: AuditSink,
    call_timeout: Duration,
    tools: HashMap<&'static str, Arc<dyn Tool>>,
}

impl ToolServer {
    pub fn new(
        keystore: Arc<Keystore>,
        identity: Arc<IdentityService>,
        health: HealthRegistry,
        audit: AuditSink,
        call_timeout: Duration,
    ) -> Self {
        let mut tools: HashMap<&'static str, Arc<dyn Tool>> = HashMap::new();
        let register = Arc::new(RegisterUserTool { identity: identity.clone() });
        let recognize = Arc::new(RecognizeFaceTool { identity: identity.clone() });
        let list = Arc::new(ListUsersTool { identity: identity.clone() });
        let profile = Arc::new(GetUserProfileTool { identity: identity.clone() });
        let update = Arc::new(UpdateUserTool { identity: identity.clone() });
        let delete = Arc::new(DeleteUserTool { identity: identity.clone() });
        let stats = Arc::new(GetDatabaseStatsTool { identity: identity.clone() });
        let health_tool = Arc::new(GetHealthStatusTool { health: health.clone() });

        tools.insert(register.name(), register);
        tools.insert(recognize.name(), recognize);
        tools.insert(list.name(), list);
        tools.insert(profile.name(), profile);
        tools.insert(update.name(), update);
        tools.insert(delete.name(), delete);
        tools.insert(stats.name(), stats);
        tools.insert(health_tool.name(), health_tool);

        ToolServer {
            keystore,
            health,
            audit,
            call_timeout,
            tools,
        }
    }

    /// Authenticate, gate on capability, then dispatch `method` with
    /// `params` (which must carry `access_token`). Always returns a value
    /// suitable for a JSON-RPC `result` field — tool-level failures are
    /// the `{status:"error", ...}` shape, never a JSON-RPC `error` object
    /// (§6).
    pub async fn handle(&self, method: &str, params: Value) -> Value {
        if method == "issue_token" {
            return self.issue_token(params);
        }

        let access_token = params.get("access_token").and_then(Value::as_str).unwrap_or("");

        let client_id = match self.keystore.verify_token(access_token) {
            Ok(claims) => claims.sub,
            Err(e) => {
                self.audit(method, AuditOutcome::Denied, "unknown", Some(e.public_message()));
                return ToolError::from(e).to_result();
            }
        };

        let Some(tool) = self.tools.get(method) else {
            self.audit(method, AuditOutcome::Denied, &client_id, Some("unknown tool".to_string()));
            return ToolError::validation(format!("unknown tool: {method}")).to_result();
        };

        let snapshot = self.health.snapshot();
        if !tool.capability().satisfied(&snapshot) {
            let message = format!(
                "{method} is unavailable: overall health is {:?}",
                snapshot.overall
            );
            self.audit(method, AuditOutcome::Denied, &client_id, Some(message.clone()));
            return ToolError::unavailable(message).to_result();
        }

        let outcome = tokio::time::timeout(self.call_timeout, tool.execute(&client_id, params)).await;
        match outcome {
            Ok(Ok(value)) => value,
            Ok(Err(tool_error)) => {
                self.audit(method, AuditOutcome::Failure, &client_id, Some(tool_error.message.clone()));
                tool_error.to_result()
            }
            Err(_elapsed) => {
                let err = ToolError::internal(format!("{method} timed out after {:?}", self.call_timeout));
                self.audit(method, AuditOutcome::Failure, &client_id, Some(err.message.clone()));
                err.to_result()
            }
        }
    }

    /// `issue_token` is the client-credentials grant (§4.1
    /// `issue_token`) exposed as a transport-level method rather than a
    /// capability-gated biometric tool: it is the bootstrap call a fresh
    /// voice-orchestrator process makes before it holds a bearer token at
    /// all, so it carries `client_id`/`client_secret` instead of
    /// `access_token` and is never gated on health capabilities.
    fn issue_token(&self, params: Value) -> Value {
        #[derive(Deserialize)]
        struct IssueTokenParams {
            client_id: String,
            client_secret: String,
        }
        let p: IssueTokenParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => {
                self.audit("issue_token", AuditOutcome::Denied, "unknown", Some(e.to_string()));
                return ToolError::validation(e.to_string()).to_result();
            }
        };
        match self.keystore.issue_token(&p.client_id, &p.client_secret) {
            Ok(token) => {
                self.audit("issue_token", AuditOutcome::Success, &p.client_id, None);
                json!({"access_token": token})
            }
            Err(e) => {
                self.audit("issue_token", AuditOutcome::Denied, &p.client_id, Some(e.public_message()));
                ToolError::from(e).to_result()
            }
        }
    }

    fn audit(&self, event_type: &str, outcome: AuditOutcome, client_id: &str, error_message: Option<String>) {
        self.audit.log(AuditEvent {
            ts: Utc::now(),
            event_type: event_type.to_string(),
            outcome,
            client_id: client_id.to_string(),
            user_id: None,
            user_name: None,
            confidence_score: None,
            threshold: None,
            biometric_data: None,
            additional_info: None,
            error_message,
        });
    }
}

fn decode_image(image_data: &str) -> Result<Vec<u8>, ToolError> {
    if image_data.len() < MIN_BASE64_IMAGE_LEN {
        return Err(ToolError::validation(format!(
            "image_data must be at least {MIN_BASE64_IMAGE_LEN} base64 characters, got {}",
            image_data.len()
        )));
    }
    base64::engine::general_purpose::STANDARD
        .decode(image_data)
        .map_err(|e| ToolError::validation(format!("image_data is not valid base64: {e}")))
}

#[derive(Deserialize)]
struct RegisterParams {
    name: String,
    image_data: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

struct RegisterUserTool {
    identity: Arc<IdentityService>,
}

#[async_trait]
impl Tool for RegisterUserTool {
    fn name(&self) -> &'static str {
        "register_user"
    }
    fn capability(&self) -> Capability {
        Capability::CanRegisterOrQueue
    }
    async fn execute(&self, client_id: &str, params: Value) -> Result<Value, ToolError> {
        let p: RegisterParams = serde_json::from_value(params).map_err(|e| ToolError::validation(e.to_string()))?;
        let image_bytes = decode_image(&p.image_data)?;
        let identity = self.identity.clone();
        let client_id = client_id.to_string();
        let outcome = tokio::task::spawn_blocking(move || {
            identity.register(&client_id, &p.name, &image_bytes, p.metadata)
        })
        .await
        .map_err(|e| ToolError::internal(e.to_string()))??;

        Ok(match outcome {
            RegisterOutcome::Registered(user) => json!({"status": "registered", "user": user}),
            RegisterOutcome::Queued { name, queue_position } => {
                json!({"status": "queued", "user": {"name": name, "queue_position": queue_position}})
            }
            RegisterOutcome::AlreadyExists(user) => json!({"status": "already_exists", "user": user}),
        })
    }
}

#[derive(Deserialize)]
struct RecognizeParams {
    image_data: String,
    confidence_threshold: Option<f32>,
}

struct RecognizeFaceTool {
    identity: Arc<IdentityService>,
}

#[async_trait]
impl Tool for RecognizeFaceTool {
    fn name(&self) -> &'static str {
        "recognize_face"
    }
    fn capability(&self) -> Capability {
        Capability::CanRecognize
    }
    async fn execute(&self, client_id: &str, params: Value) -> Result<Value, ToolError> {
        let p: RecognizeParams = serde_json::from_value(params).map_err(|e| ToolError::validation(e.to_string()))?;
        if let Some(t) = p.confidence_threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(ToolError::validation("confidence_threshold must be in [0,1]"));
            }
        }
        let image_bytes = decode_image(&p.image_data)?;
        // confidence_threshold is interpreted as a distance cap (§6);
        // 0.0 maps to the strictest possible distance (rejects everything
        // except a perfect match) and is passed straight through.
        let identity = self.identity.clone();
        let client_id_owned = client_id.to_string();
        let outcome = tokio::task::spawn_blocking(move || {
            identity.recognize(&client_id_owned, &image_bytes, p.confidence_threshold)
        })
        .await
        .map_err(|e| ToolError::internal(e.to_string()))??;

        Ok(match outcome {
            RecognizeOutcome::Recognized { user, distance } => {
                json!({"status": "recognized", "distance": distance, "user": user})
            }
            RecognizeOutcome::NotRecognized => json!({"status": "not_recognized"}),
        })
    }
}

#[derive(Deserialize)]
struct ListUsersParams {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    20
}

struct ListUsersTool {
    identity: Arc<IdentityService>,
}

#[async_trait]
impl Tool for ListUsersTool {
    fn name(&self) -> &'static str {
        "list_users"
    }
    fn capability(&self) -> Capability {
        Capability::CanRecognize
    }
    async fn execute(&self, _client_id: &str, params: Value) -> Result<Value, ToolError> {
        let p: ListUsersParams = serde_json::from_value(params).map_err(|e| ToolError::validation(e.to_string()))?;
        if !(1..=100).contains(&p.limit) {
            return Err(ToolError::validation("limit must be between 1 and 100"));
        }
        if p.offset < 0 {
            return Err(ToolError::validation("offset must be >= 0"));
        }
        let identity = self.identity.clone();
        let (limit, offset) = (p.limit as usize, p.offset as usize);
        let (total, users, has_more) =
            tokio::task::spawn_blocking(move || identity.list(offset, limit))
                .await
                .map_err(|e| ToolError::internal(e.to_string()))?;
        Ok(json!({
            "total": total,
            "count": users.len(),
            "offset": offset,
            "limit": limit,
            "has_more": has_more,
            "users": users,
        }))
    }
}

#[derive(Deserialize)]
struct UserIdParams {
    user_id: String,
}

struct GetUserProfileTool {
    identity: Arc<IdentityService>,
}

#[async_trait]
impl Tool for GetUserProfileTool {
    fn name(&self) -> &'static str {
        "get_user_profile"
    }
    fn capability(&self) -> Capability {
        Capability::CanRecognize
    }
    async fn execute(&self, _client_id: &str, params: Value) -> Result<Value, ToolError> {
        let p: UserIdParams = serde_json::from_value(params).map_err(|e| ToolError::validation(e.to_string()))?;
        let identity = self.identity.clone();
        let profile = tokio::task::spawn_blocking(move || identity.get_profile(&p.user_id))
            .await
            .map_err(|e| ToolError::internal(e.to_string()))??;
        Ok(serde_json::to_value(profile).map_err(|e| ToolError::internal(e.to_string()))?)
    }
}

#[derive(Deserialize)]
struct UpdateUserParams {
    user_id: String,
    name: Option<String>,
    #[serde(default)]
    metadata: Option<HashMap<String, String>>,
}

struct UpdateUserTool {
    identity: Arc<IdentityService>,
}

#[async_trait]
impl Tool for UpdateUserTool {
    fn name(&self) -> &'static str {
        "update_user"
    }
    fn capability(&self) -> Capability {
        Capability::CanRegister
    }
    async fn execute(&self, client_id: &str, params: Value) -> Result<Value, ToolError> {
        let p: UpdateUserParams = serde_json::from_value(params).map_err(|e| ToolError::validation(e.to_string()))?;
        let identity = self.identity.clone();
        let client_id = client_id.to_string();
        let profile = tokio::task::spawn_blocking(move || {
            identity.update(&client_id, &p.user_id, p.name, p.metadata)
        })
        .await
        .map_err(|e| ToolError::internal(e.to_string()))??;
        Ok(json!({"status": "ok", "user": profile}))
    }
}

struct DeleteUserTool {
    identity: Arc<IdentityService>,
}

#[async_trait]
impl Tool for DeleteUserTool {
    fn name(&self) -> &'static str {
        "delete_user"
    }
    fn capability(&self) -> Capability {
        Capability::CanRegister
    }
    async fn execute(&self, client_id: &str, params: Value) -> Result<Value, ToolError> {
        let p: UserIdParams = serde_json::from_value(params).map_err(|e| ToolError::validation(e.to_string()))?;
        let identity = self.identity.clone();
        let client_id = client_id.to_string();
        tokio::task::spawn_blocking(move || identity.delete(&client_id, &p.user_id))
            .await
            .map_err(|e| ToolError::internal(e.to_string()))??;
        Ok(json!({"status": "ok"}))
    }
}

struct GetDatabaseStatsTool {
    identity: Arc<IdentityService>,
}

#[async_trait]
impl Tool for GetDatabaseStatsTool {
    fn name(&self) -> &'static str {
        "get_database_stats"
    }
    fn capability(&self) -> Capability {
        Capability::CanRecognize
    }
    async fn execute(&self, _client_id: &str, _params: Value) -> Result<Value, ToolError> {
        let identity = self.identity.clone();
        let stats = tokio::task::spawn_blocking(move || identity.stats())
            .await
            .map_err(|e| ToolError::internal(e.to_string()))?;
        Ok(serde_json::to_value(stats).map_err(|e| ToolError::internal(e.to_string()))?)
    }
}

struct GetHealthStatusTool {
    health: HealthRegistry,
}

#[async_trait]
impl Tool for GetHealthStatusTool {
    fn name(&self) -> &'static str {
        "get_health_status"
    }
    fn capability(&self) -> Capability {
        Capability::Always
    }
    async fn execute(&self, _client_id: &str, _params: Value) -> Result<Value, ToolError> {
        Ok(serde_json::to_value(self.health.snapshot()).map_err(|e| ToolError::internal(e.to_string()))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facegate_biometric::{StubFaceEmbedder, VectorIndex};
    use facegate_core::{Component, Status};
    use facegate_identity::UserStore;
    use std::sync::Arc;

    fn harness() -> (tempfile::TempDir, ToolServer, String, String, String) {
        let dir = tempfile::tempdir().unwrap();
        let keystore = Arc::new(
            Keystore::open(&dir.path().join("keys"), dir.path().join("clients.json"), 3600).unwrap(),
        );
        let (client, secret) = keystore.create_client("voice-orchestrator").unwrap();
        let token = keystore.issue_token(&client.client_id, &secret).unwrap();

        let health = HealthRegistry::new();
        health.update(Component::FaceModel, Status::Healthy, "ready", None);
        health.update(Component::VectorIndex, Status::Healthy, "ready", None);
        health.update(Component::TokenAuthority, Status::Healthy, "ready", None);

        let index = Arc::new(VectorIndex::open(dir.path().join("vectors"), 512).unwrap());
        let store = Arc::new(UserStore::open(dir.path().join("users.json")).unwrap());
        let audit = AuditSink::start(dir.path().join("audit"), 64, 30, false).unwrap();
        let identity = Arc::new(IdentityService::new(
            Arc::new(StubFaceEmbedder::default()),
            index,
            store,
            health.clone(),
            audit.clone(),
            0.4,
        ));

        let server = ToolServer::new(keystore, identity, health, audit, Duration::from_secs(5));
        (dir, server, token, client.client_id, secret)
    }

    #[tokio::test]
    async fn register_and_recognize_round_trip() {
        let (_dir, server, token, _client_id, _secret) = harness();
        let image = base64::engine::general_purpose::STANDARD.encode(vec![7u8; 128]);

        let result = server
            .handle(
                "register_user",
                json!({"access_token": token, "name": "John Smith", "image_data": image}),
            )
            .await;
        assert_eq!(result["status"], "registered");
        assert_eq!(result["user"]["user_id"], "john_smith_1");
        assert!(result["user"].get("embedding").is_none());

        let result = server
            .handle("recognize_face", json!({"access_token": token, "image_data": image}))
            .await;
        assert_eq!(result["status"], "recognized");
        assert_eq!(result["user"]["user_id"], "john_smith_1");
    }

    #[tokio::test]
    async fn bad_token_is_rejected_without_touching_identity_service() {
        let (_dir, server, _token, _client_id, _secret) = harness();
        let result = server
            .handle("list_users", json!({"access_token": "not-a-real-token"}))
            .await;
        assert_eq!(result["status"], "error");
        assert_eq!(result["kind"], "unauthenticated");
    }

    #[tokio::test]
    async fn short_name_is_rejected_as_validation_before_identity_call() {
        let (_dir, server, token, _client_id, _secret) = harness();
        let image = base64::engine::general_purpose::STANDARD.encode(vec![1u8; 128]);
        let result = server
            .handle(
                "register_user",
                json!({"access_token": token, "name": "A", "image_data": image}),
            )
            .await;
        assert_eq!(result["status"], "error");
        assert_eq!(result["kind"], "validation");
    }

    #[tokio::test]
    async fn short_image_data_is_rejected_before_decode() {
        let (_dir, server, token, _client_id, _secret) = harness();
        let result = server
            .handle(
                "register_user",
                json!({"access_token": token, "name": "Jane Doe", "image_data": "dG9vc2hvcnQ="}),
            )
            .await;
        assert_eq!(result["status"], "error");
        assert_eq!(result["kind"], "validation");
    }

    #[tokio::test]
    async fn health_status_requires_no_capability() {
        let (_dir, server, token, _client_id, _secret) = harness();
        let result = server.handle("get_health_status", json!({"access_token": token})).await;
        assert_eq!(result["overall"], "healthy");
    }

    #[tokio::test]
    async fn issue_token_round_trips_and_the_token_is_usable() {
        let (_dir, server, _token, client_id, secret) = harness();
        let result = server
            .handle("issue_token", json!({"client_id": client_id, "client_secret": secret}))
            .await;
        let fresh_token = result["access_token"].as_str().expect("access_token string");

        let result = server
            .handle("get_health_status", json!({"access_token": fresh_token}))
            .await;
        assert_eq!(result["overall"], "healthy");
    }

    #[tokio::test]
    async fn issue_token_rejects_wrong_secret() {
        let (_dir, server, _token, client_id, _secret) = harness();
        let result = server
            .handle("issue_token", json!({"client_id": client_id, "client_secret": "wrong"}))
            .await;
        assert_eq!(result["status"], "error");
    }
}
