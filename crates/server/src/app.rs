//! Application wiring: turns a [`facegate_config::Settings`] into a live
//! [`facegate_tools::ToolServer`] by constructing and threading together
//! this system's C1-C6 components.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use facegate_audit::AuditSink;
use facegate_biometric::{FaceEmbedder, OnnxFaceEmbedder, VectorIndex};
use facegate_config::Settings;
use facegate_core::{Component, Status};
use facegate_health::HealthRegistry;
use facegate_identity::{IdentityService, UserStore};
use facegate_keystore::Keystore;
use facegate_tools::ToolServer;

pub struct App {
    pub keystore: Arc<Keystore>,
    pub health: HealthRegistry,
    pub identity: Arc<IdentityService>,
    pub tool_server: ToolServer,
}

impl App {
    /// Build every component from `settings`, probing the face model and
    /// vector index so the Health Registry reflects real startup state
    /// instead of defaulting to `Unavailable` forever (§4.3).
    pub fn build(settings: &Settings) -> anyhow::Result<Self> {
        let health = HealthRegistry::new();

        let keystore = Arc::new(Keystore::open(
            std::path::Path::new(&settings.paths.keys_dir),
            PathBuf::from(&settings.paths.clients_file),
            settings.keystore.token_ttl_seconds,
        )?);
        health.update(Component::TokenAuthority, Status::Healthy, "keys loaded", None);

        let embedder: Arc<dyn FaceEmbedder> = match OnnxFaceEmbedder::load(
            &settings.biometric.detector_model_path,
            &settings.biometric.embedder_model_path,
            0.5,
        ) {
            Ok(e) => {
                health.update(Component::FaceModel, Status::Healthy, "models loaded", None);
                Arc::new(e)
            }
            Err(e) => {
                health.update(
                    Component::FaceModel,
                    Status::Unavailable,
                    "face model failed to load",
                    Some(e.to_string()),
                );
                return Err(anyhow::anyhow!("face model load failed: {e}"));
            }
        };

        let index = match VectorIndex::open(&settings.paths.vectors_dir, settings.biometric.embedding_dim) {
            Ok(i) => {
                health.update(Component::VectorIndex, Status::Healthy, "index loaded", None);
                Arc::new(i)
            }
            Err(e) => {
                health.update(
                    Component::VectorIndex,
                    Status::Degraded,
                    "vector index failed to open; writes will be queued",
                    Some(e.to_string()),
                );
                return Err(anyhow::anyhow!("vector index open failed: {e}"));
            }
        };

        let store = Arc::new(UserStore::open(
            PathBuf::from(&settings.paths.data_dir).join("users.json"),
        )?);

        let audit = AuditSink::start(
            &settings.paths.audit_dir,
            settings.audit.queue_capacity,
            settings.audit.retention_days,
            settings.audit.redact_user_name,
        )?;

        let identity = Arc::new(IdentityService::new(
            embedder,
            index,
            store,
            health.clone(),
            audit.clone(),
            settings.biometric.distance_threshold_default,
        ));
        identity.install_queue_drain(&health);

        let tool_server = ToolServer::new(
            keystore.clone(),
            identity.clone(),
            health.clone(),
            audit,
            Duration::from_millis(settings.server.tool_call_timeout_ms),
        );

        Ok(App {
            keystore,
            health,
            identity,
            tool_server,
        })
    }
}
