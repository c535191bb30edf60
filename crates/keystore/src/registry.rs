//! Atomic on-disk registry of OAuth clients (`clients.json`). See §6's
//! on-disk layout and §4.1's `create_client`/`disable_client`/`list_clients`
//! operations.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use facegate_core::{Error, OAuthClient};
use parking_lot::Mutex;

use crate::keys::atomic_write;
use crate::secrets::{generate_client_secret, hash_secret};

/// Guards the client list behind a single writer lock; reads take the same
/// lock since the whole file is rewritten on every mutation.
pub struct ClientRegistry {
    path: PathBuf,
    clients: Mutex<Vec<OAuthClient>>,
}

impl ClientRegistry {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let clients = if path.exists() {
            let data = fs::read_to_string(&path)
                .map_err(|e| Error::Internal(anyhow::anyhow!("reading {path:?}: {e}")))?;
            serde_json::from_str(&data)
                .map_err(|e| Error::Internal(anyhow::anyhow!("parsing {path:?}: {e}")))?
        } else {
            Vec::new()
        };
        Ok(ClientRegistry {
            path,
            clients: Mutex::new(clients),
        })
    }

    fn persist(&self, clients: &[OAuthClient]) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Internal(anyhow::anyhow!("creating {parent:?}: {e}")))?;
        }
        let json = serde_json::to_vec_pretty(clients)
            .map_err(|e| Error::Internal(anyhow::anyhow!("serializing client registry: {e}")))?;
        atomic_write(&self.path, &json)
    }

    /// Register a new client, returning its id and the plaintext secret
    /// (shown exactly once; only the hash is persisted).
    pub fn create_client(&self, name: &str) -> Result<(OAuthClient, String), Error> {
        let mut clients = self.clients.lock();
        if clients.iter().any(|c| c.name == name) {
            return Err(Error::AlreadyExists(format!(
                "a client named '{name}' already exists"
            )));
        }
        let (secret, secret_hash) = generate_client_secret();
        let client = OAuthClient {
            client_id: uuid::Uuid::new_v4().to_string(),
            client_secret_hash: secret_hash,
            name: name.to_string(),
            created_at: Utc::now(),
            enabled: true,
        };
        clients.push(client.clone());
        self.persist(&clients)?;
        Ok((client, secret))
    }

    pub fn find(&self, client_id: &str) -> Option<OAuthClient> {
        self.clients
            .lock()
            .iter()
            .find(|c| c.client_id == client_id)
            .cloned()
    }

    pub fn list(&self) -> Vec<OAuthClient> {
        self.clients.lock().clone()
    }

    pub fn disable(&self, client_id: &str) -> Result<(), Error> {
        let mut clients = self.clients.lock();
        let client = clients
            .iter_mut()
            .find(|c| c.client_id == client_id)
            .ok_or_else(|| Error::NotFound(format!("no such client: {client_id}")))?;
        client.enabled = false;
        self.persist(&clients)
    }

    /// Rotate a client's secret, invalidating the old one. Returns the new
    /// plaintext secret.
    pub fn rotate_secret(&self, client_id: &str) -> Result<String, Error> {
        let mut clients = self.clients.lock();
        let client = clients
            .iter_mut()
            .find(|c| c.client_id == client_id)
            .ok_or_else(|| Error::NotFound(format!("no such client: {client_id}")))?;
        let (secret, hash) = generate_client_secret();
        client.client_secret_hash = hash;
        self.persist(&clients)?;
        Ok(secret)
    }
}

/// Re-hash an externally supplied secret the same way `create_client` does;
/// used by tests that need to construct a client with a known secret.
pub fn hash_for_test(secret: &str) -> Result<String, Error> {
    hash_secret(secret)
}

pub fn registry_path(data_dir: &Path) -> PathBuf {
    data_dir.join("clients.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_find_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ClientRegistry::load(dir.path().join("clients.json")).unwrap();
        let (client, secret) = registry.create_client("voice-orchestrator").unwrap();
        assert!(!secret.is_empty());
        let found = registry.find(&client.client_id).unwrap();
        assert_eq!(found.name, "voice-orchestrator");
        assert!(found.enabled);
    }

    #[test]
    fn duplicate_name_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ClientRegistry::load(dir.path().join("clients.json")).unwrap();
        registry.create_client("dup").unwrap();
        assert!(registry.create_client("dup").is_err());
    }

    #[test]
    fn registry_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clients.json");
        let (client_id, name) = {
            let registry = ClientRegistry::load(&path).unwrap();
            let (client, _secret) = registry.create_client("persisted").unwrap();
            (client.client_id, client.name)
        };
        let reloaded = ClientRegistry::load(&path).unwrap();
        let found = reloaded.find(&client_id).unwrap();
        assert_eq!(found.name, name);
    }

    #[test]
    fn disable_marks_client_inactive() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ClientRegistry::load(dir.path().join("clients.json")).unwrap();
        let (client, _) = registry.create_client("to-disable").unwrap();
        registry.disable(&client.client_id).unwrap();
        assert!(!registry.find(&client.client_id).unwrap().enabled);
    }
}
