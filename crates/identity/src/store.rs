//! Durable store of full [`UserRecord`]s (including the embedding), keyed
//! by `user_id`. The Vector Index (C5) only needs the embedding and the
//! small search-facing metadata map; this store is the source of truth the
//! Identity Service (C6) reads and writes for everything else (name,
//! timestamps, recognition count, quality).

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use facegate_core::{Error, UserRecord};

pub struct UserStore {
    path: PathBuf,
    records: RwLock<Vec<UserRecord>>,
}

impl UserStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, Error> {
        let path = path.into();
        let records = if path.exists() {
            let data = fs::read_to_string(&path)
                .map_err(|e| Error::Internal(anyhow::anyhow!("reading {path:?}: {e}")))?;
            serde_json::from_str(&data)
                .map_err(|e| Error::Internal(anyhow::anyhow!("parsing {path:?}: {e}")))?
        } else {
            Vec::new()
        };
        Ok(UserStore {
            path,
            records: RwLock::new(records),
        })
    }

    fn persist(&self, records: &[UserRecord]) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Internal(anyhow::anyhow!("creating {parent:?}: {e}")))?;
        }
        let json = serde_json::to_vec_pretty(records)
            .map_err(|e| Error::Internal(anyhow::anyhow!("serializing user store: {e}")))?;
        atomic_write(&self.path, &json)
    }

    pub fn find_by_id(&self, user_id: &str) -> Option<UserRecord> {
        self.records.read().iter().find(|r| r.user_id == user_id).cloned()
    }

    pub fn find_by_slug(&self, slug: &str) -> Option<UserRecord> {
        self.records
            .read()
            .iter()
            .find(|r| {
                r.user_id
                    .rsplit_once('_')
                    .is_some_and(|(stem, n)| stem == slug && n.parse::<u64>().is_ok())
            })
            .cloned()
    }

    pub fn insert(&self, record: UserRecord) -> Result<(), Error> {
        let mut records = self.records.write();
        records.push(record);
        self.persist(&records)
    }

    pub fn update<F>(&self, user_id: &str, mutate: F) -> Result<UserRecord, Error>
    where
        F: FnOnce(&mut UserRecord),
    {
        let mut records = self.records.write();
        let record = records
            .iter_mut()
            .find(|r| r.user_id == user_id)
            .ok_or_else(|| Error::NotFound(format!("no such user: {user_id}")))?;
        mutate(record);
        let updated = record.clone();
        self.persist(&records)?;
        Ok(updated)
    }

    pub fn remove(&self, user_id: &str) -> Result<bool, Error> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| r.user_id != user_id);
        let removed = records.len() != before;
        if removed {
            self.persist(&records)?;
        }
        Ok(removed)
    }

    pub fn list(&self, offset: usize, limit: usize) -> (usize, Vec<UserRecord>, bool) {
        let records = self.records.read();
        let mut sorted: Vec<&UserRecord> = records.iter().collect();
        sorted.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        let total = sorted.len();
        let page: Vec<UserRecord> = sorted.into_iter().skip(offset).take(limit).cloned().collect();
        let has_more = offset + page.len() < total;
        (total, page, has_more)
    }

    pub fn count(&self) -> usize {
        self.records.read().len()
    }
}

fn atomic_write(path: &Path, contents: &[u8]) -> Result<(), Error> {
    let tmp_path = {
        let mut p = path.to_path_buf();
        let file_name = p
            .file_name()
            .map(|n| format!("{}.tmp", n.to_string_lossy()))
            .unwrap_or_else(|| "facegate.tmp".to_string());
        p.set_file_name(file_name);
        p
    };
    let mut file = fs::File::create(&tmp_path)
        .map_err(|e| Error::Internal(anyhow::anyhow!("creating temp file {tmp_path:?}: {e}")))?;
    file.write_all(contents)
        .map_err(|e| Error::Internal(anyhow::anyhow!("writing temp file {tmp_path:?}: {e}")))?;
    file.sync_all()
        .map_err(|e| Error::Internal(anyhow::anyhow!("syncing temp file {tmp_path:?}: {e}")))?;
    fs::rename(&tmp_path, path)
        .map_err(|e| Error::Internal(anyhow::anyhow!("renaming into place {path:?}: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn sample(user_id: &str) -> UserRecord {
        UserRecord {
            user_id: user_id.to_string(),
            name: "Alice".to_string(),
            embedding: vec![0.1; 8],
            metadata: HashMap::new(),
            registration_timestamp: Utc::now(),
            last_recognized_timestamp: None,
            recognition_count: 0,
            detection_score: 0.9,
            face_quality: facegate_core::FaceQuality {
                bbox_area: 0.2,
                sharpness: 10.0,
                pose: 0.0,
            },
        }
    }

    #[test]
    fn insert_then_find_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::open(dir.path().join("users.json")).unwrap();
        store.insert(sample("alice_a1b2")).unwrap();
        assert!(store.find_by_id("alice_a1b2").is_some());
    }

    #[test]
    fn update_mutates_in_place_without_regenerating_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = UserStore::open(dir.path().join("users.json")).unwrap();
        store.insert(sample("alice_a1b2")).unwrap();
        let updated = store
            .update("alice_a1b2", |r| r.name = "Alicia".to_string())
            .unwrap();
        assert_eq!(updated.user_id, "alice_a1b2");
        assert_eq!(updated.name, "Alicia");
    }

    #[test]
    fn survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("users.json");
        {
            let store = UserStore::open(&path).unwrap();
            store.insert(sample("alice_a1b2")).unwrap();
        }
        let reopened = UserStore::open(&path).unwrap();
        assert_eq!(reopened.count(), 1);
    }
}
