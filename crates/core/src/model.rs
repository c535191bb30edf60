//! Durable data model shared by the identity, keystore, audit and health
//! components.
//!
//! Types here are intentionally storage-agnostic: they carry no Qdrant,
//! ScyllaDB, or HNSW specifics. Each owning crate (`facegate-keystore`,
//! `facegate-audit`, `facegate-health`, `facegate-biometric`) persists its
//! own slice of this model in whatever shape suits it.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Metadata keys the Identity Service accepts. Anything outside this set is
/// rejected with a validation error before it ever reaches the vector
/// index's side store.
pub const METADATA_KEY_WHITELIST: &[&str] = &[
    "department",
    "position",
    "location",
    "information",
    "details",
    "profile",
    "data",
    "notes",
];

/// Reject metadata maps that carry a key outside [`METADATA_KEY_WHITELIST`].
pub fn validate_metadata(metadata: &HashMap<String, String>) -> Result<(), String> {
    for key in metadata.keys() {
        if !METADATA_KEY_WHITELIST.contains(&key.as_str()) {
            return Err(format!("metadata key '{key}' is not in the allowed set"));
        }
    }
    Ok(())
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z '.\-]+$").expect("static regex is valid"))
}

/// Validate a display name against the 2–100 character, restricted-charset
/// rule shared by the tool surface (`register_user`/`update_user`) and the
/// voice register flow's free-form name capture.
pub fn validate_name(name: &str) -> Result<(), String> {
    let len = name.chars().count();
    if !(2..=100).contains(&len) {
        return Err(format!(
            "name must be between 2 and 100 characters, got {len}"
        ));
    }
    if !name_pattern().is_match(name) {
        return Err(
            "name may only contain letters, spaces, hyphens, apostrophes and periods".to_string(),
        );
    }
    Ok(())
}

/// Turn a display name into the slug used as the stable prefix of a
/// `user_id` (e.g. "John Smith" -> "john_smith").
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_sep = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    slug
}

/// The durable identity unit. See §3 "UserRecord".
///
/// The embedding is never serialized into any response sent across the
/// tool surface; [`UserProfile`] is the public projection used for that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub name: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub registration_timestamp: DateTime<Utc>,
    pub last_recognized_timestamp: Option<DateTime<Utc>>,
    pub recognition_count: u64,
    pub detection_score: f32,
    pub face_quality: FaceQuality,
}

impl UserRecord {
    /// Project into the public, embedding-free view returned by the tool
    /// surface (`get_user_profile`, `list_users`, registration results).
    pub fn to_profile(&self) -> UserProfile {
        UserProfile {
            user_id: self.user_id.clone(),
            name: self.name.clone(),
            metadata: self.metadata.clone(),
            registration_timestamp: self.registration_timestamp,
            last_recognized_timestamp: self.last_recognized_timestamp,
            recognition_count: self.recognition_count,
            detection_score: self.detection_score,
            face_quality: self.face_quality.clone(),
        }
    }
}

/// Public projection of [`UserRecord`] with the embedding stripped out.
/// This is the only shape ever returned across the tool surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub registration_timestamp: DateTime<Utc>,
    pub last_recognized_timestamp: Option<DateTime<Utc>>,
    pub recognition_count: u64,
    pub detection_score: f32,
    pub face_quality: FaceQuality,
}

/// Quality metrics captured at registration time from the face
/// detector/embedder (C4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceQuality {
    pub bbox_area: f32,
    pub sharpness: f32,
    pub pose: f32,
}

/// An OAuth 2.1 client-credentials registration. See §3 "OAuthClient".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthClient {
    pub client_id: String,
    pub client_secret_hash: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub enabled: bool,
}

/// Decoded claims of a verified RS256 access token. See §3
/// "AccessToken".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    #[serde(default)]
    pub scope: String,
}

/// Outcome classification recorded on every [`AuditEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    Queued,
    Denied,
}

/// An append-only audit record. Never carries an embedding or raw image
/// byte — see §4.2's invariant and [`AuditEvent::biometric_summary`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub ts: DateTime<Utc>,
    pub event_type: String,
    pub outcome: AuditOutcome,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub biometric_data: Option<BiometricSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Non-reversible summary of a biometric decision suitable for the audit
/// log (detection score and quality only — never the embedding itself).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BiometricSummary {
    pub detection_score: f32,
    pub face_quality: Option<FaceQuality>,
}

/// Convert a cosine distance (range `[0,2]`, 0 is identical) to a
/// similarity percentage for voice output. The tool surface and every
/// stored threshold stay in cosine distance; this conversion exists only
/// at the point a result is spoken aloud.
pub fn distance_to_similarity_percent(distance: f32) -> f32 {
    ((1.0 - distance / 2.0).clamp(0.0, 1.0)) * 100.0
}

#[cfg(test)]
mod distance_tests {
    use super::distance_to_similarity_percent;

    #[test]
    fn identical_vectors_are_full_similarity() {
        assert_eq!(distance_to_similarity_percent(0.0), 100.0);
    }

    #[test]
    fn opposite_vectors_are_zero_similarity() {
        assert_eq!(distance_to_similarity_percent(2.0), 0.0);
    }

    #[test]
    fn out_of_range_distance_is_clamped() {
        assert_eq!(distance_to_similarity_percent(-0.5), 100.0);
        assert_eq!(distance_to_similarity_percent(3.0), 0.0);
    }
}

/// A write accepted while the vector index was degraded, held by the
/// health registry until the Identity Service drains it. See §3
/// "QueuedRegistration".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedRegistration {
    pub ts: DateTime<Utc>,
    pub name: String,
    pub image_bytes: Vec<u8>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_basic() {
        assert_eq!(slugify("John Smith"), "john_smith");
        assert_eq!(slugify("  Mary-Jane O'Neil. "), "mary_jane_o_neil");
    }

    #[test]
    fn name_length_boundaries() {
        assert!(validate_name("Al").is_ok());
        assert!(validate_name("A").is_err());
        let hundred = "A".repeat(100);
        assert!(validate_name(&hundred).is_ok());
        let hundred_one = "A".repeat(101);
        assert!(validate_name(&hundred_one).is_err());
    }

    #[test]
    fn name_charset() {
        assert!(validate_name("Anne-Marie O'Brien").is_ok());
        assert!(validate_name("John3").is_err());
        assert!(validate_name("John_Smith").is_err());
    }

    #[test]
    fn metadata_whitelist() {
        let mut ok = HashMap::new();
        ok.insert("department".to_string(), "sales".to_string());
        assert!(validate_metadata(&ok).is_ok());

        let mut bad = HashMap::new();
        bad.insert("ssn".to_string(), "123-45-6789".to_string());
        assert!(validate_metadata(&bad).is_err());
    }
}
