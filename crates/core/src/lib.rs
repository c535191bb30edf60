//! Core types and errors shared across the facegate workspace.
//!
//! This crate provides foundational types used by every other crate:
//! - the durable data model (`UserRecord`, `AuditEvent`, `OAuthClient`, ...)
//! - health/capability types shared between the health registry and its
//!   readers
//! - audio buffer types used by the speech pipeline
//! - the unified error type and its `ErrorKind` classification

pub mod audio;
pub mod error;
pub mod health;
pub mod model;

pub use audio::{AudioBuffer, AudioEncoding, AudioFrame, Channels, SampleRate};
pub use error::{Error, ErrorKind, Result};
pub use health::{Capabilities, Component, ComponentState, HealthSnapshot, Status};
pub use model::{
    distance_to_similarity_percent, slugify, validate_metadata, validate_name, AccessTokenClaims,
    AuditEvent, AuditOutcome, BiometricSummary, FaceQuality, OAuthClient, QueuedRegistration,
    UserProfile, UserRecord, METADATA_KEY_WHITELIST,
};
