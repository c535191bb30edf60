//! Health/capability types shared between `facegate-health` (which owns the
//! state machine) and every crate that reads a snapshot of it
//! (`facegate-identity`, `facegate-tools`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The components this system tracks health for. See §3 "HealthState".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    FaceModel,
    VectorIndex,
    TokenAuthority,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::FaceModel => "face_model",
            Component::VectorIndex => "vector_index",
            Component::TokenAuthority => "token_authority",
        }
    }
}

/// Status of a single component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Ordered so that `Healthy < Degraded < Unavailable`; the worst status
    /// across components is simply the maximum. See §3's "overall
    /// status = worst component status".
    Healthy,
    Degraded,
    Unavailable,
}

/// A single component's current state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentState {
    pub status: Status,
    pub message: String,
    pub last_checked: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Derived capability map. See §3's boolean capability formulas.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Capabilities {
    pub can_register: bool,
    pub can_recognize: bool,
    pub can_queue_registration: bool,
}

impl Capabilities {
    pub fn derive(face_model: Status, vector_index: Status) -> Self {
        Capabilities {
            can_register: face_model == Status::Healthy
                && matches!(vector_index, Status::Healthy | Status::Degraded),
            can_recognize: face_model == Status::Healthy && vector_index == Status::Healthy,
            can_queue_registration: face_model == Status::Healthy
                && vector_index == Status::Degraded,
        }
    }
}

/// Full health snapshot as returned by `get_health_status` and consulted by
/// the tool server's capability gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub overall: Status,
    pub components: std::collections::HashMap<Component, ComponentState>,
    pub capabilities: Capabilities,
    pub queued_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_derivation_matches_documented_formulas() {
        let caps = Capabilities::derive(Status::Healthy, Status::Healthy);
        assert!(caps.can_register);
        assert!(caps.can_recognize);
        assert!(!caps.can_queue_registration);

        let caps = Capabilities::derive(Status::Healthy, Status::Degraded);
        assert!(caps.can_register);
        assert!(!caps.can_recognize);
        assert!(caps.can_queue_registration);

        let caps = Capabilities::derive(Status::Healthy, Status::Unavailable);
        assert!(!caps.can_register);
        assert!(!caps.can_recognize);
        assert!(!caps.can_queue_registration);
    }

    #[test]
    fn status_ordering_gives_worst_as_max() {
        assert!(Status::Unavailable > Status::Degraded);
        assert!(Status::Degraded > Status::Healthy);
    }
}
