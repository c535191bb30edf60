//! Sync Tool Facade (C8) and Voice Orchestrators (C12).
//!
//! [`facade::SyncToolClient`] spawns and speaks JSON-RPC-over-stdio to a
//! `facegate-server` child process, exposing the eight-tool biometric
//! surface as plain blocking calls. [`flows`] builds the four multi-turn
//! flows (Recognize/Register/Update/Delete) on top of it and the Audio
//! Device Arbiter / Speech Pipeline / Intent Oracle in `facegate-voice`.

pub mod error;
pub mod facade;
pub mod flows;

pub use error::FlowError;
pub use facade::SyncToolClient;
pub use flows::{Flow, FlowContext};
