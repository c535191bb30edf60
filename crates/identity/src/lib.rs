//! Identity Service (C6): register/recognize/update/delete/list/stats,
//! orchestrating the Health Registry (C3), Vector Index + Face
//! Detector/Embedder (C4/C5), and Audit Sink (C2). See §4.6.

pub mod service;
pub mod store;

pub use service::{IdentityService, RecognizeOutcome, RegisterOutcome};
pub use store::UserStore;
