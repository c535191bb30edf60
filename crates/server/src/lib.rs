//! Tool Server (C7) binary support: wires the Keystore (C1), Audit Sink
//! (C2), Health Registry (C3), Face Detector/Embedder (C4), Vector Index
//! (C5) and Identity Service (C6) behind the stdio JSON-RPC loop defined
//! in `main.rs`. See §4.7 and §6.
//!
//! Transport is newline-delimited JSON-RPC over stdio (§6); there is no
//! HTTP, WebSocket, or WebRTC surface in this system.

pub mod app;
pub mod rpc_loop;

pub use app::App;
pub use rpc_loop::run_stdio_loop;
