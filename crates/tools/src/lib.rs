//! Tool Server (C7): the JSON-RPC protocol framing and the eight-tool
//! biometric surface exposed over stdio. See §6.

pub mod protocol;
pub mod registry;

pub use protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, ToolError, INVALID_PARAMS, METHOD_NOT_FOUND,
    PARSE_ERROR,
};
pub use registry::{Capability, Tool, ToolServer};
