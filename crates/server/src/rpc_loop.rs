//! Newline-delimited JSON-RPC 2.0 read loop (§6 "Transport"). Each
//! line on stdin is one [`facegate_tools::JsonRpcRequest`]; the response is
//! written as one line of JSON on stdout. Malformed lines and unknown
//! methods get a JSON-RPC `error` object; every other failure is shaped by
//! [`facegate_tools::ToolServer::handle`] as a `{status:"error",...}`
//! result, per §6's two-layer error model.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use facegate_tools::{JsonRpcRequest, JsonRpcResponse, ToolServer, METHOD_NOT_FOUND, PARSE_ERROR};

const KNOWN_METHODS: &[&str] = &[
    "issue_token",
    "register_user",
    "recognize_face",
    "list_users",
    "get_user_profile",
    "update_user",
    "delete_user",
    "get_database_stats",
    "get_health_status",
];

/// Drive requests from `reader` to `writer` until the input stream closes.
pub async fn run_stdio_loop<R, W>(tool_server: &ToolServer, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = handle_line(tool_server, &line).await;
        let mut payload = serde_json::to_vec(&response).expect("JsonRpcResponse always serializes");
        payload.push(b'\n');
        writer.write_all(&payload).await?;
        writer.flush().await?;
    }

    Ok(())
}

async fn handle_line(tool_server: &ToolServer, line: &str) -> JsonRpcResponse {
    let request: JsonRpcRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            return JsonRpcResponse::transport_error(
                serde_json::Value::Null,
                PARSE_ERROR,
                format!("invalid JSON-RPC request: {e}"),
            )
        }
    };

    if !KNOWN_METHODS.contains(&request.method.as_str()) {
        return JsonRpcResponse::transport_error(
            request.id,
            METHOD_NOT_FOUND,
            format!("unknown method: {}", request.method),
        );
    }

    let result = tool_server.handle(&request.method, request.params).await;
    JsonRpcResponse::success(request.id, result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use facegate_audit::AuditSink;
    use facegate_biometric::{StubFaceEmbedder, VectorIndex};
    use facegate_core::{Component, Status};
    use facegate_health::HealthRegistry;
    use facegate_identity::{IdentityService, UserStore};
    use facegate_keystore::Keystore;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    async fn harness() -> (tempfile::TempDir, ToolServer, String) {
        let dir = tempfile::tempdir().unwrap();
        let keystore = Arc::new(
            Keystore::open(&dir.path().join("keys"), dir.path().join("clients.json"), 3600).unwrap(),
        );
        let (client, secret) = keystore.create_client("voice-orchestrator").unwrap();
        let token = keystore.issue_token(&client.client_id, &secret).unwrap();

        let health = HealthRegistry::new();
        health.update(Component::FaceModel, Status::Healthy, "ready", None);
        health.update(Component::VectorIndex, Status::Healthy, "ready", None);
        health.update(Component::TokenAuthority, Status::Healthy, "ready", None);

        let index = Arc::new(VectorIndex::open(dir.path().join("vectors"), 512).unwrap());
        let store = Arc::new(UserStore::open(dir.path().join("users.json")).unwrap());
        let audit = AuditSink::start(dir.path().join("audit"), 64, 30, false).unwrap();
        let identity = Arc::new(IdentityService::new(
            Arc::new(StubFaceEmbedder::default()),
            index,
            store,
            health.clone(),
            audit.clone(),
            0.4,
        ));

        let server = ToolServer::new(keystore, identity, health, audit, Duration::from_secs(5));
        (dir, server, token)
    }

    #[tokio::test]
    async fn one_request_per_line_round_trips() {
        let (_dir, server, token) = harness().await;
        let image = base64::engine::general_purpose::STANDARD.encode(vec![3u8; 128]);
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "register_user",
            "params": {"access_token": token, "name": "Ada Lovelace", "image_data": image},
        });
        let line = format!("{}\n", serde_json::to_string(&request).unwrap());

        let mut output = Vec::new();
        run_stdio_loop(&server, line.as_bytes(), &mut output).await.unwrap();

        let response: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(response["result"]["status"], "registered");
        assert_eq!(response["id"], 1);
    }

    #[tokio::test]
    async fn unknown_method_is_a_transport_level_error() {
        let (_dir, server, token) = harness().await;
        let line = format!(
            "{}\n",
            json!({"jsonrpc": "2.0", "id": 2, "method": "delete_everything", "params": {"access_token": token}})
        );

        let mut output = Vec::new();
        run_stdio_loop(&server, line.as_bytes(), &mut output).await.unwrap();

        let response: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
        assert!(response.get("result").is_none());
    }

    #[tokio::test]
    async fn malformed_line_is_a_parse_error() {
        let (_dir, server, _token) = harness().await;
        let mut output = Vec::new();
        run_stdio_loop(&server, b"not json at all\n" as &[u8], &mut output).await.unwrap();

        let response: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(response["error"]["code"], PARSE_ERROR);
    }
}
