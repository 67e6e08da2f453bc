//! End-to-end tests against a live `Broker` over a real Unix socket. No
//! Postgres instance is required: these exercise the handshake, the
//! meta-command surface, and error paths that never reach a backend.

use std::time::Duration;

use qp_broker::{Broker, HandshakeRequest, HandshakeResponse, Status};
use qp_core::ConnCatalog;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

const RESPONSE_LEN: usize = 4 + 2 + 4 + 32 + 4 + 4;

async fn spawn_broker(catalog_yaml: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let socket_path = tmp.path().join("qp.sock");
    let runtime_dir = tmp.path().join("runtime");
    let catalog = ConnCatalog::from_yaml(catalog_yaml).unwrap();
    let broker = Broker::bind(&socket_path, &runtime_dir, catalog).await.unwrap();
    tokio::spawn(async move {
        let _ = broker.run().await;
    });
    // give the accept loop a moment to start listening
    tokio::time::sleep(Duration::from_millis(20)).await;
    (tmp, socket_path)
}

async fn handshake(stream: &mut UnixStream, resume_token: Option<[u8; 32]>, secret: [u8; 32]) -> HandshakeResponse {
    let req = HandshakeRequest {
        resume_token,
        secret_token: secret,
    };
    stream.write_all(&req.to_bytes()).await.unwrap();
    let mut buf = [0u8; RESPONSE_LEN];
    stream.read_exact(&mut buf).await.unwrap();
    decode_response(&buf)
}

fn decode_response(buf: &[u8]) -> HandshakeResponse {
    let status = u32::from_be_bytes(buf[6..10].try_into().unwrap());
    let status = match status {
        0 => Status::Ok,
        1 => Status::BadMagic,
        2 => Status::BadVersion,
        3 => Status::TokenExpired,
        4 => Status::TokenUnknown,
        5 => Status::Full,
        _ => Status::Internal,
    };
    let mut resume_token = [0u8; 32];
    resume_token.copy_from_slice(&buf[10..42]);
    let idle_ttl_secs = u32::from_be_bytes(buf[42..46].try_into().unwrap());
    let abs_ttl_secs = u32::from_be_bytes(buf[46..50].try_into().unwrap());
    HandshakeResponse {
        status,
        resume_token,
        idle_ttl_secs,
        abs_ttl_secs,
    }
}

#[tokio::test]
async fn fresh_handshake_is_accepted_and_meta_conn_selects_a_connection() {
    let (_tmp, socket_path) = spawn_broker(
        "connections:\n  demo:\n    database: demo\n    sensitive_columns: []\n",
    )
    .await;
    let runtime_dir_secret = std::fs::read(socket_path.parent().unwrap().join("runtime").join("secret")).unwrap();
    let mut secret = [0u8; 32];
    secret.copy_from_slice(&runtime_dir_secret);

    let mut stream = UnixStream::connect(&socket_path).await.unwrap();
    let resp = handshake(&mut stream, None, secret).await;
    assert_eq!(resp.status, Status::Ok);

    let req = json!({"jsonrpc": "2.0", "id": 1, "method": "meta", "params": {"raw": "conn demo"}});
    let payload = serde_json::to_vec(&req).unwrap();
    stream.write_all(&(payload.len() as u32).to_be_bytes()).await.unwrap();
    stream.write_all(&payload).await.unwrap();

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.unwrap();
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["result"]["connection"], "demo");
}

#[tokio::test]
async fn handshake_with_wrong_secret_is_rejected() {
    let (_tmp, socket_path) = spawn_broker("connections: {}\n").await;
    let mut stream = UnixStream::connect(&socket_path).await.unwrap();
    let resp = handshake(&mut stream, None, [0xAAu8; 32]).await;
    assert_eq!(resp.status, Status::Internal);
}

#[tokio::test]
async fn exec_against_an_unknown_connection_returns_a_json_rpc_error() {
    let (_tmp, socket_path) = spawn_broker("connections: {}\n").await;
    let runtime_dir_secret = std::fs::read(socket_path.parent().unwrap().join("runtime").join("secret")).unwrap();
    let mut secret = [0u8; 32];
    secret.copy_from_slice(&runtime_dir_secret);

    let mut stream = UnixStream::connect(&socket_path).await.unwrap();
    let resp = handshake(&mut stream, None, secret).await;
    assert_eq!(resp.status, Status::Ok);

    let req = json!({"jsonrpc": "2.0", "id": 1, "method": "exec", "params": {"sql": "select 1"}});
    let payload = serde_json::to_vec(&req).unwrap();
    stream.write_all(&(payload.len() as u32).to_be_bytes()).await.unwrap();
    stream.write_all(&payload).await.unwrap();

    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await.unwrap();
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await.unwrap();
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert!(value["error"].is_object());
}
