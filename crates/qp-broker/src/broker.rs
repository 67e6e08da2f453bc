//! The broker's single-task cooperative event loop (§5): one `tokio::select!`
//! over the listener and every live session's next frame, no
//! `tokio::spawn` per connection. This is a deliberate departure from
//! `cori-proxy::proxy::CoriProxy::run`'s spawn-per-upstream-connection
//! model — the source design requires that "no request handler parks
//! waiting for I/O while another is running," which a spawned-task model
//! satisfies by scheduler fiat but a hand-rolled single task has to earn
//! by construction. The only suspension points are the listener accept,
//! a per-session frame read, and (outside the loop body) the write/flush
//! that answers it — exactly the set the source design names.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

use qp_backend::ConnectionManager;
use qp_core::QpError;
use qp_result::{BuildPolicy, DbTokenStore, ResultBuilder};

use crate::meta::{self, MetaCommand};
use crate::protocol::{ExecColumn, ExecParams, ExecResult, JsonRpcRequest, JsonRpcResponse, StatusResult};
use crate::resume::{read_or_create_secret, ResumeTokenStore};
use crate::session::SessionTable;
use crate::wire::{HandshakeRequest, HandshakeResponse, Status, REQUEST_LEN};

/// Idle and absolute resume-token lifetimes advertised to clients in the
/// handshake response (§6). Not separately enforced past the in-memory
/// idle ring today — see `DESIGN.md` — but always sent so a client can
/// plan its own retry/backoff.
const IDLE_TTL_SECS: u32 = 300;
const ABS_TTL_SECS: u32 = 3600;

/// How long a pooled backend connection may sit unused before the
/// connection manager reaps it on next access (§5).
const BACKEND_TTL: Duration = Duration::from_secs(300);

/// What happened this loop iteration, decided once the borrows involved in
/// deciding it (principally `reads`, which holds `&mut` into `conns`) have
/// gone out of scope, so the branch bodies below are free to mutate `conns`
/// themselves.
enum Event {
    Accepted(std::io::Result<(UnixStream, tokio::net::unix::SocketAddr)>),
    Read(u64, std::io::Result<Option<Vec<u8>>>),
}

pub struct Broker {
    listener: UnixListener,
    manager: ConnectionManager,
    sessions: SessionTable,
    resume_store: ResumeTokenStore,
    secret: [u8; 32],
    token_stores: HashMap<String, DbTokenStore>,
    generation: u32,
}

impl Broker {
    /// `runtime_dir` is the broker's private directory (§6 environment):
    /// it holds the shared handshake secret and the resume-token cache
    /// alongside the listen socket itself.
    pub async fn bind(
        socket_path: impl AsRef<std::path::Path>,
        runtime_dir: impl AsRef<std::path::Path>,
        catalog: qp_core::ConnCatalog,
    ) -> std::io::Result<Self> {
        let socket_path = socket_path.as_ref().to_path_buf();
        let runtime_dir = runtime_dir.as_ref().to_path_buf();
        if socket_path.exists() {
            let _ = std::fs::remove_file(&socket_path);
        }
        let listener = UnixListener::bind(&socket_path)?;
        let secret = read_or_create_secret(&runtime_dir)?;
        let resume_store = ResumeTokenStore::open(&runtime_dir, &socket_path.to_string_lossy());
        Ok(Self {
            listener,
            manager: ConnectionManager::new(catalog, BACKEND_TTL),
            sessions: SessionTable::new(),
            resume_store,
            secret,
            token_stores: HashMap::new(),
            generation: 0,
        })
    }

    /// Run forever, accepting clients and servicing their requests from a
    /// single task. `conns` is kept out of `self` so the accept and read
    /// halves of the loop only ever need disjoint borrows.
    pub async fn run(mut self) -> std::io::Result<()> {
        let mut conns: HashMap<u64, UnixStream> = HashMap::new();

        loop {
            let event = {
                let mut reads = FuturesUnordered::new();
                for (&id, stream) in conns.iter_mut() {
                    reads.push(async move { (id, read_frame(stream).await) });
                }
                tokio::select! {
                    accepted = self.listener.accept() => Event::Accepted(accepted),
                    Some((id, result)) = reads.next(), if !reads.is_empty() => Event::Read(id, result),
                }
            };

            match event {
                Event::Accepted(Ok((stream, _addr))) => {
                    if let Some((id, stream)) = self.handshake(stream).await {
                        conns.insert(id, stream);
                    }
                }
                Event::Accepted(Err(e)) => {
                    tracing::error!(error = %e, "accept failed");
                }
                Event::Read(id, Ok(Some(frame))) => {
                    let response = self.handle_frame(id, &frame).await;
                    if let Some(stream) = conns.get_mut(&id) {
                        if write_frame(stream, &response).await.is_err() {
                            conns.remove(&id);
                            self.sessions.disconnect(id);
                        }
                    }
                }
                Event::Read(id, _) => {
                    conns.remove(&id);
                    self.sessions.disconnect(id);
                }
            }
        }
    }

    /// Perform the fixed-size handshake. Returns the session id and the
    /// now-authenticated stream on success; on any rejection the
    /// rejection response has already been written and the connection is
    /// dropped.
    async fn handshake(&mut self, mut stream: UnixStream) -> Option<(u64, UnixStream)> {
        let mut buf = [0u8; REQUEST_LEN];
        if stream.read_exact(&mut buf).await.is_err() {
            return None;
        }
        let Some((magic, version, req)) = HandshakeRequest::parse(&buf) else {
            return None;
        };
        if magic != crate::wire::MAGIC {
            let _ = write_bytes(&mut stream, &HandshakeResponse::rejection(Status::BadMagic).to_bytes()).await;
            return None;
        }
        if version != crate::wire::VERSION {
            let _ = write_bytes(&mut stream, &HandshakeResponse::rejection(Status::BadVersion).to_bytes()).await;
            return None;
        }
        if req.secret_token != self.secret {
            tracing::warn!("handshake rejected: secret token mismatch");
            let _ = write_bytes(&mut stream, &HandshakeResponse::rejection(Status::Internal).to_bytes()).await;
            return None;
        }

        let (id, token) = match req.resume_token {
            Some(token) => match self.sessions.reactivate_by_token(&token) {
                Some(id) => (id, token),
                None => {
                    let status = if self.resume_store.load().as_ref() == Some(&token) {
                        Status::TokenExpired
                    } else {
                        Status::TokenUnknown
                    };
                    let _ = write_bytes(&mut stream, &HandshakeResponse::rejection(status).to_bytes()).await;
                    return None;
                }
            },
            None => {
                let mut fresh = [0u8; 32];
                rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut fresh);
                let id = self.sessions.create(fresh);
                self.resume_store.store(&fresh);
                (id, fresh)
            }
        };

        let resp = HandshakeResponse {
            status: Status::Ok,
            resume_token: token,
            idle_ttl_secs: IDLE_TTL_SECS,
            abs_ttl_secs: ABS_TTL_SECS,
        };
        if write_bytes(&mut stream, &resp.to_bytes()).await.is_err() {
            self.sessions.disconnect(id);
            return None;
        }
        Some((id, stream))
    }

    /// Decode one JSON-RPC request frame, dispatch it, and serialize the
    /// response. Never fails: malformed input becomes a JSON-RPC error
    /// object rather than a dropped connection.
    async fn handle_frame(&mut self, id: u64, frame: &[u8]) -> Vec<u8> {
        let request: JsonRpcRequest = match serde_json::from_slice(frame) {
            Ok(r) => r,
            Err(e) => {
                let resp = JsonRpcResponse::error(None, -32700, format!("parse error: {e}"));
                return serde_json::to_vec(&resp).unwrap_or_default();
            }
        };
        self.sessions.touch(id);

        let resp = match request.method.as_str() {
            "exec" => match request.params.clone().and_then(|v| serde_json::from_value::<ExecParams>(v).ok()) {
                Some(params) => match self.handle_exec(id, params).await {
                    Ok(result) => JsonRpcResponse::success(request.id, serde_json::to_value(result).unwrap_or(Value::Null)),
                    Err(e) => JsonRpcResponse::from_qp_error(request.id, &e),
                },
                None => JsonRpcResponse::error(request.id, -32602, "missing or invalid 'sql' param"),
            },
            "status" => {
                let result = self.handle_status(id);
                JsonRpcResponse::success(request.id, serde_json::to_value(result).unwrap_or(Value::Null))
            }
            "meta" => match request.params.clone().and_then(|v| v.get("raw").and_then(Value::as_str).map(str::to_string)) {
                Some(raw) => match meta::parse(&raw) {
                    Some(cmd) => match self.handle_meta(id, &cmd) {
                        Ok(result) => JsonRpcResponse::success(request.id, result),
                        Err(e) => JsonRpcResponse::from_qp_error(request.id, &e),
                    },
                    None => JsonRpcResponse::success(request.id, Value::Null),
                },
                None => JsonRpcResponse::error(request.id, -32602, "missing 'raw' param"),
            },
            other => JsonRpcResponse::error(request.id, -32601, format!("method not found: {other}")),
        };
        serde_json::to_vec(&resp).unwrap_or_default()
    }

    async fn handle_exec(&mut self, id: u64, params: ExecParams) -> Result<ExecResult, QpError> {
        let conn_name = self
            .sessions
            .get(id)
            .and_then(|s| s.conn_name.clone())
            .ok_or_else(|| QpError::BadInput("no connection selected; use a 'conn' meta command first".to_string()))?;

        let started = std::time::Instant::now();
        let backend = self.manager.get(&conn_name).await?;
        let ir = backend.parse(&params.sql)?;
        let touches = qp_touch::extract(&ir);
        let profile = self
            .manager
            .catalog()
            .get(&conn_name)
            .ok_or_else(|| QpError::Internal(format!("connection '{conn_name}' vanished from catalog mid-request")))?
            .clone();
        let plan = qp_policy::PolicyValidator::validate(&ir, &touches, &profile)?;

        let column_names: Vec<String> = ir.root().select_items.iter().map(|item| item.out_alias.clone()).collect();

        let store = match self.token_stores.entry(conn_name.clone()) {
            std::collections::hash_map::Entry::Occupied(e) => e.into_mut(),
            std::collections::hash_map::Entry::Vacant(e) => {
                e.insert(DbTokenStore::new(conn_name.clone(), profile.policy.column_strategy)?)
            }
        };

        let build_policy = BuildPolicy {
            plan: Some(&plan),
            store: Some(store),
            generation: self.generation,
        };
        let builder = ResultBuilder::new(column_names, build_policy, profile.policy.max_rows, profile.policy.max_query_bytes);

        // Re-borrow: the first `backend` above only lived long enough to
        // parse, so its borrow of `self.manager` already ended and this is
        // a fresh lookup rather than a stale reference.
        let backend = self.manager.get(&conn_name).await?;
        let result = match backend.exec(&params.sql, &profile.policy, builder).await {
            Ok(r) => r,
            Err(e) => {
                self.manager.disconnect(&conn_name);
                return Err(e);
            }
        };

        let columns = result
            .columns
            .iter()
            .map(|c| ExecColumn {
                name: c.name.clone(),
                kind: "unknown".to_string(),
            })
            .collect();
        let rows = result
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| match cell {
                        qp_result::CellValue::Null | qp_result::CellValue::Omitted => Value::Null,
                        qp_result::CellValue::Text(s) => Value::String(s.clone()),
                    })
                    .collect()
            })
            .collect();

        Ok(ExecResult {
            exec_ms: started.elapsed().as_millis() as u64,
            columns,
            rowcount: result.rows.len(),
            rows,
            truncated: result.result_truncated || result.cells_truncated,
        })
    }

    fn handle_status(&self, id: u64) -> StatusResult {
        let session = self.sessions.get(id);
        StatusResult {
            session_id: id.to_string(),
            connection: session.and_then(|s| s.conn_name.clone()),
            created_at_unix: session.map(|s| unix_secs(s.created_at)).unwrap_or(0),
            last_active_unix: session.map(|s| unix_secs(s.last_active)).unwrap_or(0),
        }
    }

    /// Handle a meta command. Only `conn <name>` is interpreted; anything
    /// else is accepted and echoed back for the client to act on, since
    /// meta commands are primarily a client-side convenience surface
    /// (`\x`-style shorthand) rather than broker state in their own right.
    fn handle_meta(&mut self, id: u64, cmd: &MetaCommand) -> Result<Value, QpError> {
        if cmd.name == "conn" {
            let name = cmd
                .positional
                .first()
                .ok_or_else(|| QpError::BadInput("conn: missing connection name".to_string()))?;
            if self.manager.catalog().get(name).is_none() {
                return Err(QpError::BadInput(format!("unknown connection '{name}'")));
            }
            if let Some(session) = self.sessions.get_mut(id) {
                session.conn_name = Some(name.clone());
            }
            return Ok(serde_json::json!({ "connection": name }));
        }
        Ok(serde_json::json!({ "command": cmd.name }))
    }
}

fn unix_secs(t: SystemTime) -> u64 {
    t.duration_since(SystemTime::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Read one length-prefixed frame. `Ok(None)` means the peer closed
/// cleanly between frames; any other I/O error is a dead connection.
async fn read_frame(stream: &mut UnixStream) -> std::io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(len_buf);
    if len == 0 {
        return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "zero-length frame"));
    }
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf).await?;
    Ok(Some(buf))
}

async fn write_frame(stream: &mut UnixStream, payload: &[u8]) -> std::io::Result<()> {
    let len = payload.len() as u32;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(payload).await?;
    stream.flush().await
}

async fn write_bytes(stream: &mut UnixStream, bytes: &[u8]) -> std::io::Result<()> {
    stream.write_all(bytes).await?;
    stream.flush().await
}
