//! Session broker (§3, §5, §6): the fixed-size handshake, the resume-token
//! cache, the meta-command tokenizer, the JSON-RPC `exec`/`status`/meta
//! surface, and the single-task cooperative event loop tying them together.

mod broker;
mod error;
mod meta;
mod protocol;
mod resume;
mod session;
mod wire;

pub use broker::Broker;
pub use error::BackendError;
pub use meta::{MetaCommand, MetaValue};
pub use protocol::{ExecColumn, ExecParams, ExecResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse, StatusResult};
pub use resume::ResumeTokenStore;
pub use session::{Session, SessionTable, MAX_IDLE_SESSIONS};
pub use wire::{HandshakeRequest, HandshakeResponse, Status};
