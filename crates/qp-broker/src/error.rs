//! The broker reuses `qp_core::QpError` directly rather than introducing a
//! parallel wrapper type, the same call `qp-policy` already made for its
//! own boundary: every failure the broker produces already has a natural
//! `QpError` variant and an `rpc_code()` to carry it over JSON-RPC.
//!
//! The one thing `QpError` doesn't cover is a transport-level I/O failure
//! (a dropped socket, a truncated frame). Those never reach a client as a
//! JSON-RPC error object — the connection is simply dropped — so they're
//! handled as plain `std::io::Error` inside `broker.rs` and never converted.

pub use qp_backend::BackendError;
