//! Shared types used by every other crate in this workspace: the error
//! taxonomy (§7), the safety policy and connection catalog (§3), and a
//! handful of constants (canonical identifier limits, built-in safe
//! functions) that the lowering, touch, and policy crates all need to
//! agree on.

pub mod config;
pub mod error;
pub mod ident;

pub use config::{BackendKind, ColumnStrategy, ConnCatalog, ConnProfile, SafetyPolicy};
pub use error::{qrerr, QpError};

/// Maximum byte length of a connection name. Chosen so a worst-case token
/// `tok_<name>_<u32>_<u32>` (`4 + name + 1 + 10 + 1 + 10 + 1` NUL) stays
/// under 63 bytes including the terminator, with margin.
pub const CONN_NAME_MAX_LEN: usize = 32;

/// Hard ceiling on token text length, including the terminating NUL.
pub const TOKEN_MAX_LEN: usize = 63;

/// Floor for `SafetyPolicy::max_query_bytes`: guarantees the builder can
/// always store at least one minimally sized, NUL-terminated cell even if
/// a catalog misconfigures a smaller cap.
pub const MIN_QUERY_BYTES_FLOOR: u32 = 56;

/// Functions the validator accepts even when a connection's allowlist
/// doesn't mention them. Kept narrow and read-only in spirit.
pub const BUILTIN_SAFE_FUNCTIONS: &[&str] = &[
    "count", "sum", "avg", "min", "max", "coalesce", "lower", "upper", "length", "now",
    "nullif", "abs", "round", "trim", "concat", "substring",
];
