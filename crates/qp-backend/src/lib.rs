//! Narrow backend capability (§4's `[ADD]` connection manager): a
//! `DbBackend` trait every driver implements, a Postgres adapter built on
//! `sqlx`, and a `ConnectionManager` that lazily opens named connections
//! from the catalog and reaps them on a TTL.

mod backend;
mod error;
mod manager;
mod postgres;

pub use backend::DbBackend;
pub use error::BackendError;
pub use manager::ConnectionManager;
pub use postgres::PgBackend;
