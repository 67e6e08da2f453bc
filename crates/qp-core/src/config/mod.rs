//! Catalog and policy configuration, loaded once at startup from YAML
//! (§3 `SafetyPolicy`, `ConnProfile`/`ConnCatalog`).

mod catalog;
mod policy;

pub use catalog::{BackendKind, ConnCatalog, ConnProfile};
pub use policy::{ColumnStrategy, SafetyPolicy};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error reading catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid catalog yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid catalog: {0}")]
    Validation(String),
}
