use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::policy::SafetyPolicy;
use super::ConfigError;
use crate::ident::CanonicalColumnId;
use crate::CONN_NAME_MAX_LEN;

/// Backend kind a connection profile targets. Only Postgres is wired to an
/// adapter today; the enum stays open so a future adapter doesn't need a
/// catalog format change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Postgres,
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Postgres
    }
}

/// Raw, pre-canonicalization shape of a catalog entry as it appears in
/// YAML: `sensitive_columns` may be 2-part (`table.column`) or 3-part
/// (`schema.table.column`) strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawConnProfile {
    #[serde(default)]
    kind: BackendKind,
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
    database: String,
    #[serde(default = "default_user")]
    user: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    credentials_env: Option<String>,
    #[serde(default = "default_schema")]
    default_schema: String,
    #[serde(default)]
    safe_functions: Vec<String>,
    #[serde(default)]
    sensitive_columns: Vec<String>,
    #[serde(default)]
    policy: SafetyPolicy,
}

#[derive(Debug, Deserialize)]
struct RawCatalogFile {
    #[serde(default)]
    connections: HashMap<String, RawConnProfile>,
}

/// Static descriptor for a single named backend connection (§3
/// `ConnProfile`). `sensitive_columns` is always fully canonicalized
/// (`schema.table.column`) by the time a profile reaches validator or
/// builder code.
#[derive(Debug, Clone)]
pub struct ConnProfile {
    pub name: String,
    pub kind: BackendKind,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: Option<String>,
    pub credentials_env: Option<String>,
    /// Schema assumed for unqualified base relations, and for completing
    /// 2-part `table.column` canonical ids (§3).
    pub default_schema: String,
    pub safe_functions: Vec<String>,
    pub sensitive_columns: Vec<CanonicalColumnId>,
    pub policy: SafetyPolicy,
}

impl ConnProfile {
    /// Whether `col` (already canonical) is listed sensitive on this
    /// connection.
    pub fn is_sensitive(&self, col: &CanonicalColumnId) -> bool {
        self.sensitive_columns.contains(col)
    }

    /// Whether `name` is allowed either via this connection's explicit
    /// allowlist or the backend's built-in safe set.
    pub fn allows_function(&self, name: &str) -> bool {
        let folded = name.to_ascii_lowercase();
        crate::BUILTIN_SAFE_FUNCTIONS.contains(&folded.as_str())
            || self
                .safe_functions
                .iter()
                .any(|f| f.to_ascii_lowercase() == folded)
    }

    /// Build a Postgres connection string, preferring an environment
    /// variable over an inline password when both are configured.
    pub fn connection_string(&self) -> String {
        if let Some(env_var) = &self.credentials_env {
            if let Ok(url) = std::env::var(env_var) {
                return url;
            }
        }
        match &self.password {
            Some(password) => format!(
                "postgresql://{}:{}@{}:{}/{}",
                self.user, password, self.host, self.port, self.database
            ),
            None => format!(
                "postgresql://{}@{}:{}/{}",
                self.user, self.host, self.port, self.database
            ),
        }
    }
}

/// Catalog of named connection profiles, loaded once from YAML at startup.
#[derive(Debug, Clone, Default)]
pub struct ConnCatalog {
    connections: HashMap<String, ConnProfile>,
}

impl ConnCatalog {
    pub fn from_yaml(s: &str) -> Result<Self, ConfigError> {
        let raw: RawCatalogFile = serde_yaml::from_str(s)?;
        let mut connections = HashMap::with_capacity(raw.connections.len());
        for (name, entry) in raw.connections {
            if name.is_empty() || name.len() > CONN_NAME_MAX_LEN {
                return Err(ConfigError::Validation(format!(
                    "connection name {name:?} exceeds {CONN_NAME_MAX_LEN} bytes"
                )));
            }
            let mut sensitive_columns = Vec::with_capacity(entry.sensitive_columns.len());
            for raw_col in &entry.sensitive_columns {
                let id = CanonicalColumnId::parse(raw_col, &entry.default_schema).ok_or_else(|| {
                    ConfigError::Validation(format!(
                        "sensitive column {raw_col:?} on connection {name:?} is not table.column or schema.table.column"
                    ))
                })?;
                sensitive_columns.push(id);
            }
            let mut policy = entry.policy;
            policy.normalize();
            connections.insert(
                name.clone(),
                ConnProfile {
                    name,
                    kind: entry.kind,
                    host: entry.host,
                    port: entry.port,
                    database: entry.database,
                    user: entry.user,
                    password: entry.password,
                    credentials_env: entry.credentials_env,
                    default_schema: entry.default_schema,
                    safe_functions: entry.safe_functions,
                    sensitive_columns,
                    policy,
                },
            );
        }
        Ok(Self { connections })
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn get(&self, name: &str) -> Option<&ConnProfile> {
        self.connections.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.connections.keys().map(String::as_str)
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_user() -> String {
    "postgres".to_string()
}

fn default_schema() -> String {
    "public".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
connections:
  pgmain:
    database: appdb
    user: app
    sensitive_columns:
      - users.fiscal_code
      - private.people.ssn
    policy:
      max_rows: 50
"#;

    #[test]
    fn loads_and_canonicalizes_sensitive_columns() {
        let catalog = ConnCatalog::from_yaml(YAML).unwrap();
        let conn = catalog.get("pgmain").unwrap();
        assert_eq!(conn.sensitive_columns.len(), 2);
        assert!(conn.is_sensitive(&CanonicalColumnId::new("public", "users", "fiscal_code")));
        assert!(conn.is_sensitive(&CanonicalColumnId::new("private", "people", "ssn")));
        assert_eq!(conn.policy.max_rows, 50);
    }

    #[test]
    fn rejects_overlong_connection_name() {
        let name = "x".repeat(CONN_NAME_MAX_LEN + 1);
        let yaml = format!("connections:\n  {name}:\n    database: d\n");
        assert!(ConnCatalog::from_yaml(&yaml).is_err());
    }

    #[test]
    fn rejects_malformed_sensitive_column() {
        let yaml = "connections:\n  pgmain:\n    database: d\n    sensitive_columns:\n      - onlyname\n";
        assert!(ConnCatalog::from_yaml(yaml).is_err());
    }

    #[test]
    fn builtin_and_allowlisted_functions_are_allowed() {
        let catalog = ConnCatalog::from_yaml(YAML).unwrap();
        let conn = catalog.get("pgmain").unwrap();
        assert!(conn.allows_function("COUNT"));
        assert!(!conn.allows_function("pg_sleep"));
    }
}
