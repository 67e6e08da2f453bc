//! Identifier normalization (§3 `Identifier`) and the canonical
//! `schema.table.column` form used by sensitive-column lists throughout the
//! catalog, validator, and token store.

use std::fmt;

/// Fold an unquoted SQL identifier to lower-case. Quoted identifiers are
/// never passed through this function: the lowering layer preserves their
/// exact bytes.
pub fn fold_unquoted(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// A normalized `schema.table.column` triple. Catalog entries may be
/// supplied as a bare `table.column`; those are completed with the
/// connection's configured default schema (`"public"` unless overridden)
/// at ingest time, so every downstream consumer only ever sees the 3-part
/// form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalColumnId {
    pub schema: String,
    pub table: String,
    pub column: String,
}

impl CanonicalColumnId {
    pub fn new(schema: impl Into<String>, table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            column: column.into(),
        }
    }

    /// Parse either `table.column` (completed with `default_schema`) or
    /// `schema.table.column`. Returns `None` for anything else (zero, one,
    /// or more than three dot-separated parts).
    pub fn parse(raw: &str, default_schema: &str) -> Option<Self> {
        let parts: Vec<&str> = raw.split('.').collect();
        match parts.as_slice() {
            [table, column] if !table.is_empty() && !column.is_empty() => {
                Some(Self::new(default_schema, *table, *column))
            }
            [schema, table, column]
                if !schema.is_empty() && !table.is_empty() && !column.is_empty() =>
            {
                Some(Self::new(*schema, *table, *column))
            }
            _ => None,
        }
    }
}

impl fmt::Display for CanonicalColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.schema, self.table, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_part_form_gets_default_schema() {
        let id = CanonicalColumnId::parse("users.fiscal_code", "public").unwrap();
        assert_eq!(id.to_string(), "public.users.fiscal_code");
    }

    #[test]
    fn three_part_form_is_kept_as_is() {
        let id = CanonicalColumnId::parse("private.people.name", "public").unwrap();
        assert_eq!(id.to_string(), "private.people.name");
    }

    #[test]
    fn malformed_forms_are_rejected() {
        assert!(CanonicalColumnId::parse("justcolumn", "public").is_none());
        assert!(CanonicalColumnId::parse("a.b.c.d", "public").is_none());
        assert!(CanonicalColumnId::parse("", "public").is_none());
    }

    #[test]
    fn fold_unquoted_lowercases_ascii() {
        assert_eq!(fold_unquoted("UsErS"), "users");
    }
}
