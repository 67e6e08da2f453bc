//! Sensitive-token store (§4.6). Holds one token per tokenized value for a
//! single connection's lifetime, addressed by a dense index into a
//! [`PackedArray`] and, under the deterministic strategy, deduplicated
//! through a hand-rolled [`HashTable`] rather than `std::HashMap` (the same
//! containers `qp-arena` already provides for exactly this purpose).

use qp_arena::{fnv1a64, HashTable, PackedArray, StrId, StringPool};
use qp_core::{ColumnStrategy, QpError, CONN_NAME_MAX_LEN, TOKEN_MAX_LEN};

struct TokenEntry {
    col_ref: StrId,
    value: String,
    oid: u32,
}

/// Input to [`DbTokenStore::create_token`]. `value` is never `NULL` at this
/// layer: the result builder only calls into the store for non-NULL cells
/// (§4.5), so the store's job is narrower than the source design's C
/// signature — there's no `value==NULL && value_len>0` state to reject
/// because a Rust `&str` can't express a null pointer with a positive
/// length in the first place.
pub struct TokenInput<'a> {
    pub col_ref: &'a str,
    pub value: &'a str,
    pub oid: u32,
}

pub struct ParsedToken {
    pub conn_name: String,
    pub generation: u32,
    pub index: usize,
}

/// Bound to one connection name at construction; every token it mints is
/// prefixed `tok_<name>_`.
pub struct DbTokenStore {
    conn_name: String,
    strategy: ColumnStrategy,
    tokens: PackedArray<TokenEntry>,
    dedup: HashTable<usize>,
    strings: StringPool,
}

impl DbTokenStore {
    /// `conn_name` must already be within [`CONN_NAME_MAX_LEN`] (the
    /// catalog enforces this at load time); this is a cheap sanity check,
    /// not the primary enforcement point.
    pub fn new(conn_name: impl Into<String>, strategy: ColumnStrategy) -> Result<Self, QpError> {
        let conn_name = conn_name.into();
        if conn_name.is_empty() || conn_name.len() > CONN_NAME_MAX_LEN {
            return Err(QpError::Internal(format!(
                "token store: connection name {conn_name:?} exceeds {CONN_NAME_MAX_LEN} bytes"
            )));
        }
        Ok(Self {
            conn_name,
            strategy,
            tokens: PackedArray::new(),
            dedup: HashTable::new(),
            strings: StringPool::new(usize::MAX),
        })
    }

    /// Mint or reuse a token for `input` under `generation`. Returns
    /// `Ok(None)` on the one expected "soft" failure — the formatted token
    /// would not fit in [`TOKEN_MAX_LEN`] bytes including its NUL
    /// terminator — so callers can fail that single cell closed without
    /// erroring the whole query, matching the result builder's cap
    /// handling. Any other failure (bad input, arena exhaustion) is a hard
    /// `Err`.
    pub fn create_token(
        &mut self,
        generation: u32,
        input: TokenInput<'_>,
    ) -> Result<Option<String>, QpError> {
        if input.col_ref.is_empty() {
            return Err(QpError::BadInput("token store: empty col_ref".into()));
        }

        if matches!(self.strategy, ColumnStrategy::Deterministic) {
            let key_hash = dedup_hash(input.col_ref, input.value, input.oid);
            let existing = {
                let tokens = &self.tokens;
                let strings = &self.strings;
                self.dedup
                    .find(key_hash, |&idx| {
                        tokens
                            .get(idx)
                            .map(|e| {
                                e.value == input.value
                                    && e.oid == input.oid
                                    && strings.resolve(e.col_ref) == input.col_ref
                            })
                            .unwrap_or(false)
                    })
                    .copied()
            };
            if let Some(idx) = existing {
                return Ok(Some(format_token(&self.conn_name, generation, idx)));
            }
            let Some((idx, token)) = self.append(generation, input.col_ref, input.value, input.oid)? else {
                return Ok(None);
            };
            self.dedup.insert(key_hash, idx);
            return Ok(Some(token));
        }

        Ok(self
            .append(generation, input.col_ref, input.value, input.oid)?
            .map(|(_, token)| token))
    }

    /// Push a new entry and format its token, rolling the push back if the
    /// formatted token overflows `TOKEN_MAX_LEN`. Returns `Ok(None)` on
    /// overflow (nothing was appended), not an error.
    fn append(
        &mut self,
        generation: u32,
        col_ref: &str,
        value: &str,
        oid: u32,
    ) -> Result<Option<(usize, String)>, QpError> {
        let col_ref_id = self
            .strings
            .intern(col_ref)
            .map_err(|e| QpError::Internal(format!("token store: string pool: {e}")))?;
        let idx = self
            .tokens
            .push(TokenEntry {
                col_ref: col_ref_id,
                value: value.to_string(),
                oid,
            })
            .map_err(|_| QpError::Internal("token store: token array full".into()))?;
        let token = format_token(&self.conn_name, generation, idx);
        if token.len() >= TOKEN_MAX_LEN {
            self.tokens.swap_remove(idx);
            return Ok(None);
        }
        Ok(Some((idx, token)))
    }
}

fn dedup_hash(col_ref: &str, value: &str, oid: u32) -> u64 {
    let mut bytes = Vec::with_capacity(col_ref.len() + value.len() + 9);
    bytes.extend_from_slice(col_ref.as_bytes());
    bytes.push(0);
    bytes.extend_from_slice(value.as_bytes());
    bytes.push(0);
    bytes.extend_from_slice(&oid.to_le_bytes());
    fnv1a64(&bytes)
}

fn format_token(conn_name: &str, generation: u32, index: usize) -> String {
    format!("tok_{conn_name}_{generation}_{index}")
}

/// Parse `tok_<name>_<gen>_<idx>`, splitting on the *last* two underscores
/// so connection names may themselves contain underscores. Rejects a bad
/// prefix, a missing part, or a non-numeric/overflowing generation or
/// index.
pub fn parse_token(token: &str) -> Option<ParsedToken> {
    let rest = token.strip_prefix("tok_")?;
    let mut parts = rest.rsplitn(3, '_');
    let idx_str = parts.next()?;
    let gen_str = parts.next()?;
    let conn_name = parts.next()?;
    if conn_name.is_empty() {
        return None;
    }
    let generation: u32 = gen_str.parse().ok()?;
    let index: u32 = idx_str.parse().ok()?;
    Some(ParsedToken {
        conn_name: conn_name.to_string(),
        generation,
        index: index as usize,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DbTokenStore {
        DbTokenStore::new("pgmain", ColumnStrategy::Deterministic).unwrap()
    }

    #[test]
    fn deterministic_strategy_dedups_identical_values() {
        let mut s = store();
        let a = s
            .create_token(1, TokenInput { col_ref: "private.people.ssn", value: "123-45-6789", oid: 25 })
            .unwrap()
            .unwrap();
        let b = s
            .create_token(1, TokenInput { col_ref: "private.people.ssn", value: "123-45-6789", oid: 25 })
            .unwrap()
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn deterministic_strategy_distinguishes_different_values() {
        let mut s = store();
        let a = s
            .create_token(1, TokenInput { col_ref: "private.people.ssn", value: "111-11-1111", oid: 25 })
            .unwrap()
            .unwrap();
        let b = s
            .create_token(1, TokenInput { col_ref: "private.people.ssn", value: "222-22-2222", oid: 25 })
            .unwrap()
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn randomized_strategy_never_dedups() {
        let mut s = DbTokenStore::new("pgmain", ColumnStrategy::Randomized).unwrap();
        let a = s
            .create_token(1, TokenInput { col_ref: "private.people.ssn", value: "same", oid: 25 })
            .unwrap()
            .unwrap();
        let b = s
            .create_token(1, TokenInput { col_ref: "private.people.ssn", value: "same", oid: 25 })
            .unwrap()
            .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn empty_col_ref_is_rejected() {
        let mut s = store();
        let err = s
            .create_token(1, TokenInput { col_ref: "", value: "x", oid: 25 })
            .unwrap_err();
        assert!(matches!(err, QpError::BadInput(_)));
    }

    #[test]
    fn round_trips_through_parse_token() {
        let mut s = store();
        let tok = s
            .create_token(7, TokenInput { col_ref: "private.people.ssn", value: "x", oid: 25 })
            .unwrap()
            .unwrap();
        let parsed = parse_token(&tok).unwrap();
        assert_eq!(parsed.conn_name, "pgmain");
        assert_eq!(parsed.generation, 7);
        assert_eq!(parsed.index, 0);
    }

    #[test]
    fn parse_token_handles_underscores_in_connection_name() {
        let parsed = parse_token("tok_my_conn_name_3_9").unwrap();
        assert_eq!(parsed.conn_name, "my_conn_name");
        assert_eq!(parsed.generation, 3);
        assert_eq!(parsed.index, 9);
    }

    #[test]
    fn parse_token_rejects_malformed_input() {
        assert!(parse_token("not_a_token").is_none());
        assert!(parse_token("tok_name_notanumber_9").is_none());
        assert!(parse_token("tok_name_3_notanumber").is_none());
    }

    /// Scenario S3 (§8): a known fiscal code column, generation 42, on
    /// connection `pgmain` mints `tok_pgmain_42_0`; running the same value
    /// again reuses index 0 rather than growing the store.
    #[test]
    fn scenario_s3_mints_and_reuses_the_expected_token() {
        let mut s = store();
        let first = s
            .create_token(
                42,
                TokenInput { col_ref: "users.fiscal_code", value: "RSSMRA80A01H501U", oid: 25 },
            )
            .unwrap()
            .unwrap();
        assert_eq!(first, "tok_pgmain_42_0");

        let second = s
            .create_token(
                42,
                TokenInput { col_ref: "users.fiscal_code", value: "RSSMRA80A01H501U", oid: 25 },
            )
            .unwrap()
            .unwrap();
        assert_eq!(second, "tok_pgmain_42_0");
    }
}
