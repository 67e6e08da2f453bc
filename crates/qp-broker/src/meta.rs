//! Meta-command tokenizer (§6: `{ "raw": string }` → `key=value` pairs,
//! quoted values, numeric coercion). A small recursive-descent scanner
//! rather than a regex: quoting and escaping need lookahead a single
//! regex pass handles awkwardly, and the grammar here is tiny enough that
//! a hand-written scanner stays more readable.

#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetaCommand {
    pub name: String,
    /// Bare (non `key=value`) tokens, in order.
    pub positional: Vec<String>,
    /// `key=value` tokens, in order of first appearance.
    pub pairs: Vec<(String, MetaValue)>,
}

impl MetaCommand {
    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }
}

/// Parse the remainder of a meta-command line (after the leading `\` or
/// `:` has already been stripped by the caller).
pub fn parse(raw: &str) -> Option<MetaCommand> {
    let tokens = tokenize(raw);
    let mut iter = tokens.into_iter();
    let name = iter.next()?;

    let mut positional = Vec::new();
    let mut pairs = Vec::new();
    for tok in iter {
        match split_pair(&tok) {
            Some((key, value)) => pairs.push((key, coerce(&value))),
            None => positional.push(unquote(&tok)),
        }
    }

    Some(MetaCommand {
        name,
        positional,
        pairs,
    })
}

/// Split whitespace-separated tokens, treating a double-quoted span
/// (with `\"` and `\\` escapes) as a single token including its
/// surrounding quotes, so `split_pair`/`unquote` can later decide how to
/// treat it.
fn tokenize(raw: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = raw.chars().peekable();
    let mut current = String::new();
    let mut in_quotes = false;

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                current.push(c);
                in_quotes = !in_quotes;
            }
            '\\' if in_quotes => {
                if let Some(next) = chars.next() {
                    current.push('\\');
                    current.push(next);
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Split `key=value` at the first unquoted `=`. A token whose `=` falls
/// inside a quoted span, or with no `=` at all, is not a pair.
fn split_pair(tok: &str) -> Option<(String, String)> {
    let mut in_quotes = false;
    let mut chars = tok.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => in_quotes = !in_quotes,
            '\\' if in_quotes => {
                chars.next();
            }
            '=' if !in_quotes => {
                if i == 0 {
                    return None;
                }
                return Some((tok[..i].to_string(), tok[i + 1..].to_string()));
            }
            _ => {}
        }
    }
    None
}

fn unquote(tok: &str) -> String {
    if tok.len() >= 2 && tok.starts_with('"') && tok.ends_with('"') {
        tok[1..tok.len() - 1].replace("\\\"", "\"").replace("\\\\", "\\")
    } else {
        tok.to_string()
    }
}

fn coerce(raw: &str) -> MetaValue {
    if raw.starts_with('"') {
        return MetaValue::Str(unquote(raw));
    }
    if let Ok(i) = raw.parse::<i64>() {
        return MetaValue::Int(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return MetaValue::Float(f);
    }
    match raw {
        "true" => MetaValue::Bool(true),
        "false" => MetaValue::Bool(false),
        _ => MetaValue::Str(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_command() {
        let cmd = parse("status").unwrap();
        assert_eq!(cmd.name, "status");
        assert!(cmd.positional.is_empty());
        assert!(cmd.pairs.is_empty());
    }

    #[test]
    fn parses_key_value_pairs_with_numeric_coercion() {
        let cmd = parse("set max_rows=50 ratio=0.5 enabled=true").unwrap();
        assert_eq!(cmd.name, "set");
        assert_eq!(cmd.get("max_rows"), Some(&MetaValue::Int(50)));
        assert_eq!(cmd.get("ratio"), Some(&MetaValue::Float(0.5)));
        assert_eq!(cmd.get("enabled"), Some(&MetaValue::Bool(true)));
    }

    #[test]
    fn parses_quoted_values_with_embedded_spaces_and_escapes() {
        let cmd = parse(r#"set name="hello world" note="she said \"hi\"""#).unwrap();
        assert_eq!(cmd.get("name"), Some(&MetaValue::Str("hello world".to_string())));
        assert_eq!(cmd.get("note"), Some(&MetaValue::Str("she said \"hi\"".to_string())));
    }

    #[test]
    fn positional_tokens_are_kept_in_order() {
        let cmd = parse("conn pgmain verbose").unwrap();
        assert_eq!(cmd.positional, vec!["pgmain".to_string(), "verbose".to_string()]);
    }

    #[test]
    fn empty_raw_line_has_no_command() {
        assert!(parse("   ").is_none());
    }
}
