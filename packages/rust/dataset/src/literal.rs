//! Loading the dataset from the data module's object literal.
//!
//! The container block is rewritten into strict JSON (comments dropped, bare
//! keys quoted, single-quoted strings converted, trailing commas removed) and
//! handed to `serde_json`. This is a normalization pass, not a JS parser:
//! expressions, spreads and computed keys are out of reach.

use tracing::warn;

use taxrates_shared::{Dataset, Result, TaxRatesError};

use crate::locator::{duplicate_keys, locate_container};
use crate::scan::{comment_end, is_quote, string_end};

/// Parse the records held by `const <container> = {...}` in `source`.
///
/// A key declared twice keeps its last record, as it would in JS.
pub fn parse_dataset(source: &str, container: &str) -> Result<Dataset> {
    let span = locate_container(source, container).ok_or_else(|| {
        TaxRatesError::parse(format!("container `{container}` not found in data file"))
    })?;

    for key in duplicate_keys(source, container) {
        warn!(key = %key, container, "duplicate record key, the last one wins");
    }

    let json = to_json(&source[span.start..span.end]);
    serde_json::from_str(&json)
        .map_err(|e| TaxRatesError::parse(format!("invalid record in `{container}`: {e}")))
}

/// Rewrite a JS object literal into JSON text.
pub fn to_json(src: &str) -> String {
    let bytes = src.as_bytes();
    let mut out = String::with_capacity(src.len());
    let mut i = 0;

    while i < bytes.len() {
        if let Some(end) = comment_end(bytes, i) {
            i = end;
            continue;
        }

        let b = bytes[i];
        if is_quote(b) {
            let end = string_end(bytes, i);
            push_string(&mut out, &src[i..end]);
            i = end;
            continue;
        }

        if b == b',' && closes_next(bytes, i + 1) {
            i += 1;
            continue;
        }

        if b.is_ascii_alphabetic() || b == b'_' || b == b'$' {
            let end = bytes[i..]
                .iter()
                .position(|c| !(c.is_ascii_alphanumeric() || *c == b'_' || *c == b'$'))
                .map_or(bytes.len(), |n| i + n);
            let word = &src[i..end];
            if is_key_position(bytes, end) && !matches!(word, "true" | "false" | "null") {
                out.push('"');
                out.push_str(word);
                out.push('"');
            } else {
                out.push_str(word);
            }
            i = end;
            continue;
        }

        // Copy one whole UTF-8 character.
        let ch_len = src[i..].chars().next().map_or(1, char::len_utf8);
        out.push_str(&src[i..i + ch_len]);
        i += ch_len;
    }

    out
}

/// Whether the next significant byte after `from` is `}` or `]`.
fn closes_next(bytes: &[u8], mut from: usize) -> bool {
    while from < bytes.len() {
        if let Some(end) = comment_end(bytes, from) {
            from = end;
            continue;
        }
        match bytes[from] {
            b if b.is_ascii_whitespace() => from += 1,
            b'}' | b']' => return true,
            _ => return false,
        }
    }
    false
}

/// Whether a `:` follows `from`, skipping whitespace.
fn is_key_position(bytes: &[u8], from: usize) -> bool {
    bytes[from..]
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b':')
}

/// Emit a JS string literal (any quote style) as a JSON string.
fn push_string(out: &mut String, literal: &str) {
    if literal.starts_with('"') {
        out.push_str(literal);
        return;
    }

    let inner = literal
        .get(1..literal.len().saturating_sub(1))
        .unwrap_or_default();
    out.push('"');
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(q @ ('\'' | '`')) => out.push(q),
                Some(other) => {
                    out.push('\\');
                    out.push(other);
                }
                None => {}
            },
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
}
