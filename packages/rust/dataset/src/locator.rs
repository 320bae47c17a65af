//! Locating record blocks and their properties inside the data module text.
//!
//! A record is found by its anchor (`"key": {`) and bounded with
//! [`block_end`]; inside a block, top-level properties are listed by a small
//! depth-tracking walk. Anchors are matched on lexemes, so commented-out
//! records and string contents never count. Nothing here parses values.

use std::collections::HashSet;

use regex::Regex;

use crate::scan::{Lexeme, Lexemes, block_end};

/// A balanced `{...}` block located in a larger text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    /// Where the anchor match begins (the key or declaration).
    pub anchor_start: usize,
    /// Offset of the opening `{`.
    pub start: usize,
    /// Offset just past the closing `}`.
    pub end: usize,
}

impl BlockSpan {
    /// Offset of the closing `}`.
    pub fn close(&self) -> usize {
        self.end - 1
    }
}

/// Locate the block for `key`, anchored on `"key": {` (or single quotes).
///
/// Only anchors in code count; text inside comments and string literals is
/// skipped. A key that appears more than once resolves to its last block.
pub fn locate(blob: &str, key: &str) -> Option<BlockSpan> {
    let mut found = None;
    // Anchor offset, and whether the colon has been seen.
    let mut pending: Option<(usize, bool)> = None;

    for lexeme in Lexemes::new(blob, 0) {
        match (lexeme, pending) {
            (Lexeme::Str(start, end), _) => {
                let name = blob.get(start + 1..end.saturating_sub(1));
                pending = (name == Some(key)).then_some((start, false));
            }
            (Lexeme::Byte(_, b), Some(_)) if b.is_ascii_whitespace() => {}
            (Lexeme::Byte(_, b':'), Some((anchor, false))) => pending = Some((anchor, true)),
            (Lexeme::Byte(pos, b'{'), Some((anchor, true))) => {
                if let Some(end) = block_end(blob, pos) {
                    found = Some(BlockSpan {
                        anchor_start: anchor,
                        start: pos,
                        end,
                    });
                }
                pending = None;
            }
            _ => pending = None,
        }
    }

    found
}

/// Locate the record `key` among the top-level entries of the container.
///
/// Repeated keys resolve to the last entry, the one a JS engine keeps.
pub fn locate_record(blob: &str, container: &str, key: &str) -> Option<BlockSpan> {
    let outer = locate_container(blob, container)?;
    let entry = properties(&blob[outer.start..outer.end])
        .into_iter()
        .rfind(|p| p.name == key)?;
    let start = outer.start + entry.value_start;
    if blob.as_bytes().get(start) != Some(&b'{') {
        return None;
    }
    let end = block_end(blob, start)?;
    Some(BlockSpan {
        anchor_start: outer.start + entry.key_start,
        start,
        end,
    })
}

/// Keys declared more than once at the top level of the container.
pub fn duplicate_keys(blob: &str, container: &str) -> Vec<String> {
    let Some(outer) = locate_container(blob, container) else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    let mut dupes = Vec::new();
    for entry in properties(&blob[outer.start..outer.end]) {
        if !seen.insert(entry.name.clone()) && !dupes.contains(&entry.name) {
            dupes.push(entry.name);
        }
    }
    dupes
}

/// Locate the container object declared as `const <name> = {`.
pub fn locate_container(blob: &str, name: &str) -> Option<BlockSpan> {
    let pattern = format!(r"\b(?:const|let|var)\s+{}\s*=\s*\{{", regex::escape(name));
    let re = Regex::new(&pattern).ok()?;
    let m = re.find_iter(blob).find(|m| is_code(blob, m.start()))?;
    // The pattern ends with the opening brace.
    let start = m.end() - 1;
    let end = block_end(blob, start)?;
    Some(BlockSpan {
        anchor_start: m.start(),
        start,
        end,
    })
}

/// Whether `pos` is a code byte, outside comments and string literals.
fn is_code(blob: &str, pos: usize) -> bool {
    Lexemes::new(blob, 0)
        .find(|l| match *l {
            Lexeme::Byte(p, _) => p >= pos,
            Lexeme::Str(_, end) => end > pos,
        })
        .is_some_and(|l| matches!(l, Lexeme::Byte(p, _) if p == pos))
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

/// A top-level `name: value` entry of a block. Offsets are block-relative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    /// Property name, unquoted.
    pub name: String,
    /// Offset of the first character of the key (or its opening quote).
    pub key_start: usize,
    /// Offset of the first character of the value.
    pub value_start: usize,
    /// Offset just past the last non-whitespace character of the value.
    pub value_end: usize,
    /// Offset of the separating comma after the value, if any.
    pub comma: Option<usize>,
}

#[derive(Clone, Copy)]
enum State {
    Key,
    Ident { start: usize },
    Colon,
    ValueStart,
    Value,
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn new_property(name: &str, key_start: usize) -> Property {
    Property {
        name: name.to_string(),
        key_start,
        value_start: 0,
        value_end: 0,
        comma: None,
    }
}

/// List the top-level properties of the block starting at `block[0] == '{'`.
///
/// Nested objects and arrays are skipped as opaque values. Returns an empty
/// list for anything that does not start with `{`.
pub fn properties(block: &str) -> Vec<Property> {
    let mut out = Vec::new();
    if !block.starts_with('{') {
        return out;
    }

    let mut depth = 0usize;
    let mut state = State::Key;
    let mut current: Option<Property> = None;

    for lexeme in Lexemes::new(block, 0) {
        let (pos, end, byte) = match lexeme {
            Lexeme::Byte(pos, b) => (pos, pos + 1, Some(b)),
            Lexeme::Str(start, end) => (start, end, None),
        };
        let ws = byte.is_some_and(|b| b.is_ascii_whitespace());
        let opens = matches!(byte, Some(b'{' | b'['));
        let closes = matches!(byte, Some(b'}' | b']'));

        if depth == 0 {
            if byte == Some(b'{') {
                depth = 1;
            }
            continue;
        }

        // Inside a nested value: only track depth and the value's extent.
        if depth > 1 {
            if opens {
                depth += 1;
            } else if closes {
                depth -= 1;
            }
            if !ws {
                if let Some(p) = current.as_mut() {
                    p.value_end = end;
                }
            }
            continue;
        }

        match state {
            State::Key => match (lexeme, byte) {
                (Lexeme::Str(start, end), _) => {
                    let name = block.get(start + 1..end.saturating_sub(1)).unwrap_or_default();
                    current = Some(new_property(name, start));
                    state = State::Colon;
                }
                (_, Some(b)) if is_ident_byte(b) => state = State::Ident { start: pos },
                (_, Some(b'}')) => break,
                _ => {}
            },
            State::Ident { start } => match byte {
                Some(b) if is_ident_byte(b) => {}
                Some(b':') => {
                    current = Some(new_property(&block[start..pos], start));
                    state = State::ValueStart;
                }
                _ if ws => {
                    current = Some(new_property(&block[start..pos], start));
                    state = State::Colon;
                }
                _ => state = State::Key,
            },
            State::Colon => {
                if ws {
                    continue;
                }
                if byte == Some(b':') {
                    state = State::ValueStart;
                } else {
                    current = None;
                    state = State::Key;
                }
            }
            State::ValueStart => {
                if ws {
                    continue;
                }
                if closes {
                    break;
                }
                if let Some(p) = current.as_mut() {
                    p.value_start = pos;
                    p.value_end = end;
                }
                if opens {
                    depth += 1;
                }
                state = State::Value;
            }
            State::Value => {
                if ws {
                    continue;
                }
                if byte == Some(b',') {
                    if let Some(mut p) = current.take() {
                        p.comma = Some(pos);
                        out.push(p);
                    }
                    state = State::Key;
                    continue;
                }
                if closes {
                    out.extend(current.take());
                    break;
                }
                if let Some(p) = current.as_mut() {
                    p.value_end = end;
                }
                if opens {
                    depth += 1;
                }
            }
        }
    }

    out
}

/// Find the top-level property called `name`.
pub fn find_property(block: &str, name: &str) -> Option<Property> {
    properties(block).into_iter().find(|p| p.name == name)
}

/// Whitespace preceding offset `pos` on its line, if only whitespace precedes it.
pub(crate) fn line_indent(text: &str, pos: usize) -> Option<&str> {
    let line_start = text[..pos].rfind('\n').map_or(0, |i| i + 1);
    let prefix = &text[line_start..pos];
    prefix
        .bytes()
        .all(|b| b == b' ' || b == b'\t')
        .then_some(prefix)
}
