//! Delimiter scanning over JS-like source text.
//!
//! The scanner is linear and lexical only: it knows about string literals
//! (double, single and back-quoted, with backslash escapes) and about `//`
//! and `/* */` comments, so delimiter characters inside either are ignored.
//! Everything else is reported byte by byte.

/// A lexical unit outside comments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lexeme {
    /// A code byte at the given offset.
    Byte(usize, u8),
    /// A string literal spanning `start..end`, quotes included.
    Str(usize, usize),
}

/// Iterator over the lexemes of `text` starting at a byte offset.
pub(crate) struct Lexemes<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Lexemes<'a> {
    pub(crate) fn new(text: &'a str, from: usize) -> Self {
        Self {
            bytes: text.as_bytes(),
            pos: from,
        }
    }
}

impl Iterator for Lexemes<'_> {
    type Item = Lexeme;

    fn next(&mut self) -> Option<Lexeme> {
        loop {
            let b = *self.bytes.get(self.pos)?;
            if let Some(end) = comment_end(self.bytes, self.pos) {
                self.pos = end;
                continue;
            }
            let start = self.pos;
            if is_quote(b) {
                self.pos = string_end(self.bytes, start);
                return Some(Lexeme::Str(start, self.pos));
            }
            self.pos += 1;
            return Some(Lexeme::Byte(start, b));
        }
    }
}

pub(crate) fn is_quote(b: u8) -> bool {
    matches!(b, b'"' | b'\'' | b'`')
}

/// Offset just past the string literal opening at `start`.
/// An unterminated literal runs to the end of the text.
pub(crate) fn string_end(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// If a comment starts at `pos`, the offset just past it.
pub(crate) fn comment_end(bytes: &[u8], pos: usize) -> Option<usize> {
    if bytes.get(pos) != Some(&b'/') {
        return None;
    }
    match bytes.get(pos + 1) {
        Some(b'/') => {
            let end = bytes[pos..]
                .iter()
                .position(|&b| b == b'\n')
                .map_or(bytes.len(), |i| pos + i);
            Some(end)
        }
        Some(b'*') => {
            let end = bytes[pos + 2..]
                .windows(2)
                .position(|w| w == b"*/")
                .map_or(bytes.len(), |i| pos + 2 + i + 2);
            Some(end)
        }
        _ => None,
    }
}

fn closer_for(open: u8) -> Option<u8> {
    match open {
        b'{' => Some(b'}'),
        b'[' => Some(b']'),
        _ => None,
    }
}

/// Offset just past the delimiter that balances the one at `open`.
///
/// `text[open]` must be `{` or `[`. Returns `None` when the text ends before
/// the depth counter returns to zero.
pub fn block_end(text: &str, open: usize) -> Option<usize> {
    let opener = *text.as_bytes().get(open)?;
    let closer = closer_for(opener)?;

    let mut depth = 0usize;
    for lexeme in Lexemes::new(text, open) {
        if let Lexeme::Byte(pos, b) = lexeme {
            if b == opener {
                depth += 1;
            } else if b == closer {
                depth -= 1;
                if depth == 0 {
                    return Some(pos + 1);
                }
            }
        }
    }
    None
}

/// Offset of the first code (non-string, non-comment) occurrence of `byte`
/// at or after `from`.
pub fn find_code_byte(text: &str, from: usize, byte: u8) -> Option<usize> {
    Lexemes::new(text, from).find_map(|lexeme| match lexeme {
        Lexeme::Byte(pos, b) if b == byte => Some(pos),
        _ => None,
    })
}

/// Count `{`/`}` and `[`/`]` in code, returning `(opening, closing)`.
pub fn delimiter_counts(text: &str) -> (usize, usize) {
    Lexemes::new(text, 0).fold((0, 0), |(open, close), lexeme| match lexeme {
        Lexeme::Byte(_, b'{' | b'[') => (open + 1, close),
        Lexeme::Byte(_, b'}' | b']') => (open, close + 1),
        _ => (open, close),
    })
}
