//! Splits a raw stylesheet into top-level rule blocks.
//!
//! The scanner is a single linear pass over the input bytes with three
//! mutually exclusive modes (normal, in-comment, in-string) and a brace
//! depth counter that only moves in normal mode. Structural characters are
//! all ASCII, so byte offsets always land on UTF-8 character boundaries.

use serde::{Deserialize, Serialize};

/// Byte range of a rule inside its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A contiguous top-level block of source text: selector prelude plus block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub text: String,
    pub span: Span,
    /// 1-based line the rule starts on.
    pub line: usize,
    /// True when the rule did not close: trailing text, or an unterminated
    /// comment, string or block at end of input.
    pub partial: bool,
}

impl Rule {
    /// Rule text with comments removed and surrounding whitespace trimmed.
    pub fn subject(&self) -> String {
        strip_comments(&self.text).trim().to_string()
    }

    /// Selector (or at-rule) prelude: everything before the first block,
    /// comments removed and whitespace collapsed.
    pub fn prelude(&self) -> String {
        let subject = self.subject();
        let head = match subject.find('{') {
            Some(idx) => &subject[..idx],
            None => subject.as_str(),
        };
        head.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Comment,
    Str(u8),
}

/// Split `text` into top-level rules.
///
/// A rule is emitted each time the brace depth returns to zero after having
/// been positive. Anything left after the last closing brace (including an
/// unterminated comment, string or block) is emitted as a final partial rule.
pub fn tokenize(text: &str) -> Vec<Rule> {
    let bytes = text.as_bytes();
    let mut rules = Vec::new();
    let mut lines = LineCursor::default();

    let mut mode = Mode::Normal;
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        match mode {
            Mode::Normal => match b {
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    mode = Mode::Comment;
                    i += 2;
                    continue;
                }
                b'"' | b'\'' => mode = Mode::Str(b),
                b'{' => depth += 1,
                b'}' if depth > 0 => {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(rule) = emit(text, start, i + 1, false, &mut lines) {
                            rules.push(rule);
                        }
                        start = i + 1;
                    }
                }
                _ => {}
            },
            Mode::Comment => {
                if b == b'*' && bytes.get(i + 1) == Some(&b'/') {
                    mode = Mode::Normal;
                    i += 2;
                    continue;
                }
            }
            Mode::Str(quote) => {
                if b == b'\\' {
                    i += 2;
                    continue;
                }
                if b == quote {
                    mode = Mode::Normal;
                }
            }
        }
        i += 1;
    }

    if let Some(rule) = emit(text, start, bytes.len(), true, &mut lines) {
        rules.push(rule);
    }

    rules
}

/// Build a rule from `text[start..end]`, trimmed of surrounding whitespace.
fn emit(
    text: &str,
    start: usize,
    end: usize,
    partial: bool,
    lines: &mut LineCursor,
) -> Option<Rule> {
    let raw = &text[start..end];
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lead = raw.len() - raw.trim_start().len();
    let span = Span {
        start: start + lead,
        end: start + lead + trimmed.len(),
    };
    Some(Rule {
        text: trimmed.to_string(),
        span,
        line: lines.line_at(text, span.start),
        partial,
    })
}

/// Incremental offset-to-line mapping; offsets must be queried in ascending order.
#[derive(Debug, Default)]
struct LineCursor {
    pos: usize,
    newlines: usize,
}

impl LineCursor {
    fn line_at(&mut self, text: &str, offset: usize) -> usize {
        self.newlines += text.as_bytes()[self.pos..offset]
            .iter()
            .filter(|b| **b == b'\n')
            .count();
        self.pos = offset;
        self.newlines + 1
    }
}

/// Copy of `text` in which every comment byte and every byte between string
/// quotes is replaced by `_`. Quote characters themselves are kept.
///
/// The mask has the same byte length as `text`, so an offset found by
/// searching the mask indexes the same place in `text`, and a search can
/// only ever match real code.
pub fn mask_non_code(text: &str) -> String {
    const FILL: u8 = b'_';
    let mut bytes = text.as_bytes().to_vec();
    let mut mode = Mode::Normal;
    let mut i = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        match mode {
            Mode::Normal => {
                if b == b'/' && bytes.get(i + 1) == Some(&b'*') {
                    bytes[i] = FILL;
                    bytes[i + 1] = FILL;
                    mode = Mode::Comment;
                    i += 2;
                    continue;
                }
                if b == b'"' || b == b'\'' {
                    mode = Mode::Str(b);
                }
            }
            Mode::Comment => {
                if b == b'*' && bytes.get(i + 1) == Some(&b'/') {
                    bytes[i] = FILL;
                    bytes[i + 1] = FILL;
                    mode = Mode::Normal;
                    i += 2;
                    continue;
                }
                bytes[i] = FILL;
            }
            Mode::Str(quote) => {
                if b == b'\\' {
                    bytes[i] = FILL;
                    if let Some(next) = bytes.get_mut(i + 1) {
                        *next = FILL;
                    }
                    i += 2;
                    continue;
                }
                if b == quote {
                    mode = Mode::Normal;
                } else {
                    bytes[i] = FILL;
                }
            }
        }
        i += 1;
    }

    // Masked regions start and end on ASCII bytes and cover every byte in
    // between, so no partial UTF-8 sequence survives.
    String::from_utf8(bytes)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

/// Remove `/* ... */` comments, leaving string contents untouched.
pub fn strip_comments(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut mode = Mode::Normal;
    let mut copy_from = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        let b = bytes[i];
        match mode {
            Mode::Normal => {
                if b == b'/' && bytes.get(i + 1) == Some(&b'*') {
                    out.push_str(&text[copy_from..i]);
                    mode = Mode::Comment;
                    i += 2;
                    continue;
                }
                if b == b'"' || b == b'\'' {
                    mode = Mode::Str(b);
                }
            }
            Mode::Comment => {
                if b == b'*' && bytes.get(i + 1) == Some(&b'/') {
                    mode = Mode::Normal;
                    i += 2;
                    copy_from = i;
                    continue;
                }
            }
            Mode::Str(quote) => {
                if b == b'\\' {
                    i += 2;
                    continue;
                }
                if b == quote {
                    mode = Mode::Normal;
                }
            }
        }
        i += 1;
    }

    if mode != Mode::Comment {
        out.push_str(&text[copy_from.min(text.len())..]);
    }
    out
}
