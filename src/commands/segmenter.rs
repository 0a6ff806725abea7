//! Statement segmenter
//!
//! Buffers raw terminal input until it forms complete statements. Block
//! comments are removed (also when they span several chunks), except for
//! `/*!NNNNN ... */` directives whose body is kept so it executes. Statements
//! end at `;`, and a bare `use <db>` / `\c <db>` needs no terminator.

use super::patterns::database_switch;
use regex::{Captures, Regex};
use std::sync::OnceLock;

const COMMENT_OPEN: &str = "/*";
const COMMENT_CLOSE: &str = "*/";

#[derive(Debug, Default)]
pub struct Segmenter {
    /// Text after the last complete statement.
    buffer: String,
    /// Inside a block comment that began in an earlier chunk.
    in_comment: bool,
    /// Last chunk ended in a comment on a `*` that may start the terminator.
    pending_star: bool,
}

impl Segmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of input and return the statements it completed.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        if self.in_comment {
            let text = if self.pending_star {
                format!("*{}", chunk)
            } else {
                chunk.to_string()
            };

            match text.find(COMMENT_CLOSE) {
                Some(end) => {
                    self.in_comment = false;
                    self.pending_star = false;
                    self.buffer.push_str(&text[end + COMMENT_CLOSE.len()..]);
                }
                None => {
                    self.pending_star = text.ends_with('*');
                    return Vec::new();
                }
            }
        } else {
            self.buffer.push_str(chunk);
        }

        self.strip_comments();
        self.split_statements()
    }

    /// Drop any partial statement and comment state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.in_comment = false;
        self.pending_star = false;
    }

    /// End of input: whatever is left becomes the last statement.
    pub fn finish(&mut self) -> Option<String> {
        let rest = self.buffer.trim().to_string();
        self.reset();
        (!rest.is_empty()).then_some(rest)
    }

    /// A statement is partially typed (or a comment is open).
    pub fn is_pending(&self) -> bool {
        self.in_comment || !self.buffer.trim().is_empty()
    }

    fn strip_comments(&mut self) {
        if !self.buffer.contains(COMMENT_OPEN) {
            return;
        }

        let stripped = block_comment_re().replace_all(&self.buffer, |caps: &Captures| {
            if caps.get(1).is_some() {
                caps[2].to_string()
            } else {
                String::new()
            }
        });
        self.buffer = stripped.into_owned();

        // Anything still opening a comment is unterminated
        if let Some(start) = self.buffer.find(COMMENT_OPEN) {
            let rest = &self.buffer[start + COMMENT_OPEN.len()..];
            if rest.is_empty() || rest.starts_with('!') {
                // Either undecided yet or a directive whose body is kept once it closes.
                return;
            }
            self.pending_star = rest.ends_with('*');
            self.buffer.truncate(start);
            self.in_comment = true;
        }
    }

    fn split_statements(&mut self) -> Vec<String> {
        let mut statements = Vec::new();

        // Nothing inside an open directive ends a statement yet
        let limit = self.buffer.find(COMMENT_OPEN).unwrap_or(self.buffer.len());
        if let Some(last) = self.buffer[..limit].rfind(';') {
            let complete: String = self.buffer.drain(..=last).collect();
            statements.extend(
                complete[..last]
                    .split(';')
                    .map(|statement| statement.trim().to_string()),
            );
        }

        let tail = self.buffer.trim();
        if tail.is_empty() {
            self.buffer.clear();
        } else if database_switch(tail).is_some() {
            statements.push(tail.to_string());
            self.buffer.clear();
        }

        statements
    }
}

fn block_comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)/\*(!\d*)?(.*?)\*/").expect("valid block comment pattern")
    })
}
