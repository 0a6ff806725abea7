/*!
 * Line editor helper
 *
 * Wires the completion engine into rustyline: tab completion, inline hints
 * and hint highlighting.
 */

use super::engine::complete_line;
use super::metadata::KeywordStore;
use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::{Highlighter, MatchingBracketHighlighter};
use rustyline::hint::{Hinter, HistoryHinter};
use rustyline::validate::Validator;
use rustyline::Context;
use std::borrow::Cow;

/// Shell helper for rustyline.
pub struct AdaSqlHelper {
    keywords: KeywordStore,
    highlighter: MatchingBracketHighlighter,
    hinter: HistoryHinter,
}

impl AdaSqlHelper {
    pub fn new(keywords: KeywordStore) -> Self {
        Self {
            keywords,
            highlighter: MatchingBracketHighlighter::new(),
            hinter: HistoryHinter::new(),
        }
    }

    fn completions(&self, line: &str) -> Vec<String> {
        // Reads whatever snapshot is current; an in-flight rebuild is not awaited.
        complete_line(line, &self.keywords.snapshot())
    }
}

impl Completer for AdaSqlHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> Result<(usize, Vec<Pair>), ReadlineError> {
        let candidates = self
            .completions(&line[..pos])
            .into_iter()
            .map(|replacement| Pair {
                display: replacement
                    .rsplit(char::is_whitespace)
                    .next()
                    .unwrap_or_default()
                    .to_string(),
                replacement,
            })
            .collect();

        // Completions are whole lines, so they replace everything up to the cursor.
        Ok((0, candidates))
    }
}

impl Hinter for AdaSqlHelper {
    type Hint = String;

    fn hint(&self, line: &str, pos: usize, ctx: &Context<'_>) -> Option<String> {
        if let Some(history_hint) = self.hinter.hint(line, pos, ctx) {
            return Some(history_hint);
        }

        if pos < line.len() || line.trim_end().len() != line.len() {
            return None;
        }

        // Only hint when exactly one completion is left
        match self.completions(line).as_slice() {
            [only] if only.len() > line.len() && only.starts_with(line) => {
                Some(only[line.len()..].to_string())
            }
            _ => None,
        }
    }
}

impl Highlighter for AdaSqlHelper {
    fn highlight_hint<'h>(&self, hint: &'h str) -> Cow<'h, str> {
        Cow::Owned(format!("\x1b[90m{}\x1b[0m", hint))
    }

    fn highlight<'l>(&self, line: &'l str, pos: usize) -> Cow<'l, str> {
        self.highlighter.highlight(line, pos)
    }

    fn highlight_char(&self, line: &str, pos: usize, forced: bool) -> bool {
        self.highlighter.highlight_char(line, pos, forced)
    }
}

// Statement boundaries are decided by the segmenter, not the editor.
impl Validator for AdaSqlHelper {}

impl rustyline::Helper for AdaSqlHelper {}
