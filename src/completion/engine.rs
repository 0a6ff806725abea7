/*!
 * Completion engine
 *
 * Core completion logic responsible for:
 * - Finding the token under completion and how it is quoted
 * - Choosing which keyword sets apply to it
 * - Rendering each match back into the full input line
 */

use super::metadata::KeywordIndex;
use std::collections::BTreeSet;

/// Character that starts a shell meta-command; such lines are not completed.
pub const META_COMMAND_PREFIX: char = '\\';

const QUOTE_CHARS: [char; 3] = ['`', '\'', '"'];

/// The token being completed, split out of the input line.
#[derive(Debug, PartialEq)]
pub struct CompletionTarget<'a> {
    /// Everything before the target, including an opening quote.
    pub head: &'a str,
    /// Target text without its opening quote.
    pub word: &'a str,
    pub quote: Option<char>,
    /// No other token precedes the target.
    pub is_first_token: bool,
}

impl<'a> CompletionTarget<'a> {
    pub fn parse(line: &'a str) -> Option<Self> {
        if line.is_empty() || line.starts_with(META_COMMAND_PREFIX) {
            return None;
        }

        let start = line
            .char_indices()
            .rev()
            .find(|(_, c)| c.is_whitespace())
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);

        let token = &line[start..];
        let quote = token.chars().next().filter(|c| QUOTE_CHARS.contains(c));
        let word_start = start + quote.map(char::len_utf8).unwrap_or(0);

        Some(Self {
            head: &line[..word_start],
            word: &line[word_start..],
            quote,
            is_first_token: line[..start].trim().is_empty(),
        })
    }

    /// Quoted or dotted targets only complete to names, never to keywords.
    pub fn names_only(&self) -> bool {
        self.quote.is_some() || self.word.contains('.')
    }

    fn render(&self, keyword: &str) -> String {
        let mut line = String::with_capacity(self.head.len() + keyword.len() + 1);
        line.push_str(self.head);
        line.push_str(keyword);
        if let Some(quote) = self.quote {
            line.push(quote);
        }
        line
    }
}

/// Full-line completions for `line`, sorted and without duplicates.
pub fn complete_line(line: &str, index: &KeywordIndex) -> Vec<String> {
    let Some(target) = CompletionTarget::parse(line) else {
        return Vec::new();
    };

    let mut sets: Vec<&BTreeSet<String>> = vec![&index.schema_names, &index.object_names];

    if target.is_first_token {
        sets.push(&index.repl_keywords);
    }

    if !target.names_only() {
        sets.push(&index.language_keywords);
    }

    if target.word.contains('.') {
        sets.push(&index.object_dot_names);
    }

    let matches: BTreeSet<&String> = sets
        .into_iter()
        .flat_map(|set| KeywordIndex::prefixed(set, target.word))
        .collect();

    matches
        .into_iter()
        .map(|keyword| target.render(keyword))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod engine_tests;
