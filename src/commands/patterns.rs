//! Recognisers for the statements the shell handles itself.

use regex::Regex;
use std::sync::OnceLock;

/// What the execution queue should do with a statement.
#[derive(Clone, Debug, PartialEq)]
pub enum StatementKind {
    Empty,
    UseDatabase(String),
    Begin,
    Rollback,
    Commit,
    Sql,
}

impl StatementKind {
    pub fn classify(text: &str) -> Self {
        let text = text.trim();

        if text.is_empty() {
            StatementKind::Empty
        } else if let Some(database) = database_switch(text) {
            StatementKind::UseDatabase(database)
        } else if begin_re().is_match(text) {
            StatementKind::Begin
        } else if rollback_re().is_match(text) {
            StatementKind::Rollback
        } else if commit_re().is_match(text) {
            StatementKind::Commit
        } else {
            StatementKind::Sql
        }
    }
}

/// Database named by a `use <db>` / `\c <db>` / `\connect <db>` command, without backticks.
pub fn database_switch(text: &str) -> Option<String> {
    database_switch_re()
        .captures(text.trim())
        .map(|caps| caps[1].trim_matches('`').to_string())
}

fn database_switch_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:use|\\c(?:onnect)?)\s+(`[^`]+`|[^;\s`]+)\s*;?$")
            .expect("valid database switch pattern")
    })
}

fn begin_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:begin(?:\s+work)?|start\s+transaction)\s*;?$")
            .expect("valid begin pattern")
    })
}

fn rollback_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^rollback(?:\s+work)?\s*;?$").expect("valid rollback pattern")
    })
}

fn commit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^commit(?:\s+work)?\s*;?$").expect("valid commit pattern")
    })
}
