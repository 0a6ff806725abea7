//! Session state owned by the execution queue.

use std::fmt;

/// Transaction state machine. There is no terminal state; it lives as long as the session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum TransactionState {
    #[default]
    Idle,
    InTransaction(String),
}

impl TransactionState {
    pub fn id(&self) -> Option<&str> {
        match self {
            TransactionState::Idle => None,
            TransactionState::InTransaction(id) => Some(id),
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Idle => write!(f, "(none)"),
            TransactionState::InTransaction(id) => write!(f, "{}", id),
        }
    }
}

/// Everything later statements depend on: the current database and transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    pub database: Option<String>,
    pub transaction: TransactionState,
}

impl SessionState {
    pub fn new(database: Option<String>) -> Self {
        Self {
            database,
            transaction: TransactionState::Idle,
        }
    }
}
