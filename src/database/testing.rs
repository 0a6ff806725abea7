//! Scripted in-memory backend for tests.

use super::connection::{DataApi, ExecuteOutput, ExecuteRequest};
use super::error::DataApiError;
use super::value::{ColumnDescriptor, Field};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// One recorded backend call.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Execute {
        sql: String,
        database: Option<String>,
        transaction_id: Option<String>,
    },
    Begin(Option<String>),
    Commit(String),
    Rollback(String),
}

#[derive(Default)]
pub struct ScriptedDataApi {
    responses: HashMap<String, Result<ExecuteOutput, String>>,
    delays: HashMap<String, Duration>,
    fail_transactions: bool,
    fail_commit: bool,
    fail_rollback: bool,
    calls: Mutex<Vec<Call>>,
    transactions_begun: Mutex<u32>,
}

impl ScriptedDataApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, sql: &str, output: ExecuteOutput) -> Self {
        self.responses.insert(sql.to_string(), Ok(output));
        self
    }

    /// Answer a `SHOW ...` style listing with one string column.
    pub fn listing(self, sql: &str, names: &[&str]) -> Self {
        let output = ExecuteOutput {
            records: Some(
                names
                    .iter()
                    .map(|name| vec![Field::String(name.to_string())])
                    .collect(),
            ),
            column_metadata: vec![ColumnDescriptor::new("Name", "VARCHAR")],
            number_of_records_updated: None,
        };
        self.respond(sql, output)
    }

    pub fn fail(mut self, sql: &str, message: &str) -> Self {
        self.responses.insert(sql.to_string(), Err(message.to_string()));
        self
    }

    pub fn delay(mut self, sql: &str, delay: Duration) -> Self {
        self.delays.insert(sql.to_string(), delay);
        self
    }

    pub fn fail_transactions(mut self) -> Self {
        self.fail_transactions = true;
        self
    }

    /// Begin succeeds, commit is refused.
    pub fn fail_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    /// Begin succeeds, rollback is refused.
    pub fn fail_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    fn service_error(message: &str) -> DataApiError {
        DataApiError::Service {
            code: "BadRequestException".into(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl DataApi for ScriptedDataApi {
    async fn execute_statement(
        &self,
        request: ExecuteRequest<'_>,
    ) -> Result<ExecuteOutput, DataApiError> {
        self.calls.lock().push(Call::Execute {
            sql: request.sql.to_string(),
            database: request.database.map(str::to_string),
            transaction_id: request.transaction_id.map(str::to_string),
        });

        if let Some(delay) = self.delays.get(request.sql) {
            tokio::time::sleep(*delay).await;
        }

        match self.responses.get(request.sql) {
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(message)) => Err(Self::service_error(message)),
            None => Ok(ExecuteOutput {
                records: None,
                column_metadata: Vec::new(),
                number_of_records_updated: Some(0),
            }),
        }
    }

    async fn begin_transaction(&self, database: Option<&str>) -> Result<String, DataApiError> {
        self.calls
            .lock()
            .push(Call::Begin(database.map(str::to_string)));
        if self.fail_transactions {
            return Err(Self::service_error("transactions unavailable"));
        }

        let mut begun = self.transactions_begun.lock();
        *begun += 1;
        Ok(format!("tx-{}", *begun))
    }

    async fn commit_transaction(&self, transaction_id: &str) -> Result<(), DataApiError> {
        self.calls
            .lock()
            .push(Call::Commit(transaction_id.to_string()));
        if self.fail_transactions || self.fail_commit {
            return Err(Self::service_error("transactions unavailable"));
        }
        Ok(())
    }

    async fn rollback_transaction(&self, transaction_id: &str) -> Result<(), DataApiError> {
        self.calls
            .lock()
            .push(Call::Rollback(transaction_id.to_string()));
        if self.fail_transactions || self.fail_rollback {
            return Err(Self::service_error("transactions unavailable"));
        }
        Ok(())
    }
}
