use super::patterns::StatementKind;
use super::transaction::{SessionState, TransactionState};
use crate::completion::KeywordStore;
use crate::database::{hydrate_records, DataApi, DataApiError, ExecuteRequest, HydratedRow, HydrationError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Called exactly once with the statement's outcome.
pub type ResultHandle = Box<dyn FnOnce(StatementOutcome) + Send + 'static>;

/// A complete statement waiting in the queue.
pub struct Statement {
    pub text: String,
    respond: ResultHandle,
}

/// What a statement produced, echoed with its own text.
#[derive(Debug)]
pub struct StatementOutcome {
    pub statement: String,
    pub elapsed: Duration,
    pub result: Result<StatementOutput, StatementError>,
}

#[derive(Debug, PartialEq)]
pub enum StatementOutput {
    /// Nothing to run.
    Empty,
    /// Shell status such as a database switch or a transaction change.
    Message(String),
    /// Transaction misuse; reported but never treated as a failure.
    Notice(String),
    Records(Vec<HydratedRow>),
    Affected(i64),
}

#[derive(Debug, Error)]
pub enum StatementError {
    #[error("Failed to begin transaction: {0}")]
    Begin(#[source] DataApiError),

    #[error("Failed to commit transaction '{id}': {source}")]
    Commit { id: String, source: DataApiError },

    #[error("Failed to rollback transaction '{id}': {source}")]
    Rollback { id: String, source: DataApiError },

    #[error("Failed to execute statement: {0}")]
    Execute(#[source] DataApiError),

    #[error("Failed to read results: {0}")]
    Hydrate(#[source] HydrationError),
}

/// What a failed statement does to the rest of the queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Report and move on to the next statement (interactive sessions).
    Continue,
    /// Report and stop draining (scripts piped into the shell).
    Abort,
}

/// How the processing loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueExit {
    /// Every producer hung up and every statement ran.
    Drained,
    /// A statement failed under [`FailurePolicy::Abort`].
    Aborted,
}

/// Producer side of the statement queue. Submitting never waits.
#[derive(Clone)]
pub struct QueryQueue {
    tx: mpsc::UnboundedSender<Statement>,
}

impl QueryQueue {
    pub fn submit<F>(&self, text: impl Into<String>, respond: F) -> anyhow::Result<()>
    where
        F: FnOnce(StatementOutcome) + Send + 'static,
    {
        let statement = Statement {
            text: text.into(),
            respond: Box::new(respond),
        };
        self.tx
            .send(statement)
            .map_err(|_| anyhow::anyhow!("statement queue is closed"))
    }
}

/// Consumer side: runs statements one at a time, in arrival order.
///
/// The executor is the only writer of the session state; everyone else sees
/// it through [`QueryExecutor::subscribe`].
pub struct QueryExecutor {
    api: Arc<dyn DataApi>,
    keywords: KeywordStore,
    state: SessionState,
    published: watch::Sender<SessionState>,
    policy: FailurePolicy,
}

impl QueryExecutor {
    pub fn new(
        api: Arc<dyn DataApi>,
        keywords: KeywordStore,
        database: Option<String>,
        policy: FailurePolicy,
    ) -> Self {
        let state = SessionState::new(database);
        let (published, _) = watch::channel(state.clone());
        Self {
            api,
            keywords,
            state,
            published,
            policy,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.published.subscribe()
    }

    /// Start the processing loop on the runtime.
    pub fn spawn(self) -> (QueryQueue, JoinHandle<QueueExit>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(self.run(rx));
        (QueryQueue { tx }, handle)
    }

    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Statement>) -> QueueExit {
        while let Some(Statement { text, respond }) = rx.recv().await {
            let start_time = Instant::now();
            let result = self.execute(&text).await;
            let failed = result.is_err();

            // The outcome is delivered before the next statement is taken off the queue.
            respond(StatementOutcome {
                statement: text,
                elapsed: start_time.elapsed(),
                result,
            });

            if failed && self.policy == FailurePolicy::Abort {
                info!("stopping after failed statement");
                return QueueExit::Aborted;
            }
        }

        QueueExit::Drained
    }

    /// Run one statement against the session.
    pub async fn execute(&mut self, text: &str) -> Result<StatementOutput, StatementError> {
        let kind = StatementKind::classify(text);
        debug!(?kind, "dequeued statement");

        match kind {
            StatementKind::Empty => Ok(StatementOutput::Empty),
            StatementKind::UseDatabase(database) => Ok(self.use_database(database)),
            StatementKind::Begin => self.begin().await,
            StatementKind::Rollback => self.rollback().await,
            StatementKind::Commit => self.commit().await,
            StatementKind::Sql => self.execute_sql(text.trim()).await,
        }
    }

    fn use_database(&mut self, database: String) -> StatementOutput {
        self.state.database = Some(database.clone());
        self.publish();

        self.keywords
            .spawn_refresh(self.api.clone(), Some(database.clone()));

        StatementOutput::Message(format!("Now using database {}", database))
    }

    async fn begin(&mut self) -> Result<StatementOutput, StatementError> {
        if let Some(id) = self.state.transaction.id() {
            return Ok(StatementOutput::Notice(format!(
                "Transaction '{}' currently in progress, cannot create a new one",
                id
            )));
        }

        let id = self
            .api
            .begin_transaction(self.state.database.as_deref())
            .await
            .map_err(StatementError::Begin)?;

        self.state.transaction = TransactionState::InTransaction(id.clone());
        self.publish();

        Ok(StatementOutput::Message(format!("Transaction '{}' begun", id)))
    }

    async fn rollback(&mut self) -> Result<StatementOutput, StatementError> {
        let Some(id) = self.state.transaction.id().map(str::to_string) else {
            return Ok(no_transaction());
        };

        self.api
            .rollback_transaction(&id)
            .await
            .map_err(|source| StatementError::Rollback {
                id: id.clone(),
                source,
            })?;

        self.state.transaction = TransactionState::Idle;
        self.publish();

        Ok(StatementOutput::Message(format!(
            "Transaction '{}' rolled back",
            id
        )))
    }

    async fn commit(&mut self) -> Result<StatementOutput, StatementError> {
        let Some(id) = self.state.transaction.id().map(str::to_string) else {
            return Ok(no_transaction());
        };

        self.api
            .commit_transaction(&id)
            .await
            .map_err(|source| StatementError::Commit {
                id: id.clone(),
                source,
            })?;

        self.state.transaction = TransactionState::Idle;
        self.publish();

        Ok(StatementOutput::Message(format!(
            "Transaction '{}' committed",
            id
        )))
    }

    async fn execute_sql(&mut self, sql: &str) -> Result<StatementOutput, StatementError> {
        let request = ExecuteRequest::new(sql)
            .database(self.state.database.as_deref())
            .transaction(self.state.transaction.id())
            .with_metadata();

        let output = self
            .api
            .execute_statement(request)
            .await
            .map_err(StatementError::Execute)?;

        match (output.records, output.number_of_records_updated) {
            (Some(records), _) => hydrate_records(&records, &output.column_metadata)
                .map(StatementOutput::Records)
                .map_err(StatementError::Hydrate),
            (None, Some(affected)) => Ok(StatementOutput::Affected(affected)),
            (None, None) => Ok(StatementOutput::Empty),
        }
    }

    fn publish(&self) {
        self.published.send_replace(self.state.clone());
    }
}

fn no_transaction() -> StatementOutput {
    StatementOutput::Notice("No transaction currently in progress".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::testing::{Call, ScriptedDataApi};
    use crate::database::connection::ExecuteOutput;
    use crate::database::value::{ColumnDescriptor, Field, Value};
    use parking_lot::Mutex;

    struct Run {
        outcomes: Vec<StatementOutcome>,
        exit: QueueExit,
        state: SessionState,
    }

    async fn run_statements(
        api: Arc<ScriptedDataApi>,
        policy: FailurePolicy,
        statements: &[&str],
    ) -> Run {
        let dyn_api: Arc<dyn DataApi> = api;
        let executor = QueryExecutor::new(dyn_api, KeywordStore::new(), None, policy);
        let session = executor.subscribe();
        let (queue, handle) = executor.spawn();

        let outcomes = Arc::new(Mutex::new(Vec::new()));
        for statement in statements {
            let outcomes = outcomes.clone();
            queue
                .submit(*statement, move |outcome| outcomes.lock().push(outcome))
                .unwrap();
        }
        drop(queue);

        let exit = handle.await.unwrap();
        let outcomes = std::mem::take(&mut *outcomes.lock());
        let state = session.borrow().clone();
        Run {
            outcomes,
            exit,
            state,
        }
    }

    fn executed_sql(api: &ScriptedDataApi) -> Vec<(String, Option<String>, Option<String>)> {
        api.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Execute {
                    sql,
                    database,
                    transaction_id,
                } if !sql.starts_with("show ") => Some((sql, database, transaction_id)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_results_arrive_in_submission_order() {
        let api = Arc::new(
            ScriptedDataApi::new()
                .delay("SELECT 'a'", Duration::from_millis(10))
                .delay("SELECT 'b'", Duration::from_millis(60)),
        );

        let run = run_statements(
            api.clone(),
            FailurePolicy::Continue,
            &["SELECT 'a'", "SELECT 'b'", "SELECT 'c'"],
        )
        .await;

        let order: Vec<&str> = run.outcomes.iter().map(|o| o.statement.as_str()).collect();
        assert_eq!(order, vec!["SELECT 'a'", "SELECT 'b'", "SELECT 'c'"]);
        assert!(run.outcomes[1].elapsed >= Duration::from_millis(60));

        let calls: Vec<String> = executed_sql(&api).into_iter().map(|(sql, _, _)| sql).collect();
        assert_eq!(calls, vec!["SELECT 'a'", "SELECT 'b'", "SELECT 'c'"]);
        assert_eq!(run.exit, QueueExit::Drained);
    }

    #[tokio::test]
    async fn test_second_begin_keeps_first_transaction() {
        let api = Arc::new(ScriptedDataApi::new());
        let run = run_statements(
            api.clone(),
            FailurePolicy::Continue,
            &["BEGIN", "begin;", "SELECT 1"],
        )
        .await;

        assert_eq!(
            run.outcomes[0].result.as_ref().unwrap(),
            &StatementOutput::Message("Transaction 'tx-1' begun".into())
        );
        assert_eq!(
            run.outcomes[1].result.as_ref().unwrap(),
            &StatementOutput::Notice(
                "Transaction 'tx-1' currently in progress, cannot create a new one".into()
            )
        );
        assert_eq!(
            executed_sql(&api),
            vec![("SELECT 1".to_string(), None, Some("tx-1".to_string()))]
        );
        assert_eq!(
            run.state.transaction,
            TransactionState::InTransaction("tx-1".into())
        );
        assert_eq!(api.calls().iter().filter(|c| matches!(c, Call::Begin(_))).count(), 1);
    }

    #[tokio::test]
    async fn test_rollback_without_transaction() {
        let api = Arc::new(ScriptedDataApi::new());
        let run = run_statements(api.clone(), FailurePolicy::Abort, &["ROLLBACK", "COMMIT"]).await;

        for outcome in &run.outcomes {
            assert_eq!(
                outcome.result.as_ref().unwrap(),
                &StatementOutput::Notice("No transaction currently in progress".into())
            );
        }
        assert_eq!(run.state.transaction, TransactionState::Idle);
        assert_eq!(run.exit, QueueExit::Drained);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_commit_and_rollback_end_transaction() {
        let api = Arc::new(ScriptedDataApi::new());
        let run = run_statements(
            api.clone(),
            FailurePolicy::Continue,
            &["BEGIN", "INSERT INTO t VALUES (1)", "COMMIT", "SELECT 1", "BEGIN", "ROLLBACK"],
        )
        .await;

        assert_eq!(
            run.outcomes[2].result.as_ref().unwrap(),
            &StatementOutput::Message("Transaction 'tx-1' committed".into())
        );
        assert_eq!(
            run.outcomes[5].result.as_ref().unwrap(),
            &StatementOutput::Message("Transaction 'tx-2' rolled back".into())
        );
        assert_eq!(
            executed_sql(&api),
            vec![
                ("INSERT INTO t VALUES (1)".to_string(), None, Some("tx-1".to_string())),
                ("SELECT 1".to_string(), None, None),
            ]
        );
        assert_eq!(run.state.transaction, TransactionState::Idle);
        assert!(api.calls().contains(&Call::Commit("tx-1".into())));
        assert!(api.calls().contains(&Call::Rollback("tx-2".into())));
    }

    #[tokio::test]
    async fn test_transaction_failures_leave_state() {
        let api = Arc::new(ScriptedDataApi::new().fail_transactions());
        let run = run_statements(api, FailurePolicy::Continue, &["BEGIN", "SELECT 1"]).await;

        let err = run.outcomes[0].result.as_ref().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to begin transaction: transactions unavailable (BadRequestException)"
        );
        assert!(run.outcomes[1].result.is_ok());
        assert_eq!(run.state.transaction, TransactionState::Idle);
    }

    #[tokio::test]
    async fn test_failed_commit_keeps_transaction() {
        let api = Arc::new(ScriptedDataApi::new().fail_commit());
        let run = run_statements(
            api.clone(),
            FailurePolicy::Continue,
            &["BEGIN", "COMMIT", "SELECT 1"],
        )
        .await;

        assert!(matches!(
            &run.outcomes[1].result,
            Err(StatementError::Commit { id, .. }) if id == "tx-1"
        ));
        assert_eq!(
            run.outcomes[1].result.as_ref().unwrap_err().to_string(),
            "Failed to commit transaction 'tx-1': transactions unavailable (BadRequestException)"
        );
        assert_eq!(
            executed_sql(&api),
            vec![("SELECT 1".to_string(), None, Some("tx-1".to_string()))]
        );
        assert_eq!(
            run.state.transaction,
            TransactionState::InTransaction("tx-1".into())
        );
    }

    #[tokio::test]
    async fn test_failed_rollback_keeps_transaction() {
        let api = Arc::new(ScriptedDataApi::new().fail_rollback());
        let run = run_statements(
            api.clone(),
            FailurePolicy::Continue,
            &["BEGIN", "ROLLBACK", "SELECT 1", "COMMIT"],
        )
        .await;

        assert!(matches!(
            &run.outcomes[1].result,
            Err(StatementError::Rollback { id, .. }) if id == "tx-1"
        ));
        assert_eq!(
            executed_sql(&api),
            vec![("SELECT 1".to_string(), None, Some("tx-1".to_string()))]
        );
        assert_eq!(
            run.outcomes[3].result.as_ref().unwrap(),
            &StatementOutput::Message("Transaction 'tx-1' committed".into())
        );
        assert_eq!(run.state.transaction, TransactionState::Idle);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_interactive_queue() {
        let api = Arc::new(ScriptedDataApi::new().fail("SELECT nope", "Unknown column 'nope'"));
        let run = run_statements(
            api,
            FailurePolicy::Continue,
            &["BEGIN", "SELECT nope", "SELECT 1"],
        )
        .await;

        assert_eq!(run.outcomes.len(), 3);
        assert_eq!(
            run.outcomes[1].result.as_ref().unwrap_err().to_string(),
            "Failed to execute statement: Unknown column 'nope' (BadRequestException)"
        );
        assert!(run.outcomes[2].result.is_ok());
        assert_eq!(run.state.transaction.id(), Some("tx-1"));
        assert_eq!(run.exit, QueueExit::Drained);
    }

    #[tokio::test]
    async fn test_failure_aborts_script_queue() {
        let api = Arc::new(ScriptedDataApi::new().fail("SELECT nope", "Unknown column 'nope'"));
        let run = run_statements(
            api.clone(),
            FailurePolicy::Abort,
            &["SELECT 1", "SELECT nope", "SELECT 2"],
        )
        .await;

        assert_eq!(run.outcomes.len(), 2);
        assert!(run.outcomes[1].result.is_err());
        assert_eq!(run.exit, QueueExit::Aborted);
        assert_eq!(executed_sql(&api).len(), 2);
    }

    #[tokio::test]
    async fn test_use_database_applies_to_later_statements() {
        let api = Arc::new(ScriptedDataApi::new().listing("show tables", &["users"]));
        let run = run_statements(
            api.clone(),
            FailurePolicy::Continue,
            &["BEGIN", "use shop", "SELECT 1"],
        )
        .await;

        assert_eq!(
            run.outcomes[1].result.as_ref().unwrap(),
            &StatementOutput::Message("Now using database shop".into())
        );
        assert_eq!(
            executed_sql(&api),
            vec![(
                "SELECT 1".to_string(),
                Some("shop".to_string()),
                Some("tx-1".to_string())
            )]
        );
        assert_eq!(run.state.database.as_deref(), Some("shop"));
        assert_eq!(run.state.transaction.id(), Some("tx-1"));
    }

    #[tokio::test]
    async fn test_use_database_refreshes_keywords() {
        let api = Arc::new(ScriptedDataApi::new().listing("show tables", &["users"]));
        let keywords = KeywordStore::new();
        let dyn_api: Arc<dyn DataApi> = api;
        let mut executor =
            QueryExecutor::new(dyn_api, keywords.clone(), None, FailurePolicy::Continue);

        executor.execute("\\c shop").await.unwrap();

        for _ in 0..100 {
            if keywords.snapshot().object_names.contains("users") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(keywords.snapshot().object_names.contains("users"));
    }

    #[tokio::test]
    async fn test_records_are_hydrated() {
        let output = ExecuteOutput {
            records: Some(vec![vec![Field::Long(7), Field::String("2024-01-01 00:00:00".into())]]),
            column_metadata: vec![
                ColumnDescriptor::new("id", "INT"),
                ColumnDescriptor::new("created", "DATETIME"),
            ],
            number_of_records_updated: None,
        };
        let api = Arc::new(
            ScriptedDataApi::new()
                .respond("SELECT id, created FROM t", output)
                .respond(
                    "DELETE FROM t",
                    ExecuteOutput {
                        number_of_records_updated: Some(3),
                        ..Default::default()
                    },
                ),
        );

        let run = run_statements(
            api,
            FailurePolicy::Continue,
            &["SELECT id, created FROM t", "DELETE FROM t", "   "],
        )
        .await;

        match run.outcomes[0].result.as_ref().unwrap() {
            StatementOutput::Records(rows) => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].get("id"), Some(&Value::Long(7)));
                assert!(matches!(rows[0].get("created"), Some(Value::Timestamp(_))));
            }
            other => panic!("unexpected output {:?}", other),
        }
        assert_eq!(
            run.outcomes[1].result.as_ref().unwrap(),
            &StatementOutput::Affected(3)
        );
        assert_eq!(run.outcomes[2].result.as_ref().unwrap(), &StatementOutput::Empty);
    }

    #[tokio::test]
    async fn test_malformed_rows_fail_the_statement() {
        let output = ExecuteOutput {
            records: Some(vec![vec![Field::Long(1), Field::Long(2)]]),
            column_metadata: vec![ColumnDescriptor::new("id", "INT")],
            number_of_records_updated: None,
        };
        let api = Arc::new(ScriptedDataApi::new().respond("SELECT id FROM t", output));
        let run = run_statements(api, FailurePolicy::Continue, &["SELECT id FROM t"]).await;

        assert!(matches!(
            run.outcomes[0].result,
            Err(StatementError::Hydrate(HydrationError::MissingColumn { fields: 2, columns: 1 }))
        ));
    }

    #[tokio::test]
    async fn test_zero_dates_are_shown() {
        let output = ExecuteOutput {
            records: Some(vec![vec![Field::String("0000-00-00 00:00:00".into())]]),
            column_metadata: vec![ColumnDescriptor::new("shipped_at", "DATETIME")],
            number_of_records_updated: None,
        };
        let api = Arc::new(ScriptedDataApi::new().respond("SELECT shipped_at FROM t", output));
        let run = run_statements(api, FailurePolicy::Abort, &["SELECT shipped_at FROM t"]).await;

        match run.outcomes[0].result.as_ref().unwrap() {
            StatementOutput::Records(rows) => assert_eq!(
                rows[0].get("shipped_at"),
                Some(&Value::String("0000-00-00 00:00:00".into()))
            ),
            other => panic!("unexpected output {:?}", other),
        }
        assert_eq!(run.exit, QueueExit::Drained);
    }
}
