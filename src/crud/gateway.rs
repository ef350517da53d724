use std::{fmt, sync::Arc, time::Duration};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::{
    crud::statements::SqlStatement,
    db::{BoundValue, DbClient},
    errors::DbError,
    models::{connections::ConnectionConfig, rows::ResultTable},
};

/// Outcome handed to the presentation layer. Engine errors only ever
/// appear here as a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionResult {
    Affected(u64),
    Table(ResultTable),
    Failure(String),
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, ExecutionResult::Failure(_))
    }
}

impl From<DbError> for ExecutionResult {
    fn from(e: DbError) -> Self {
        ExecutionResult::Failure(e.to_string())
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionResult::Affected(rows) => write!(f, "SUCCESS -> affected {} rows", rows),
            ExecutionResult::Table(table) => write!(f, "SUCCESS -> returned {} rows", table.len()),
            ExecutionResult::Failure(message) => write!(f, "FAILED -> {}", message),
        }
    }
}

const READ_KEYWORDS: &[&str] = &[
    "SELECT", "WITH", "SHOW", "PRAGMA", "EXPLAIN", "VALUES", "DESCRIBE",
];

/// Whether free-form SQL belongs on the read path. A `WITH` that ends in a
/// data-modifying statement still counts as a read.
pub fn returns_rows(sql: &str) -> bool {
    let first = sql
        .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();
    READ_KEYWORDS.contains(&first.as_str())
}

/// Runs reads directly and every write in its own transaction.
#[derive(Clone)]
pub struct ExecutionGateway {
    client: Arc<dyn DbClient>,
    statement_timeout: Duration,
    bind_parameters: bool,
}

impl ExecutionGateway {
    pub fn new(client: Arc<dyn DbClient>, config: &ConnectionConfig) -> Self {
        Self {
            client,
            statement_timeout: config.statement_timeout,
            bind_parameters: config.bind_parameters,
        }
    }

    pub async fn run_query(&self, sql: &str) -> ExecutionResult {
        match self.fetch(sql).await {
            Ok(table) => ExecutionResult::Table(table),
            Err(e) => e.into(),
        }
    }

    /// Read path without the result wrapping, for callers that need the rows.
    pub async fn fetch(&self, sql: &str) -> Result<ResultTable, DbError> {
        debug!("query: {}", sql);
        match timeout(self.statement_timeout, self.client.query(sql)).await {
            Ok(Ok(table)) => Ok(table),
            Ok(Err(e)) => {
                warn!("query failed: {}", e);
                Err(e)
            }
            Err(_) => {
                warn!("query timed out: {}", sql);
                Err(DbError::Timeout(self.statement_timeout))
            }
        }
    }

    pub async fn run_command(&self, sql: &str) -> ExecutionResult {
        self.execute(sql, &[]).await
    }

    /// Executes builder output, with placeholders unless literal mode is configured.
    pub async fn run_statement(&self, statement: &SqlStatement) -> ExecutionResult {
        if self.bind_parameters {
            let sql = statement.to_parameterized(self.client.placeholder());
            debug!("statement: {} (bound as {})", statement.as_sql(), sql);
            self.execute(&sql, &statement.params()).await
        } else {
            self.execute(statement.as_sql(), &[]).await
        }
    }

    async fn execute(&self, sql: &str, params: &[BoundValue]) -> ExecutionResult {
        match self.execute_in_transaction(sql, params).await {
            Ok(rows) => ExecutionResult::Affected(rows),
            Err(e) => e.into(),
        }
    }

    async fn execute_in_transaction(&self, sql: &str, params: &[BoundValue]) -> Result<u64, DbError> {
        debug!("command: {}", sql);
        let mut tx = self.client.begin_transaction().await?;

        let outcome = match timeout(self.statement_timeout, tx.execute(sql, params)).await {
            Ok(result) => result,
            Err(_) => Err(DbError::Timeout(self.statement_timeout)),
        };

        match outcome {
            Ok(rows) => {
                tx.commit().await?;
                info!("committed, {} rows affected", rows);
                Ok(rows)
            }
            Err(e) => {
                warn!("command failed, rolling back: {}", e);
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("rollback failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crud::statements::build_insert,
        db::{
            mock::{MockDbClient, MockTransaction},
            Placeholder, Transaction,
        },
        models::schema::{ColumnDescriptor, TableSchema},
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::{
        future,
        sync::atomic::{AtomicUsize, Ordering},
    };

    /// Engine stand-in whose statements never complete.
    #[derive(Default)]
    struct StalledClient {
        commits: Arc<AtomicUsize>,
        rollbacks: Arc<AtomicUsize>,
    }

    struct StalledTransaction {
        commits: Arc<AtomicUsize>,
        rollbacks: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl DbClient for StalledClient {
        async fn query(&self, _query: &str) -> Result<ResultTable, DbError> {
            future::pending().await
        }

        async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, DbError> {
            Ok(Box::new(StalledTransaction {
                commits: self.commits.clone(),
                rollbacks: self.rollbacks.clone(),
            }))
        }

        async fn list_tables(&self) -> Result<Vec<String>, DbError> {
            Ok(Vec::new())
        }

        async fn describe_table(&self, table_name: &str) -> Result<TableSchema, DbError> {
            Err(DbError::SchemaNotFound(table_name.to_string()))
        }

        fn placeholder(&self) -> Placeholder {
            Placeholder::Question
        }
    }

    #[async_trait]
    impl Transaction for StalledTransaction {
        async fn execute(&mut self, _query: &str, _params: &[BoundValue]) -> Result<u64, DbError> {
            future::pending().await
        }

        async fn commit(self: Box<Self>) -> Result<(), DbError> {
            self.commits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<(), DbError> {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config(bind_parameters: bool) -> ConnectionConfig {
        let mut config = ConnectionConfig::new("sqlite::memory:").unwrap();
        config.bind_parameters = bind_parameters;
        config
    }

    fn client_with(tx: MockTransaction) -> MockDbClient {
        let mut mock_db = MockDbClient::new();
        mock_db
            .expect_begin_transaction()
            .times(1)
            .return_once(move || Ok(Box::new(tx)));
        mock_db.expect_placeholder().return_const(Placeholder::Question);
        mock_db
    }

    #[tokio::test]
    async fn test_command_commits_on_success() {
        let mut mock_tx = MockTransaction::new();
        mock_tx.expect_execute().times(1).returning(|sql, params| {
            assert_eq!(sql, "DELETE FROM users");
            assert!(params.is_empty());
            Ok(3)
        });
        mock_tx.expect_commit().times(1).returning(|| Ok(()));
        mock_tx.expect_rollback().never();

        let gateway = ExecutionGateway::new(Arc::new(client_with(mock_tx)), &config(true));
        let result = gateway.run_command("DELETE FROM users").await;

        assert_eq!(result, ExecutionResult::Affected(3));
        assert_eq!(result.to_string(), "SUCCESS -> affected 3 rows");
    }

    #[tokio::test]
    async fn test_command_rolls_back_on_failure() {
        let mut mock_tx = MockTransaction::new();
        mock_tx
            .expect_execute()
            .returning(|_, _| Err(DbError::General("duplicate key".to_string())));
        mock_tx.expect_commit().never();
        mock_tx.expect_rollback().times(1).returning(|| Ok(()));

        let gateway = ExecutionGateway::new(Arc::new(client_with(mock_tx)), &config(true));
        let result = gateway.run_command("INSERT INTO users VALUES (1)").await;

        assert!(!result.is_success());
        assert_eq!(result.to_string(), "FAILED -> Error: duplicate key");
    }

    #[tokio::test]
    async fn test_failed_rollback_still_reports_original_error() {
        let mut mock_tx = MockTransaction::new();
        mock_tx
            .expect_execute()
            .returning(|_, _| Err(DbError::General("syntax error".to_string())));
        mock_tx
            .expect_rollback()
            .times(1)
            .returning(|| Err(DbError::Transaction("connection lost".to_string())));

        let gateway = ExecutionGateway::new(Arc::new(client_with(mock_tx)), &config(true));
        let result = gateway.run_command("UPDATE").await;

        assert_eq!(result, ExecutionResult::Failure("Error: syntax error".to_string()));
    }

    #[tokio::test]
    async fn test_statement_runs_with_bound_parameters() {
        let schema = TableSchema {
            table_name: "t".to_string(),
            columns: vec![
                ColumnDescriptor::new("id", "INTEGER"),
                ColumnDescriptor::new("label", "TEXT"),
            ],
        };
        let values = json!({"id": "5", "label": "x"});
        let statement = build_insert("t", &schema, values.as_object().unwrap()).unwrap();

        let mut mock_tx = MockTransaction::new();
        mock_tx.expect_execute().times(1).returning(|sql, params| {
            assert_eq!(sql, "INSERT INTO t (id, label) VALUES (?, ?)");
            assert_eq!(
                params,
                &[BoundValue::Integer(5), BoundValue::Text("x".to_string())][..]
            );
            Ok(1)
        });
        mock_tx.expect_commit().returning(|| Ok(()));

        let gateway = ExecutionGateway::new(Arc::new(client_with(mock_tx)), &config(true));
        assert_eq!(gateway.run_statement(&statement).await, ExecutionResult::Affected(1));
    }

    #[tokio::test]
    async fn test_statement_runs_literally_when_binding_is_off() {
        let schema = TableSchema {
            table_name: "t".to_string(),
            columns: vec![ColumnDescriptor::new("label", "TEXT")],
        };
        let values = json!({"label": "x"});
        let statement = build_insert("t", &schema, values.as_object().unwrap()).unwrap();

        let mut mock_tx = MockTransaction::new();
        mock_tx.expect_execute().times(1).returning(|sql, params| {
            assert_eq!(sql, "INSERT INTO t (label) VALUES ('x')");
            assert!(params.is_empty());
            Ok(1)
        });
        mock_tx.expect_commit().returning(|| Ok(()));

        let gateway = ExecutionGateway::new(Arc::new(client_with(mock_tx)), &config(false));
        assert!(gateway.run_statement(&statement).await.is_success());
    }

    #[tokio::test]
    async fn test_query_returns_table_or_failure() {
        let mut mock_db = MockDbClient::new();
        mock_db
            .expect_query()
            .withf(|sql| sql == "SELECT * FROM users")
            .returning(|_| {
                Ok(ResultTable {
                    columns: vec!["name".to_string()],
                    rows: vec![vec![json!("Alice")]],
                })
            });
        mock_db
            .expect_query()
            .withf(|sql| sql != "SELECT * FROM users")
            .returning(|_| Err(DbError::General("no such table".to_string())));

        let gateway = ExecutionGateway::new(Arc::new(mock_db), &config(true));

        match gateway.run_query("SELECT * FROM users").await {
            ExecutionResult::Table(table) => assert_eq!(table.rows[0][0], json!("Alice")),
            other => panic!("expected table, got {:?}", other),
        }
        assert_eq!(
            gateway.run_query("SELECT * FROM nope").await.to_string(),
            "FAILED -> Error: no such table"
        );
    }

    #[test]
    fn test_returns_rows_by_leading_keyword() {
        for sql in [
            "SELECT 1",
            "  select * from t",
            "WITH x AS (SELECT 1) SELECT * FROM x",
            "SHOW TABLES",
            "PRAGMA table_info(t)",
            "explain select 1",
            "(SELECT 1)",
        ] {
            assert!(returns_rows(sql), "{}", sql);
        }
        for sql in [
            "INSERT INTO t VALUES (1)",
            "UPDATE t SET a = 1",
            "DELETE FROM t",
            "",
            "SELECTED",
        ] {
            assert!(!returns_rows(sql), "{}", sql);
        }
    }

    #[tokio::test]
    async fn test_timed_out_command_is_rolled_back() {
        let client = StalledClient::default();
        let (commits, rollbacks) = (client.commits.clone(), client.rollbacks.clone());
        let mut config = config(true);
        config.statement_timeout = Duration::from_millis(20);

        let gateway = ExecutionGateway::new(Arc::new(client), &config);
        let result = gateway.run_command("UPDATE users SET name = 'x'").await;

        match &result {
            ExecutionResult::Failure(message) => assert!(message.contains("timed out")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(rollbacks.load(Ordering::SeqCst), 1);
        assert_eq!(commits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timed_out_query_is_a_failure() {
        let mut config = config(true);
        config.statement_timeout = Duration::from_millis(20);

        let gateway = ExecutionGateway::new(Arc::new(StalledClient::default()), &config);
        let result = gateway.run_query("SELECT * FROM users").await;

        assert_eq!(
            result.to_string(),
            format!("FAILED -> {}", DbError::Timeout(Duration::from_millis(20)))
        );
        assert!(result.to_string().contains("timed out"));
    }
}
