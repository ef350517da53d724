//! MySQL client.
//!
//! `information_schema.columns.column_type` reports integers as `int(11)`,
//! `bigint(20) unsigned` and so on. None of those contain "integer", so
//! MySQL integer columns are quoted like text in generated statements; the
//! server coerces `'5'` back to 5, which keeps the statements equivalent.

use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use sqlx::{
    mysql::{MySqlPoolOptions, MySqlRow},
    types::{Decimal, JsonValue},
    Executor, MySqlPool, Row, Statement,
};

use crate::{
    errors::DbError,
    models::{
        connections::ConnectionConfig,
        rows::ResultTable,
        schema::{ColumnDescriptor, TableSchema},
    },
};

use super::{
    bind_params, bytes_cell, column_names, text_or_null, to_result_table, BoundValue, DbClient,
    Placeholder, Transaction,
};

/// Cells outside the shared decode chain: unsigned integers, DECIMAL, JSON
/// and binary columns.
fn decode_fallback(row: &MySqlRow, index: usize) -> Option<Value> {
    if let Ok(v) = row.try_get::<Option<u64>, _>(index) {
        return Some(v.map(Value::from).unwrap_or(Value::Null));
    }
    if let Ok(v) = row.try_get::<Option<Decimal>, _>(index) {
        return Some(text_or_null(v));
    }
    if let Ok(v) = row.try_get::<Option<JsonValue>, _>(index) {
        return Some(text_or_null(v));
    }
    row.try_get::<Option<Vec<u8>>, _>(index).ok().map(bytes_cell)
}

pub struct MySqlClient {
    pub pool: MySqlPool,
}

impl MySqlClient {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, DbError> {
        // Only bounds SELECT, and MariaDB lacks the variable altogether.
        let set_timeout = format!(
            "SET SESSION max_execution_time = {}",
            config.statement_timeout.as_millis()
        );
        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .after_connect(move |conn, _meta| {
                let set_timeout = set_timeout.clone();
                Box::pin(async move {
                    if let Err(e) = conn.execute(set_timeout.as_str()).await {
                        debug!("server-side statement timeout not set: {}", e);
                    }
                    Ok(())
                })
            })
            .connect(&config.database_url)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl DbClient for MySqlClient {
    async fn query(&self, query: &str) -> Result<ResultTable, DbError> {
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Sqlx)?;

        let columns = match rows.first() {
            Some(row) => column_names(row.columns()),
            // No rows to read names from; ask the prepared statement instead.
            None => match self.pool.prepare(query).await {
                Ok(statement) => column_names(statement.columns()),
                Err(e) => {
                    debug!("could not describe result columns: {}", e);
                    Vec::new()
                }
            },
        };

        Ok(to_result_table(columns, &rows, decode_fallback))
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, DbError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;
        Ok(Box::new(MySqlTransaction { tx }))
    }

    async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        // information_schema columns come back as binary strings on some servers.
        let query = r#"
            SELECT CAST(table_name AS CHAR) AS table_name
            FROM information_schema.tables
            WHERE table_schema = DATABASE()
              AND table_type = 'BASE TABLE'
            ORDER BY table_name
        "#;
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Sqlx)?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("table_name").map_err(DbError::Sqlx))
            .collect()
    }

    async fn describe_table(&self, table_name: &str) -> Result<TableSchema, DbError> {
        let query = r#"
            SELECT CAST(column_name AS CHAR) AS column_name,
                   CAST(column_type AS CHAR) AS column_type,
                   CAST(is_nullable AS CHAR) AS is_nullable,
                   CAST(column_default AS CHAR) AS column_default
            FROM information_schema.columns
            WHERE table_schema = DATABASE()
              AND table_name = ?
            ORDER BY ordinal_position
        "#;
        let rows = sqlx::query(query)
            .bind(table_name)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Sqlx)?;

        let columns = rows
            .iter()
            .map(|row| {
                Ok(ColumnDescriptor {
                    name: row.try_get("column_name")?,
                    declared_type: row.try_get("column_type")?,
                    is_nullable: row.try_get::<String, _>("is_nullable")? == "YES",
                    default: row.try_get("column_default")?,
                    cast_type: None,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;

        if columns.is_empty() {
            return Err(DbError::SchemaNotFound(table_name.to_string()));
        }

        Ok(TableSchema {
            table_name: table_name.to_string(),
            columns,
        })
    }

    fn placeholder(&self) -> Placeholder {
        Placeholder::Question
    }
}

pub struct MySqlTransaction {
    tx: sqlx::Transaction<'static, sqlx::MySql>,
}

#[async_trait]
impl Transaction for MySqlTransaction {
    async fn execute(&mut self, query: &str, params: &[BoundValue]) -> Result<u64, DbError> {
        let result = bind_params(sqlx::query(query), params)
            .execute(&mut *self.tx)
            .await
            .map_err(DbError::Sqlx)?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        self.tx
            .commit()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))
    }
}
