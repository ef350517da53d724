use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    types::{Decimal, JsonValue},
    Executor, PgPool, Row, Statement,
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
    bind_params, column_names, hex_literal, text_or_null, to_result_table, BoundValue, DbClient,
    Placeholder, Transaction,
};

/// Cells outside the shared decode chain. Decimals keep their exact text and
/// scale, so they compare equal when they come back through `$n::numeric`.
fn decode_fallback(row: &PgRow, index: usize) -> Option<Value> {
    if let Ok(v) = row.try_get::<Option<Decimal>, _>(index) {
        return Some(text_or_null(v));
    }
    if let Ok(v) = row.try_get::<Option<JsonValue>, _>(index) {
        return Some(text_or_null(v));
    }
    row.try_get::<Option<Vec<u8>>, _>(index)
        .ok()
        .map(|v| v.map(|bytes| Value::String(hex_literal(&bytes))).unwrap_or(Value::Null))
}

pub struct PostgresClient {
    pub pool: PgPool,
}

impl PostgresClient {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, DbError> {
        // The server cancels anything the gateway has stopped waiting for.
        let set_timeout = format!(
            "SET statement_timeout = {}",
            config.statement_timeout.as_millis()
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .after_connect(move |conn, _meta| {
                let set_timeout = set_timeout.clone();
                Box::pin(async move {
                    conn.execute(set_timeout.as_str()).await?;
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
impl DbClient for PostgresClient {
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
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        let query = r#"
            SELECT table_name::text AS table_name
            FROM information_schema.tables
            WHERE table_schema = current_schema()
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
            SELECT column_name::text AS column_name,
                   data_type::text AS data_type,
                   udt_name::text AS udt_name,
                   is_nullable::text AS is_nullable,
                   column_default::text AS column_default
            FROM information_schema.columns
            WHERE table_schema = current_schema()
              AND table_name = $1
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
                    declared_type: row.try_get("data_type")?,
                    is_nullable: row.try_get::<String, _>("is_nullable")? == "YES",
                    default: row.try_get("column_default")?,
                    cast_type: row.try_get("udt_name")?,
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
        Placeholder::DollarCast
    }
}

pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, sqlx::Postgres>,
}

#[async_trait]
impl Transaction for PostgresTransaction {
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
