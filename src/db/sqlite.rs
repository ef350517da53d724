use std::{path::Path, str::FromStr};

use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Executor, Row, SqlitePool, Statement,
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
    bind_params, bytes_cell, column_names, to_result_table, BoundValue, DbClient, Placeholder,
    Transaction,
};

fn decode_fallback(row: &SqliteRow, index: usize) -> Option<Value> {
    row.try_get::<Option<Vec<u8>>, _>(index).ok().map(bytes_cell)
}

pub struct SqliteClient {
    pub pool: SqlitePool,
}

impl SqliteClient {
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| DbError::Config(e.to_string()))?;

        // Every connection to an in-memory database sees its own empty database.
        let max_connections = if config.database_url.contains(":memory:") {
            1
        } else {
            config.max_connections
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Opens (creating if needed) a database file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl DbClient for SqliteClient {
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
        Ok(Box::new(SqliteTransaction { tx }))
    }

    async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        let query = r#"
            SELECT name
            FROM sqlite_master
            WHERE type = 'table'
              AND name NOT LIKE 'sqlite_%'
            ORDER BY name
        "#;
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Sqlx)?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(DbError::Sqlx))
            .collect()
    }

    async fn describe_table(&self, table_name: &str) -> Result<TableSchema, DbError> {
        let query = r#"
            SELECT name, type, "notnull" AS not_null, dflt_value
            FROM pragma_table_info(?)
            ORDER BY cid
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
                    name: row.try_get("name")?,
                    declared_type: row.try_get("type")?,
                    is_nullable: row.try_get::<i64, _>("not_null")? == 0,
                    default: row.try_get("dflt_value")?,
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

pub struct SqliteTransaction {
    tx: sqlx::Transaction<'static, sqlx::Sqlite>,
}

#[async_trait]
impl Transaction for SqliteTransaction {
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
