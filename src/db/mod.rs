use std::sync::Arc;

use async_trait::async_trait;
use log::info;
use serde_json::Value;
use sqlx::{
    query::Query,
    types::{
        chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc},
        Uuid,
    },
    Column, ColumnIndex, Database, Decode, Encode, Row, Type,
};

use crate::{
    errors::DbError,
    models::{
        connections::{ConnectionConfig, DbType},
        rows::ResultTable,
        schema::TableSchema,
    },
};

pub mod mysql;
pub mod postgres;
pub mod sqlite;

/// A value bound to a statement placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
}

/// How an engine spells positional placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// `?` (MySQL, SQLite).
    Question,
    /// `$1::type` (PostgreSQL); the cast lets text parameters reach any column type.
    DollarCast,
}

#[async_trait]
pub trait DbClient: Send + Sync {
    async fn query(&self, query: &str) -> Result<ResultTable, DbError>;
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>, DbError>;
    async fn list_tables(&self) -> Result<Vec<String>, DbError>;
    async fn describe_table(&self, table_name: &str) -> Result<TableSchema, DbError>;
    fn placeholder(&self) -> Placeholder;
}

#[async_trait]
pub trait Transaction: Send {
    /// Runs one statement and returns the number of affected rows.
    async fn execute(&mut self, query: &str, params: &[BoundValue]) -> Result<u64, DbError>;
    async fn commit(self: Box<Self>) -> Result<(), DbError>;
    async fn rollback(self: Box<Self>) -> Result<(), DbError>;
}

pub async fn connect(config: &ConnectionConfig) -> Result<Arc<dyn DbClient>, DbError> {
    let client: Arc<dyn DbClient> = match config.db_type {
        DbType::Postgres => Arc::new(postgres::PostgresClient::connect(config).await?),
        DbType::MySql => Arc::new(mysql::MySqlClient::connect(config).await?),
        DbType::Sqlite => Arc::new(sqlite::SqliteClient::connect(config).await?),
    };
    info!("connected to {:?} database", config.db_type);
    Ok(client)
}

pub(crate) fn bind_params<'q, DB>(
    mut query: Query<'q, DB, <DB as Database>::Arguments<'q>>,
    params: &'q [BoundValue],
) -> Query<'q, DB, <DB as Database>::Arguments<'q>>
where
    DB: Database,
    i64: Encode<'q, DB> + Type<DB>,
    f64: Encode<'q, DB> + Type<DB>,
    &'q str: Encode<'q, DB> + Type<DB>,
    Option<&'q str>: Encode<'q, DB> + Type<DB>,
{
    for param in params {
        query = match param {
            BoundValue::Null => query.bind(None::<&str>),
            BoundValue::Integer(i) => query.bind(*i),
            BoundValue::Float(f) => query.bind(*f),
            BoundValue::Text(s) => query.bind(s.as_str()),
        };
    }
    query
}

pub(crate) fn column_names<C: Column>(columns: &[C]) -> Vec<String> {
    columns.iter().map(|column| column.name().to_string()).collect()
}

/// Collects fetched rows into a [`ResultTable`], decoding each cell as JSON.
/// `fallback` handles the engine-specific types the shared chain cannot read.
pub(crate) fn to_result_table<R, F>(
    columns: Vec<String>,
    rows: &[R],
    fallback: F,
) -> ResultTable
where
    R: Row,
    usize: ColumnIndex<R>,
    F: Fn(&R, usize) -> Option<Value>,
    for<'r> Option<i64>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<i32>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<i16>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<f64>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<f32>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<bool>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<String>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<NaiveDate>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<NaiveTime>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<NaiveDateTime>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<DateTime<Utc>>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<Uuid>: Decode<'r, R::Database> + Type<R::Database>,
{
    let rows = rows
        .iter()
        .map(|row| {
            (0..row.len())
                .map(|i| {
                    decode_cell(row, i)
                        .or_else(|| fallback(row, i))
                        .unwrap_or(Value::Null)
                })
                .collect()
        })
        .collect();

    ResultTable { columns, rows }
}

/// Tries the common scalar types in turn. `None` means no shared type fits
/// the cell; SQL NULL decodes as `Some(Value::Null)`.
fn decode_cell<R>(row: &R, index: usize) -> Option<Value>
where
    R: Row,
    usize: ColumnIndex<R>,
    for<'r> Option<i64>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<i32>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<i16>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<f64>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<f32>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<bool>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<String>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<NaiveDate>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<NaiveTime>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<NaiveDateTime>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<DateTime<Utc>>: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> Option<Uuid>: Decode<'r, R::Database> + Type<R::Database>,
{
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return Some(v.map(Value::from).unwrap_or(Value::Null));
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(index) {
        return Some(v.map(Value::from).unwrap_or(Value::Null));
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(index) {
        return Some(v.map(Value::from).unwrap_or(Value::Null));
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return Some(v.map(Value::from).unwrap_or(Value::Null));
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(index) {
        return Some(v.map(Value::from).unwrap_or(Value::Null));
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return Some(v.map(Value::from).unwrap_or(Value::Null));
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return Some(v.map(Value::String).unwrap_or(Value::Null));
    }
    // Temporal and uuid cells travel as text; the engine parses them back
    // when they reappear in a statement.
    if let Ok(v) = row.try_get::<Option<NaiveDateTime>, _>(index) {
        return Some(text_or_null(v));
    }
    if let Ok(v) = row.try_get::<Option<DateTime<Utc>>, _>(index) {
        return Some(v.map(|v| Value::String(v.to_rfc3339())).unwrap_or(Value::Null));
    }
    if let Ok(v) = row.try_get::<Option<NaiveDate>, _>(index) {
        return Some(text_or_null(v));
    }
    if let Ok(v) = row.try_get::<Option<NaiveTime>, _>(index) {
        return Some(text_or_null(v));
    }
    row.try_get::<Option<Uuid>, _>(index).ok().map(text_or_null)
}

pub(crate) fn text_or_null<T: ToString>(value: Option<T>) -> Value {
    value
        .map(|v| Value::String(v.to_string()))
        .unwrap_or(Value::Null)
}

/// Binary cells keep valid UTF-8 as is; anything else becomes `\x`-prefixed hex.
pub(crate) fn bytes_cell(bytes: Option<Vec<u8>>) -> Value {
    match bytes {
        None => Value::Null,
        Some(bytes) => match String::from_utf8(bytes) {
            Ok(text) => Value::String(text),
            Err(e) => Value::String(hex_literal(e.as_bytes())),
        },
    }
}

/// PostgreSQL's hex input format for `bytea`.
pub(crate) fn hex_literal(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for byte in bytes {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}
