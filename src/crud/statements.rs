//! SQL assembly for the generic CRUD pages.
//!
//! Values are rendered by column type: numeric columns (see
//! [`is_numeric_type`](crate::models::schema::is_numeric_type)) verbatim, all
//! others between single quotes with no escaping. That text is what
//! [`SqlStatement::as_sql`] returns and what gets logged. The same statement
//! also carries its values as [`BoundValue`]s so it can be executed with
//! placeholders instead.
//!
//! UPDATE and DELETE match rows on the full previous row snapshot, not on a
//! key, so they can touch zero or several rows.

use std::mem;

use serde_json::Value;

use crate::{
    db::{BoundValue, Placeholder},
    errors::DbError,
    models::{
        rows::{cell_text, Row},
        schema::{ColumnDescriptor, TableSchema},
    },
};

#[derive(Debug, Clone, PartialEq)]
struct Param {
    value: BoundValue,
    cast: String,
}

/// A fully rendered statement plus its parameterized form.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    sql: String,
    /// Text between parameters; always one more than `params`.
    segments: Vec<String>,
    params: Vec<Param>,
}

impl SqlStatement {
    /// Literal SQL with values inlined.
    pub fn as_sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> Vec<BoundValue> {
        self.params.iter().map(|p| p.value.clone()).collect()
    }

    /// The statement text with engine placeholders in place of values.
    pub fn to_parameterized(&self, style: Placeholder) -> String {
        let mut out = String::with_capacity(self.sql.len());
        for (i, segment) in self.segments.iter().enumerate() {
            out.push_str(segment);
            if let Some(param) = self.params.get(i) {
                match style {
                    Placeholder::Question => out.push('?'),
                    Placeholder::DollarCast => {
                        out.push_str(&format!("${}::{}", i + 1, param.cast));
                    }
                }
            }
        }
        out
    }
}

enum Rendered {
    Null,
    Value { literal: String, bound: BoundValue },
}

fn render(column: &ColumnDescriptor, value: &Value) -> Rendered {
    if value.is_null() {
        return Rendered::Null;
    }

    if !column.is_numeric() {
        let text = cell_text(value);
        return Rendered::Value {
            literal: format!("'{}'", text),
            bound: BoundValue::Text(text),
        };
    }

    match value {
        Value::Number(n) => Rendered::Value {
            literal: n.to_string(),
            bound: match n.as_i64() {
                Some(i) => BoundValue::Integer(i),
                None => BoundValue::Float(n.as_f64().unwrap_or_default()),
            },
        },
        Value::String(s) if s.trim().is_empty() => Rendered::Null,
        other => {
            let text = cell_text(other);
            let bound = if let Ok(i) = text.trim().parse::<i64>() {
                BoundValue::Integer(i)
            } else if let Ok(f) = text.trim().parse::<f64>() {
                BoundValue::Float(f)
            } else {
                BoundValue::Text(text.clone())
            };
            Rendered::Value {
                literal: text,
                bound,
            }
        }
    }
}

/// Renders `value` as it appears in statement text for `column`.
pub fn render_value(column: &ColumnDescriptor, value: &Value) -> String {
    match render(column, value) {
        Rendered::Null => "NULL".to_string(),
        Rendered::Value { literal, .. } => literal,
    }
}

#[derive(Default)]
struct StatementWriter {
    sql: String,
    current: String,
    segments: Vec<String>,
    params: Vec<Param>,
}

impl StatementWriter {
    fn push_sql(&mut self, text: &str) {
        self.sql.push_str(text);
        self.current.push_str(text);
    }

    fn push_value(&mut self, column: &ColumnDescriptor, value: &Value) {
        match render(column, value) {
            Rendered::Null => self.push_sql("NULL"),
            Rendered::Value { literal, bound } => {
                self.sql.push_str(&literal);
                self.segments.push(mem::take(&mut self.current));
                self.params.push(Param {
                    value: bound,
                    cast: column.cast_type().to_string(),
                });
            }
        }
    }

    /// `col = value`, or `col IS NULL` for a null snapshot value.
    fn push_predicate(&mut self, column: &ColumnDescriptor, value: &Value) {
        self.push_sql(&column.name);
        if value.is_null() {
            self.push_sql(" IS NULL");
        } else {
            self.push_sql(" = ");
            self.push_value(column, value);
        }
    }

    fn push_where(&mut self, table: &str, schema: &TableSchema, row: &Row) -> Result<(), DbError> {
        self.push_sql(" WHERE ");
        for (i, column) in schema.columns.iter().enumerate() {
            if i > 0 {
                self.push_sql(" AND ");
            }
            self.push_predicate(column, lookup(table, row, column)?);
        }
        Ok(())
    }

    fn finish(mut self) -> SqlStatement {
        self.segments.push(self.current);
        SqlStatement {
            sql: self.sql,
            segments: self.segments,
            params: self.params,
        }
    }
}

fn ensure_columns(table: &str, schema: &TableSchema) -> Result<(), DbError> {
    if schema.is_empty() {
        return Err(DbError::EmptySchema(table.to_string()));
    }
    Ok(())
}

fn lookup<'a>(table: &str, row: &'a Row, column: &ColumnDescriptor) -> Result<&'a Value, DbError> {
    row.get(&column.name).ok_or_else(|| DbError::MissingValue {
        table: table.to_string(),
        column: column.name.clone(),
    })
}

pub fn build_select(table: &str) -> SqlStatement {
    let mut writer = StatementWriter::default();
    writer.push_sql(&format!("SELECT * FROM {}", table));
    writer.finish()
}

pub fn build_insert(table: &str, schema: &TableSchema, values: &Row) -> Result<SqlStatement, DbError> {
    ensure_columns(table, schema)?;

    let mut writer = StatementWriter::default();
    writer.push_sql(&format!(
        "INSERT INTO {} ({}) VALUES (",
        table,
        schema.column_names().join(", ")
    ));
    for (i, column) in schema.columns.iter().enumerate() {
        if i > 0 {
            writer.push_sql(", ");
        }
        writer.push_value(column, lookup(table, values, column)?);
    }
    writer.push_sql(")");

    Ok(writer.finish())
}

/// `SET` takes the new values, `WHERE` the old snapshot.
pub fn build_update(
    table: &str,
    schema: &TableSchema,
    old_row: &Row,
    new_values: &Row,
) -> Result<SqlStatement, DbError> {
    ensure_columns(table, schema)?;

    let mut writer = StatementWriter::default();
    writer.push_sql(&format!("UPDATE {} SET ", table));
    for (i, column) in schema.columns.iter().enumerate() {
        if i > 0 {
            writer.push_sql(", ");
        }
        writer.push_sql(&format!("{} = ", column.name));
        writer.push_value(column, lookup(table, new_values, column)?);
    }
    writer.push_where(table, schema, old_row)?;

    Ok(writer.finish())
}

pub fn build_delete(table: &str, schema: &TableSchema, row: &Row) -> Result<SqlStatement, DbError> {
    ensure_columns(table, schema)?;

    let mut writer = StatementWriter::default();
    writer.push_sql(&format!("DELETE FROM {}", table));
    writer.push_where(table, schema, row)?;

    Ok(writer.finish())
}
