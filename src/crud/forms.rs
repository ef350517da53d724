//! Data-driven forms built from a table's column metadata.
//!
//! One [`FormSpec`] shape serves every table: a field per column, in schema
//! order, followed by a single submit control.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    errors::DbError,
    models::{
        rows::{cell_text, Row},
        schema::TableSchema,
    },
};

pub const SUBMIT_LABEL: &str = "RUN";
const SUBMIT_NAME: &str = "submit";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Text,
    Submit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    /// Column is declared NOT NULL. Shown to the user, never enforced here.
    pub required: bool,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSpec {
    pub table: String,
    pub fields: Vec<FormField>,
}

/// Builds the form for `schema`, prefilling values from `prefill` when given.
///
/// Keys missing from `prefill` and null values leave the field blank.
pub fn build_form(schema: &TableSchema, prefill: Option<&Row>) -> FormSpec {
    let mut fields: Vec<FormField> = schema
        .columns
        .iter()
        .map(|column| FormField {
            name: column.name.clone(),
            label: column.name.clone(),
            kind: FieldKind::Text,
            required: !column.is_nullable,
            value: prefill
                .and_then(|row| row.get(&column.name))
                .filter(|value| !value.is_null())
                .map(cell_text),
        })
        .collect();

    fields.push(FormField {
        name: SUBMIT_NAME.to_string(),
        label: SUBMIT_LABEL.to_string(),
        kind: FieldKind::Submit,
        required: false,
        value: None,
    });

    FormSpec {
        table: schema.table_name.clone(),
        fields,
    }
}

impl FormSpec {
    pub fn data_fields(&self) -> impl Iterator<Item = &FormField> {
        self.fields.iter().filter(|f| f.kind == FieldKind::Text)
    }

    /// Accepts a submission when every data field is present.
    ///
    /// Values are taken as text; type checking is left to the engine.
    pub fn validate(&self, submission: &HashMap<String, String>) -> Result<Row, DbError> {
        let missing: Vec<String> = self
            .data_fields()
            .filter(|field| !submission.contains_key(&field.name))
            .map(|field| field.name.clone())
            .collect();

        if !missing.is_empty() {
            return Err(DbError::Validation(missing));
        }

        Ok(self
            .data_fields()
            .map(|field| {
                let value = submission[&field.name].clone();
                (field.name.clone(), Value::String(value))
            })
            .collect())
    }
}
