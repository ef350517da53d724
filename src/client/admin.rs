//! Request-level operations behind each admin page.
//!
//! Every method fetches schema and rows afresh and returns either a payload
//! to render or an [`ExecutionResult`] message; errors never escape as
//! `DbError`.

use std::{collections::HashMap, sync::Arc};

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    crud::{
        build_delete, build_form, build_insert, build_select, build_update, ExecutionGateway,
        ExecutionResult, FormSpec, SchemaIntrospector,
    },
    db::DbClient,
    errors::DbError,
    models::{
        connections::ConnectionConfig,
        rows::{Row, RowIdentity},
        schema::TableSchema,
    },
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowListing {
    pub identity: RowIdentity,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexPage {
    pub tables: Vec<String>,
    pub rows: Vec<RowListing>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Index(IndexPage),
    Schema(Vec<TableSchema>),
    Form(FormSpec),
    Message(ExecutionResult),
}

impl From<ExecutionResult> for Response {
    fn from(result: ExecutionResult) -> Self {
        Response::Message(result)
    }
}

impl From<DbError> for Response {
    fn from(e: DbError) -> Self {
        Response::Message(e.into())
    }
}

/// Action posted from the index page. The first non-empty key wins,
/// checked in the order of the variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexAction {
    Query(String),
    Command(String),
    Insert(String),
    Update(String),
    Delete(String),
}

impl IndexAction {
    pub fn from_form(form: &HashMap<String, String>) -> Option<Self> {
        let field = |key: &str| {
            form.get(key)
                .filter(|value| !value.is_empty())
                .cloned()
        };

        field("query")
            .map(IndexAction::Query)
            .or_else(|| field("command").map(IndexAction::Command))
            .or_else(|| field("insert").map(IndexAction::Insert))
            .or_else(|| field("update").map(IndexAction::Update))
            .or_else(|| field("delete").map(IndexAction::Delete))
    }
}

#[derive(Clone)]
pub struct AdminService {
    introspector: SchemaIntrospector,
    gateway: ExecutionGateway,
}

impl AdminService {
    pub fn new(client: Arc<dyn DbClient>, config: &ConnectionConfig) -> Self {
        Self {
            introspector: SchemaIntrospector::new(client.clone()),
            gateway: ExecutionGateway::new(client, config),
        }
    }

    pub fn introspector(&self) -> &SchemaIntrospector {
        &self.introspector
    }

    pub fn gateway(&self) -> &ExecutionGateway {
        &self.gateway
    }

    /// Lists every row of every table, each tagged with its positional identity.
    pub async fn index(&self) -> Response {
        match self.list_rows().await {
            Ok(page) => Response::Index(page),
            Err(e) => e.into(),
        }
    }

    async fn list_rows(&self) -> Result<IndexPage, DbError> {
        let tables = self.introspector.list_tables().await?;
        let mut rows = Vec::new();

        for table in &tables {
            let contents = self.gateway.fetch(build_select(table).as_sql()).await?;
            rows.extend(
                contents
                    .rows
                    .into_iter()
                    .enumerate()
                    .map(|(i, values)| RowListing {
                        identity: RowIdentity::new(table.as_str(), i),
                        values,
                    }),
            );
        }

        Ok(IndexPage { tables, rows })
    }

    pub async fn handle_index_post(&self, form: &HashMap<String, String>) -> Option<Response> {
        let action = IndexAction::from_form(form)?;
        info!("index action: {:?}", action);

        Some(match action {
            IndexAction::Query(sql) => self.query(&sql).await,
            IndexAction::Command(sql) => self.command(&sql).await,
            IndexAction::Insert(table) => self.insert_form(&table).await,
            IndexAction::Update(identity) => self.update_form(&identity).await,
            IndexAction::Delete(identity) => self.delete(&identity).await.into(),
        })
    }

    pub async fn query(&self, sql: &str) -> Response {
        self.gateway.run_query(sql).await.into()
    }

    pub async fn command(&self, sql: &str) -> Response {
        self.gateway.run_command(sql).await.into()
    }

    pub async fn schema(&self) -> Response {
        match self.introspector.describe_database().await {
            Ok(schemas) => Response::Schema(schemas),
            Err(e) => e.into(),
        }
    }

    pub async fn insert_form(&self, table: &str) -> Response {
        match self.introspector.describe_table(table).await {
            Ok(schema) => Response::Form(build_form(&schema, None)),
            Err(e) => e.into(),
        }
    }

    pub async fn submit_insert(
        &self,
        table: &str,
        submission: &HashMap<String, String>,
    ) -> ExecutionResult {
        let statement = async {
            let schema = self.introspector.describe_table(table).await?;
            let values = build_form(&schema, None).validate(submission)?;
            build_insert(table, &schema, &values)
        };

        match statement.await {
            Ok(statement) => self.gateway.run_statement(&statement).await,
            Err(e) => e.into(),
        }
    }

    pub async fn update_form(&self, identity: &str) -> Response {
        match self.resolve_row(identity).await {
            Ok((schema, row)) => Response::Form(build_form(&schema, Some(&row))),
            Err(e) => e.into(),
        }
    }

    /// The WHERE snapshot is whatever sits at the identity's position now,
    /// not necessarily the row the form was rendered from.
    pub async fn submit_update(
        &self,
        identity: &str,
        submission: &HashMap<String, String>,
    ) -> ExecutionResult {
        let statement = async {
            let (schema, old_row) = self.resolve_row(identity).await?;
            let new_values = build_form(&schema, None).validate(submission)?;
            build_update(&schema.table_name, &schema, &old_row, &new_values)
        };

        match statement.await {
            Ok(statement) => self.gateway.run_statement(&statement).await,
            Err(e) => e.into(),
        }
    }

    pub async fn delete(&self, identity: &str) -> ExecutionResult {
        let statement = async {
            let (schema, row) = self.resolve_row(identity).await?;
            build_delete(&schema.table_name, &schema, &row)
        };

        match statement.await {
            Ok(statement) => self.gateway.run_statement(&statement).await,
            Err(e) => e.into(),
        }
    }

    /// Schema and current snapshot of the row at a positional identity.
    pub async fn resolve_row(&self, identity: &str) -> Result<(TableSchema, Row), DbError> {
        let identity: RowIdentity = identity.parse()?;
        let schema = self.introspector.describe_table(&identity.table).await?;
        let contents = self
            .gateway
            .fetch(build_select(&identity.table).as_sql())
            .await?;

        let row = contents
            .row(identity.index)
            .ok_or_else(|| DbError::RowNotFound {
                table: identity.table.clone(),
                index: identity.index,
            })?;
        Ok((schema, row))
    }
}
