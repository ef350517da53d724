use std::sync::Arc;

use log::{debug, warn};

use crate::{db::DbClient, errors::DbError, models::schema::TableSchema};

/// Reads table and column metadata from the live catalog. Nothing is cached.
#[derive(Clone)]
pub struct SchemaIntrospector {
    client: Arc<dyn DbClient>,
}

impl SchemaIntrospector {
    pub fn new(client: Arc<dyn DbClient>) -> Self {
        Self { client }
    }

    pub async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        let tables = self.client.list_tables().await.inspect_err(|e| {
            warn!("listing tables failed: {}", e);
        })?;
        debug!("found {} tables", tables.len());
        Ok(tables)
    }

    pub async fn describe_table(&self, table_name: &str) -> Result<TableSchema, DbError> {
        let schema = self
            .client
            .describe_table(table_name)
            .await
            .inspect_err(|e| warn!("describing {} failed: {}", table_name, e))?;

        if schema.is_empty() {
            return Err(DbError::SchemaNotFound(table_name.to_string()));
        }
        Ok(schema)
    }

    /// Every table's schema, in [`list_tables`](Self::list_tables) order.
    pub async fn describe_database(&self) -> Result<Vec<TableSchema>, DbError> {
        let mut schemas = Vec::new();
        for table in self.list_tables().await? {
            schemas.push(self.describe_table(&table).await?);
        }
        Ok(schemas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock::MockDbClient;
    use crate::models::schema::ColumnDescriptor;
    use mockall::predicate;

    fn users() -> TableSchema {
        TableSchema {
            table_name: "users".to_string(),
            columns: vec![
                ColumnDescriptor::new("id", "INT"),
                ColumnDescriptor::new("name", "VARCHAR"),
            ],
        }
    }

    #[tokio::test]
    async fn test_list_tables() {
        let mut mock_db = MockDbClient::new();
        mock_db
            .expect_list_tables()
            .times(1)
            .returning(|| Ok(vec!["users".to_string(), "orders".to_string()]));

        let introspector = SchemaIntrospector::new(Arc::new(mock_db));
        let tables = introspector.list_tables().await.unwrap();
        assert_eq!(tables, vec!["users".to_string(), "orders".to_string()]);
    }

    #[tokio::test]
    async fn test_describe_table() {
        let mut mock_db = MockDbClient::new();
        mock_db
            .expect_describe_table()
            .with(predicate::eq("users"))
            .returning(|_| Ok(users()));

        let introspector = SchemaIntrospector::new(Arc::new(mock_db));
        let schema = introspector.describe_table("users").await.unwrap();
        assert_eq!(schema.table_name, "users");
        assert_eq!(schema.column_names(), vec!["id", "name"]);
    }

    #[tokio::test]
    async fn test_describe_table_without_columns() {
        let mut mock_db = MockDbClient::new();
        mock_db.expect_describe_table().returning(|name| {
            Ok(TableSchema {
                table_name: name.to_string(),
                columns: Vec::new(),
            })
        });

        let introspector = SchemaIntrospector::new(Arc::new(mock_db));
        let result = introspector.describe_table("ghost").await;
        assert!(matches!(result, Err(DbError::SchemaNotFound(name)) if name == "ghost"));
    }

    #[tokio::test]
    async fn test_describe_database_hits_catalog_every_call() {
        let mut mock_db = MockDbClient::new();
        mock_db
            .expect_list_tables()
            .times(2)
            .returning(|| Ok(vec!["users".to_string()]));
        mock_db
            .expect_describe_table()
            .times(2)
            .returning(|_| Ok(users()));

        let introspector = SchemaIntrospector::new(Arc::new(mock_db));
        let first = introspector.describe_database().await.unwrap();
        let second = introspector.describe_database().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
    }

    #[tokio::test]
    async fn test_connection_failure_surfaces() {
        let mut mock_db = MockDbClient::new();
        mock_db
            .expect_list_tables()
            .returning(|| Err(DbError::Connection("refused".to_string())));

        let introspector = SchemaIntrospector::new(Arc::new(mock_db));
        assert!(matches!(
            introspector.describe_database().await,
            Err(DbError::Connection(_))
        ));
    }
}
