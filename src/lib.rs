use client::AdminService;
use errors::DbError;
use models::connections::ConnectionConfig;

pub mod client;
pub mod crud;
pub mod db;
pub mod errors;
pub mod models;

/// Connects with `config` and wires up the admin service around the pool.
pub async fn connect(config: &ConnectionConfig) -> Result<AdminService, DbError> {
    let client = db::connect(config).await?;
    Ok(AdminService::new(client, config))
}
