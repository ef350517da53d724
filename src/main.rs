use std::env;

use tablesmith::client::Response;
use tablesmith::crud::{returns_rows, ExecutionResult};
use tablesmith::models::connections::ConnectionConfig;
use tablesmith::models::rows::cell_text;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = ConnectionConfig::from_env()?;
    let admin = tablesmith::connect(&config).await?;

    let sql = env::args().skip(1).collect::<Vec<_>>().join(" ");
    let response = if sql.trim().is_empty() {
        admin.index().await
    } else if returns_rows(&sql) {
        admin.query(&sql).await
    } else {
        admin.command(&sql).await
    };

    match response {
        Response::Index(page) => {
            for row in page.rows {
                let values: Vec<String> = row.values.iter().map(cell_text).collect();
                println!("{},[{}]", row.identity, values.join(", "));
            }
        }
        Response::Message(ExecutionResult::Table(table)) => print!("{}", table.to_csv()?),
        Response::Message(result) => println!("{}", result),
        Response::Schema(_) | Response::Form(_) => {}
    }

    Ok(())
}
