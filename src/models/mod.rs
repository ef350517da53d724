pub mod connections;
pub mod rows;
pub mod schema;
