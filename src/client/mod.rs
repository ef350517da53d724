pub mod admin;

pub use admin::{AdminService, IndexAction, IndexPage, Response, RowListing};
