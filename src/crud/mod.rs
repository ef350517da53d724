pub mod forms;
pub mod gateway;
pub mod introspector;
pub mod statements;

pub use forms::{build_form, FieldKind, FormField, FormSpec};
pub use gateway::{returns_rows, ExecutionGateway, ExecutionResult};
pub use introspector::SchemaIntrospector;
pub use statements::{build_delete, build_insert, build_select, build_update, SqlStatement};
