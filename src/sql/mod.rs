//! Relational output: dialects, column types and DDL.

mod ddl;
mod dialect;
mod types;

pub use ddl::render_ddl;
pub use dialect::Dialect;
pub use types::{boolean_literal, string_literal};
