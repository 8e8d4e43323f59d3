//! Relational database source via DuckDB
//!
//! DuckDB acts as the query engine and reaches PostgreSQL, MySQL, SQLite
//! and DuckDB files through its extensions.

mod engine;

pub use engine::{Attachment, DuckDbSource, DuckDbStream};
