//! Storage Layer - SQLite-backed persistence
//!
//! One table per table-owning class:
//! - `id` (integer, shared across every table of one entity)
//! - `_class` (most-derived class name; read back from the root table)
//! - one `_<field>` column per declared field

pub mod inspect;
pub mod migrate;
pub mod schema;
pub mod sqlite;

pub use inspect::{Inspector, TableInfo, DbStats};
pub use migrate::Migration;
pub use sqlite::{LoadStats, Store};
