//! # Mudstore - joined-table-per-class persistence
//!
//! Maps a multiply-inherited, dynamically extended entity model onto SQLite.
//!
//! Mudstore provides:
//! - Explicit class declarations with ordered bases and typed fields
//! - One table per class that introduces fields, joined on a shared integer id
//! - An identity map with dense, reusable ids (0 = null reference)
//! - Write-through field descriptors and computed reverse relations
//! - In-place schema reconciliation and whole-dataset loading

pub mod identity;
pub mod class;
pub mod entity;
pub mod field;
pub mod relation;
pub mod storage;
pub mod config;
pub mod output;
pub mod ui;

// Re-exports for convenient access
pub use class::{ClassDef, ClassRegistry, FieldKind, ROOT_CLASS};
pub use entity::EntityRecord;
pub use identity::{EntityId, IdentityMap};
pub use storage::{LoadStats, Migration, Store};

/// Result type alias for Mudstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Mudstore operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unknown identity: {0}")]
    UnknownIdentity(EntityId),

    #[error("No persisted table for class {0}")]
    NoPersistedTable(String),

    #[error("Unknown persisted class: {0}")]
    UnknownPersistedClass(String),

    #[error("Schema mismatch in table {table}: expected {expected:?}, found {found:?} (reconcile before loading)")]
    SchemaMismatch {
        table: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Relation {class}.{field} is read-only")]
    ReadOnlyRelation { class: String, field: String },

    #[error("Relation {class}.{field} has more than one entity referencing {target}")]
    AmbiguousRelation {
        class: String,
        field: String,
        target: EntityId,
    },

    #[error("Class {class} has no field {field}")]
    UnknownField { class: String, field: String },

    #[error("Field {field} does not hold a {expected} value")]
    FieldType { field: String, expected: &'static str },

    #[error("Entity {id} has no row in table {table} (reconcile to backfill it)")]
    MissingRow { table: String, id: EntityId },

    #[error("Field {field} cannot store this value: {reason}")]
    InvalidValue { field: String, reason: &'static str },

    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    #[error("Blob error: {0}")]
    Blob(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}
