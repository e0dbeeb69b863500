//! In-memory entity state

use crate::identity::EntityId;
use rusqlite::types::Value;
use std::collections::HashMap;

/// The live, identity-mapped instance of one entity.
///
/// `values` mirrors the persisted columns of every table-owning class in the
/// entity's chain, keyed by physical column name. `transient` holds state
/// that is never written to disk and is rebuilt by post-load hooks.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub id: EntityId,
    /// Most-derived class name, as stored in the `_class` column
    pub class: String,
    pub values: HashMap<String, Value>,
    pub transient: HashMap<String, serde_json::Value>,
}

impl EntityRecord {
    /// A bare instance: identity and class only, no field data
    pub fn bare(id: EntityId, class: impl Into<String>) -> Self {
        Self {
            id,
            class: class.into(),
            values: HashMap::new(),
            transient: HashMap::new(),
        }
    }

    pub fn raw(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// Merge one row's columns into raw storage
    pub fn merge(&mut self, columns: impl IntoIterator<Item = (String, Value)>) {
        self.values.extend(columns);
    }
}
