//! SQLite-backed store and identity map

use super::schema::{self, quote};
use crate::class::{ClassRegistry, ROOT_CLASS};
use crate::entity::EntityRecord;
use crate::identity::{EntityId, IdentityMap};
use crate::{Error, Result};
use rusqlite::types::Value;
use rusqlite::{Connection, params};
use std::collections::BTreeSet;
use std::path::Path;

/// Joined-table-per-class store.
///
/// Owns the single connection, the class registry and the identity map.
/// Every field write goes straight through to its owning table; there is
/// no batching and no transaction spanning several writes.
pub struct Store {
    conn: Connection,
    registry: ClassRegistry,
    objects: IdentityMap<EntityRecord>,
}

impl Store {
    /// Open a database file (creates if doesn't exist)
    pub fn open(path: &Path, registry: ClassRegistry) -> Result<Self> {
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "opened store");
        Ok(Self::with_connection(conn, registry))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory(registry: ClassRegistry) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::with_connection(conn, registry))
    }

    fn with_connection(conn: Connection, registry: ClassRegistry) -> Self {
        Self {
            conn,
            registry,
            objects: IdentityMap::new(),
        }
    }

    /// Release the connection, surfacing any error from closing it.
    ///
    /// Dropping the store also closes the connection, silently.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| Error::Storage(e))
    }

    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Create the table of every table-owning class that lacks one
    pub fn create_tables(&self) -> Result<()> {
        for class in self.registry.owners() {
            self.conn.execute(&schema::create_table(class), [])?;
        }
        tracing::info!(tables = self.registry.owners().count(), "schema ensured");
        Ok(())
    }

    // ========== Entity Lifecycle ==========

    /// Create a new entity of `class` and insert its header rows.
    ///
    /// One row goes into every table-owning class of the chain, each tagged
    /// with the most-derived class name.
    pub fn create(&mut self, class: &str) -> Result<EntityId> {
        self.registry.ensure_persistable(class)?;

        let mut record = EntityRecord::bare(EntityId::NULL, class);
        let mut tables = Vec::new();
        for owner in self.registry.table_owners(class)? {
            for column in &owner.columns {
                record
                    .values
                    .entry(column.name.clone())
                    .or_insert_with(|| column.kind.default_value());
            }
            tables.push(owner.name.clone());
        }

        let id = self.objects.allocate();
        record.id = id;
        self.objects.insert(id, record);

        if let Err(e) = self.insert_headers(id, class, &tables) {
            // rows were rolled back; hand the id back too
            self.objects.release(id)?;
            return Err(e);
        }

        tracing::debug!(%id, class, tables = tables.len(), "created entity");
        Ok(id)
    }

    /// All header rows of one entity go in together or not at all
    fn insert_headers(&mut self, id: EntityId, class: &str, tables: &[String]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for table in tables {
            let sql = format!("INSERT INTO {} (id, _class) VALUES (?1, ?2)", quote(table));
            tx.execute(&sql, params![id.as_sql(), class])?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Create the entity behind `slot` unless it already exists.
    ///
    /// Lets several initialisers of one multiply-inherited entity each ensure
    /// the entity is stored without inserting it twice.
    pub fn ensure_created(&mut self, class: &str, slot: &mut Option<EntityId>) -> Result<EntityId> {
        match *slot {
            Some(id) => Ok(id),
            None => {
                let id = self.create(class)?;
                *slot = Some(id);
                Ok(id)
            }
        }
    }

    /// Remove an entity's rows from every owning table and free its id.
    ///
    /// References to it held by other entities are left as they are.
    pub fn delete(&mut self, id: EntityId) -> Result<()> {
        let class = self.objects.lookup(id)?.class.clone();

        for owner in self.registry.table_owners(&class)? {
            let sql = format!("DELETE FROM {} WHERE id = ?1", quote(&owner.name));
            self.conn.execute(&sql, [id.as_sql()])?;
        }

        self.objects.release(id)?;
        tracing::debug!(%id, class = %class, "deleted entity");
        Ok(())
    }

    // ========== Field Access ==========

    /// Single-column write to one table.
    ///
    /// Fails with `MissingRow` when the entity has no row there, so a write
    /// is never reported as stored when it only reached memory.
    pub fn update(&self, table: &str, id: EntityId, column: &str, value: &Value) -> Result<()> {
        let sql = format!("UPDATE {} SET {} = ?1 WHERE id = ?2", quote(table), quote(column));
        let changed = self.conn.execute(&sql, params![value, id.as_sql()])?;
        if changed != 1 {
            return Err(Error::MissingRow {
                table: table.to_string(),
                id,
            });
        }
        Ok(())
    }

    /// Raw value of a declared field, or `None` if never populated
    pub fn read_field(&self, id: EntityId, field: &str) -> Result<Option<&Value>> {
        let record = self.objects.lookup(id)?;
        let (_, column) = self.registry.column_owner(&record.class, field)?;
        Ok(record.raw(&column.name))
    }

    /// Write a field into raw storage and through to its owning table
    pub fn write_field(&mut self, id: EntityId, field: &str, value: Value) -> Result<()> {
        let record = self.objects.lookup(id)?;
        let (owner, column) = self.registry.column_owner(&record.class, field)?;
        self.update(&owner.name, id, &column.name, &value)?;

        let column = column.name.clone();
        self.objects.lookup_mut(id)?.values.insert(column, value);
        Ok(())
    }

    // ========== Identity Map ==========

    pub fn entity(&self, id: EntityId) -> Result<&EntityRecord> {
        self.objects.lookup(id)
    }

    /// Mutable access for transient state; persisted fields go through `write_field`
    pub fn entity_mut(&mut self, id: EntityId) -> Result<&mut EntityRecord> {
        self.objects.lookup_mut(id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.objects.contains(id)
    }

    pub fn class_of(&self, id: EntityId) -> Result<&str> {
        Ok(&self.objects.lookup(id)?.class)
    }

    /// Resolve a stored reference through the identity map; null stays `None`
    pub fn resolve(&self, id: EntityId) -> Result<Option<EntityId>> {
        if id.is_null() {
            return Ok(None);
        }
        self.objects.lookup(id).map(|record| Some(record.id))
    }

    /// Every loaded entity whose most-derived class is exactly `class`
    pub fn all_instances_of(&self, class: &str) -> Vec<EntityId> {
        self.objects
            .values()
            .filter(|record| record.class == class)
            .map(|record| record.id)
            .collect()
    }

    /// Every loaded entity whose chain includes `class`
    pub fn all_kinds_of(&self, class: &str) -> Result<Vec<EntityId>> {
        let mut ids = Vec::new();
        for record in self.objects.values() {
            if self.registry.is_a(&record.class, class)? {
                ids.push(record.id);
            }
        }
        Ok(ids)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    // ========== Loading ==========

    /// Rebuild the whole dataset into memory.
    ///
    /// Bare instances for every root row are identity-mapped before any
    /// table data is merged, so references resolve regardless of row order.
    /// Post-load hooks run last.
    pub fn load_all(&mut self) -> Result<LoadStats> {
        self.verify_schema()?;

        // built aside so a failed load leaves the current map untouched
        let mut objects = IdentityMap::new();

        let mut stmt = self
            .conn
            .prepare(&format!("SELECT id, _class FROM {} ORDER BY id", quote(ROOT_CLASS)))?;
        let headers = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        drop(stmt);

        for (raw_id, class) in headers {
            self.registry.ensure_persistable(&class)?;
            let id = EntityId::from_sql(raw_id);
            if id.is_null() {
                return Err(Error::UnknownIdentity(id));
            }
            objects.insert(id, EntityRecord::bare(id, class));
        }

        let mut rows = 0;
        let tables: Vec<String> = self.registry.owners().map(|c| c.name.clone()).collect();
        for table in &tables {
            rows += merge_table(&self.conn, &mut objects, table)?;
        }

        let mut hooks = 0;
        let registry = &self.registry;
        for record in objects.values_mut() {
            if let Some(hook) = registry.post_load_hook(&record.class)? {
                hook(record);
                hooks += 1;
            }
        }

        self.objects = objects;
        let stats = LoadStats {
            entities: self.objects.len(),
            tables: tables.len(),
            rows,
            hooks,
        };
        tracing::info!(
            entities = stats.entities,
            tables = stats.tables,
            rows = stats.rows,
            hooks = stats.hooks,
            "loaded store"
        );
        Ok(stats)
    }

    /// Every table in the file must belong to a registered owner, and every
    /// owner's table must exist with exactly its declared columns.
    fn verify_schema(&self) -> Result<()> {
        for table in schema::list_tables(&self.conn)? {
            let owned = self.registry.get(&table).map(|c| c.is_table_owner()).unwrap_or(false);
            if !owned {
                return Err(Error::UnknownPersistedClass(table));
            }
        }

        for class in self.registry.owners() {
            let expected: BTreeSet<String> = class.table_columns().into_iter().collect();
            let found: BTreeSet<String> = schema::table_columns(&self.conn, &class.name)?.into_iter().collect();
            if expected != found {
                return Err(Error::SchemaMismatch {
                    table: class.name.clone(),
                    expected: expected.into_iter().collect(),
                    found: found.into_iter().collect(),
                });
            }
        }
        Ok(())
    }
}

/// Merge every row of one table into the identity-mapped instances
fn merge_table(conn: &Connection, objects: &mut IdentityMap<EntityRecord>, table: &str) -> Result<usize> {
    let mut stmt = conn.prepare(&format!("SELECT * FROM {}", quote(table)))?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let rows = stmt
        .query_map([], |row| {
            let id: i64 = row.get(0)?;
            let mut data = Vec::with_capacity(names.len());
            for (i, name) in names.iter().enumerate() {
                if name == "id" || name == "_class" {
                    continue;
                }
                data.push((name.clone(), row.get::<_, Value>(i)?));
            }
            Ok((id, data))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let count = rows.len();
    for (raw_id, data) in rows {
        objects.lookup_mut(EntityId::from_sql(raw_id))?.merge(data);
    }
    Ok(count)
}

/// Summary of a `load_all` pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    pub entities: usize,
    pub tables: usize,
    pub rows: usize,
    pub hooks: usize,
}

impl std::fmt::Display for LoadStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Load Statistics:")?;
        writeln!(f, "  Entities: {}", self.entities)?;
        writeln!(f, "  Tables: {}", self.tables)?;
        writeln!(f, "  Rows merged: {}", self.rows)?;
        writeln!(f, "  Post-load hooks: {}", self.hooks)
    }
}
