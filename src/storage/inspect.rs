//! Registry-free, read-only view of a store file for operators

use super::schema::{self, quote};
use crate::class::ROOT_CLASS;
use crate::identity::EntityId;
use crate::Result;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Opens a store file read-only and reports on what it holds, without
/// knowing the domain's class registry.
pub struct Inspector {
    conn: Connection,
}

/// One table as found in the file
#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: usize,
}

/// Database statistics
#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub tables: usize,
    pub entities: usize,
    pub max_id: u64,
    /// Entity count per most-derived class tag
    pub classes: BTreeMap<String, usize>,
}

impl Inspector {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn tables(&self) -> Result<Vec<TableInfo>> {
        let mut tables = Vec::new();
        for name in schema::list_tables(&self.conn)? {
            let rows: i64 = self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", quote(&name)), [], |row| row.get(0))?;
            tables.push(TableInfo {
                columns: schema::table_columns(&self.conn, &name)?,
                name,
                rows: rows as usize,
            });
        }
        Ok(tables)
    }

    pub fn stats(&self) -> Result<DbStats> {
        let tables = schema::list_tables(&self.conn)?.len();
        if !schema::table_exists(&self.conn, ROOT_CLASS)? {
            return Ok(DbStats {
                tables,
                entities: 0,
                max_id: 0,
                classes: BTreeMap::new(),
            });
        }

        let mut stmt = self.conn.prepare(&format!(
            "SELECT _class, COUNT(*) FROM {} GROUP BY _class ORDER BY _class",
            quote(ROOT_CLASS)
        ))?;
        let classes = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize)))?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;

        let max_id: i64 = self.conn.query_row(
            &format!("SELECT COALESCE(MAX(id), 0) FROM {}", quote(ROOT_CLASS)),
            [],
            |row| row.get(0),
        )?;

        Ok(DbStats {
            tables,
            entities: classes.values().sum(),
            max_id: max_id.max(0) as u64,
            classes,
        })
    }

    /// Every row stored for one entity, keyed by table, with values rendered as JSON
    pub fn entity_rows(&self, id: EntityId) -> Result<BTreeMap<String, BTreeMap<String, serde_json::Value>>> {
        let mut found = BTreeMap::new();
        for table in schema::list_tables(&self.conn)? {
            let mut stmt = self
                .conn
                .prepare(&format!("SELECT * FROM {} WHERE id = ?1", quote(&table)))?;
            let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
            let mut rows = stmt.query([id.as_sql()])?;
            if let Some(row) = rows.next()? {
                let mut fields = BTreeMap::new();
                for (i, name) in names.iter().enumerate() {
                    fields.insert(name.clone(), to_json(row.get_ref(i)?));
                }
                found.insert(table, fields);
            }
        }
        Ok(found)
    }
}

fn to_json(value: ValueRef<'_>) -> serde_json::Value {
    match Value::from(value) {
        Value::Null => serde_json::Value::Null,
        Value::Integer(n) => n.into(),
        Value::Real(f) => f.into(),
        Value::Text(s) => s.into(),
        // blobs written by the engine are JSON; show anything else as a byte count
        Value::Blob(bytes) => serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| format!("<{} bytes>", bytes.len()).into()),
    }
}

impl std::fmt::Display for DbStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Database Statistics:")?;
        writeln!(f, "  Tables: {}", self.tables)?;
        writeln!(f, "  Entities: {}", self.entities)?;
        writeln!(f, "  Highest id: {}", self.max_id)?;
        for (class, count) in &self.classes {
            writeln!(f, "    {}: {}", class, count)?;
        }
        Ok(())
    }
}
