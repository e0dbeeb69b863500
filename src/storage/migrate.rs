//! Schema reconciliation - bring a class table in line with its declaration
//!
//! SQLite can only add columns in place, so any removal rebuilds the table:
//! copy the surviving columns to a temporary backup, drop and recreate the
//! table in its new shape, then copy the data back.

use super::schema::{self, quote};
use super::sqlite::Store;
use crate::class::{ClassSchema, ROOT_CLASS};
use crate::Result;
use rusqlite::params_from_iter;
use std::collections::BTreeSet;

/// Outcome of reconciling one table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Migration {
    Unchanged,
    /// Table did not exist and was created
    Created,
    /// Columns added in place
    Added(Vec<String>),
    /// Table rewritten; `dropped` columns and their data are gone
    Rebuilt { dropped: Vec<String>, added: Vec<String> },
    /// Class owns no table; nothing to do
    NotOwner,
}

impl Store {
    /// Reconcile the table of `class` against its declared columns.
    ///
    /// Afterwards every stored entity whose chain reaches `class` has a row
    /// in its table, which matters once a class gains a new table-owning base.
    pub fn reconcile(&mut self, class: &str) -> Result<Migration> {
        let schema = self.registry().get(class)?.clone();
        if !schema.is_table_owner() {
            return Ok(Migration::NotOwner);
        }

        let outcome = self.reconcile_columns(&schema)?;
        let filled = self.backfill_headers(&schema)?;
        if filled > 0 {
            tracing::info!(table = %schema.name, rows = filled, "backfilled header rows");
        }
        Ok(outcome)
    }

    fn reconcile_columns(&mut self, schema: &ClassSchema) -> Result<Migration> {
        let existing = schema::table_columns(self.conn(), &schema.name)?;
        if existing.is_empty() {
            self.conn().execute(&schema::create_table(schema), [])?;
            tracing::info!(table = %schema.name, "created table");
            return Ok(Migration::Created);
        }

        let old: BTreeSet<String> = existing.into_iter().collect();
        let new: BTreeSet<String> = schema.table_columns().into_iter().collect();
        let dropped: Vec<String> = old.difference(&new).cloned().collect();
        let added: Vec<String> = new.difference(&old).cloned().collect();

        if dropped.is_empty() && added.is_empty() {
            return Ok(Migration::Unchanged);
        }

        if dropped.is_empty() {
            for name in &added {
                self.add_column(schema, name)?;
            }
            return Ok(Migration::Added(added));
        }

        tracing::warn!(table = %schema.name, dropped = ?dropped, "rebuilding table, dropped columns lose their data");
        let kept: Vec<String> = old.intersection(&new).cloned().collect();
        self.rebuild(schema, &kept)?;
        Ok(Migration::Rebuilt { dropped, added })
    }

    /// Reconcile every table-owning class, in registration order
    pub fn reconcile_all(&mut self) -> Result<Vec<(String, Migration)>> {
        let owners: Vec<String> = self.registry().owners().map(|c| c.name.clone()).collect();
        let mut outcomes = Vec::with_capacity(owners.len());
        for class in owners {
            let outcome = self.reconcile(&class)?;
            outcomes.push((class, outcome));
        }
        Ok(outcomes)
    }

    /// Insert default rows for root entities of any class reaching `schema`
    /// that lack one in its table
    fn backfill_headers(&self, schema: &ClassSchema) -> Result<usize> {
        if schema.name == ROOT_CLASS || !schema::table_exists(self.conn(), ROOT_CLASS)? {
            return Ok(0);
        }

        let mut kinds = Vec::new();
        for class in self.registry().classes() {
            if self.registry().is_a(&class.name, &schema.name)? {
                kinds.push(class.name.clone());
            }
        }

        let placeholders = vec!["?"; kinds.len()].join(", ");
        let table = quote(&schema.name);
        let sql = format!(
            "INSERT INTO {table} (id, _class) SELECT id, _class FROM {root} \
             WHERE _class IN ({placeholders}) AND id NOT IN (SELECT id FROM {table})",
            root = quote(ROOT_CLASS),
        );
        Ok(self.conn().execute(&sql, params_from_iter(kinds.iter()))?)
    }

    fn add_column(&self, schema: &ClassSchema, name: &str) -> Result<()> {
        let definition = schema
            .columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.kind.definition(&c.name))
            // id/_class only go missing on hand-made tables
            .unwrap_or_else(|| format!("{} TEXT NOT NULL DEFAULT ''", quote(name)));

        self.conn().execute(
            &format!("ALTER TABLE {} ADD COLUMN {}", quote(&schema.name), definition),
            [],
        )?;
        tracing::debug!(table = %schema.name, column = name, "added column");
        Ok(())
    }

    fn rebuild(&mut self, schema: &ClassSchema, kept: &[String]) -> Result<()> {
        let table = quote(&schema.name);
        let backup_name = format!("{}_backup", schema.name);
        let backup = quote(&backup_name);
        let columns = kept.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", ");

        let tx = self.conn_mut().transaction()?;
        tx.execute(&format!("DROP TABLE IF EXISTS temp.{}", backup), [])?;
        tx.execute(&schema::create_table_named(&backup_name, schema, true), [])?;
        tx.execute(
            &format!("INSERT INTO temp.{backup} ({columns}) SELECT {columns} FROM main.{table}"),
            [],
        )?;
        tx.execute(&format!("DROP TABLE main.{}", table), [])?;
        tx.execute(&schema::create_table(schema), [])?;
        tx.execute(
            &format!("INSERT INTO main.{table} ({columns}) SELECT {columns} FROM temp.{backup}"),
            [],
        )?;
        tx.execute(&format!("DROP TABLE temp.{}", backup), [])?;
        tx.commit()?;

        tracing::debug!(table = %schema.name, kept = kept.len(), "rebuilt table");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassDef, ClassRegistry};
    use crate::field::Text;
    use crate::Error;
    use rusqlite::types::Value;

    fn registry(fields: &[&str]) -> ClassRegistry {
        let mut def = ClassDef::new("Thing").extends(ROOT_CLASS);
        for field in fields {
            def = def.text(*field);
        }
        ClassRegistry::new().with(def).unwrap()
    }

    #[test]
    fn test_missing_table_is_created() {
        let mut store = Store::open_in_memory(registry(&["a"])).unwrap();
        let outcomes = store.reconcile_all().unwrap();
        assert_eq!(
            outcomes,
            vec![
                (ROOT_CLASS.to_string(), Migration::Created),
                ("Thing".to_string(), Migration::Created),
            ]
        );
        assert_eq!(store.reconcile("Thing").unwrap(), Migration::Unchanged);
    }

    #[test]
    fn test_added_columns_are_altered_in() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.db");

        let store = Store::open(&path, registry(&["a"])).unwrap();
        store.create_tables().unwrap();
        store.close().unwrap();

        let mut store = Store::open(&path, registry(&["a", "b"])).unwrap();
        assert_eq!(store.reconcile("Thing").unwrap(), Migration::Added(vec!["_b".to_string()]));
        assert_eq!(
            schema::table_columns(store.conn(), "Thing").unwrap(),
            vec!["id", "_class", "_a", "_b"]
        );
    }

    #[test]
    fn test_rebuild_preserves_overlapping_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.db");

        let mut store = Store::open(&path, registry(&["a", "b", "c"])).unwrap();
        store.create_tables().unwrap();
        let id = store.create("Thing").unwrap();
        store.write_field(id, "a", Value::Text("gone".into())).unwrap();
        store.write_field(id, "b", Value::Text("bee".into())).unwrap();
        store.write_field(id, "c", Value::Text("sea".into())).unwrap();
        store.close().unwrap();

        let mut store = Store::open(&path, registry(&["b", "c", "d"])).unwrap();
        // unreconciled tables refuse to load
        assert!(matches!(store.load_all(), Err(Error::SchemaMismatch { .. })));

        let outcome = store.reconcile("Thing").unwrap();
        assert_eq!(
            outcome,
            Migration::Rebuilt {
                dropped: vec!["_a".to_string()],
                added: vec!["_d".to_string()],
            }
        );

        let mut columns = schema::table_columns(store.conn(), "Thing").unwrap();
        columns.sort();
        assert_eq!(columns, vec!["_b", "_c", "_class", "_d", "id"]);

        store.load_all().unwrap();
        let record = store.entity(id).unwrap();
        assert_eq!(record.class, "Thing");
        assert_eq!(record.raw("_b"), Some(&Value::Text("bee".into())));
        assert_eq!(record.raw("_c"), Some(&Value::Text("sea".into())));
        assert_eq!(record.raw("_d"), Some(&Value::Text(String::new())));
        assert_eq!(record.raw("_a"), None);
    }

    fn item_registry(coloured: bool) -> ClassRegistry {
        let mut reg = ClassRegistry::new()
            .with(ClassDef::new("Named").extends(ROOT_CLASS).text("name"))
            .unwrap();
        let mut item = ClassDef::new("Item").extends("Named");
        if coloured {
            reg.register(ClassDef::new("Coloured").extends(ROOT_CLASS).text("colour")).unwrap();
            item = item.extends("Coloured");
        }
        reg.with(item).unwrap()
    }

    const NAME: Text = Text::new("name");
    const COLOUR: Text = Text::new("colour");

    #[test]
    fn test_new_owning_base_gets_rows_for_existing_entities() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.db");

        let mut store = Store::open(&path, item_registry(false)).unwrap();
        store.reconcile_all().unwrap();
        let lamp = store.create("Item").unwrap();
        let torch = store.create("Item").unwrap();
        NAME.set(&mut store, lamp, "lamp").unwrap();
        store.close().unwrap();

        let mut store = Store::open(&path, item_registry(true)).unwrap();
        let outcomes = store.reconcile_all().unwrap();
        assert!(outcomes.contains(&("Coloured".to_string(), Migration::Created)));
        let rows: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM \"Coloured\" WHERE _class = 'Item'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 2);

        store.load_all().unwrap();
        assert_eq!(COLOUR.get(&store, torch).unwrap(), "");
        COLOUR.set(&mut store, lamp, "red").unwrap();
        store.close().unwrap();

        let mut store = Store::open(&path, item_registry(true)).unwrap();
        assert!(store.reconcile_all().unwrap().iter().all(|(_, m)| *m == Migration::Unchanged));
        store.load_all().unwrap();
        assert_eq!(NAME.get(&store, lamp).unwrap(), "lamp");
        assert_eq!(COLOUR.get(&store, lamp).unwrap(), "red");
    }

    #[test]
    fn test_mixin_is_not_reconciled() {
        let reg = ClassRegistry::new().with(ClassDef::new("Mixin")).unwrap();
        let mut store = Store::open_in_memory(reg).unwrap();
        assert_eq!(store.reconcile("Mixin").unwrap(), Migration::NotOwner);
    }
}
