//! Table definitions derived from class schemas, plus SQLite introspection

use crate::class::ClassSchema;
use crate::Result;
use rusqlite::Connection;

/// Quote an identifier for use in SQL
pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Column definitions of a class table: `id`, `_class`, then one per field
pub fn column_definitions(class: &ClassSchema) -> Vec<String> {
    let mut defs = vec![
        "id INTEGER PRIMARY KEY".to_string(),
        "_class TEXT NOT NULL DEFAULT ''".to_string(),
    ];
    defs.extend(class.columns.iter().map(|c| c.kind.definition(&c.name)));
    defs
}

/// SQL to create the table of a table-owning class
pub fn create_table(class: &ClassSchema) -> String {
    create_table_named(&class.name, class, false)
}

/// Same shape as [`create_table`], under another name
pub fn create_table_named(table: &str, class: &ClassSchema, temporary: bool) -> String {
    format!(
        "CREATE {}TABLE IF NOT EXISTS {} ({})",
        if temporary { "TEMPORARY " } else { "" },
        quote(table),
        column_definitions(class).join(", ")
    )
}

/// Column names of a table as the database currently has them, in table order.
///
/// Empty if the table does not exist.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let names = stmt
        .query_map([table], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

/// User tables in the main schema
pub fn list_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassDef, ClassRegistry, ROOT_CLASS};

    #[test]
    fn test_create_table_sql() {
        let reg = ClassRegistry::new()
            .with(ClassDef::new("Item").extends(ROOT_CLASS).text("name").blob("bag"))
            .unwrap();
        let sql = create_table(reg.get("Item").unwrap());
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS \"Item\" (id INTEGER PRIMARY KEY, _class TEXT NOT NULL DEFAULT '', \"_name\" TEXT DEFAULT '', \"_bag\" BLOB DEFAULT NULL)"
        );
    }

    #[test]
    fn test_introspection() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, _class TEXT, _a INT)", []).unwrap();

        assert_eq!(table_columns(&conn, "t").unwrap(), vec!["id", "_class", "_a"]);
        assert!(table_columns(&conn, "missing").unwrap().is_empty());
        assert_eq!(list_tables(&conn).unwrap(), vec!["t"]);
        assert!(table_exists(&conn, "t").unwrap());
        assert!(!table_exists(&conn, "missing").unwrap());
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("Room"), "\"Room\"");
        assert_eq!(quote("a\"b"), "\"a\"\"b\"");
    }
}
