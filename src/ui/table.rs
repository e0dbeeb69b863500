use crate::storage::{DbStats, TableInfo};
use std::collections::BTreeMap;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct ClassRow {
    #[tabled(rename = "Class")]
    class: String,
    #[tabled(rename = "Entities")]
    entities: usize,
}

#[derive(Tabled)]
struct TableRow {
    #[tabled(rename = "Table")]
    name: String,
    #[tabled(rename = "Rows")]
    rows: usize,
    #[tabled(rename = "Columns")]
    columns: String,
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "Table")]
    table: String,
    #[tabled(rename = "Column")]
    column: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn render<T: Tabled>(rows: Vec<T>) -> String {
    if rows.is_empty() {
        return String::new();
    }
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Entity count per class tag
pub fn classes_table(stats: &DbStats) -> String {
    render(
        stats
            .classes
            .iter()
            .map(|(class, entities)| ClassRow {
                class: class.clone(),
                entities: *entities,
            })
            .collect(),
    )
}

pub fn tables_table(tables: &[TableInfo]) -> String {
    render(
        tables
            .iter()
            .map(|t| TableRow {
                name: t.name.clone(),
                rows: t.rows,
                columns: t.columns.join(", "),
            })
            .collect(),
    )
}

/// One line per stored column of an entity, grouped by table
pub fn rows_table(rows: &BTreeMap<String, BTreeMap<String, serde_json::Value>>) -> String {
    render(
        rows.iter()
            .flat_map(|(table, fields)| {
                fields.iter().map(move |(column, value)| FieldRow {
                    table: table.clone(),
                    column: column.clone(),
                    value: value.to_string(),
                })
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_renders_nothing() {
        assert!(tables_table(&[]).is_empty());
    }

    #[test]
    fn test_tables_table_lists_columns() {
        let out = tables_table(&[TableInfo {
            name: "Room".to_string(),
            columns: vec!["id".to_string(), "_class".to_string(), "_name".to_string()],
            rows: 3,
        }]);
        assert!(out.contains("Room"));
        assert!(out.contains("id, _class, _name"));
    }
}
