//! Terminal output for the operator CLI

pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{error, header, section, success, summary_row};
pub use table::{classes_table, rows_table, tables_table};
pub use theme::{theme, Theme};
