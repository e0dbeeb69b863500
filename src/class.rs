//! Class definitions and schema derivation
//!
//! Entity classes are declared explicitly as an ordered list of base classes
//! plus the persisted fields the class itself introduces. Deriving a class
//! computes its columns and whether it owns a table:
//! - a class that declares at least one field owns a table named after itself
//! - a class with no fields is a mixin and stores nothing of its own
//!
//! Every class that should be instantiable must reach the root class
//! [`ROOT_CLASS`] through its bases. The root table carries the `_class` tag
//! used to reconstruct entities on load.

use crate::entity::EntityRecord;
use crate::{Error, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;

/// Name of the root class and of the table every entity has a header row in
pub const ROOT_CLASS: &str = "Persistent";

/// Prefix separating column names from public field names
pub const COLUMN_PREFIX: &str = "_";

/// Hook run once per entity after the whole dataset is in memory.
pub type PostLoadHook = fn(&mut EntityRecord);

/// Declared kind of a persisted field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Text,
    Integer,
    Boolean,
    /// Structured value serialized to bytes
    Blob,
    /// Id of another entity, 0 = null
    Reference,
    /// List of strings stored as one `|`-joined text column
    TextList,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::Blob => "blob",
            FieldKind::Reference => "reference",
            FieldKind::TextList => "text_list",
        }
    }

    /// Physical column kind backing this field
    pub fn column_kind(&self) -> ColumnKind {
        match self {
            FieldKind::Text | FieldKind::TextList => ColumnKind::Text,
            FieldKind::Integer | FieldKind::Boolean | FieldKind::Reference => ColumnKind::Integer,
            FieldKind::Blob => ColumnKind::Blob,
        }
    }
}

impl FromStr for FieldKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" | "string" | "str" => Ok(FieldKind::Text),
            "integer" | "int" => Ok(FieldKind::Integer),
            "boolean" | "bool" => Ok(FieldKind::Boolean),
            "blob" | "pickle" => Ok(FieldKind::Blob),
            "reference" | "ref" => Ok(FieldKind::Reference),
            "text_list" | "stringlist" => Ok(FieldKind::TextList),
            _ => Err(Error::InvalidDefinition(format!("Unknown field kind: {}", s))),
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Physical SQLite storage class of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    Text,
    Integer,
    Blob,
}

impl ColumnKind {
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnKind::Text => "TEXT",
            ColumnKind::Integer => "INTEGER",
            ColumnKind::Blob => "BLOB",
        }
    }

    /// SQL literal used as the column default
    pub fn default_sql(&self) -> &'static str {
        match self {
            ColumnKind::Text => "''",
            ColumnKind::Integer => "0",
            ColumnKind::Blob => "NULL",
        }
    }

    /// In-memory counterpart of [`ColumnKind::default_sql`]
    pub fn default_value(&self) -> rusqlite::types::Value {
        use rusqlite::types::Value;
        match self {
            ColumnKind::Text => Value::Text(String::new()),
            ColumnKind::Integer => Value::Integer(0),
            ColumnKind::Blob => Value::Null,
        }
    }

    /// Column definition fragment, e.g. `"_name" TEXT DEFAULT ''`
    pub fn definition(&self, column: &str) -> String {
        format!("\"{}\" {} DEFAULT {}", column, self.sql_type(), self.default_sql())
    }
}

/// A field as declared on a class body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldKind,
}

/// Declaration of an entity class.
#[derive(Debug, Clone)]
pub struct ClassDef {
    name: String,
    bases: Vec<String>,
    fields: Vec<FieldDef>,
    post_load: Option<PostLoadHook>,
}

impl ClassDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bases: Vec::new(),
            fields: Vec::new(),
            post_load: None,
        }
    }

    /// Append a base class. Order matters: it is the breadth-first visit order.
    pub fn extends(mut self, base: impl Into<String>) -> Self {
        self.bases.push(base.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDef { name: name.into(), kind });
        self
    }

    pub fn text(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Text)
    }

    pub fn integer(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Integer)
    }

    pub fn boolean(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Boolean)
    }

    pub fn blob(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Blob)
    }

    pub fn reference(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::Reference)
    }

    pub fn text_list(self, name: impl Into<String>) -> Self {
        self.field(name, FieldKind::TextList)
    }

    pub fn on_load(mut self, hook: PostLoadHook) -> Self {
        self.post_load = Some(hook);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A persisted column derived from a field declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Public field name
    pub field: String,
    /// Physical column name (prefixed)
    pub name: String,
    pub field_kind: FieldKind,
    pub kind: ColumnKind,
}

impl Column {
    fn derive(def: &FieldDef) -> Self {
        Self {
            field: def.name.clone(),
            name: column_name(&def.name),
            field_kind: def.kind,
            kind: def.kind.column_kind(),
        }
    }
}

/// Physical column name for a public field name
pub fn column_name(field: &str) -> String {
    format!("{}{}", COLUMN_PREFIX, field)
}

/// Derived, registered form of a [`ClassDef`]
#[derive(Debug, Clone)]
pub struct ClassSchema {
    pub name: String,
    pub bases: Vec<String>,
    pub columns: Vec<Column>,
    pub post_load: Option<PostLoadHook>,
}

impl ClassSchema {
    /// A class owns a table iff it declares persisted fields
    pub fn is_table_owner(&self) -> bool {
        !self.columns.is_empty()
    }

    pub fn column(&self, field: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.field == field)
    }

    /// Physical columns of this class's table, including `id` and `_class`
    pub fn table_columns(&self) -> Vec<String> {
        let mut names = vec!["id".to_string(), "_class".to_string()];
        names.extend(self.columns.iter().map(|c| c.name.clone()));
        names
    }
}

/// Closed registry of entity classes, keyed by class name.
///
/// Registration order is preserved; a base must be registered before any
/// class extending it.
#[derive(Debug, Clone)]
pub struct ClassRegistry {
    classes: HashMap<String, ClassSchema>,
    order: Vec<String>,
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassRegistry {
    /// Create a registry containing only the root class
    pub fn new() -> Self {
        let mut registry = Self {
            classes: HashMap::new(),
            order: Vec::new(),
        };
        let root = ClassDef::new(ROOT_CLASS).integer("patchid");
        registry.insert(root);
        registry
    }

    /// Derive and register a class
    pub fn register(&mut self, def: ClassDef) -> Result<&mut Self> {
        validate_identifier(&def.name)?;

        // SQLite table names ignore case, so `Room` and `ROOM` would share one
        if let Some(existing) = self.classes.keys().find(|k| k.eq_ignore_ascii_case(&def.name)) {
            return Err(Error::InvalidDefinition(format!(
                "class {} clashes with registered class {}",
                def.name, existing
            )));
        }

        let mut seen_bases = HashSet::new();
        for base in &def.bases {
            if !self.classes.contains_key(base) {
                return Err(Error::InvalidDefinition(format!(
                    "class {} extends unregistered class {}",
                    def.name, base
                )));
            }
            if !seen_bases.insert(base) {
                return Err(Error::InvalidDefinition(format!(
                    "class {} lists base {} twice",
                    def.name, base
                )));
            }
        }

        let mut seen_fields = HashSet::new();
        for field in &def.fields {
            validate_identifier(&field.name)?;
            if field.name.eq_ignore_ascii_case("class") {
                return Err(Error::InvalidDefinition(format!(
                    "class {} field {} collides with the class tag column",
                    def.name, field.name
                )));
            }
            if !seen_fields.insert(field.name.to_ascii_lowercase()) {
                return Err(Error::InvalidDefinition(format!(
                    "class {} declares field {} twice",
                    def.name, field.name
                )));
            }
        }

        tracing::debug!(class = %def.name, fields = def.fields.len(), "registered class");
        self.insert(def);
        Ok(self)
    }

    /// Builder-style registration
    pub fn with(mut self, def: ClassDef) -> Result<Self> {
        self.register(def)?;
        Ok(self)
    }

    fn insert(&mut self, def: ClassDef) {
        let schema = ClassSchema {
            columns: def.fields.iter().map(Column::derive).collect(),
            name: def.name.clone(),
            bases: def.bases,
            post_load: def.post_load,
        };
        self.order.push(def.name.clone());
        self.classes.insert(def.name, schema);
    }

    pub fn get(&self, class: &str) -> Result<&ClassSchema> {
        self.classes
            .get(class)
            .ok_or_else(|| Error::UnknownPersistedClass(class.to_string()))
    }

    pub fn contains(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    /// Classes in registration order
    pub fn classes(&self) -> impl Iterator<Item = &ClassSchema> {
        self.order.iter().filter_map(|name| self.classes.get(name))
    }

    /// Table-owning classes in registration order
    pub fn owners(&self) -> impl Iterator<Item = &ClassSchema> {
        self.classes().filter(|c| c.is_table_owner())
    }

    pub fn columns_of(&self, class: &str) -> Result<&[Column]> {
        Ok(&self.get(class)?.columns)
    }

    pub fn is_table_owner(&self, class: &str) -> Result<bool> {
        Ok(self.get(class)?.is_table_owner())
    }

    /// Table holding the class's own fields: its own, or the first
    /// table-owning ancestor's for a mixin.
    pub fn table_name_of(&self, class: &str) -> Result<&str> {
        self.chain(class)?
            .into_iter()
            .find(|c| c.is_table_owner())
            .map(|c| c.name.as_str())
            .ok_or_else(|| Error::NoPersistedTable(class.to_string()))
    }

    /// Breadth-first walk over `class` and its ancestors, each visited once
    pub fn chain(&self, class: &str) -> Result<Vec<&ClassSchema>> {
        let mut queue = VecDeque::from([self.get(class)?]);
        let mut visited = HashSet::new();
        let mut chain = Vec::new();

        while let Some(schema) = queue.pop_front() {
            if !visited.insert(schema.name.as_str()) {
                continue;
            }
            for base in &schema.bases {
                queue.push_back(self.get(base)?);
            }
            chain.push(schema);
        }
        Ok(chain)
    }

    /// Table-owning classes in the chain, in breadth-first order
    pub fn table_owners(&self, class: &str) -> Result<Vec<&ClassSchema>> {
        Ok(self.chain(class)?.into_iter().filter(|c| c.is_table_owner()).collect())
    }

    /// The owner whose table stores `field` for entities of `class`.
    ///
    /// If several ancestors declare the same field name, the first one in
    /// breadth-first order wins.
    pub fn column_owner(&self, class: &str, field: &str) -> Result<(&ClassSchema, &Column)> {
        self.chain(class)?
            .into_iter()
            .find_map(|c| c.column(field).map(|col| (c, col)))
            .ok_or_else(|| Error::UnknownField {
                class: class.to_string(),
                field: field.to_string(),
            })
    }

    /// True if `ancestor` is `class` or appears in its chain
    pub fn is_a(&self, class: &str, ancestor: &str) -> Result<bool> {
        Ok(self.chain(class)?.iter().any(|c| c.name == ancestor))
    }

    /// Fails with `NoPersistedTable` unless instances of `class` can be stored
    pub fn ensure_persistable(&self, class: &str) -> Result<()> {
        if self.is_a(class, ROOT_CLASS)? {
            Ok(())
        } else {
            Err(Error::NoPersistedTable(class.to_string()))
        }
    }

    /// First post-load hook found in breadth-first order
    pub fn post_load_hook(&self, class: &str) -> Result<Option<PostLoadHook>> {
        Ok(self.chain(class)?.into_iter().find_map(|c| c.post_load))
    }
}

/// Class and field names are spliced into SQL, so restrict them to plain identifiers
fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid && !name.to_ascii_lowercase().starts_with("sqlite_") {
        Ok(())
    } else {
        Err(Error::InvalidDefinition(format!("invalid identifier: {:?}", name)))
    }
}
