//! Field descriptors - typed accessors over an entity's raw column storage
//!
//! Descriptors are declared as constants next to the domain type that uses
//! them and carry only the public field name:
//!
//! ```
//! use mudstore::field::{Text, Reference, ReverseCollection};
//!
//! const NAME: Text = Text::new("name");
//! const ANCHOR: Reference = Reference::new("anchor");
//! const EXITS: ReverseCollection = ReverseCollection::new("Exit", "anchor");
//! ```
//!
//! Every setter writes through to the owning table immediately.

use crate::identity::EntityId;
use crate::storage::Store;
use crate::{Error, Result};
use rusqlite::types::Value;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Separator used by [`TextList`]
pub const LIST_SEPARATOR: char = '|';

fn type_error(field: &str, expected: &'static str) -> Error {
    Error::FieldType {
        field: field.to_string(),
        expected,
    }
}

/// Text column
#[derive(Debug, Clone, Copy)]
pub struct Text {
    name: &'static str,
}

impl Text {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, store: &Store, id: EntityId) -> Result<String> {
        match store.read_field(id, self.name)? {
            Some(Value::Text(s)) => Ok(s.clone()),
            None | Some(Value::Null) => Ok(String::new()),
            Some(_) => Err(type_error(self.name, "text")),
        }
    }

    pub fn set(&self, store: &mut Store, id: EntityId, value: impl Into<String>) -> Result<()> {
        store.write_field(id, self.name, Value::Text(value.into()))
    }
}

/// Integer column
#[derive(Debug, Clone, Copy)]
pub struct Integer {
    name: &'static str,
}

impl Integer {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, store: &Store, id: EntityId) -> Result<i64> {
        match store.read_field(id, self.name)? {
            Some(Value::Integer(n)) => Ok(*n),
            None | Some(Value::Null) => Ok(0),
            Some(_) => Err(type_error(self.name, "integer")),
        }
    }

    pub fn set(&self, store: &mut Store, id: EntityId, value: i64) -> Result<()> {
        store.write_field(id, self.name, Value::Integer(value))
    }
}

/// Boolean stored as integer; any non-zero value reads as true
#[derive(Debug, Clone, Copy)]
pub struct Boolean {
    name: &'static str,
}

impl Boolean {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, store: &Store, id: EntityId) -> Result<bool> {
        match store.read_field(id, self.name)? {
            Some(Value::Integer(n)) => Ok(*n != 0),
            None | Some(Value::Null) => Ok(false),
            Some(_) => Err(type_error(self.name, "boolean")),
        }
    }

    pub fn set(&self, store: &mut Store, id: EntityId, value: bool) -> Result<()> {
        store.write_field(id, self.name, Value::Integer(i64::from(value)))
    }
}

/// List of strings kept in one text column, joined by [`LIST_SEPARATOR`].
///
/// Items must not contain the separator themselves. The empty list is
/// stored as `""`, so a list holding one empty item is refused.
#[derive(Debug, Clone, Copy)]
pub struct TextList {
    name: &'static str,
}

impl TextList {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, store: &Store, id: EntityId) -> Result<Vec<String>> {
        match store.read_field(id, self.name)? {
            Some(Value::Text(s)) if !s.is_empty() => {
                Ok(s.split(LIST_SEPARATOR).map(String::from).collect())
            }
            Some(Value::Text(_)) | None | Some(Value::Null) => Ok(Vec::new()),
            Some(_) => Err(type_error(self.name, "text list")),
        }
    }

    pub fn set<S: AsRef<str>>(&self, store: &mut Store, id: EntityId, items: &[S]) -> Result<()> {
        if items.iter().any(|item| item.as_ref().contains(LIST_SEPARATOR)) {
            return Err(type_error(self.name, "items without '|'"));
        }
        if items.len() == 1 && items[0].as_ref().is_empty() {
            return Err(Error::InvalidValue {
                field: self.name.to_string(),
                reason: "a lone empty item reads back as the empty list",
            });
        }
        let joined = items.iter().map(AsRef::as_ref).collect::<Vec<_>>().join("|");
        store.write_field(id, self.name, Value::Text(joined))
    }
}

/// Opaque structured value serialized to JSON bytes.
///
/// A never-written blob reads as `T::default()`.
#[derive(Debug)]
pub struct Blob<T> {
    name: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T> Clone for Blob<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Blob<T> {}

impl<T: Serialize + DeserializeOwned + Default> Blob<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _value: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self, store: &Store, id: EntityId) -> Result<T> {
        match store.read_field(id, self.name)? {
            Some(Value::Blob(bytes)) if !bytes.is_empty() => Ok(serde_json::from_slice(bytes)?),
            Some(Value::Blob(_)) | None | Some(Value::Null) => Ok(T::default()),
            Some(_) => Err(type_error(self.name, "blob")),
        }
    }

    pub fn set(&self, store: &mut Store, id: EntityId, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        store.write_field(id, self.name, Value::Blob(bytes))
    }
}

/// Single reference to another entity, stored as its id (0 = null)
#[derive(Debug, Clone, Copy)]
pub struct Reference {
    name: &'static str,
}

impl Reference {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Stored id, unresolved
    pub fn raw(&self, store: &Store, id: EntityId) -> Result<EntityId> {
        match store.read_field(id, self.name)? {
            Some(Value::Integer(n)) => Ok(EntityId::from_sql(*n)),
            None | Some(Value::Null) => Ok(EntityId::NULL),
            Some(_) => Err(type_error(self.name, "reference")),
        }
    }

    /// Resolve through the identity map.
    ///
    /// After the target is deleted and its id reused, this resolves to the
    /// new occupant; holders must clear the reference before deleting.
    pub fn get(&self, store: &Store, id: EntityId) -> Result<Option<EntityId>> {
        store.resolve(self.raw(store, id)?)
    }

    pub fn set(&self, store: &mut Store, id: EntityId, target: Option<EntityId>) -> Result<()> {
        let target = target.unwrap_or(EntityId::NULL);
        store.write_field(id, self.name, Value::Integer(target.as_sql()))
    }
}

/// Every entity of `class` whose reference `field` points at the holder
#[derive(Debug, Clone, Copy)]
pub struct ReverseCollection {
    class: &'static str,
    field: &'static str,
}

impl ReverseCollection {
    pub const fn new(class: &'static str, field: &'static str) -> Self {
        Self { class, field }
    }

    pub fn get(&self, store: &Store, id: EntityId) -> Result<Vec<EntityId>> {
        store.referencing(self.class, self.field, id)
    }

    /// Always fails: the collection is computed, not stored
    pub fn set(&self, _store: &mut Store, _id: EntityId, _value: &[EntityId]) -> Result<()> {
        Err(Error::ReadOnlyRelation {
            class: self.class.to_string(),
            field: self.field.to_string(),
        })
    }
}

/// Like [`ReverseCollection`], expecting at most one match
#[derive(Debug, Clone, Copy)]
pub struct ReverseSingleton {
    class: &'static str,
    field: &'static str,
}

impl ReverseSingleton {
    pub const fn new(class: &'static str, field: &'static str) -> Self {
        Self { class, field }
    }

    pub fn get(&self, store: &Store, id: EntityId) -> Result<Option<EntityId>> {
        let hits = store.referencing(self.class, self.field, id)?;
        match hits.as_slice() {
            [] => Ok(None),
            [one] => Ok(Some(*one)),
            _ => Err(Error::AmbiguousRelation {
                class: self.class.to_string(),
                field: self.field.to_string(),
                target: id,
            }),
        }
    }

    /// Always fails: the relation is computed, not stored
    pub fn set(&self, _store: &mut Store, _id: EntityId, _value: Option<EntityId>) -> Result<()> {
        Err(Error::ReadOnlyRelation {
            class: self.class.to_string(),
            field: self.field.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{ClassDef, ClassRegistry, ROOT_CLASS};
    use std::collections::BTreeMap;

    const NAME: Text = Text::new("name");
    const LEVEL: Integer = Integer::new("level");
    const LIT: Boolean = Boolean::new("lit");
    const KEYWORDS: TextList = TextList::new("keywords");
    const NOTES: Blob<BTreeMap<String, Vec<i64>>> = Blob::new("notes");
    const OWNER: Reference = Reference::new("owner");

    fn store() -> Store {
        let reg = ClassRegistry::new()
            .with(
                ClassDef::new("Torch")
                    .extends(ROOT_CLASS)
                    .text("name")
                    .integer("level")
                    .boolean("lit")
                    .text_list("keywords")
                    .blob("notes")
                    .reference("owner"),
            )
            .unwrap();
        let store = Store::open_in_memory(reg).unwrap();
        store.create_tables().unwrap();
        store
    }

    #[test]
    fn test_scalar_fields() {
        let mut store = store();
        let id = store.create("Torch").unwrap();

        assert_eq!(NAME.get(&store, id).unwrap(), "");
        assert_eq!(LEVEL.get(&store, id).unwrap(), 0);
        assert!(!LIT.get(&store, id).unwrap());

        NAME.set(&mut store, id, "torch").unwrap();
        LEVEL.set(&mut store, id, -4).unwrap();
        LIT.set(&mut store, id, true).unwrap();

        assert_eq!(NAME.get(&store, id).unwrap(), "torch");
        assert_eq!(LEVEL.get(&store, id).unwrap(), -4);
        assert!(LIT.get(&store, id).unwrap());
    }

    #[test]
    fn test_boolean_coerces_nonzero() {
        let mut store = store();
        let id = store.create("Torch").unwrap();
        store.write_field(id, "lit", Value::Integer(7)).unwrap();
        assert!(LIT.get(&store, id).unwrap());
    }

    #[test]
    fn test_text_list() {
        let mut store = store();
        let id = store.create("Torch").unwrap();
        assert!(KEYWORDS.get(&store, id).unwrap().is_empty());

        KEYWORDS.set(&mut store, id, &["torch", "light"]).unwrap();
        assert_eq!(KEYWORDS.get(&store, id).unwrap(), vec!["torch", "light"]);
        assert!(KEYWORDS.set(&mut store, id, &["a|b"]).is_err());
    }

    #[test]
    fn test_text_list_refuses_lone_empty_item() {
        let mut store = store();
        let id = store.create("Torch").unwrap();
        KEYWORDS.set(&mut store, id, &["torch"]).unwrap();

        let err = KEYWORDS.set(&mut store, id, &[""]).unwrap_err();
        assert!(matches!(err, Error::InvalidValue { field, .. } if field == "keywords"));
        assert_eq!(KEYWORDS.get(&store, id).unwrap(), vec!["torch"]);

        let empty: [&str; 0] = [];
        KEYWORDS.set(&mut store, id, &empty).unwrap();
        assert!(KEYWORDS.get(&store, id).unwrap().is_empty());

        KEYWORDS.set(&mut store, id, &["", ""]).unwrap();
        assert_eq!(KEYWORDS.get(&store, id).unwrap(), vec!["", ""]);
    }

    #[test]
    fn test_blob_structural_value() {
        let mut store = store();
        let id = store.create("Torch").unwrap();
        assert!(NOTES.get(&store, id).unwrap().is_empty());

        let mut notes = BTreeMap::new();
        notes.insert("burns".to_string(), vec![1, 2, 3]);
        NOTES.set(&mut store, id, &notes).unwrap();
        assert_eq!(NOTES.get(&store, id).unwrap(), notes);
    }

    #[test]
    fn test_reference_null_and_target() {
        let mut store = store();
        let torch = store.create("Torch").unwrap();
        let other = store.create("Torch").unwrap();

        assert_eq!(OWNER.get(&store, torch).unwrap(), None);
        OWNER.set(&mut store, torch, Some(other)).unwrap();
        assert_eq!(OWNER.get(&store, torch).unwrap(), Some(other));
        OWNER.set(&mut store, torch, None).unwrap();
        assert_eq!(OWNER.raw(&store, torch).unwrap(), EntityId::NULL);
    }

    #[test]
    fn test_dangling_reference_aliases_new_occupant() {
        let mut store = store();
        let torch = store.create("Torch").unwrap();
        let victim = store.create("Torch").unwrap();
        let _keep_max = store.create("Torch").unwrap();
        OWNER.set(&mut store, torch, Some(victim)).unwrap();

        store.delete(victim).unwrap();
        assert!(matches!(OWNER.get(&store, torch), Err(Error::UnknownIdentity(_))));

        let newcomer = store.create("Torch").unwrap();
        assert_eq!(newcomer, victim);
        assert_eq!(OWNER.get(&store, torch).unwrap(), Some(newcomer));
    }

    #[test]
    fn test_wrong_type_in_raw_storage() {
        let mut store = store();
        let id = store.create("Torch").unwrap();
        store.write_field(id, "level", Value::Text("high".into())).unwrap();
        assert!(matches!(LEVEL.get(&store, id), Err(Error::FieldType { .. })));
    }
}
