//! Relation resolvers - reverse lookups over single-reference columns
//!
//! One-to-many and one-to-one back-references are never stored. They are
//! recomputed on every read by scanning the table that owns the reference
//! column. Many-to-many relations use a join class with two references and
//! a reverse collection on each side.

use crate::identity::EntityId;
use crate::storage::Store;
use crate::storage::schema::quote;
use crate::Result;

impl Store {
    /// Ids of entities of `class` whose reference `field` equals `target`,
    /// in ascending order, each resolved through the identity map.
    pub fn referencing(&self, class: &str, field: &str, target: EntityId) -> Result<Vec<EntityId>> {
        let (owner, column) = self.registry().column_owner(class, field)?;
        let sql = format!(
            "SELECT id FROM {} WHERE {} = ?1 ORDER BY id",
            quote(&owner.name),
            quote(&column.name)
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let ids = stmt
            .query_map([target.as_sql()], |row| row.get::<_, i64>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        ids.into_iter()
            .map(|raw| self.entity(EntityId::from_sql(raw)).map(|record| record.id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::class::{ClassDef, ClassRegistry, ROOT_CLASS};
    use crate::field::{Reference, ReverseCollection, ReverseSingleton, Text};
    use crate::storage::Store;
    use crate::Error;

    const ANCHOR: Reference = Reference::new("anchor");
    const EXITS: ReverseCollection = ReverseCollection::new("Exit", "anchor");

    const HOLDER: Reference = Reference::new("holder");
    const SHADOW: ReverseSingleton = ReverseSingleton::new("Shadow", "holder");

    const TITLE: Text = Text::new("title");
    const LINK_ROOM: Reference = Reference::new("room");
    const LINK_EMITTER: Reference = Reference::new("emitter");
    const ROOM_LINKS: ReverseCollection = ReverseCollection::new("RoomEmitter", "room");
    const EMITTER_LINKS: ReverseCollection = ReverseCollection::new("RoomEmitter", "emitter");

    fn store() -> Store {
        let reg = ClassRegistry::new()
            .with(ClassDef::new("Room").extends(ROOT_CLASS).text("title"))
            .unwrap()
            .with(ClassDef::new("Exit").extends(ROOT_CLASS).reference("anchor"))
            .unwrap()
            .with(ClassDef::new("Door").extends("Exit").boolean("locked"))
            .unwrap()
            .with(ClassDef::new("Shadow").extends(ROOT_CLASS).reference("holder"))
            .unwrap()
            .with(ClassDef::new("Emitter").extends(ROOT_CLASS).text("title"))
            .unwrap()
            .with(
                ClassDef::new("RoomEmitter")
                    .extends(ROOT_CLASS)
                    .reference("room")
                    .reference("emitter"),
            )
            .unwrap();
        let store = Store::open_in_memory(reg).unwrap();
        store.create_tables().unwrap();
        store
    }

    #[test]
    fn test_reverse_collection_follows_references() {
        let mut store = store();
        let room = store.create("Room").unwrap();
        let north = store.create("Exit").unwrap();
        let door = store.create("Door").unwrap();
        let elsewhere = store.create("Exit").unwrap();

        ANCHOR.set(&mut store, north, Some(room)).unwrap();
        ANCHOR.set(&mut store, door, Some(room)).unwrap();

        // subclasses share the owner's table, so the door shows up too
        assert_eq!(EXITS.get(&store, room).unwrap(), vec![north, door]);
        assert!(EXITS.get(&store, elsewhere).unwrap().is_empty());

        ANCHOR.set(&mut store, north, None).unwrap();
        assert_eq!(EXITS.get(&store, room).unwrap(), vec![door]);
    }

    #[test]
    fn test_reverse_relations_are_read_only() {
        let mut store = store();
        let room = store.create("Room").unwrap();
        assert!(matches!(EXITS.set(&mut store, room, &[]), Err(Error::ReadOnlyRelation { .. })));
        assert!(matches!(SHADOW.set(&mut store, room, None), Err(Error::ReadOnlyRelation { .. })));
    }

    #[test]
    fn test_reverse_singleton() {
        let mut store = store();
        let room = store.create("Room").unwrap();
        assert_eq!(SHADOW.get(&store, room).unwrap(), None);

        let first = store.create("Shadow").unwrap();
        HOLDER.set(&mut store, first, Some(room)).unwrap();
        assert_eq!(SHADOW.get(&store, room).unwrap(), Some(first));

        let second = store.create("Shadow").unwrap();
        HOLDER.set(&mut store, second, Some(room)).unwrap();
        assert!(matches!(SHADOW.get(&store, room), Err(Error::AmbiguousRelation { .. })));
    }

    #[test]
    fn test_many_to_many_through_join_class() {
        let mut store = store();
        let hall = store.create("Room").unwrap();
        let cellar = store.create("Room").unwrap();
        let bell = store.create("Emitter").unwrap();
        TITLE.set(&mut store, bell, "bell").unwrap();

        for room in [hall, cellar] {
            let link = store.create("RoomEmitter").unwrap();
            LINK_ROOM.set(&mut store, link, Some(room)).unwrap();
            LINK_EMITTER.set(&mut store, link, Some(bell)).unwrap();
        }

        let rooms: Vec<_> = EMITTER_LINKS
            .get(&store, bell)
            .unwrap()
            .into_iter()
            .map(|link| LINK_ROOM.get(&store, link).unwrap())
            .collect();
        assert_eq!(rooms, vec![Some(hall), Some(cellar)]);

        let emitters = ROOM_LINKS.get(&store, cellar).unwrap();
        assert_eq!(emitters.len(), 1);
        assert_eq!(LINK_EMITTER.get(&store, emitters[0]).unwrap(), Some(bell));
    }
}
