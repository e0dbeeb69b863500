//! Entity identity - dense, reusable integer ids and the live identity map
//!
//! Ids are small non-negative integers. `0` is reserved for "no reference"
//! and is never handed out. Freed ids below the current maximum are kept as
//! gaps and reused smallest-first before the maximum grows.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Process-wide unique identity of a persisted entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl EntityId {
    /// The null reference. Never allocated.
    pub const NULL: EntityId = EntityId(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Value stored in `id` and single-reference columns
    pub fn as_sql(self) -> i64 {
        self.0 as i64
    }

    /// Interpret a stored column value; negative values are treated as null.
    pub fn from_sql(raw: i64) -> Self {
        if raw <= 0 { Self::NULL } else { EntityId(raw as u64) }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for EntityId {
    fn from(raw: u64) -> Self {
        EntityId(raw)
    }
}

/// Identity map with an embedded id allocator.
///
/// Invariant: every live id maps to exactly one value, and `allocate` never
/// returns an id that is currently live.
#[derive(Debug)]
pub struct IdentityMap<T> {
    live: BTreeMap<EntityId, T>,
    /// Freed or skipped ids strictly below `max`
    gaps: BTreeSet<EntityId>,
    max: u64,
}

impl<T> Default for IdentityMap<T> {
    fn default() -> Self {
        Self {
            live: BTreeMap::new(),
            gaps: BTreeSet::new(),
            max: 0,
        }
    }
}

impl<T> IdentityMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the smallest available id, preferring gaps over growing the max.
    ///
    /// The caller is expected to `insert` a value at the returned id.
    pub fn allocate(&mut self) -> EntityId {
        if let Some(id) = self.gaps.pop_first() {
            return id;
        }
        self.max += 1;
        EntityId(self.max)
    }

    /// Place a value at an explicit id.
    ///
    /// Ids skipped over when this grows the max are recorded as gaps;
    /// inserting into an existing gap consumes it. Returns the previous value.
    pub fn insert(&mut self, id: EntityId, value: T) -> Option<T> {
        debug_assert!(!id.is_null(), "id 0 is reserved");
        if id.0 > self.max {
            self.gaps.extend((self.max + 1..id.0).map(EntityId));
            self.max = id.0;
        } else {
            self.gaps.remove(&id);
        }
        self.live.insert(id, value)
    }

    /// Evict an id and return it to the free pool.
    pub fn release(&mut self, id: EntityId) -> Result<T> {
        let value = self.live.remove(&id).ok_or(Error::UnknownIdentity(id))?;

        if id.0 < self.max {
            self.gaps.insert(id);
        } else {
            // Releasing the top id shrinks the range instead of leaving a gap.
            self.max = self.live.keys().next_back().map_or(0, |id| id.0);
            let max = self.max;
            self.gaps.retain(|gap| gap.0 < max);
        }
        Ok(value)
    }

    pub fn lookup(&self, id: EntityId) -> Result<&T> {
        self.live.get(&id).ok_or(Error::UnknownIdentity(id))
    }

    pub fn lookup_mut(&mut self, id: EntityId) -> Result<&mut T> {
        self.live.get_mut(&id).ok_or(Error::UnknownIdentity(id))
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.live.contains_key(&id)
    }

    /// Live ids in ascending order
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.live.keys().copied()
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.live.values()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.live.values_mut()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Highest id handed out or inserted so far
    pub fn max_id(&self) -> EntityId {
        EntityId(self.max)
    }

    pub fn clear(&mut self) {
        self.live.clear();
        self.gaps.clear();
        self.max = 0;
    }
}
