//! Type-safe, efficient identifiers for transit entities.
//!
//! All identifiers use Arc<str> for cheap cloning and minimal memory overhead.
//! Source identifiers are translated to dense indices through an [`IdTable`]
//! owned by the timetable or network that loaded them.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

macro_rules! impl_identifier {
    ($name:ident) => {
        #[derive(Clone, Debug)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(s: impl AsRef<str>) -> Self {
                Self(s.as_ref().into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.0.hash(state);
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        #[cfg(feature = "serde")]
        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }
    };
}

impl_identifier!(StopIdentifier);
impl_identifier!(RouteIdentifier);
impl_identifier!(TripIdentifier);
impl_identifier!(ServiceIdentifier);
impl_identifier!(ShapeIdentifier);

/// Dense index of a stop inside one loaded timetable
pub type StopIndex = u32;

/// Dense index of a trip inside one loaded timetable
pub type TripIndex = u32;

/// Dense index of a service calendar inside one loaded timetable
pub type ServiceIndex = u32;

/// Translation between source identifiers and dense zero-based indices.
///
/// One table is built per load and owned by whatever was loaded; nothing is
/// shared between networks.
#[derive(Clone, Debug)]
pub struct IdTable<K> {
    index: HashMap<K, u32>,
    keys: Vec<K>,
}

impl<K: Clone + Eq + Hash> IdTable<K> {
    pub fn new() -> Self {
        Self {
            index: HashMap::new(),
            keys: Vec::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            index: HashMap::with_capacity(capacity),
            keys: Vec::with_capacity(capacity),
        }
    }

    /// Returns the index for `key`, assigning the next free one if unseen
    pub fn intern(&mut self, key: K) -> u32 {
        if let Some(&idx) = self.index.get(&key) {
            return idx;
        }
        let idx = self.keys.len() as u32;
        self.keys.push(key.clone());
        self.index.insert(key, idx);
        idx
    }

    /// Assigns a fresh index, or returns `None` if `key` is already known
    pub fn insert_new(&mut self, key: K) -> Option<u32> {
        if self.index.contains_key(&key) {
            return None;
        }
        Some(self.intern(key))
    }

    pub fn get(&self, key: &K) -> Option<u32> {
        self.index.get(key).copied()
    }

    pub fn key(&self, idx: u32) -> Option<&K> {
        self.keys.get(idx as usize)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys in index order
    pub fn keys(&self) -> &[K] {
        &self.keys
    }
}

impl<K: Clone + Eq + Hash> Default for IdTable<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_equality() {
        let id1 = StopIdentifier::new("stop_123");
        let id2 = StopIdentifier::new("stop_123");
        let id3 = id1.clone();

        assert_eq!(id1, id2);
        assert_eq!(id1, id3);
        assert!(Arc::ptr_eq(&id1.0, &id3.0)); // Clone shares Arc
    }

    #[test]
    fn test_identifier_display() {
        let id = RouteIdentifier::new("route_1");
        assert_eq!(format!("{}", id), "route_1");
    }

    #[test]
    fn test_id_table_is_dense() {
        let mut table = IdTable::new();
        assert_eq!(table.intern(StopIdentifier::new("b")), 0);
        assert_eq!(table.intern(StopIdentifier::new("a")), 1);
        assert_eq!(table.intern(StopIdentifier::new("b")), 0);

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(&StopIdentifier::new("a")), Some(1));
        assert_eq!(table.key(1).map(|k| k.as_str()), Some("a"));
        assert_eq!(table.key(2), None);
    }

    #[test]
    fn test_id_table_insert_new_rejects_duplicates() {
        let mut table: IdTable<i64> = IdTable::new();
        assert_eq!(table.insert_new(42), Some(0));
        assert_eq!(table.insert_new(42), None);
        assert_eq!(table.insert_new(7), Some(1));
    }
}
