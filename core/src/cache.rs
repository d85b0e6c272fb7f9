//! Keyed memos with hit/miss accounting.

use indexmap::IndexMap;
use std::{borrow::Borrow, hash::Hash, path::PathBuf, rc::Rc, time::SystemTime};

/// A generic key-value memo. Iteration order is insertion order.
pub struct Cache<K, V> {
    map: IndexMap<K, V>,
    stats: Stats,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Stats {
    pub puts: u64,
    pub hits: u64,
    pub misses: u64,
    pub clears: u64,
}

impl<K, V> Default for Cache<K, V> {
    fn default() -> Self {
        Self {
            map: IndexMap::new(),
            stats: Stats::default(),
        }
    }
}

impl<K: Hash + Eq, V> Cache<K, V> {
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if let Some(value) = self.map.get(key) {
            self.stats.hits += 1;
            Some(value)
        } else {
            self.stats.misses += 1;
            None
        }
    }

    pub fn put(&mut self, key: K, value: V) {
        self.stats.puts += 1;
        self.map.insert(key, value);
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    pub fn clear_entry<Q>(&mut self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if self.map.shift_remove(key).is_some() {
            self.stats.clears += 1;
        }
    }

    pub fn clear_all(&mut self) {
        self.stats.clears += 1;
        self.map.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.map.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> Stats {
        self.stats
    }
}

/// The memos consulted by the build engine. One instance lives in each
/// [`BuildContext`](crate::BuildContext); the `clean` target clears all
/// three because the build tree is gone.
#[derive(Default)]
pub struct Caches {
    /// Directories known to have been created during this run. An entry
    /// implies entries for all of its ancestors.
    pub dir_exists: Cache<PathBuf, ()>,
    /// Last-modification timestamps. An entry exists only if the path existed
    /// on disk at the time of insertion.
    pub mtime: Cache<PathBuf, SystemTime>,
    /// Transitive resolved-header lists, keyed by raw include form
    /// (`"add.h"`) or by a concrete source path. Unresolved includes are
    /// memoized with an empty list so they are not rescanned.
    pub included_deps: Cache<String, Rc<Vec<PathBuf>>>,
}

impl Caches {
    pub fn clear_all(&mut self) {
        self.dir_exists.clear_all();
        self.mtime.clear_all();
        self.included_deps.clear_all();
    }
}
