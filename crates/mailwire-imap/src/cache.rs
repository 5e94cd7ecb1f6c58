//! Cache of parsed body structures.
//!
//! Entries are keyed by server, UIDVALIDITY and UID, so a UIDVALIDITY change
//! makes every older entry of that server unreachable. The parser never
//! writes here; a session inserts the trees its observer receives.

use std::collections::{HashMap, VecDeque};

use crate::parser::BodyPart;
use crate::types::{Uid, UidValidity};

/// Identity of one cached body structure.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShellKey {
    /// Server account key.
    pub server_key: String,
    /// UIDVALIDITY of the mailbox the message lives in.
    pub uid_validity: UidValidity,
    /// Message UID.
    pub uid: Uid,
}

impl ShellKey {
    /// Creates a key.
    #[must_use]
    pub fn new(server_key: impl Into<String>, uid_validity: UidValidity, uid: Uid) -> Self {
        Self {
            server_key: server_key.into(),
            uid_validity,
            uid,
        }
    }
}

/// Least-recently-used map from [`ShellKey`] to body structure.
#[derive(Debug, Clone)]
pub struct BodyStructureCache {
    capacity: usize,
    entries: HashMap<ShellKey, BodyPart>,
    // Front is least recently used.
    recency: VecDeque<ShellKey>,
}

impl BodyStructureCache {
    /// Creates a cache holding at most `capacity` trees.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            recency: VecDeque::with_capacity(capacity),
        }
    }

    /// Stores a tree, evicting the least recently used one when full.
    pub fn insert(&mut self, key: ShellKey, body: BodyPart) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.clone(), body).is_some() {
            self.touch(&key);
            return;
        }
        self.recency.push_back(key);
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.recency.pop_front() else {
                break;
            };
            tracing::trace!(uid = oldest.uid.get(), "evicting body structure");
            self.entries.remove(&oldest);
        }
    }

    /// Looks up a tree and marks it most recently used.
    pub fn get(&mut self, key: &ShellKey) -> Option<&BodyPart> {
        if self.entries.contains_key(key) {
            self.touch(key);
        }
        self.entries.get(key)
    }

    /// Removes one entry.
    pub fn remove(&mut self, key: &ShellKey) -> Option<BodyPart> {
        let removed = self.entries.remove(key)?;
        self.recency.retain(|k| k != key);
        Some(removed)
    }

    /// Drops every entry of `server_key` whose UIDVALIDITY differs from `current`.
    pub fn invalidate_validity(&mut self, server_key: &str, current: UidValidity) {
        let stale = |k: &ShellKey| k.server_key == server_key && k.uid_validity != current;
        self.entries.retain(|k, _| !stale(k));
        self.recency.retain(|k| !stale(k));
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
    }

    /// Number of cached trees.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&mut self, key: &ShellKey) {
        if let Some(pos) = self.recency.iter().position(|k| k == key) {
            if let Some(k) = self.recency.remove(pos) {
                self.recency.push_back(k);
            }
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::parser::{BodyPartKind, LeafPart};

    fn leaf(size: u32) -> BodyPart {
        BodyPart {
            part_number: "1".into(),
            kind: BodyPartKind::Leaf(LeafPart {
                media_type: "text".into(),
                subtype: "plain".into(),
                content_id: None,
                description: None,
                encoding: "7BIT".into(),
                octet_size: size,
            }),
        }
    }

    fn key(validity: u32, uid: u32) -> ShellKey {
        ShellKey::new(
            "server",
            UidValidity::new(validity).unwrap(),
            Uid::new(uid).unwrap(),
        )
    }

    #[test]
    fn test_insert_and_get() {
        let mut cache = BodyStructureCache::new(4);
        cache.insert(key(1, 10), leaf(100));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key(1, 10)), Some(&leaf(100)));
        assert!(cache.get(&key(2, 10)).is_none());
    }

    #[test]
    fn test_lru_eviction() {
        let mut cache = BodyStructureCache::new(2);
        cache.insert(key(1, 1), leaf(1));
        cache.insert(key(1, 2), leaf(2));
        // Touch 1 so 2 becomes the oldest.
        assert!(cache.get(&key(1, 1)).is_some());
        cache.insert(key(1, 3), leaf(3));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key(1, 2)).is_none());
        assert!(cache.get(&key(1, 1)).is_some());
        assert!(cache.get(&key(1, 3)).is_some());
    }

    #[test]
    fn test_replace_does_not_grow() {
        let mut cache = BodyStructureCache::new(2);
        cache.insert(key(1, 1), leaf(1));
        cache.insert(key(1, 1), leaf(5));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&key(1, 1)), Some(&leaf(5)));
    }

    #[test]
    fn test_invalidate_validity() {
        let mut cache = BodyStructureCache::new(8);
        cache.insert(key(1, 1), leaf(1));
        cache.insert(key(2, 1), leaf(2));
        cache.insert(
            ShellKey::new("other", UidValidity::new(1).unwrap(), Uid::new(1).unwrap()),
            leaf(3),
        );

        cache.invalidate_validity("server", UidValidity::new(2).unwrap());
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key(1, 1)).is_none());
        assert!(cache.get(&key(2, 1)).is_some());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut cache = BodyStructureCache::new(8);
        cache.insert(key(1, 1), leaf(1));
        cache.insert(key(1, 2), leaf(2));
        assert_eq!(cache.remove(&key(1, 1)), Some(leaf(1)));
        assert!(cache.remove(&key(1, 1)).is_none());
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let mut cache = BodyStructureCache::new(0);
        cache.insert(key(1, 1), leaf(1));
        assert!(cache.is_empty());
    }
}
