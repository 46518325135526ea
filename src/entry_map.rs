//! EntryMap: separate-chaining hash map with stable entry handles.
//!
//! Nodes live in a `SlotMap`; bucket heads and `next` links are slot keys.
//! A key carries a generation, so an [`EntryHandle`] to a removed node
//! resolves to `None` even after its slot has been reused.

use crate::error::{Error, Result};
use crate::guard::{DebugReentrancy, EnumeratorGuard, Version};
use crate::primes;
use crate::views::{Keys, Source, Values};
use crate::HASH_MASK;
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::iter::FusedIterator;
use core::mem;
use slotmap::{DefaultKey, SlotMap};
use std::collections::hash_map::RandomState;
use tracing::trace;

/// Handle to one entry. Reads and writes through it skip hashing entirely.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct EntryHandle(DefaultKey);

impl EntryHandle {
    pub fn key<'a, K, V, S>(&self, map: &'a EntryMap<K, V, S>) -> Option<&'a K> {
        map.nodes.get(self.0).map(|n| &n.key)
    }

    pub fn value<'a, K, V, S>(&self, map: &'a EntryMap<K, V, S>) -> Option<&'a V> {
        map.nodes.get(self.0).map(|n| &n.value)
    }

    pub fn value_mut<'a, K, V, S>(&self, map: &'a mut EntryMap<K, V, S>) -> Option<&'a mut V> {
        map.nodes.get_mut(self.0).map(|n| &mut n.value)
    }

    /// Overwrites the value in place and returns the previous one. Returns
    /// `None` (dropping `value`) if the entry has been removed.
    pub fn replace<K, V, S>(&self, map: &mut EntryMap<K, V, S>, value: V) -> Option<V> {
        self.value_mut(map).map(|slot| mem::replace(slot, value))
    }
}

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    hash: u32,
    next: Option<DefaultKey>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum InsertMode {
    Throw,
    Overwrite,
    ReturnFalseIfExists,
}

enum Inserted<K, V> {
    New(DefaultKey),
    Replaced(DefaultKey, V),
    Rejected(K),
}

pub struct EntryMap<K, V, S = RandomState> {
    hasher: S,
    buckets: Vec<Option<DefaultKey>>,
    nodes: SlotMap<DefaultKey, Node<K, V>>,
    version: Version,
    reentrancy: DebugReentrancy,
}

impl<K, V> EntryMap<K, V> {
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }

    /// Map with at least `capacity` buckets.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::with_capacity_and_hasher(capacity, RandomState::new())
    }
}

impl<K, V> Default for EntryMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> EntryMap<K, V, S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            hasher,
            buckets: vec![None; primes::get_prime(0)],
            nodes: SlotMap::with_key(),
            version: Version::new(),
            reentrancy: DebugReentrancy::new(),
        }
    }

    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Result<Self> {
        if capacity > primes::MAX_PRIME_ARRAY_LENGTH {
            return Err(Error::CapacityOutOfRange {
                requested: capacity,
                max: primes::MAX_PRIME_ARRAY_LENGTH,
            });
        }
        let buckets = primes::get_prime(capacity);
        Ok(Self {
            hasher,
            buckets: vec![None; buckets],
            nodes: SlotMap::with_capacity_and_key(capacity),
            version: Version::new(),
            reentrancy: DebugReentrancy::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of buckets. The map grows once `len()` exceeds it.
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    #[inline]
    fn bucket_of(&self, hash: u32) -> usize {
        hash as usize % self.buckets.len()
    }

    /// Drops every entry and returns to the minimum bucket count.
    ///
    /// The node storage is cleared in place and keeps its allocated slots;
    /// only the bucket table is reallocated at minimum size.
    pub fn clear(&mut self) {
        trace!(len = self.nodes.len(), buckets = self.buckets.len(), "clearing map");
        self.buckets = vec![None; primes::get_prime(0)];
        self.version.bump();
        // Clearing in place bumps every slot generation, so handles taken
        // before the clear never resolve to entries added after it.
        self.nodes.clear();
    }

    /// Removes the entry behind `handle`, if it is still live.
    pub fn remove_handle(&mut self, handle: EntryHandle) -> Option<(K, V)> {
        let hash = self.nodes.get(handle.0)?.hash;
        let bucket = self.bucket_of(hash);
        let mut prev = None;
        let mut cur = self.buckets[bucket];
        while let Some(k) = cur {
            if k == handle.0 {
                return self.unlink(bucket, prev, k);
            }
            prev = cur;
            cur = self.nodes.get(k)?.next;
        }
        None
    }

    fn unlink(&mut self, bucket: usize, prev: Option<DefaultKey>, k: DefaultKey) -> Option<(K, V)> {
        let next = self.nodes.get(k)?.next;
        match prev {
            None => self.buckets[bucket] = next,
            Some(p) => self.nodes.get_mut(p)?.next = next,
        }
        let node = self.nodes.remove(k)?;
        self.version.bump();
        Some((node.key, node.value))
    }

    /// Relinks every node onto a table of `new_len` buckets using the
    /// stored hashes. Nodes are not moved or reallocated.
    fn resize(&mut self, new_len: usize) {
        trace!(
            from = self.buckets.len(),
            to = new_len,
            len = self.nodes.len(),
            "growing bucket table"
        );
        let mut buckets = vec![None; new_len];
        for head in mem::take(&mut self.buckets) {
            let mut cur = head;
            while let Some(k) = cur {
                let Some(node) = self.nodes.get_mut(k) else {
                    break;
                };
                cur = node.next;
                let b = node.hash as usize % new_len;
                node.next = buckets[b];
                buckets[b] = Some(k);
            }
        }
        self.buckets = buckets;
    }

    /// Borrowing iterator in bucket-then-chain order.
    pub fn iter(&self) -> Iter<'_, K, V, S> {
        Iter {
            map: self,
            cursor: self.cursor(),
            remaining: self.nodes.len(),
        }
    }

    /// Mutable iteration over values. Order is unspecified and may differ
    /// from [`iter`](Self::iter).
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            it: self.nodes.iter_mut(),
        }
    }

    pub fn keys(&self) -> Keys<'_, Self> {
        Keys::new(self)
    }

    pub fn values(&self) -> Values<'_, Self> {
        Values::new(self)
    }

    /// Detached enumerator; see [`Cursor`].
    pub fn cursor(&self) -> Cursor {
        Cursor {
            guard: EnumeratorGuard::new(&self.version),
            position: Position::Start,
        }
    }
}

impl<K, V, S> EntryMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    #[inline]
    fn make_hash<Q>(&self, q: &Q) -> u32
    where
        Q: ?Sized + Hash,
    {
        (self.hasher.hash_one(q) as u32) & HASH_MASK
    }

    /// Walks the chain for `q`; returns `(bucket, predecessor, node)`.
    /// Runs user `Hash`/`Eq`, so callers hold the reentrancy guard.
    fn probe<Q>(&self, q: &Q) -> Option<(usize, Option<DefaultKey>, DefaultKey)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.make_hash(q);
        let bucket = self.bucket_of(hash);
        let mut prev = None;
        let mut cur = self.buckets[bucket];
        while let Some(k) = cur {
            let node = self.nodes.get(k)?;
            if node.hash == hash && node.key.borrow() == q {
                return Some((bucket, prev, k));
            }
            prev = cur;
            cur = node.next;
        }
        None
    }

    pub fn find<Q>(&self, q: &Q) -> Option<EntryHandle>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        self.probe(q).map(|(_, _, k)| EntryHandle(k))
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let _g = self.reentrancy.enter();
        self.probe(q).is_some()
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find(q).and_then(|h| h.value(self))
    }

    pub fn get_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let h = self.find(q)?;
        h.value_mut(self)
    }

    /// Like [`get`](Self::get), but a missing key is an error.
    pub fn value_of<Q>(&self, q: &Q) -> Result<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq + fmt::Debug,
    {
        self.get(q).ok_or_else(|| Error::KeyNotFound(format!("{q:?}")))
    }

    fn insert(&mut self, key: K, value: V, mode: InsertMode) -> Inserted<K, V> {
        let inserted = {
            let _g = self.reentrancy.enter();
            let hash = self.make_hash(&key);
            let bucket = self.bucket_of(hash);
            let mut cur = self.buckets[bucket];
            while let Some(k) = cur {
                let Some(node) = self.nodes.get_mut(k) else {
                    break;
                };
                if node.hash == hash && node.key == key {
                    return match mode {
                        InsertMode::Throw | InsertMode::ReturnFalseIfExists => {
                            Inserted::Rejected(key)
                        }
                        InsertMode::Overwrite => {
                            let old = mem::replace(&mut node.value, value);
                            self.version.bump();
                            Inserted::Replaced(k, old)
                        }
                    };
                }
                cur = node.next;
            }
            let next = self.buckets[bucket];
            let k = self.nodes.insert(Node {
                key,
                value,
                hash,
                next,
            });
            self.buckets[bucket] = Some(k);
            self.version.bump();
            k
        };
        if self.nodes.len() > self.buckets.len() {
            self.resize(primes::expand_prime(self.buckets.len()));
        }
        Inserted::New(inserted)
    }

    /// Inserts a new entry; an existing key is a [`Error::DuplicateKey`] and
    /// leaves the map untouched.
    pub fn add(&mut self, key: K, value: V) -> Result<EntryHandle>
    where
        K: fmt::Debug,
    {
        match self.insert(key, value, InsertMode::Throw) {
            Inserted::New(k) | Inserted::Replaced(k, _) => Ok(EntryHandle(k)),
            Inserted::Rejected(key) => Err(Error::DuplicateKey(format!("{key:?}"))),
        }
    }

    /// Inserts or overwrites. An existing entry keeps its node and position;
    /// only the value changes.
    pub fn set(&mut self, key: K, value: V) -> EntryHandle {
        match self.insert(key, value, InsertMode::Overwrite) {
            Inserted::New(k) | Inserted::Replaced(k, _) => EntryHandle(k),
            // Overwrite never rejects.
            Inserted::Rejected(_) => unreachable!("overwrite rejected a key"),
        }
    }

    /// Inserts only if absent. Returns `None`, without touching the map,
    /// when the key is already present.
    pub fn try_add(&mut self, key: K, value: V) -> Option<EntryHandle> {
        match self.insert(key, value, InsertMode::ReturnFalseIfExists) {
            Inserted::New(k) => Some(EntryHandle(k)),
            Inserted::Replaced(..) | Inserted::Rejected(_) => None,
        }
    }

    /// Handle to the entry for `key`, inserting `default()` on a miss.
    /// `default` only runs when the key is absent.
    pub fn get_or_insert_with<F>(&mut self, key: K, default: F) -> EntryHandle
    where
        F: FnOnce() -> V,
    {
        if let Some(h) = self.find(&key) {
            return h;
        }
        let value = default();
        match self.insert(key, value, InsertMode::Overwrite) {
            Inserted::New(k) | Inserted::Replaced(k, _) => EntryHandle(k),
            Inserted::Rejected(_) => unreachable!("overwrite rejected a key"),
        }
    }

    pub fn remove<Q>(&mut self, q: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.remove_entry(q).map(|(_, v)| v)
    }

    pub fn remove_entry<Q>(&mut self, q: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let (bucket, prev, k) = {
            let _g = self.reentrancy.enter();
            self.probe(q)?
        };
        self.unlink(bucket, prev, k)
    }

    /// Removes the entry only if its value still equals `expected`.
    pub fn remove_if_eq<Q>(&mut self, q: &Q, expected: &V) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: PartialEq,
    {
        let Some((bucket, prev, k)) = ({
            let _g = self.reentrancy.enter();
            self.probe(q)
        }) else {
            return false;
        };
        if !self.nodes.get(k).is_some_and(|n| n.value == *expected) {
            return false;
        }
        self.unlink(bucket, prev, k).is_some()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Position {
    Start,
    At { bucket: usize, key: DefaultKey },
    End,
}

/// Enumerator that does not borrow its map between steps.
///
/// It records the map's version when created. Every `move_next` and
/// `reset` fails with [`Error::EnumerationInvalidated`] once the map has been
/// structurally modified (`add`, `set`, `remove`, `clear`) or after
/// [`dispose`](Self::dispose). Passing a map other than the one that created
/// the cursor is a logic error.
#[derive(Debug, Clone)]
pub struct Cursor {
    guard: EnumeratorGuard,
    position: Position,
}

impl Cursor {
    /// Advances to the next entry. `Ok(false)` once exhausted.
    pub fn move_next<K, V, S>(&mut self, map: &EntryMap<K, V, S>) -> Result<bool> {
        self.guard.check(&map.version)?;
        let (mut bucket, mut next) = match self.position {
            Position::Start => (0, map.buckets.first().copied().flatten()),
            Position::At { bucket, key } => (bucket, map.nodes.get(key).and_then(|n| n.next)),
            Position::End => return Ok(false),
        };
        loop {
            if let Some(key) = next {
                self.position = Position::At { bucket, key };
                return Ok(true);
            }
            bucket += 1;
            match map.buckets.get(bucket) {
                Some(&head) => next = head,
                None => {
                    self.position = Position::End;
                    return Ok(false);
                }
            }
        }
    }

    /// Rewinds to before the first entry. The version snapshot is kept, so a
    /// cursor invalidated by mutation stays invalid.
    pub fn reset<K, V, S>(&mut self, map: &EntryMap<K, V, S>) -> Result<()> {
        self.guard.check(&map.version)?;
        self.position = Position::Start;
        Ok(())
    }

    pub fn dispose(&mut self) {
        self.guard.dispose();
        self.position = Position::End;
    }

    pub fn is_disposed(&self) -> bool {
        self.guard.is_disposed()
    }

    pub fn current(&self) -> Option<EntryHandle> {
        match self.position {
            Position::At { key, .. } => Some(EntryHandle(key)),
            Position::Start | Position::End => None,
        }
    }

    pub fn key<'a, K, V, S>(&self, map: &'a EntryMap<K, V, S>) -> Option<&'a K> {
        self.current()?.key(map)
    }

    pub fn value<'a, K, V, S>(&self, map: &'a EntryMap<K, V, S>) -> Option<&'a V> {
        self.current()?.value(map)
    }
}

/// Iterator over `(handle, key, value)` triples.
pub struct Iter<'a, K, V, S> {
    map: &'a EntryMap<K, V, S>,
    cursor: Cursor,
    remaining: usize,
}

impl<'a, K, V, S> Iterator for Iter<'a, K, V, S> {
    type Item = (EntryHandle, &'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if !self.cursor.move_next(self.map).ok()? {
            return None;
        }
        let handle = self.cursor.current()?;
        let node = self.map.nodes.get(handle.0)?;
        self.remaining = self.remaining.saturating_sub(1);
        Some((handle, &node.key, &node.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V, S> ExactSizeIterator for Iter<'_, K, V, S> {}
impl<K, V, S> FusedIterator for Iter<'_, K, V, S> {}

/// Iterator over `(handle, key, mutable value)` triples.
pub struct IterMut<'a, K, V> {
    it: slotmap::basic::IterMut<'a, DefaultKey, Node<K, V>>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (EntryHandle, &'a K, &'a mut V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.it
            .next()
            .map(|(k, n)| (EntryHandle(k), &n.key, &mut n.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.it.size_hint()
    }
}

/// `(key, value)` pairs, the shape views project from.
pub struct PairIter<'a, K, V, S>(Iter<'a, K, V, S>);

impl<'a, K, V, S> Iterator for PairIter<'a, K, V, S> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(_, k, v)| (k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl<K, V, S> FusedIterator for PairIter<'_, K, V, S> {}

impl<K, V, S> Source for EntryMap<K, V, S> {
    type Key = K;
    type Value = V;
    type Pairs<'a> = PairIter<'a, K, V, S> where Self: 'a;

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn pairs(&self) -> Self::Pairs<'_> {
        PairIter(self.iter())
    }
}

impl<K, V, S> Keys<'_, EntryMap<K, V, S>>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Hashed lookup on the owning map, O(1) on average.
    pub fn contains<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.owner.contains_key(q)
    }
}

impl<'a, K, V, S> IntoIterator for &'a EntryMap<K, V, S> {
    type Item = (EntryHandle, &'a K, &'a V);
    type IntoIter = Iter<'a, K, V, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V, S> fmt::Debug for EntryMap<K, V, S>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.pairs()).finish()
    }
}

impl<K, V, S> Extend<(K, V)> for EntryMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.set(k, v);
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for EntryMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::with_hasher(S::default());
        map.extend(iter);
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::BTreeSet;
    use std::hash::Hasher;
    use test_log::test;

    #[derive(Clone, Default)]
    struct ConstBuildHasher;
    struct ConstHasher;
    impl BuildHasher for ConstBuildHasher {
        type Hasher = ConstHasher;
        fn build_hasher(&self) -> Self::Hasher {
            ConstHasher
        }
    }
    impl Hasher for ConstHasher {
        fn write(&mut self, _bytes: &[u8]) {}
        fn finish(&self) -> u64 {
            0
        }
    }

    fn reachable_from_buckets<K, V, S>(m: &EntryMap<K, V, S>) -> usize {
        let mut n = 0;
        for head in &m.buckets {
            let mut cur = *head;
            while let Some(k) = cur {
                n += 1;
                cur = m.nodes[k].next;
            }
        }
        n
    }

    /// Duplicate keys are rejected and the map remains unchanged.
    #[test]
    fn duplicate_add_rejected() {
        let mut m: EntryMap<String, i32> = EntryMap::new();
        let handle = m.add("dup".to_string(), 1).unwrap();
        match m.add("dup".to_string(), 2) {
            Err(Error::DuplicateKey(k)) => assert_eq!(k, "\"dup\""),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(handle.value(&m), Some(&1));
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn try_add_reports_presence_without_bumping_version() {
        let mut m: EntryMap<&str, i32> = EntryMap::new();
        assert!(m.try_add("a", 1).is_some());
        let cursor = m.cursor();
        assert!(m.try_add("a", 2).is_none());
        assert_eq!(m.get("a"), Some(&1));
        let mut cursor = cursor;
        assert_eq!(cursor.move_next(&m), Ok(true));
    }

    #[test]
    fn remove_if_eq_mismatch_keeps_version() {
        let mut m: EntryMap<&str, i32> = [("a", 1), ("b", 2)].into_iter().collect();
        let mut cursor = m.cursor();
        assert!(!m.remove_if_eq("a", &99));
        assert!(!m.remove_if_eq("zzz", &1));
        assert_eq!(m.len(), 2);
        assert_eq!(cursor.move_next(&m), Ok(true));
        assert!(m.remove_if_eq("a", &1));
        assert_eq!(cursor.move_next(&m), Err(Error::EnumerationInvalidated));
    }

    #[test]
    fn set_overwrites_in_place() {
        let mut m: EntryMap<&str, i32> = EntryMap::new();
        let h1 = m.set("k", 1);
        let h2 = m.set("k", 2);
        assert_eq!(h1, h2, "overwrite keeps the node");
        assert_eq!(m.len(), 1);
        assert_eq!(h1.value(&m), Some(&2));
    }

    #[test]
    fn find_contains_parity() {
        let mut m: EntryMap<String, i32> = EntryMap::new();
        let present = ["a", "b", "c"];
        for (i, k) in present.iter().enumerate() {
            m.add((*k).to_string(), i as i32).unwrap();
        }
        for k in present {
            assert!(m.find(k).is_some());
            assert!(m.contains_key(k));
        }
        for k in ["x", "y", "z"] {
            assert!(m.find(k).is_none());
            assert!(!m.contains_key(k));
        }
    }

    #[test]
    fn value_of_reports_missing_key() {
        let mut m: EntryMap<String, i32> = EntryMap::new();
        m.add("here".to_string(), 7).unwrap();
        assert_eq!(m.value_of("here"), Ok(&7));
        assert_eq!(
            m.value_of("gone"),
            Err(Error::KeyNotFound("\"gone\"".to_string()))
        );
    }

    /// Handle reads and writes avoid a second lookup and see the same entry
    /// as a later `find`.
    #[test]
    fn handle_access_and_mutation() {
        let mut m: EntryMap<String, i32> = EntryMap::new();
        let h = m.add("k1".to_string(), 10).unwrap();
        assert_eq!(h.key(&m), Some(&"k1".to_string()));
        *h.value_mut(&mut m).unwrap() += 5;
        assert_eq!(m.get("k1"), Some(&15));
        assert_eq!(h.replace(&mut m, 20), Some(15));
        assert_eq!(m.find("k1"), Some(h));
        assert_eq!(m.get("k1"), Some(&20));

        assert_eq!(m.remove("k1"), Some(20));
        assert!(h.value(&m).is_none());
        assert!(h.replace(&mut m, 1).is_none());
    }

    #[test]
    fn stale_handle_does_not_alias_new_entry() {
        let mut m: EntryMap<String, i32> = EntryMap::new();
        let h1 = m.add("old".to_string(), 1).unwrap();
        m.remove_handle(h1).unwrap();
        let h2 = m.add("new".to_string(), 2).unwrap();
        assert_ne!(h1, h2);
        assert!(h1.value(&m).is_none());
        assert!(m.remove_handle(h1).is_none());
    }

    #[test]
    fn remove_missing_key_is_not_an_error() {
        let mut m: EntryMap<&str, i32> = EntryMap::new();
        m.add("a", 1).unwrap();
        assert_eq!(m.remove("b"), None);
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn remove_if_eq_checks_value() {
        let mut m: EntryMap<&str, i32> = EntryMap::new();
        m.add("a", 1).unwrap();
        assert!(!m.remove_if_eq("a", &2));
        assert!(m.contains_key("a"));
        assert!(m.remove_if_eq("a", &1));
        assert!(!m.contains_key("a"));
        assert!(!m.remove_if_eq("a", &1));
    }

    #[test]
    fn growth_keeps_every_entry_reachable() {
        let mut m: EntryMap<u32, u32> = EntryMap::new();
        let initial = m.capacity();
        for i in 0..1000 {
            m.add(i, i * 2).unwrap();
            assert!(m.len() <= m.capacity());
        }
        assert!(m.capacity() > initial);
        assert!(primes::is_prime(m.capacity()));
        assert_eq!(reachable_from_buckets(&m), 1000);
        for i in 0..1000 {
            assert_eq!(m.get(&i), Some(&(i * 2)));
        }
    }

    #[test]
    fn growth_preserves_handles() {
        let mut m: EntryMap<u32, u32> = EntryMap::new();
        let h = m.add(0, 0).unwrap();
        for i in 1..200 {
            m.add(i, i).unwrap();
        }
        assert_eq!(h.key(&m), Some(&0));
        assert_eq!(m.find(&0), Some(h));
    }

    #[test]
    fn clear_resets_capacity_to_minimum() {
        let mut m: EntryMap<u32, u32> = EntryMap::with_capacity(500).unwrap();
        for i in 0..100 {
            m.add(i, i).unwrap();
        }
        let h = m.find(&7).unwrap();
        m.clear();
        assert!(m.is_empty());
        assert_eq!(m.capacity(), primes::get_prime(0));
        assert!(h.value(&m).is_none());
        assert!(!m.contains_key(&5));
        m.add(5, 5).unwrap();
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn oversized_capacity_is_rejected() {
        let res = EntryMap::<u8, u8>::with_capacity(primes::MAX_PRIME_ARRAY_LENGTH + 1);
        assert!(matches!(res, Err(Error::CapacityOutOfRange { .. })));
    }

    #[test]
    fn collisions_resolve_by_equality() {
        let mut m: EntryMap<String, i32, ConstBuildHasher> =
            EntryMap::with_hasher(ConstBuildHasher);
        for (i, k) in ["a", "b", "c", "d"].iter().enumerate() {
            m.add(k.to_string(), i as i32).unwrap();
        }
        assert_eq!(m.get("c"), Some(&2));
        assert_eq!(m.remove("b"), Some(1));
        assert_eq!(m.get("a"), Some(&0));
        assert_eq!(m.get("d"), Some(&3));
        assert_eq!(reachable_from_buckets(&m), 3);
    }

    #[test]
    fn iteration_yields_each_entry_once() {
        let mut m: EntryMap<String, i32> = EntryMap::new();
        let keys = ["k1", "k2", "k3"];
        for (i, k) in keys.iter().enumerate() {
            m.add((*k).to_string(), i as i32).unwrap();
        }
        let it = m.iter();
        assert_eq!(it.len(), 3);
        let seen: BTreeSet<String> = it.map(|(_h, k, _v)| k.clone()).collect();
        let expected: BTreeSet<String> = keys.iter().map(|s| (*s).to_string()).collect();
        assert_eq!(seen, expected);

        for (_h, _k, v) in m.iter_mut() {
            *v += 10;
        }
        assert_eq!(m.get("k1"), Some(&10));
        assert_eq!(m.get("k3"), Some(&12));
    }

    #[test]
    fn get_or_insert_with_is_lazy() {
        let mut m: EntryMap<String, String> = EntryMap::new();
        let calls = Cell::new(0);
        let h1 = m.get_or_insert_with("k".to_string(), || {
            calls.set(calls.get() + 1);
            "v".to_string()
        });
        let h2 = m.get_or_insert_with("k".to_string(), || {
            calls.set(calls.get() + 1);
            "v2".to_string()
        });
        assert_eq!(calls.get(), 1);
        assert_eq!(h1, h2);
        assert_eq!(m.get("k"), Some(&"v".to_string()));
    }

    #[test]
    fn cursor_walks_all_entries_then_stops() {
        let m: EntryMap<u32, u32> = (0..10).map(|i| (i, i)).collect();
        let mut c = m.cursor();
        assert!(c.current().is_none());
        let mut seen = BTreeSet::new();
        while c.move_next(&m).unwrap() {
            seen.insert(*c.key(&m).unwrap());
        }
        assert_eq!(seen, (0..10).collect());
        assert_eq!(c.move_next(&m), Ok(false));
        assert!(c.current().is_none());

        c.reset(&m).unwrap();
        assert_eq!(c.move_next(&m), Ok(true));
    }

    #[test]
    fn cursor_invalidated_by_each_mutation_kind() {
        let fresh =
            || -> EntryMap<&'static str, i32> { [("a", 1), ("b", 2)].into_iter().collect() };
        let mutations: [fn(&mut EntryMap<&'static str, i32>); 4] = [
            |m| {
                m.set("a", 9);
            },
            |m| {
                m.add("c", 3).unwrap();
            },
            |m| {
                m.remove("a");
            },
            |m| m.clear(),
        ];
        for mutate in mutations {
            let mut m = fresh();
            let mut c = m.cursor();
            assert_eq!(c.move_next(&m), Ok(true));
            mutate(&mut m);
            assert_eq!(c.move_next(&m), Err(Error::EnumerationInvalidated));
            assert_eq!(c.reset(&m), Err(Error::EnumerationInvalidated));
        }
    }

    #[test]
    fn disposed_cursor_fails() {
        let m: EntryMap<u8, u8> = [(1, 1)].into_iter().collect();
        let mut c = m.cursor();
        c.dispose();
        assert_eq!(c.move_next(&m), Err(Error::EnumerationInvalidated));
        assert_eq!(c.reset(&m), Err(Error::EnumerationInvalidated));
    }

    #[test]
    fn handle_writes_do_not_invalidate_cursors() {
        let mut m: EntryMap<u8, u8> = [(1, 1), (2, 2)].into_iter().collect();
        let h = m.find(&1).unwrap();
        let mut c = m.cursor();
        *h.value_mut(&mut m).unwrap() = 5;
        assert_eq!(c.move_next(&m), Ok(true));
    }

    #[test]
    fn views_project_keys_and_values() {
        let m: EntryMap<&str, i32> = [("a", 1), ("b", 2)].into_iter().collect();
        let keys = m.keys();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains("a"));
        assert!(!keys.contains("z"));
        let ks: BTreeSet<&str> = keys.iter().copied().collect();
        assert_eq!(ks, BTreeSet::from(["a", "b"]));

        let values = m.values();
        assert_eq!(values.len(), 2);
        assert!(values.contains(&2));
        assert!(!values.contains(&3));
        let mut vs: Vec<i32> = values.into_iter().copied().collect();
        vs.sort();
        assert_eq!(vs, vec![1, 2]);
    }

    /// Re-entering the map from `K: Eq` during a probe panics in debug builds.
    #[cfg(debug_assertions)]
    #[test]
    fn reentrancy_panics_from_eq_during_find() {
        struct ReentryKey {
            id: &'static str,
            map: *const EntryMap<ReentryKey, i32, ConstBuildHasher>,
            trigger: bool,
        }
        impl PartialEq for ReentryKey {
            fn eq(&self, other: &Self) -> bool {
                if self.id == other.id {
                    return true;
                }
                if other.trigger {
                    unsafe {
                        let m = &*other.map;
                        let _ = m.contains_key(self.id);
                    }
                }
                false
            }
        }
        impl Eq for ReentryKey {}
        impl Hash for ReentryKey {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.id.hash(state);
            }
        }
        impl Borrow<str> for ReentryKey {
            fn borrow(&self) -> &str {
                self.id
            }
        }

        let mut m: EntryMap<ReentryKey, i32, ConstBuildHasher> =
            EntryMap::with_hasher(ConstBuildHasher);
        let stored = ReentryKey {
            id: "a",
            map: core::ptr::null(),
            trigger: false,
        };
        assert!(m.try_add(stored, 1).is_some());

        let query = ReentryKey {
            id: "b",
            map: &m as *const _,
            trigger: true,
        };
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = m.find(&query);
        }));
        assert!(res.is_err(), "expected reentrancy to panic in debug builds");
    }

    #[test]
    fn debug_formats_as_map() {
        let m: EntryMap<&str, i32> = [("only", 1)].into_iter().collect();
        assert_eq!(format!("{m:?}"), "{\"only\": 1}");
    }
}
