//! StringDictionary: string-keyed hash table probed by borrowed text.
//!
//! All entries live in one `Vec` of slots. Bucket chains and the free list
//! are both threaded through slot indices:
//!
//! - `buckets[b]` holds the first slot of chain `b`, each occupied slot
//!   links to the next one in its chain;
//! - removed slots become `Vacant` and link to the previously freed slot,
//!   so the free list is a LIFO stack headed by `free_head`.
//!
//! Inserts pop the free list before appending, and only an append into a
//! full table triggers growth. `len() == size() - free_count()`.
//!
//! Keys are stored as owned `String`s, but every lookup takes any
//! [`TextKey`] (`str`, `String`, `[char]`): hashing and equality walk the
//! probe's characters under the dictionary's [`CaseSensitivity`], so a
//! lookup never allocates.

use crate::error::{Error, Result};
use crate::guard::{DebugReentrancy, EnumeratorGuard, Version};
use crate::primes;
use crate::text_key::{CaseSensitivity, TextKey};
use crate::views::{Keys, Source, Values};
use core::fmt;
use core::hash::BuildHasher;
use core::iter::FusedIterator;
use core::mem;
use std::collections::hash_map::RandomState;
use tracing::trace;

#[derive(Debug)]
enum Slot<V> {
    Occupied {
        hash: u32,
        next: Option<usize>,
        key: String,
        value: V,
    },
    Vacant {
        next_free: Option<usize>,
    },
}

/// Construction-time settings.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct DictionaryOptions {
    /// Minimum number of entries before the first resize.
    pub capacity: usize,
    pub case: CaseSensitivity,
}

impl DictionaryOptions {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_case(mut self, case: CaseSensitivity) -> Self {
        self.case = case;
        self
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum InsertMode {
    Throw,
    Overwrite,
    ReturnFalseIfExists,
}

enum Inserted<V> {
    New,
    Replaced(V),
    Rejected(String),
}

/// Result of walking one chain.
struct Probe {
    hash: u32,
    bucket: usize,
    prev: Option<usize>,
    found: Option<usize>,
}

pub struct StringDictionary<V, S = RandomState> {
    hasher: S,
    case: CaseSensitivity,
    buckets: Vec<Option<usize>>,
    slots: Vec<Slot<V>>,
    free_head: Option<usize>,
    free_count: usize,
    version: Version,
    reentrancy: DebugReentrancy,
}

impl<V> StringDictionary<V> {
    pub fn new() -> Self {
        Self::with_hasher(RandomState::new())
    }

    pub fn with_capacity(capacity: usize) -> Result<Self> {
        Self::with_options(DictionaryOptions::default().with_capacity(capacity), RandomState::new())
    }

    pub fn with_case(case: CaseSensitivity) -> Self {
        Self::build(primes::get_prime(0), case, RandomState::new())
    }
}

impl<V> Default for StringDictionary<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, S> StringDictionary<V, S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self::build(primes::get_prime(0), CaseSensitivity::Ordinal, hasher)
    }

    pub fn with_capacity_and_hasher(capacity: usize, hasher: S) -> Result<Self> {
        Self::with_options(DictionaryOptions::default().with_capacity(capacity), hasher)
    }

    pub fn with_options(options: DictionaryOptions, hasher: S) -> Result<Self> {
        if options.capacity > primes::MAX_PRIME_ARRAY_LENGTH {
            return Err(Error::CapacityOutOfRange {
                requested: options.capacity,
                max: primes::MAX_PRIME_ARRAY_LENGTH,
            });
        }
        Ok(Self::build(primes::get_prime(options.capacity), options.case, hasher))
    }

    fn build(capacity: usize, case: CaseSensitivity, hasher: S) -> Self {
        Self {
            hasher,
            case,
            buckets: vec![None; capacity],
            slots: Vec::with_capacity(capacity),
            free_head: None,
            free_count: 0,
            version: Version::new(),
            reentrancy: DebugReentrancy::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of buckets, which is also the number of slots available
    /// before the next resize.
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// High-water mark of slots ever allocated, free ones included.
    pub fn size(&self) -> usize {
        self.slots.len()
    }

    /// Removed slots waiting to be reused.
    pub fn free_count(&self) -> usize {
        self.free_count
    }

    pub fn case_sensitivity(&self) -> CaseSensitivity {
        self.case
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    #[inline]
    fn bucket_of(&self, hash: u32) -> usize {
        hash as usize % self.buckets.len()
    }

    pub fn clear(&mut self) {
        trace!(len = self.len(), buckets = self.buckets.len(), "clearing dictionary");
        let min = primes::get_prime(0);
        self.buckets = vec![None; min];
        let old = mem::replace(&mut self.slots, Vec::with_capacity(min));
        self.free_head = None;
        self.free_count = 0;
        self.version.bump();
        drop(old);
    }

    /// Rebuilds every chain on a table of `new_len` buckets from the stored
    /// hashes. Vacant slots keep their free-list links.
    fn resize(&mut self, new_len: usize) {
        trace!(
            from = self.buckets.len(),
            to = new_len,
            size = self.slots.len(),
            "growing dictionary"
        );
        let mut buckets = vec![None; new_len];
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if let Slot::Occupied { hash, next, .. } = slot {
                let b = *hash as usize % new_len;
                *next = buckets[b];
                buckets[b] = Some(i);
            }
        }
        self.slots.reserve_exact(new_len.saturating_sub(self.slots.len()));
        self.buckets = buckets;
    }

    /// Unlinks slot `i` from its chain and pushes it onto the free list.
    fn vacate(&mut self, bucket: usize, prev: Option<usize>, i: usize) -> Option<(String, V)> {
        let next = match self.slots.get(i)? {
            Slot::Occupied { next, .. } => *next,
            Slot::Vacant { .. } => return None,
        };
        match prev {
            None => self.buckets[bucket] = next,
            Some(p) => {
                if let Some(Slot::Occupied { next: link, .. }) = self.slots.get_mut(p) {
                    *link = next;
                }
            }
        }
        let freed = Slot::Vacant {
            next_free: self.free_head,
        };
        let old = mem::replace(&mut self.slots[i], freed);
        self.free_head = Some(i);
        self.free_count += 1;
        self.version.bump();
        match old {
            Slot::Occupied { key, value, .. } => Some((key, value)),
            Slot::Vacant { .. } => None,
        }
    }

    pub fn iter(&self) -> Iter<'_, V, S> {
        Iter {
            dict: self,
            cursor: self.cursor(),
            remaining: self.len(),
        }
    }

    /// Mutable iteration over values, in slot order.
    pub fn iter_mut(&mut self) -> IterMut<'_, V> {
        IterMut {
            it: self.slots.iter_mut(),
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

impl<V, S> StringDictionary<V, S>
where
    S: BuildHasher,
{
    fn probe<T>(&self, key: &T) -> Probe
    where
        T: TextKey + ?Sized,
    {
        let hash = self.case.hash_code(&self.hasher, key);
        let bucket = self.bucket_of(hash);
        let mut prev = None;
        let mut cur = self.buckets[bucket];
        while let Some(i) = cur {
            let Some(Slot::Occupied {
                hash: h,
                next,
                key: stored,
                ..
            }) = self.slots.get(i)
            else {
                break;
            };
            if *h == hash && self.case.equals(stored.as_str(), key) {
                return Probe {
                    hash,
                    bucket,
                    prev,
                    found: Some(i),
                };
            }
            prev = cur;
            cur = *next;
        }
        Probe {
            hash,
            bucket,
            prev: None,
            found: None,
        }
    }

    fn find<T>(&self, key: &T) -> Option<usize>
    where
        T: TextKey + ?Sized,
    {
        let _g = self.reentrancy.enter();
        self.probe(key).found
    }

    pub fn contains_key<T>(&self, key: &T) -> bool
    where
        T: TextKey + ?Sized,
    {
        self.find(key).is_some()
    }

    pub fn get<T>(&self, key: &T) -> Option<&V>
    where
        T: TextKey + ?Sized,
    {
        self.get_key_value(key).map(|(_, v)| v)
    }

    /// Stored key and value. Under [`CaseSensitivity::IgnoreCase`] the
    /// stored key may differ in case from the probe.
    pub fn get_key_value<T>(&self, key: &T) -> Option<(&str, &V)>
    where
        T: TextKey + ?Sized,
    {
        match self.slots.get(self.find(key)?)? {
            Slot::Occupied { key, value, .. } => Some((key.as_str(), value)),
            Slot::Vacant { .. } => None,
        }
    }

    pub fn get_mut<T>(&mut self, key: &T) -> Option<&mut V>
    where
        T: TextKey + ?Sized,
    {
        let i = self.find(key)?;
        match self.slots.get_mut(i)? {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    /// Like [`get`](Self::get), but a missing key is an error.
    pub fn value_of<T>(&self, key: &T) -> Result<&V>
    where
        T: TextKey + ?Sized,
    {
        self.get(key).ok_or_else(|| Error::KeyNotFound(key.to_text()))
    }

    fn insert(&mut self, key: String, value: V, mode: InsertMode) -> Inserted<V> {
        let probe = {
            let _g = self.reentrancy.enter();
            self.probe(key.as_str())
        };

        if let Some(i) = probe.found {
            return match mode {
                InsertMode::Throw | InsertMode::ReturnFalseIfExists => Inserted::Rejected(key),
                InsertMode::Overwrite => match self.slots.get_mut(i) {
                    Some(Slot::Occupied { value: stored, .. }) => {
                        let old = mem::replace(stored, value);
                        self.version.bump();
                        Inserted::Replaced(old)
                    }
                    _ => Inserted::Rejected(key),
                },
            };
        }

        let mut bucket = probe.bucket;
        let index = match self.free_head {
            Some(free) => {
                self.free_head = match self.slots[free] {
                    Slot::Vacant { next_free } => next_free,
                    Slot::Occupied { .. } => None,
                };
                self.free_count -= 1;
                free
            }
            None => {
                if self.slots.len() == self.buckets.len() {
                    self.resize(primes::expand_prime(self.slots.len()));
                    bucket = self.bucket_of(probe.hash);
                }
                self.slots.push(Slot::Vacant { next_free: None });
                self.slots.len() - 1
            }
        };
        self.slots[index] = Slot::Occupied {
            hash: probe.hash,
            next: self.buckets[bucket],
            key,
            value,
        };
        self.buckets[bucket] = Some(index);
        self.version.bump();
        Inserted::New
    }

    /// Inserts a new entry; an existing key is a [`Error::DuplicateKey`] and
    /// leaves the dictionary untouched.
    pub fn add(&mut self, key: impl Into<String>, value: V) -> Result<()> {
        match self.insert(key.into(), value, InsertMode::Throw) {
            Inserted::New | Inserted::Replaced(_) => Ok(()),
            Inserted::Rejected(key) => Err(Error::DuplicateKey(key)),
        }
    }

    /// Inserts or overwrites, returning the previous value. An overwrite
    /// keeps the stored key and slot.
    pub fn set(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        match self.insert(key.into(), value, InsertMode::Overwrite) {
            Inserted::Replaced(old) => Some(old),
            Inserted::New | Inserted::Rejected(_) => None,
        }
    }

    /// Inserts only if absent; `false` leaves the dictionary untouched.
    pub fn try_add(&mut self, key: impl Into<String>, value: V) -> bool {
        matches!(
            self.insert(key.into(), value, InsertMode::ReturnFalseIfExists),
            Inserted::New
        )
    }

    pub fn remove<T>(&mut self, key: &T) -> Option<V>
    where
        T: TextKey + ?Sized,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes and returns the stored key and value; the slot goes onto the
    /// free list.
    pub fn remove_entry<T>(&mut self, key: &T) -> Option<(String, V)>
    where
        T: TextKey + ?Sized,
    {
        let probe = {
            let _g = self.reentrancy.enter();
            self.probe(key)
        };
        self.vacate(probe.bucket, probe.prev, probe.found?)
    }

    /// Removes the entry only if its value still equals `expected`.
    pub fn remove_if_eq<T>(&mut self, key: &T, expected: &V) -> bool
    where
        T: TextKey + ?Sized,
        V: PartialEq,
    {
        let probe = {
            let _g = self.reentrancy.enter();
            self.probe(key)
        };
        let Some(i) = probe.found else {
            return false;
        };
        let matches = matches!(
            self.slots.get(i),
            Some(Slot::Occupied { value, .. }) if value == expected
        );
        matches && self.vacate(probe.bucket, probe.prev, i).is_some()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Position {
    Start,
    At(usize),
    End,
}

/// Enumerator that does not borrow its dictionary between steps.
///
/// Walks slots in index order, skipping free ones. Fails with
/// [`Error::EnumerationInvalidated`] after any `add`, `set`, `remove` or
/// `clear` on the dictionary, or after [`dispose`](Self::dispose).
#[derive(Debug, Clone)]
pub struct Cursor {
    guard: EnumeratorGuard,
    position: Position,
}

impl Cursor {
    pub fn move_next<V, S>(&mut self, dict: &StringDictionary<V, S>) -> Result<bool> {
        self.guard.check(&dict.version)?;
        let mut i = match self.position {
            Position::Start => 0,
            Position::At(i) => i + 1,
            Position::End => return Ok(false),
        };
        while let Some(slot) = dict.slots.get(i) {
            if let Slot::Occupied { .. } = slot {
                self.position = Position::At(i);
                return Ok(true);
            }
            i += 1;
        }
        self.position = Position::End;
        Ok(false)
    }

    /// Rewinds without refreshing the version snapshot.
    pub fn reset<V, S>(&mut self, dict: &StringDictionary<V, S>) -> Result<()> {
        self.guard.check(&dict.version)?;
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

    pub fn entry<'a, V, S>(&self, dict: &'a StringDictionary<V, S>) -> Option<(&'a str, &'a V)> {
        let Position::At(i) = self.position else {
            return None;
        };
        match dict.slots.get(i)? {
            Slot::Occupied { key, value, .. } => Some((key.as_str(), value)),
            Slot::Vacant { .. } => None,
        }
    }

    pub fn key<'a, V, S>(&self, dict: &'a StringDictionary<V, S>) -> Option<&'a str> {
        self.entry(dict).map(|(k, _)| k)
    }

    pub fn value<'a, V, S>(&self, dict: &'a StringDictionary<V, S>) -> Option<&'a V> {
        self.entry(dict).map(|(_, v)| v)
    }
}

pub struct Iter<'a, V, S> {
    dict: &'a StringDictionary<V, S>,
    cursor: Cursor,
    remaining: usize,
}

impl<'a, V, S> Iterator for Iter<'a, V, S> {
    type Item = (&'a str, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        if !self.cursor.move_next(self.dict).ok()? {
            return None;
        }
        self.remaining = self.remaining.saturating_sub(1);
        self.cursor.entry(self.dict)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V, S> ExactSizeIterator for Iter<'_, V, S> {}
impl<V, S> FusedIterator for Iter<'_, V, S> {}

pub struct IterMut<'a, V> {
    it: core::slice::IterMut<'a, Slot<V>>,
}

impl<'a, V> Iterator for IterMut<'a, V> {
    type Item = (&'a str, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Slot::Occupied { key, value, .. } = self.it.next()? {
                return Some((key.as_str(), value));
            }
        }
    }
}

impl<V, S> Source for StringDictionary<V, S> {
    type Key = str;
    type Value = V;
    type Pairs<'a> = Iter<'a, V, S> where Self: 'a;

    fn len(&self) -> usize {
        self.slots.len() - self.free_count
    }

    fn pairs(&self) -> Self::Pairs<'_> {
        self.iter()
    }
}

impl<V, S> Keys<'_, StringDictionary<V, S>>
where
    S: BuildHasher,
{
    /// Hashed lookup on the owning dictionary, O(1) on average.
    pub fn contains<T>(&self, key: &T) -> bool
    where
        T: TextKey + ?Sized,
    {
        self.owner.contains_key(key)
    }
}

impl<'a, V, S> IntoIterator for &'a StringDictionary<V, S> {
    type Item = (&'a str, &'a V);
    type IntoIter = Iter<'a, V, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<V: fmt::Debug, S> fmt::Debug for StringDictionary<V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> Extend<(K, V)> for StringDictionary<V, S>
where
    K: Into<String>,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.set(k, v);
        }
    }
}

impl<K, V, S> FromIterator<(K, V)> for StringDictionary<V, S>
where
    K: Into<String>,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dict = Self::with_hasher(S::default());
        dict.extend(iter);
        dict
    }
}
