//! span-dictionary: two hand-built, prime-bucketed hash tables.
//!
//! - [`EntryMap<K, V, S>`]: separate chaining over generic keys. Lookups
//!   return an [`EntryHandle`] that can read and overwrite the value later
//!   without hashing the key again.
//! - [`StringDictionary<V, S>`]: string keys in a single slot arena with a
//!   free list, probed by `&str`, `&String` or a borrowed `&[char]` without
//!   allocating.
//!
//! ```
//! use span_dictionary::{CaseSensitivity, EntryMap, StringDictionary};
//!
//! let mut map = EntryMap::new();
//! let h = map.add("hits", 0u32).unwrap();
//! *h.value_mut(&mut map).unwrap() += 1;
//! assert_eq!(map.get("hits"), Some(&1));
//!
//! let mut dict = StringDictionary::with_case(CaseSensitivity::IgnoreCase);
//! dict.add("Content-Type", "text/plain").unwrap();
//! let probe: Vec<char> = "content-type".chars().collect();
//! assert_eq!(dict.get(probe.as_slice()), Some(&"text/plain"));
//! ```
//!
//! Internal Design:
//!
//! Layers
//! - `primes`: bucket counts are primes (`hash % len` indexing), taken from
//!   a fixed table and found by trial division past it. Growth at least
//!   doubles; nothing ever shrinks, `clear` starts over at the minimum.
//! - `guard`: a `Version` counter bumped by every structural mutation
//!   (add, overwrite, remove, clear), snapshotted by every cursor; plus
//!   the debug-only reentrancy guard.
//! - `entry_map` / `string_dictionary`: the two tables.
//! - `views`: `Keys` / `Values` projections over either table.
//!
//! Hashes
//! - Each entry stores a 31-bit hash computed once at insertion. Growth
//!   relinks entries from the stored hash; `K: Hash` is never called again.
//!
//! Enumeration
//! - Borrowing iterators cannot observe mutation: the borrow checker rules
//!   it out. Detached `Cursor`s do not borrow between steps and fail with
//!   [`Error::EnumerationInvalidated`] once the owner changes or after
//!   `dispose`.
//!
//! Reentrancy
//! - Probing runs user `Hash`/`Eq` (and the hasher). A nested call into the
//!   same container from there panics in debug builds. Values displaced by
//!   overwrite or clear are dropped after the container is consistent again.
//!
//! Threads
//! - Single-threaded: no locks, no atomics. Both containers are `!Send` and
//!   `!Sync`, so sharing one across threads does not compile:
//!
//! ```compile_fail
//! use span_dictionary::StringDictionary;
//!
//! let dict: StringDictionary<u32> = StringDictionary::new();
//! std::thread::spawn(move || drop(dict));
//! ```

pub mod entry_map;
mod error;
mod guard;
pub mod primes;
pub mod string_dictionary;
pub mod text_key;
pub mod views;

mod entry_map_proptest;
mod string_dictionary_proptest;

/// Stored hash codes are non-negative 31-bit values.
pub(crate) const HASH_MASK: u32 = 0x7FFF_FFFF;

// Public surface
pub use entry_map::{EntryHandle, EntryMap};
pub use error::{Error, Result};
pub use string_dictionary::{DictionaryOptions, StringDictionary};
pub use text_key::{CaseSensitivity, TextKey};
pub use views::{Keys, Values};
