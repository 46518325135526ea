#![cfg(test)]

// State-machine property tests for EntryMap, kept inside the crate so they
// can inspect bucket chains directly.

use crate::entry_map::{EntryHandle, EntryMap};
use crate::Error;
use proptest::prelude::*;
use std::borrow::Borrow;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::{BuildHasher, Hasher};

// Key newtype with Borrow<str> to exercise borrowed lookup.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct Key(String);
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
impl Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

prop_compose! {
    fn arb_key()(s in "[a-z]{0,3}") -> Key { Key(s) }
}

#[derive(Clone, Debug)]
enum Op {
    Add(Key, i32),
    Set(Key, i32),
    TryAdd(Key, i32),
    Remove(Key),
    RemoveIfEq(Key, i32),
    Find(Key),
    Contains(String),
    Mutate(Key, i32),
    Iterate,
    Clear,
}

prop_compose! {
    fn arb_ops()(ops in proptest::collection::vec(
        prop_oneof![
            4 => (arb_key(), any::<i32>()).prop_map(|(k, v)| Op::Add(k, v)),
            2 => (arb_key(), any::<i32>()).prop_map(|(k, v)| Op::Set(k, v)),
            2 => (arb_key(), any::<i32>()).prop_map(|(k, v)| Op::TryAdd(k, v)),
            3 => arb_key().prop_map(Op::Remove),
            1 => (arb_key(), 0i32..3).prop_map(|(k, v)| Op::RemoveIfEq(k, v)),
            2 => arb_key().prop_map(Op::Find),
            1 => "[a-z]{0,3}".prop_map(Op::Contains),
            2 => (arb_key(), any::<i32>()).prop_map(|(k, d)| Op::Mutate(k, d)),
            1 => Just(Op::Iterate),
            1 => Just(Op::Clear),
        ], 1..200)) -> Vec<Op> { ops }
}

fn run<S>(mut sut: EntryMap<Key, i32, S>, ops: Vec<Op>) -> Result<(), TestCaseError>
where
    S: BuildHasher,
{
    let mut model: HashMap<Key, i32> = HashMap::new();
    let mut live: HashMap<Key, EntryHandle> = HashMap::new();
    let mut stale: Vec<EntryHandle> = Vec::new();

    for op in ops {
        match op {
            Op::Add(k, v) => {
                let already = model.contains_key(&k);
                match sut.add(k.clone(), v) {
                    Ok(h) => {
                        prop_assert!(!already, "add must fail on duplicate");
                        prop_assert!(live.insert(k.clone(), h).is_none());
                        model.insert(k, v);
                    }
                    Err(Error::DuplicateKey(_)) => prop_assert!(already),
                    Err(e) => prop_assert!(false, "unexpected error {e}"),
                }
            }
            Op::Set(k, v) => {
                let h = sut.set(k.clone(), v);
                if let Some(&prev) = live.get(&k) {
                    prop_assert_eq!(prev, h, "overwrite keeps the node");
                }
                live.insert(k.clone(), h);
                model.insert(k, v);
            }
            Op::TryAdd(k, v) => {
                let already = model.contains_key(&k);
                match sut.try_add(k.clone(), v) {
                    Some(h) => {
                        prop_assert!(!already);
                        live.insert(k.clone(), h);
                        model.insert(k, v);
                    }
                    None => prop_assert!(already),
                }
            }
            Op::Remove(k) => {
                let removed = sut.remove_entry(&k);
                match model.remove(&k) {
                    Some(mv) => {
                        let (kk, vv) = removed.expect("present in model");
                        prop_assert_eq!(kk, k.clone());
                        prop_assert_eq!(vv, mv);
                        stale.push(live.remove(&k).expect("tracked handle"));
                    }
                    None => prop_assert!(removed.is_none()),
                }
            }
            Op::RemoveIfEq(k, v) => {
                let expect = model.get(&k) == Some(&v);
                prop_assert_eq!(sut.remove_if_eq(&k, &v), expect);
                if expect {
                    model.remove(&k);
                    stale.push(live.remove(&k).expect("tracked handle"));
                }
            }
            Op::Find(k) => {
                let found = sut.find(&k);
                prop_assert_eq!(found.is_some(), model.contains_key(&k));
                if let Some(h) = found {
                    prop_assert_eq!(Some(&h), live.get(&k));
                }
            }
            Op::Contains(s) => {
                let has_model = model.keys().any(|k| k.0 == s);
                prop_assert_eq!(sut.contains_key(s.as_str()), has_model);
                prop_assert_eq!(sut.keys().contains(s.as_str()), has_model);
            }
            Op::Mutate(k, d) => {
                if let Some(&h) = live.get(&k) {
                    let vr = h.value_mut(&mut sut).expect("live handle resolves");
                    *vr = vr.saturating_add(d);
                    let mv = model.get_mut(&k).expect("present in model");
                    *mv = mv.saturating_add(d);
                }
            }
            Op::Iterate => {
                let keys: Vec<Key> = sut.iter().map(|(_, k, _)| k.clone()).collect();
                let unique: BTreeSet<Key> = keys.iter().cloned().collect();
                prop_assert_eq!(keys.len(), unique.len(), "no key enumerated twice");
                let m_keys: BTreeSet<Key> = model.keys().cloned().collect();
                prop_assert_eq!(unique, m_keys);
            }
            Op::Clear => {
                sut.clear();
                model.clear();
                stale.extend(live.drain().map(|(_, h)| h));
            }
        }

        for &h in &stale {
            prop_assert!(h.value(&sut).is_none());
        }
        for (k, v) in &model {
            prop_assert_eq!(sut.get(k), Some(v));
        }
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.iter().count(), model.len());
        prop_assert!(sut.len() <= sut.capacity());
    }
    Ok(())
}

proptest! {
    #[test]
    fn prop_state_machine(ops in arb_ops()) {
        run(EntryMap::new(), ops)?;
    }
}

// Collision variant using a constant hasher to stress equality resolution.
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

proptest! {
    #[test]
    fn prop_state_machine_with_collisions(ops in arb_ops()) {
        run(EntryMap::with_hasher(ConstBuildHasher), ops)?;
    }
}
