#![cfg(test)]

// State-machine property tests for StringDictionary against a HashMap model
// keyed by the normalized text.

use crate::string_dictionary::{DictionaryOptions, StringDictionary};
use crate::text_key::CaseSensitivity;
use crate::Error;
use proptest::prelude::*;
use std::collections::hash_map::RandomState;
use std::collections::{BTreeSet, HashMap};

#[derive(Clone, Debug)]
enum Op {
    Add(String, i32),
    Set(String, i32),
    TryAdd(String, i32),
    Remove(String),
    RemoveBySlice(String),
    RemoveIfEq(String, i32),
    Get(String),
    Iterate,
    Clear,
}

fn arb_key() -> impl Strategy<Value = String> {
    "[a-cA-C]{0,3}"
}

prop_compose! {
    fn arb_ops()(ops in proptest::collection::vec(
        prop_oneof![
            4 => (arb_key(), any::<i32>()).prop_map(|(k, v)| Op::Add(k, v)),
            2 => (arb_key(), any::<i32>()).prop_map(|(k, v)| Op::Set(k, v)),
            2 => (arb_key(), any::<i32>()).prop_map(|(k, v)| Op::TryAdd(k, v)),
            2 => arb_key().prop_map(Op::Remove),
            2 => arb_key().prop_map(Op::RemoveBySlice),
            1 => (arb_key(), 0i32..3).prop_map(|(k, v)| Op::RemoveIfEq(k, v)),
            3 => arb_key().prop_map(Op::Get),
            1 => Just(Op::Iterate),
            1 => Just(Op::Clear),
        ], 1..200)) -> Vec<Op> { ops }
}

fn normalize(case: CaseSensitivity, s: &str) -> String {
    match case {
        CaseSensitivity::Ordinal => s.to_owned(),
        CaseSensitivity::IgnoreCase => s.to_uppercase(),
    }
}

fn chars(s: &str) -> Vec<char> {
    s.chars().collect()
}

fn run(case: CaseSensitivity, ops: Vec<Op>) -> Result<(), TestCaseError> {
    let options = DictionaryOptions::default().with_case(case);
    let mut sut: StringDictionary<i32> =
        StringDictionary::with_options(options, RandomState::new()).expect("valid options");
    let mut model: HashMap<String, i32> = HashMap::new();

    for op in ops {
        let (capacity_before, free_before) = (sut.capacity(), sut.free_count());
        let mut inserted_new = false;
        match op {
            Op::Add(k, v) => {
                let nk = normalize(case, &k);
                let already = model.contains_key(&nk);
                match sut.add(k, v) {
                    Ok(()) => {
                        prop_assert!(!already);
                        model.insert(nk, v);
                        inserted_new = true;
                    }
                    Err(Error::DuplicateKey(_)) => prop_assert!(already),
                    Err(e) => prop_assert!(false, "unexpected error {e}"),
                }
            }
            Op::Set(k, v) => {
                let nk = normalize(case, &k);
                let prev = sut.set(k, v);
                inserted_new = prev.is_none();
                prop_assert_eq!(prev, model.insert(nk, v));
            }
            Op::TryAdd(k, v) => {
                let nk = normalize(case, &k);
                let already = model.contains_key(&nk);
                prop_assert_eq!(sut.try_add(k, v), !already);
                if !already {
                    model.insert(nk, v);
                    inserted_new = true;
                }
            }
            Op::Remove(k) => {
                prop_assert_eq!(sut.remove(k.as_str()), model.remove(&normalize(case, &k)));
            }
            Op::RemoveBySlice(k) => {
                let slice = chars(&k);
                prop_assert_eq!(sut.remove(slice.as_slice()), model.remove(&normalize(case, &k)));
            }
            Op::RemoveIfEq(k, v) => {
                let nk = normalize(case, &k);
                let expect = model.get(&nk) == Some(&v);
                prop_assert_eq!(sut.remove_if_eq(k.as_str(), &v), expect);
                if expect {
                    model.remove(&nk);
                }
            }
            Op::Get(k) => {
                let slice = chars(&k);
                let expected = model.get(&normalize(case, &k));
                prop_assert_eq!(sut.get(k.as_str()), expected);
                prop_assert_eq!(sut.get(slice.as_slice()), expected);
                prop_assert_eq!(sut.contains_key(slice.as_slice()), expected.is_some());
            }
            Op::Iterate => {
                let keys: Vec<String> = sut.iter().map(|(k, _)| normalize(case, k)).collect();
                let unique: BTreeSet<String> = keys.iter().cloned().collect();
                prop_assert_eq!(keys.len(), unique.len(), "no key enumerated twice");
                let m_keys: BTreeSet<String> = model.keys().cloned().collect();
                prop_assert_eq!(unique, m_keys);
            }
            Op::Clear => {
                sut.clear();
                model.clear();
            }
        }

        if inserted_new && free_before > 0 {
            prop_assert_eq!(sut.capacity(), capacity_before, "free slot reused before growth");
            prop_assert_eq!(sut.free_count(), free_before - 1);
        }
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.len(), sut.size() - sut.free_count());
        prop_assert_eq!(sut.iter().count(), model.len());
        prop_assert!(sut.size() <= sut.capacity());
    }
    Ok(())
}

proptest! {
    #[test]
    fn prop_state_machine_ordinal(ops in arb_ops()) {
        run(CaseSensitivity::Ordinal, ops)?;
    }

    #[test]
    fn prop_state_machine_ignore_case(ops in arb_ops()) {
        run(CaseSensitivity::IgnoreCase, ops)?;
    }
}
