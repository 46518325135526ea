// StringDictionary integration suite, public API only.
//
// Invariants exercised:
// - Probes: `&str`, `&String` and `&[char]` find the same entries.
// - Case policy: fixed at construction, applied to hashing and equality.
// - Arena: removed slots are reused before the table grows, and
//   `len() == size() - free_count()` at all times.
use proptest::prelude::*;
use span_dictionary::{CaseSensitivity, DictionaryOptions, Error, StringDictionary};
use std::collections::{hash_map::RandomState, BTreeMap};
use test_log::test;

fn chars(s: &str) -> Vec<char> {
    s.chars().collect()
}

fn snapshot<V: Clone, S>(d: &StringDictionary<V, S>) -> BTreeMap<String, V> {
    d.iter().map(|(k, v)| (k.to_owned(), v.clone())).collect()
}

// Test: insert three, remove the middle one, insert a fourth.
// Verifies: the removed key is gone, enumeration yields exactly the rest,
// and the next insert lands in the freed slot.
#[test]
fn remove_then_reinsert() {
    let mut d = StringDictionary::new();
    d.add("key1", "value1").unwrap();
    d.add("key2", "value2").unwrap();
    d.add("key3", "value3").unwrap();

    assert_eq!(d.remove("key2"), Some("value2"));
    assert_eq!(d.len(), 2);
    assert!(!d.contains_key("key2"));
    assert_eq!(
        snapshot(&d),
        BTreeMap::from([("key1".to_string(), "value1"), ("key3".to_string(), "value3")])
    );

    let size = d.size();
    d.add("key4", "value4").unwrap();
    assert_eq!(d.len(), 3);
    assert_eq!(d.size(), size, "freed slot reused");
    assert_eq!(d.free_count(), 0);
}

// Test: throwing add on a present key.
// Verifies: DuplicateKey names the key; count and value are unchanged.
#[test]
fn duplicate_add_changes_nothing() {
    let mut d = StringDictionary::new();
    d.add("key1", 1).unwrap();
    d.add("key2", 2).unwrap();
    let err = d.add("key1", 100).unwrap_err();
    assert_eq!(err, Error::DuplicateKey("key1".to_string()));
    assert_eq!(d.len(), 2);
    assert_eq!(d.get("key1"), Some(&1));
}

// Test: a span into a larger buffer is a probe.
// Verifies: lookups and removal by a char subslice, no owned key needed.
#[test]
fn lookup_by_char_span() {
    let mut d = StringDictionary::new();
    d.add("GET", 1).unwrap();
    d.add("POST", 2).unwrap();

    let request = chars("POST /index.html");
    let method = &request[..4];
    assert_eq!(d.get(method), Some(&2));
    assert_eq!(d.get_key_value(method), Some(("POST", &2)));
    assert_eq!(d.value_of(&request[..3]), Err(Error::KeyNotFound("POS".to_string())));
    assert_eq!(d.remove(method), Some(2));
    assert!(!d.contains_key("POST"));
}

// Test: case-insensitive dictionary.
// Verifies: any casing finds the entry, a differently-cased add is a
// duplicate, the stored key keeps its original casing.
#[test]
fn ignore_case_dictionary() {
    let mut d = StringDictionary::with_case(CaseSensitivity::IgnoreCase);
    d.add("Content-Length", 42).unwrap();
    assert_eq!(d.get("content-length"), Some(&42));
    assert_eq!(d.get(chars("CONTENT-LENGTH").as_slice()), Some(&42));
    assert!(matches!(d.add("CONTENT-length", 0), Err(Error::DuplicateKey(_))));
    assert_eq!(d.set("content-LENGTH", 7), Some(42));
    assert_eq!(d.keys().iter().collect::<Vec<_>>(), ["Content-Length"]);
    assert!(d.keys().contains("content-length"));
}

// Test: ignore-case compares char by char.
// Verifies: chars with a multi-char uppercase form ('ß', 'ﬁ') are not
// expanded, so keys of different lengths never collide.
#[test]
fn ignore_case_does_not_expand_chars() {
    let mut d = StringDictionary::with_case(CaseSensitivity::IgnoreCase);
    d.add("straße", 1).unwrap();
    d.add("STRASSE", 2).unwrap();
    d.add("ﬁle", 3).unwrap();
    d.add("FILE", 4).unwrap();
    assert_eq!(d.len(), 4);
    assert_eq!(d.get("STRAßE"), Some(&1));
    assert_eq!(d.get("strasse"), Some(&2));
    assert_eq!(d.get("ﬁLE"), Some(&3));
    assert_eq!(d.get("file"), Some(&4));
}

// Test: growth past the initial capacity with interleaved removals.
// Verifies: every live key stays reachable and sizes stay consistent.
#[test]
fn growth_with_churn() {
    let mut d = StringDictionary::new();
    let mut model = BTreeMap::new();
    for i in 0..1000 {
        d.add(format!("k{i}"), i).unwrap();
        model.insert(format!("k{i}"), i);
        if i % 3 == 0 {
            let victim = format!("k{}", i / 2);
            assert_eq!(d.remove(victim.as_str()), model.remove(&victim));
        }
        assert_eq!(d.len(), d.size() - d.free_count());
        assert!(d.size() <= d.capacity());
    }
    assert_eq!(snapshot(&d), model);
    for (k, v) in &d {
        assert_eq!(d.get(k), Some(v));
    }
}

// Test: options and parsed case policy.
#[test]
fn options_from_config_strings() {
    let case: CaseSensitivity = "ignore-case".parse().unwrap();
    let opts = DictionaryOptions::default().with_capacity(30).with_case(case);
    let mut d: StringDictionary<u8> =
        StringDictionary::with_options(opts, RandomState::new()).unwrap();
    assert_eq!(d.capacity(), 37);
    assert_eq!(d.case_sensitivity(), CaseSensitivity::IgnoreCase);
    assert!(d.try_add("A", 1));
    assert!(!d.try_add("a", 2));
    assert_eq!(d.get("a"), Some(&1));
}

proptest! {
    // Property: removing n keys and adding n fresh ones never grows the table.
    #[test]
    fn prop_free_list_absorbs_reinserts(total in 1usize..200, frac in 0.0f64..=1.0) {
        let mut d = StringDictionary::new();
        for i in 0..total {
            d.add(format!("old{i}"), i).unwrap();
        }
        let (capacity, size) = (d.capacity(), d.size());
        let n = ((total as f64) * frac) as usize;
        for i in 0..n {
            prop_assert_eq!(d.remove(format!("old{i}").as_str()), Some(i));
        }
        prop_assert_eq!(d.free_count(), n);
        for i in 0..n {
            d.add(format!("new{i}"), i).unwrap();
        }
        prop_assert_eq!(d.capacity(), capacity);
        prop_assert_eq!(d.size(), size);
        prop_assert_eq!(d.len(), total);
        prop_assert_eq!(d.free_count(), 0);
    }
}
