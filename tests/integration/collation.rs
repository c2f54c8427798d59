//! Child ordering across numeric and textual keys.

use proptest::prelude::*;
use strata::tree::collate::{numeric_value, sort_keys};
use strata::tree::{Node, VolatileNode};

fn keys_of(keys: &[&str]) -> Vec<String> {
    let root = VolatileNode::new();
    for key in keys {
        root.create_child(key).unwrap();
    }
    root.keys()
}

#[test]
fn numbers_sort_by_value_before_words() {
    assert_eq!(
        keys_of(&["apple", "10", "2", "0", "1"]),
        vec!["0", "1", "2", "10", "apple"]
    );
}

#[test]
fn signed_and_fractional_keys_are_numeric() {
    assert_eq!(
        keys_of(&["b", "+2", ".5", "-1", "1e1"]),
        vec!["-1", ".5", "+2", "1e1", "b"]
    );
}

#[test]
fn special_float_words_are_textual() {
    assert_eq!(numeric_value("inf"), None);
    assert_eq!(numeric_value("NaN"), None);
    assert_eq!(keys_of(&["inf", "3", "NaN"]), vec!["3", "NaN", "inf"]);
}

#[test]
fn equal_numbers_keep_distinct_keys() {
    let keys = keys_of(&["1.0", "1", "01"]);
    assert_eq!(keys.len(), 3);
    let mut sorted = keys.clone();
    sort_keys(&mut sorted);
    assert_eq!(keys, sorted);
}

fn key_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "-?[0-9]{1,3}(\\.[0-9]{1,2})?",
        "[a-zA-Z_][a-zA-Z0-9_]{0,5}",
    ]
}

proptest! {
    #[test]
    fn iteration_order_is_collated(keys in prop::collection::btree_set(key_strategy(), 0..24)) {
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let ordered = keys_of(&refs);
        prop_assert_eq!(ordered.len(), keys.len());

        let first_text = ordered.iter().position(|k| numeric_value(k).is_none());
        if let Some(first_text) = first_text {
            prop_assert!(ordered[first_text..].iter().all(|k| numeric_value(k).is_none()));
        }
        let numbers: Vec<f64> = ordered.iter().filter_map(|k| numeric_value(k)).collect();
        prop_assert!(numbers.windows(2).all(|w| w[0] <= w[1]));
    }
}
