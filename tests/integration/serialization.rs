//! Reading and writing the text format.

use proptest::prelude::*;
use std::collections::BTreeMap;
use strata::schema::{HeaderPolicy, Schema};
use strata::tree::{Node, NodeExt, TreeAlgebra, VolatileNode};
use strata::StorageError;

fn parse(schema: Schema, text: &str) -> std::sync::Arc<VolatileNode> {
    let root = VolatileNode::new();
    schema.read_str(text, root.as_ref()).unwrap();
    root
}

#[test]
fn document_round_trips_through_text() {
    let text = "STRATA.schema=2\n\
                name: pump\n\
                empty:\n\
                flag\n\
                \"a:b\": quoted\n\
                notes: |\n first line\n\n second line\n\
                ports\n 1: inlet\n 2: outlet\n";
    let schema = Schema::default();
    let root = parse(schema, text);

    assert_eq!(root.get(&["name"]), Some("pump".to_string()));
    assert_eq!(root.get(&["empty"]), Some(String::new()));
    assert!(root.has_child("flag"));
    assert_eq!(root.get(&["flag"]), None);
    assert_eq!(root.get(&["a:b"]), Some("quoted".to_string()));
    assert_eq!(
        root.get(&["notes"]),
        Some("first line\n\nsecond line".to_string())
    );
    assert_eq!(root.get(&["ports", "2"]), Some("outlet".to_string()));

    let written = schema.document_to_string(root.as_ref(), None);
    let again = parse(schema, &written);
    assert!(again.equals_recursive(root.as_ref()));
}

#[test]
fn legacy_dialect_is_read() {
    let root = parse(Schema::default(), "STRATA.schema=1\nname=motor\nspeed=1500\n");
    assert_eq!(root.get(&["name"]), Some("motor".to_string()));
    assert_eq!(root.get_int(0, &["speed"]), 1500);
}

#[test]
fn headerless_text_is_sniffed_unless_strict() {
    let root = parse(Schema::default(), "a=1\n");
    assert_eq!(root.get(&["a"]), Some("1".to_string()));
    let root = parse(Schema::default(), "a: 1\n");
    assert_eq!(root.get(&["a"]), Some("1".to_string()));

    let strict = Schema::new(HeaderPolicy::Strict);
    let result = strict.read_str("a: 1\n", VolatileNode::new().as_ref());
    assert!(matches!(result, Err(StorageError::Schema(_))));
}

#[test]
fn document_type_survives_header() {
    let root = VolatileNode::new();
    root.set("1", &["x"]).unwrap();
    let schema = Schema::default();
    let text = schema.document_to_string(root.as_ref(), Some("model"));
    let header = schema.read_str(&text, VolatileNode::new().as_ref()).unwrap();
    assert_eq!(header.doc_type.as_deref(), Some("model"));
}

#[derive(Debug, Clone)]
struct Spec {
    value: Option<String>,
    children: BTreeMap<String, Spec>,
}

fn key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_.:=\" -]{0,6}"
}

fn value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_.:=\" -]{0,10}"
}

fn spec_strategy() -> impl Strategy<Value = Spec> {
    let leaf = value_strategy().prop_map(|value| Spec {
        value: Some(value),
        children: BTreeMap::new(),
    });
    leaf.prop_recursive(3, 32, 4, |inner| {
        (
            proptest::option::of(value_strategy()),
            prop::collection::btree_map(key_strategy(), inner, 1..4),
        )
            .prop_map(|(value, children)| Spec { value, children })
    })
}

fn build(node: &dyn Node, spec: &Spec) {
    if let Some(value) = &spec.value {
        node.set_value(Some(value)).unwrap();
    }
    for (key, child) in &spec.children {
        let created = node.create_child(key).unwrap();
        build(created.as_ref(), child);
    }
}

proptest! {
    #[test]
    fn written_trees_read_back_equal(
        children in prop::collection::btree_map(key_strategy(), spec_strategy(), 0..5)
    ) {
        let root = VolatileNode::new();
        build(root.as_ref(), &Spec { value: None, children });

        let schema = Schema::default();
        let text = schema.document_to_string(root.as_ref(), None);
        let back = VolatileNode::new();
        schema.read_str(&text, back.as_ref()).unwrap();
        prop_assert!(back.equals_recursive(root.as_ref()), "text was:\n{}", text);
    }
}
