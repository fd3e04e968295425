//! Property tests over randomly wired record graphs.

use normalization_kernel::{
    canonical_hash, for_each_nested, reduce_nested, remove_circular_references, rewrite_ids,
    rewrite_ids_recursive, Key, RecordId, Schema, Attribute, Value,
};
use proptest::prelude::*;

/// Node `i` gets record id `#cluster:i`; each edge `(from, to)` adds a
/// field on `from` pointing at `to`, so self loops and cycles are common.
#[derive(Debug, Clone)]
struct GraphSpec {
    clusters: Vec<i64>,
    edges: Vec<(usize, usize, bool)>,
}

fn graph_spec() -> impl Strategy<Value = GraphSpec> {
    (1usize..8)
        .prop_flat_map(|n| {
            (
                prop::collection::vec(-2i64..6, n),
                prop::collection::vec((0..n, 0..n, any::<bool>()), 0..16),
            )
        })
        .prop_map(|(clusters, edges)| GraphSpec { clusters, edges })
}

fn build(spec: &GraphSpec) -> Vec<Value> {
    let nodes: Vec<Value> = spec
        .clusters
        .iter()
        .enumerate()
        .map(|(i, cluster)| {
            Value::record([
                ("@rid", Value::RecordId(RecordId::new(*cluster, i as u64))),
                ("@version", Value::Int(1)),
                ("n", Value::Int(i as i64)),
            ])
        })
        .collect();

    for (k, (from, to, via_list)) in spec.edges.iter().enumerate() {
        let target = nodes[*to].clone();
        let link = if *via_list { Value::list(vec![target]) } else { target };
        nodes[*from].set_field(&format!("link{k}"), link);
    }
    nodes
}

fn identifier() -> impl Strategy<Value = Value> {
    prop_oneof![
        (-3i64..30, 0u64..50).prop_map(|(c, p)| Value::RecordId(RecordId::new(c, p))),
        (-3i64..30, 0u64..50).prop_map(|(c, p)| Value::String(format!("#{c}:{p}"))),
        "[a-z]{1,6}".prop_map(Value::String),
    ]
}

fn flat_record() -> impl Strategy<Value = Value> {
    (
        prop::option::of(identifier()),
        prop::option::of(identifier()),
        prop::option::of(identifier()),
        "[a-z]{0,8}",
    )
        .prop_map(|(rid, at_rid, owner, name)| {
            let mut fields = vec![("name", Value::String(name))];
            fields.extend(rid.map(|v| ("rid", v)));
            fields.extend(at_rid.map(|v| ("@rid", v)));
            fields.extend(owner.map(|v| ("ownerId", v)));
            Value::record(fields)
        })
}

fn scalar_or_record() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::Int),
        "[a-z]{0,4}".prop_map(Value::String),
        Just(Value::Null),
        flat_record(),
    ]
}

proptest! {
    #[test]
    fn rewrite_ids_is_idempotent(record in flat_record()) {
        let schema = Schema::new().with_attribute("owner", Attribute::foreign_key().with_column_name("ownerId"));

        rewrite_ids(&record, Some(&schema));
        let once = canonical_hash(&record).unwrap();
        rewrite_ids(&record, Some(&schema));
        let twice = canonical_hash(&record).unwrap();

        prop_assert_eq!(once, twice);
    }

    #[test]
    fn rewrite_ids_keeps_list_shape(items in prop::collection::vec(scalar_or_record(), 0..10)) {
        let before: Vec<Value> = items.clone();
        let list = Value::list(items);

        let out = rewrite_ids(&list, None);

        prop_assert_eq!(out.len(), before.len());
        for (i, original) in before.iter().enumerate() {
            let now = out.get(&Key::Index(i)).unwrap();
            if original.is_container() {
                prop_assert!(now.same_node(original));
            } else {
                prop_assert_eq!(now.type_name(), original.type_name());
            }
        }
    }

    #[test]
    fn recursive_rewrite_covers_every_reachable_record(spec in graph_spec()) {
        let nodes = build(&spec);
        let root = &nodes[0];

        rewrite_ids_recursive(root, None);

        let reachable = reduce_nested(root, Vec::new(), |mut acc, node, _| {
            if node.as_map().is_some() {
                acc.push(node.clone());
            }
            acc
        });
        for node in reachable {
            let n = node.field("n").and_then(|v| v.as_i64()).unwrap() as usize;
            prop_assert!(!node.has_field("@rid"));
            if spec.clusters[n] >= 0 {
                let expected = format!("#{}:{}", spec.clusters[n], n);
                prop_assert_eq!(node.field("id").and_then(|v| v.as_str().map(String::from)), Some(expected));
            } else {
                prop_assert!(!node.has_field("id"));
            }
        }
    }

    #[test]
    fn removing_cycles_makes_graph_serializable(spec in graph_spec()) {
        let nodes = build(&spec);
        let root = &nodes[0];
        rewrite_ids_recursive(root, None);

        let mut leaves_before = 0usize;
        for_each_nested(root, |_, _, _| leaves_before += 1);
        remove_circular_references(root);

        prop_assert!(root.to_json().is_ok());
        let mut leaves_after = 0usize;
        for_each_nested(root, |_, _, _| leaves_after += 1);
        prop_assert!(leaves_after >= leaves_before);
    }
}
