//! Property tests for the wire map serializer
//!
//! Any mapping tree consistent with the schema must survive
//! serialize -> deserialize -> serialize byte for byte.

use proptest::prelude::*;
use rowport_map::{ColumnSource, MapSerializer, MappingNode, MappingSource, SchemaNode};

fn schema() -> Vec<SchemaNode> {
    vec![
        SchemaNode::scalar("label", "string", true),
        SchemaNode::scalar("amount", "number", false),
        SchemaNode::scalar("count", "integer", false),
        SchemaNode::scalar("active", "boolean", false),
        SchemaNode::scalar("category", "categoryDescriptor", false),
        SchemaNode::object(
            "reference",
            "reference",
            false,
            vec![
                SchemaNode::scalar("code", "string", true),
                SchemaNode::scalar("version", "integer", false),
            ],
        ),
        SchemaNode::array(
            "entries",
            false,
            SchemaNode::object(
                "entry",
                "entry",
                false,
                vec![
                    SchemaNode::scalar("key", "string", true),
                    SchemaNode::scalar("weight", "number", false),
                ],
            ),
        ),
        SchemaNode::array("tags", false, SchemaNode::scalar("tag", "string", false)),
    ]
}

fn literal() -> impl Strategy<Value = String> {
    prop_oneof![
        "[ a-zA-Z0-9.$-]{0,8}",
        "-?[0-9]{1,6}(\\.[0-9]{1,3})?",
        Just("true".to_string()),
        Just("False".to_string()),
        Just(".567".to_string()),
    ]
}

fn scalar(name: &'static str) -> impl Strategy<Value = MappingNode> {
    let column = (
        "[A-Za-z][A-Za-z0-9 ]{0,6}",
        proptest::option::of("[a-z]{1,5}"),
        proptest::option::of(literal()),
    )
        .prop_map(|(column, lookup, default)| ColumnSource {
            column,
            lookup,
            default,
        });

    prop_oneof![
        Just(MappingSource::Unmapped),
        literal().prop_map(MappingSource::Static),
        column.prop_map(MappingSource::Column),
    ]
    .prop_map(move |source| MappingNode {
        name: name.to_string(),
        source,
    })
}

fn mapping_tree() -> impl Strategy<Value = Vec<MappingNode>> {
    let entry = (scalar("key"), scalar("weight"))
        .prop_map(|(key, weight)| MappingNode::object("entry", vec![key, weight]));

    (
        (scalar("label"), scalar("amount"), scalar("count"), scalar("active"), scalar("category")),
        (scalar("code"), scalar("version")),
        proptest::collection::vec(entry, 0..4),
        proptest::collection::vec(scalar("tag"), 0..4),
    )
        .prop_map(|((label, amount, count, active, category), (code, version), entries, tags)| {
            vec![
                label,
                amount,
                count,
                active,
                category,
                MappingNode::object("reference", vec![code, version]),
                MappingNode::array("entries", entries),
                MappingNode::array("tags", tags),
            ]
        })
}

proptest! {
    #[test]
    fn prop_serialize_is_stable_across_round_trip(tree in mapping_tree()) {
        let serializer = MapSerializer::new("/things", schema());

        let first = serializer.serialize_to_string(&tree).unwrap();
        let canonical = serializer.deserialize(&first).unwrap();
        let second = serializer.serialize_to_string(&canonical).unwrap();
        prop_assert_eq!(&first, &second);

        let again = serializer.deserialize(&second).unwrap();
        prop_assert_eq!(canonical, again);
    }

    #[test]
    fn prop_unmapped_array_items_never_reappear(tags in proptest::collection::vec(scalar("tag"), 0..6)) {
        let serializer = MapSerializer::new("/things", schema());
        let mapped = tags.iter().filter(|t| t.is_mapped()).count();

        let text = serializer
            .serialize_to_string(&[MappingNode::array("tags", tags)])
            .unwrap();
        let back = serializer.deserialize(&text).unwrap();
        let tags_node = back.iter().find(|n| n.name == "tags").unwrap();

        prop_assert_eq!(tags_node.children().len(), mapped);
    }
}

#[test]
fn test_canonical_form_reinstates_placeholders_in_schema_order() {
    let serializer = MapSerializer::new("/things", schema());
    let tree = vec![
        MappingNode::array("tags", vec![MappingNode::fixed("tag", "x")]),
        MappingNode::fixed("label", "  hello "),
    ];

    let canonical = serializer
        .deserialize(&serializer.serialize_to_string(&tree).unwrap())
        .unwrap();

    let names: Vec<_> = canonical.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["label", "amount", "count", "active", "category", "reference", "entries", "tags"]
    );
    assert_eq!(canonical[0].source, MappingSource::Static("hello".to_string()));
    assert_eq!(canonical[1].source, MappingSource::Unmapped);
    assert_eq!(canonical[6].source, MappingSource::Array(Vec::new()));
}

#[test]
fn test_lossless_literals_in_wire_form() {
    let serializer = MapSerializer::new("/things", schema());
    let tree = vec![
        MappingNode::fixed("amount", ".567"),
        MappingNode::column("count", ColumnSource::new("C").with_default("12")),
        MappingNode::object(
            "reference",
            vec![MappingNode::fixed("version", "12.34")],
        ),
    ];

    let value = serializer.serialize(&tree).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "amount": ".567",
            "count": {"Column": "C", "Default": 12},
            "reference": {"version": "12.34"}
        })
    );

    let money = serializer
        .serialize(&[MappingNode::fixed("amount", "12.34")])
        .unwrap();
    assert_eq!(money, serde_json::json!({"amount": 12.34}));
}
