//! Loading relation metadata from JSON model files.

use std::io::Write;

use subsample_state::{MetadataError, ModelRegistry, RelationKind, RelationMetadata};

const SHOP_MODELS: &str = r#"{
    "entities": [
        {"name": "Shop", "table": "shops", "fields": ["name"],
         "relations": [{"name": "orders", "kind": "to_many", "target": "Order", "foreign_key": "shopId"}]},
        {"name": "Order", "table": "orders",
         "relations": [
            {"name": "shop", "kind": "to_one", "target": "Shop", "foreign_key": "shopId"},
            {"name": "tags", "kind": "many_to_many", "target": "Tag", "foreign_key": "OrderId",
             "through": "orders_tags", "join_key": "TagId"}
         ]},
        {"name": "Tag", "table": "tags", "created_at": null}
    ]
}"#;

#[test]
fn registry_loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(SHOP_MODELS.as_bytes()).unwrap();

    let registry = ModelRegistry::from_json_file(file.path()).unwrap();
    assert_eq!(registry.entities().len(), 3);

    let order = registry.describe("Order").unwrap();
    assert_eq!(
        order.relation("tags").unwrap().kind,
        RelationKind::ManyToMany {
            through: "orders_tags".into(),
            join_key: "TagId".into(),
        }
    );

    let joins = registry.join_tables();
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0].table, "orders_tags");
}

#[test]
fn missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ModelRegistry::from_json_file(dir.path().join("absent.json")).unwrap_err();
    assert!(matches!(err, MetadataError::Io(_)));
}

#[test]
fn malformed_file_is_parse_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"{\"entities\": [").unwrap();

    let err = ModelRegistry::from_json_file(file.path()).unwrap_err();
    assert!(matches!(err, MetadataError::Parse(_)));
}

#[test]
fn dangling_relation_target_fails_validation() {
    let err = ModelRegistry::from_json_str(
        r#"{"entities": [{"name": "Order", "table": "orders",
            "relations": [{"name": "shop", "kind": "to_one", "target": "Shop", "foreign_key": "shopId"}]}]}"#,
    )
    .unwrap_err();
    assert!(matches!(err, MetadataError::InvalidSchema(_)));
}
