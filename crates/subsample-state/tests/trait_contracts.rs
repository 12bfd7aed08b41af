//! Trait contract tests for RecordStore.
//!
//! Every check runs against the in-memory fake and against the SurrealDB
//! store on its `mem://` engine. Any conforming implementation must pass.

use serde_json::json;
use subsample_state::fakes::MemoryRecordStore;
use subsample_state::*;

fn registry() -> ModelRegistry {
    ModelRegistry::sample()
        .with_entity(
            EntityType::new("Order", "orders")
                .with_relation(RelationDescriptor::to_one("customer", "User", "userId")),
        )
        .with_entity(
            EntityType::new("Shop", "shops")
                .with_relation(RelationDescriptor::to_many("orders", "Order", "shopId")),
        )
}

fn entity(name: &str) -> EntityType {
    registry().describe(name).unwrap().clone()
}

async fn stores() -> Vec<(&'static str, Box<dyn RecordStore>)> {
    let surreal = SurrealRecordStore::in_memory().await.unwrap();
    surreal.ensure_schema(&registry()).await.unwrap();
    let memory = MemoryRecordStore::new();
    memory.ensure_schema(&registry()).await.unwrap();
    vec![("memory", Box::new(memory)), ("surreal", Box::new(surreal))]
}

async fn create(store: &dyn RecordStore, name: &str, id: i64, fields: serde_json::Value) -> Record {
    store
        .create(&entity(name), &Identifier::Int(id), field_map(fields))
        .await
        .unwrap()
}

#[tokio::test]
async fn create_honours_identifier_hint() {
    for (label, store) in stores().await {
        let record = create(store.as_ref(), "User", 7, json!({"username": "ada"})).await;
        assert_eq!(record.id, Identifier::Int(7), "{label}");
        assert_eq!(record.entity, "User", "{label}");

        let found = store
            .find_by_id(&entity("User"), &Identifier::Int(7))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.get("username"), Some(&json!("ada")), "{label}");
    }
}

#[tokio::test]
async fn find_by_id_missing_is_none() {
    for (label, store) in stores().await {
        let found = store
            .find_by_id(&entity("User"), &Identifier::Int(404))
            .await
            .unwrap();
        assert!(found.is_none(), "{label}");
    }
}

#[tokio::test]
async fn update_merges_and_returns_row() {
    for (label, store) in stores().await {
        let record = create(
            store.as_ref(),
            "Order",
            10,
            json!({"userId": 1, "total": 5}),
        )
        .await;
        let updated = store
            .update(&entity("Order"), &record, field_map(json!({"userId": 2})))
            .await
            .unwrap();
        assert_eq!(updated.get("userId"), Some(&json!(2)), "{label}");
        assert_eq!(updated.get("total"), Some(&json!(5)), "{label}");
    }
}

#[tokio::test]
async fn foreign_key_lookup_filters_rows() {
    for (label, store) in stores().await {
        create(store.as_ref(), "Order", 10, json!({"shopId": 1})).await;
        create(store.as_ref(), "Order", 11, json!({"shopId": 1})).await;
        create(store.as_ref(), "Order", 12, json!({"shopId": 2})).await;

        let found = store
            .find_all_by_foreign_key(&entity("Order"), "shopId", &Identifier::Int(1))
            .await
            .unwrap();
        let ids: Vec<_> = found.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![Identifier::Int(10), Identifier::Int(11)], "{label}");
    }
}

#[tokio::test]
async fn page_orders_newest_first_and_limits() {
    for (label, store) in stores().await {
        create(store.as_ref(), "User", 1, json!({"createdAt": "2024-01-01"})).await;
        create(store.as_ref(), "User", 2, json!({"createdAt": "2024-03-01"})).await;
        create(store.as_ref(), "User", 3, json!({"createdAt": "2024-02-01"})).await;

        let user = entity("User");
        let page = store
            .find_page(&user, 2, &OrderBy::newest_first(&user))
            .await
            .unwrap();
        let ids: Vec<_> = page.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec![Identifier::Int(2), Identifier::Int(3)], "{label}");

        let by_id = store.find_page(&user, 10, &OrderBy::by_id(true)).await.unwrap();
        assert_eq!(by_id.first().map(|r| r.id.clone()), Some(Identifier::Int(3)), "{label}");
    }
}

#[tokio::test]
async fn join_membership_is_idempotent_and_visible_from_both_sides() {
    for (label, store) in stores().await {
        let user = create(store.as_ref(), "User", 1, json!({"username": "ada"})).await;
        let role = create(store.as_ref(), "Role", 5, json!({"code": "ADM"})).await;

        let roles = registry()
            .describe("User")
            .unwrap()
            .relation("roles")
            .unwrap()
            .clone();
        let users = registry()
            .describe("Role")
            .unwrap()
            .relation("users")
            .unwrap()
            .clone();

        store.add_join_membership(&user, &roles, &role).await.unwrap();
        store.add_join_membership(&user, &roles, &role).await.unwrap();
        store.add_join_membership(&role, &users, &user).await.unwrap();

        let members = store
            .find_join_members(&user, &roles, &entity("Role"))
            .await
            .unwrap();
        assert_eq!(members.len(), 1, "{label}");
        assert_eq!(members[0].id, Identifier::Int(5), "{label}");

        let back = store
            .find_join_members(&role, &users, &entity("User"))
            .await
            .unwrap();
        assert_eq!(back.len(), 1, "{label}");
        assert_eq!(back[0].id, Identifier::Int(1), "{label}");
    }
}

#[tokio::test]
async fn join_operations_reject_plain_relations() {
    for (label, store) in stores().await {
        let user = create(store.as_ref(), "User", 1, json!({})).await;
        let order = create(store.as_ref(), "Order", 2, json!({})).await;
        let customer = RelationDescriptor::to_one("customer", "User", "userId");

        let err = store
            .add_join_membership(&order, &customer, &user)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Backend(_)), "{label}");
    }
}

#[tokio::test]
async fn ensure_schema_is_repeatable() {
    for (label, store) in stores().await {
        store.ensure_schema(&registry()).await.unwrap_or_else(|e| panic!("{label}: {e}"));
    }
}
