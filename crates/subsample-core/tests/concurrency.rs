//! Concurrent child replication must not duplicate shared records.

use std::sync::Arc;

use serde_json::json;
use subsample_core::{Coordinator, ReplicationOptions, RunPlan};
use subsample_state::fakes::MemoryRecordStore;
use subsample_state::{
    field_map, EntityType, Identifier, ModelRegistry, RelationDescriptor, RelationMetadata,
};

const ORDERS: i64 = 8;

/// One shop with eight orders, all placed by the same customer.
fn seeded() -> (Arc<ModelRegistry>, Arc<MemoryRecordStore>) {
    let models = ModelRegistry::new()
        .with_entity(
            EntityType::new("Shop", "shops")
                .with_relation(RelationDescriptor::to_many("orders", "Order", "shopId")),
        )
        .with_entity(
            EntityType::new("Order", "orders")
                .with_relation(RelationDescriptor::to_one("customer", "Customer", "customerId")),
        )
        .with_entity(EntityType::new("Customer", "customers"));

    let source = MemoryRecordStore::new();
    source.seed(
        models.describe("Shop").unwrap(),
        1,
        field_map(json!({"name": "corner", "createdAt": "2024-01-01"})),
    );
    source.seed(
        models.describe("Customer").unwrap(),
        7,
        field_map(json!({"name": "ada"})),
    );
    for id in 0..ORDERS {
        source.seed(
            models.describe("Order").unwrap(),
            100 + id,
            field_map(json!({"shopId": 1, "customerId": 7})),
        );
    }
    (Arc::new(models), Arc::new(source))
}

async fn run_with(concurrency: usize) -> (Arc<MemoryRecordStore>, subsample_core::RunSummary) {
    let (models, source) = seeded();
    let target = Arc::new(MemoryRecordStore::new());
    let summary = Coordinator::new(source, target.clone(), models)
        .with_options(ReplicationOptions {
            child_concurrency: concurrency,
        })
        .run(&RunPlan::new("Shop", 1, 3))
        .await
        .unwrap();
    (target, summary)
}

#[tokio::test]
async fn shared_grandchild_is_created_once_under_concurrency() {
    let (target, summary) = run_with(ORDERS as usize).await;

    assert_eq!(target.count("customers"), 1);
    assert_eq!(target.count("orders"), ORDERS as usize);
    assert_eq!(summary.metrics.write_failures, 0);
    assert_eq!(summary.metrics.records_created, 1 + ORDERS as u64 + 1);
    for id in target.ids("orders") {
        let row = target.get("orders", &id).unwrap();
        assert_eq!(row.get("customerId"), Some(&json!(7)));
        assert_eq!(row.get("shopId"), Some(&json!(1)));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn multi_threaded_runtime_gives_same_result() {
    let (target, summary) = run_with(4).await;

    assert_eq!(target.count("customers"), 1);
    assert_eq!(summary.metrics.write_failures, 0);
    assert_eq!(target.created_count(), 1 + ORDERS as u64 + 1);
}

#[tokio::test]
async fn sequential_and_concurrent_runs_agree() {
    let (sequential, _) = run_with(1).await;
    let (concurrent, _) = run_with(ORDERS as usize).await;

    for table in ["shops", "orders", "customers"] {
        assert_eq!(sequential.ids(table), concurrent.ids(table), "{table}");
        for id in sequential.ids(table) {
            assert_eq!(
                sequential.get(table, &id),
                concurrent.get(table, &id),
                "{table}:{id}"
            );
        }
    }
    assert_eq!(
        sequential.ids("customers"),
        vec![Identifier::Int(7)]
    );
}
