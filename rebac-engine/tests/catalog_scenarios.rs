//! Catalog permission scenarios
//!
//! These tests exercise the bundled catalog schema end to end:
//! 1. Owners hold every permission, others hold none
//! 2. Viewer and editor roles map to the right permission subsets
//! 3. Group membership grants access, including nested groups
//! 4. Items inherit view/edit from their collection hierarchy
//! 5. Delete never inherits, it stays with direct owners
//! 6. Snapshot tokens give read-your-writes and repeatable reads
//! 7. Batch checks answer each request independently

use std::sync::Arc;

use rebac_engine::*;
use rebac_model::{ResourceRef, Schema, SubjectRef, Tuple};
use rebac_store::{MemoryTupleStore, WriteRequest};

fn seed(store: &MemoryTupleStore, tuples: &[&str]) -> rebac_model::SnapshotToken {
    let mut request = WriteRequest::new();
    for text in tuples {
        request = request.write(text.parse().expect("valid tuple text"));
    }
    store.apply(request)
}

fn engine_over(store: Arc<MemoryTupleStore>) -> AuthorizationEngine {
    AuthorizationEngine::new(store, Schema::catalog_schema()).expect("catalog schema is valid")
}

async fn allowed(
    engine: &AuthorizationEngine,
    subject: &SubjectRef,
    permission: &str,
    resource: &ResourceRef,
) -> bool {
    engine
        .check(subject, permission, resource)
        .await
        .expect("check should succeed")
        .allowed
}

#[tokio::test]
async fn test_owner_holds_every_permission() {
    let store = Arc::new(MemoryTupleStore::new());
    seed(&store, &["item:photo1#owners@user:bob"]);
    let engine = engine_over(store);

    let bob = SubjectRef::user("bob");
    let carol = SubjectRef::user("carol");
    let photo = ResourceRef::new("item", "photo1");

    for permission in ["view", "edit", "delete"] {
        assert!(
            allowed(&engine, &bob, permission, &photo).await,
            "owner bob should hold {permission}"
        );
        assert!(
            !allowed(&engine, &carol, permission, &photo).await,
            "carol should not hold {permission}"
        );
    }
}

#[tokio::test]
async fn test_viewer_and_editor_permission_subsets() {
    let store = Arc::new(MemoryTupleStore::new());
    seed(
        &store,
        &[
            "item:photo1#viewers@user:vera",
            "item:photo1#editors@user:ed",
        ],
    );
    let engine = engine_over(store);

    let vera = SubjectRef::user("vera");
    let ed = SubjectRef::user("ed");
    let photo = ResourceRef::new("item", "photo1");

    assert!(allowed(&engine, &vera, "view", &photo).await);
    assert!(!allowed(&engine, &vera, "edit", &photo).await);
    assert!(!allowed(&engine, &vera, "delete", &photo).await);

    assert!(allowed(&engine, &ed, "view", &photo).await);
    assert!(allowed(&engine, &ed, "edit", &photo).await);
    assert!(!allowed(&engine, &ed, "delete", &photo).await);
}

#[tokio::test]
async fn test_group_membership_grants_access() {
    let store = Arc::new(MemoryTupleStore::new());
    seed(
        &store,
        &[
            "item:i1#viewers@group:g1#members",
            "group:g1#members@user:dave",
        ],
    );
    let engine = engine_over(store);

    let item = ResourceRef::new("item", "i1");
    assert!(allowed(&engine, &SubjectRef::user("dave"), "view", &item).await);
    assert!(!allowed(&engine, &SubjectRef::user("mallory"), "view", &item).await);
}

#[tokio::test]
async fn test_nested_groups_resolve_transitively() {
    // Setup: erin is in g2, g2 is nested inside g1, g1 views the item
    let store = Arc::new(MemoryTupleStore::new());
    seed(
        &store,
        &[
            "item:i1#viewers@group:g1#members",
            "group:g1#members@group:g2#members",
            "group:g2#members@user:erin",
        ],
    );
    let engine = engine_over(store);

    let item = ResourceRef::new("item", "i1");
    assert!(allowed(&engine, &SubjectRef::user("erin"), "view", &item).await);
}

#[tokio::test]
async fn test_item_inherits_view_from_parent_collection() {
    let store = Arc::new(MemoryTupleStore::new());
    seed(
        &store,
        &[
            "item:i1#parents@collection:c1",
            "collection:c1#viewers@user:frank",
        ],
    );
    let engine = engine_over(store.clone());

    let item = ResourceRef::new("item", "i1");
    let frank = SubjectRef::user("frank");
    assert!(allowed(&engine, &frank, "view", &item).await);
    assert!(
        !allowed(&engine, &frank, "edit", &item).await,
        "a parent viewer does not inherit edit"
    );

    // Revoking the parent grant revokes the inherited view.
    let grant: Tuple = "collection:c1#viewers@user:frank".parse().unwrap();
    store.delete(&grant);
    assert!(!allowed(&engine, &frank, "view", &item).await);
}

#[tokio::test]
async fn test_multi_level_hierarchy_inherits_edit() {
    // Setup: i1 -> c1 -> c2, gina owns the top collection
    let store = Arc::new(MemoryTupleStore::new());
    seed(
        &store,
        &[
            "item:i1#parents@collection:c1",
            "collection:c1#parents@collection:c2",
            "collection:c2#owners@user:gina",
        ],
    );
    let engine = engine_over(store);

    let item = ResourceRef::new("item", "i1");
    let gina = SubjectRef::user("gina");
    assert!(allowed(&engine, &gina, "view", &item).await);
    assert!(allowed(&engine, &gina, "edit", &item).await);
}

#[tokio::test]
async fn test_delete_never_inherits_from_parents() {
    let store = Arc::new(MemoryTupleStore::new());
    seed(
        &store,
        &[
            "item:i1#parents@collection:c1",
            "collection:c1#owners@user:gina",
        ],
    );
    let engine = engine_over(store);

    let item = ResourceRef::new("item", "i1");
    let gina = SubjectRef::user("gina");
    assert!(allowed(&engine, &gina, "edit", &item).await);
    assert!(
        !allowed(&engine, &gina, "delete", &item).await,
        "delete stays with the item's direct owners"
    );
}

#[tokio::test]
async fn test_sibling_items_stay_isolated() {
    let store = Arc::new(MemoryTupleStore::new());
    seed(
        &store,
        &[
            "item:i1#parents@collection:c1",
            "item:i2#parents@collection:c2",
            "collection:c1#viewers@user:frank",
        ],
    );
    let engine = engine_over(store);

    let frank = SubjectRef::user("frank");
    assert!(allowed(&engine, &frank, "view", &ResourceRef::new("item", "i1")).await);
    assert!(!allowed(&engine, &frank, "view", &ResourceRef::new("item", "i2")).await);
}

#[tokio::test]
async fn test_checks_are_idempotent() {
    let store = Arc::new(MemoryTupleStore::new());
    seed(
        &store,
        &[
            "item:i1#viewers@group:g1#members",
            "group:g1#members@user:dave",
        ],
    );
    let engine = engine_over(store);

    let item = ResourceRef::new("item", "i1");
    let dave = SubjectRef::user("dave");
    let first = engine.check(&dave, "view", &item).await.unwrap();
    let second = engine.check(&dave, "view", &item).await.unwrap();
    let third = engine.check(&dave, "view", &item).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(second, third);
}

#[tokio::test]
async fn test_snapshot_tokens_pin_evaluation() {
    let store = Arc::new(MemoryTupleStore::new());
    let engine = engine_over(store.clone());

    let eve = SubjectRef::user("eve");
    let item = ResourceRef::new("item", "i1");
    let grant: Tuple = "item:i1#viewers@user:eve".parse().unwrap();

    // Write returns a token that is guaranteed to observe the write.
    let granted_at = store.write(grant.clone());
    let response = engine
        .check_at(&eve, "view", &item, Some(granted_at))
        .await
        .unwrap();
    assert!(response.allowed);

    // Revoking later does not change what the old token sees.
    store.delete(&grant);
    let pinned = engine
        .check_at(&eve, "view", &item, Some(granted_at))
        .await
        .unwrap();
    assert!(pinned.allowed, "pinned read must replay the old revision");

    let latest = engine.check(&eve, "view", &item).await.unwrap();
    assert!(!latest.allowed);

    println!("✅ Snapshot reads stay consistent across a revoke");
}

#[tokio::test]
async fn test_batch_check_answers_each_request_independently() {
    let store = Arc::new(MemoryTupleStore::new());
    seed(&store, &["item:photo1#owners@user:bob"]);
    let engine = engine_over(store);

    let requests = vec![
        CheckRequest {
            subject: SubjectRef::user("bob"),
            permission: "delete".into(),
            resource: ResourceRef::new("item", "photo1"),
            snapshot: None,
        },
        CheckRequest {
            subject: SubjectRef::user("carol"),
            permission: "delete".into(),
            resource: ResourceRef::new("item", "photo1"),
            snapshot: None,
        },
        CheckRequest {
            subject: SubjectRef::user("bob"),
            permission: "publish".into(),
            resource: ResourceRef::new("item", "photo1"),
            snapshot: None,
        },
    ];

    let results = engine.batch_check(requests).await;
    assert_eq!(results.len(), 3);
    assert!(results[0].as_ref().unwrap().allowed);
    assert!(!results[1].as_ref().unwrap().allowed);
    assert!(
        results[2].as_ref().unwrap_err().is_not_found(),
        "an unknown permission fails its own request only"
    );
}

#[tokio::test]
async fn test_list_resources_returns_only_permitted_items() {
    let store = Arc::new(MemoryTupleStore::new());
    seed(
        &store,
        &[
            "item:photo1#owners@user:bob",
            "item:photo2#viewers@group:g1#members",
            "group:g1#members@user:bob",
            "item:photo3#owners@user:carol",
        ],
    );
    let engine = engine_over(store);

    let found = engine
        .list_resources(&SubjectRef::user("bob"), "view", "item", None)
        .await
        .unwrap();
    assert_eq!(
        found,
        vec![
            ResourceRef::new("item", "photo1"),
            ResourceRef::new("item", "photo2"),
        ]
    );
}

#[tokio::test]
async fn test_list_resources_rejects_unknown_namespace() {
    let store = Arc::new(MemoryTupleStore::new());
    let engine = engine_over(store);

    // A misspelled namespace is an error even when no tuples mention it,
    // not an empty listing.
    let err = engine
        .list_resources(&SubjectRef::user("bob"), "view", "folder", None)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_expand_collects_subjects_across_indirections() {
    let store = Arc::new(MemoryTupleStore::new());
    seed(
        &store,
        &[
            "item:i1#viewers@user:alice",
            "item:i1#editors@group:g1#members",
            "group:g1#members@user:dave",
            "item:i1#parents@collection:c1",
            "collection:c1#owners@user:gina",
        ],
    );
    let engine = engine_over(store);

    let tree = engine
        .expand(&ResourceRef::new("item", "i1"), "view", None)
        .await
        .unwrap();
    let flat = tree.concrete_subjects();
    for user in ["alice", "dave", "gina"] {
        assert!(
            flat.contains(&SubjectRef::user(user)),
            "{user} should appear in the expansion"
        );
    }
}
