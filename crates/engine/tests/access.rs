//! Access-resolution scenarios through the engine facade: precedence,
//! dependency propagation, manager closure, batch parity, and the
//! responsibility visibility layer.

use compass_engine::{AccessClass, Engine, EngineError};
use compass_storage::{
    Direction, EntityRecord, MemoryStore, NodeEdge, ResponsibilityKpiAssignment,
    ResponsibilityNodeAssignment, Role, StrategyStore, UserEntityAssignment, UserRecord,
};

const ORG: &str = "org-1";

fn entity(id: &str, key: &str, formula: Option<&str>) -> EntityRecord {
    EntityRecord {
        id: id.into(),
        org_id: ORG.into(),
        key: key.into(),
        title: key.into(),
        node_id: None,
        period_type: None,
        formula: formula.map(str::to_owned),
        achievement_formula: None,
        direction: Direction::IncreaseIsGood,
        baseline_value: None,
        target_value: None,
        deleted: false,
    }
}

fn user(id: &str, role: Role, manager_id: Option<&str>) -> UserRecord {
    UserRecord {
        id: id.into(),
        org_id: ORG.into(),
        display_name: id.into(),
        role,
        manager_id: manager_id.map(str::to_owned),
    }
}

async fn assign(store: &MemoryStore, user_id: &str, entity_id: &str) {
    store
        .upsert_assignment(UserEntityAssignment {
            user_id: user_id.into(),
            entity_id: entity_id.into(),
        })
        .await
        .unwrap();
}

/// A small org: admin; manager with report; report assigned K1 whose
/// formula reads K2; an unrelated K3 assigned to nobody.
async fn seed() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_user(user("admin", Role::OrgAdmin, None));
    store.insert_user(user("manager", Role::Manager, None));
    store.insert_user(user("report", Role::Member, Some("manager")));
    store.insert_user(user("outsider", Role::Member, None));

    store.insert_entity(entity("e1", "K1", Some("get(\"K2\") * 2")));
    store.insert_entity(entity("e2", "K2", None));
    store.insert_entity(entity("e3", "K3", None));

    assign(&store, "report", "e1").await;
    store
}

#[tokio::test]
async fn direct_assignment_grants_value_edit() {
    let engine = Engine::new(seed().await);
    let result = engine.check_access("report", "e1", ORG).await.unwrap();
    assert_eq!(result.class, AccessClass::Assigned);
    assert!(result.read && result.edit_values && !result.edit_definition);
}

#[tokio::test]
async fn formula_dependency_grants_read_only() {
    // report is assigned K1; K1's formula reads K2 via get("K2").
    let engine = Engine::new(seed().await);
    let result = engine.check_access("report", "e2", ORG).await.unwrap();
    assert_eq!(result.class, AccessClass::Dependency);
    assert!(result.read);
    assert!(!result.edit_values);
}

#[tokio::test]
async fn manager_reaches_a_reports_entity_hierarchically() {
    let engine = Engine::new(seed().await);
    let result = engine.check_access("manager", "e1", ORG).await.unwrap();
    assert_eq!(result.class, AccessClass::Hierarchical);
    assert!(result.read && result.edit_values && !result.edit_definition);
}

#[tokio::test]
async fn manager_gets_dependency_reach_through_reports() {
    let engine = Engine::new(seed().await);
    let result = engine.check_access("manager", "e2", ORG).await.unwrap();
    assert_eq!(result.class, AccessClass::HierarchicalDependency);
    assert!(result.read);
    assert!(!result.edit_values);
}

#[tokio::test]
async fn assigned_takes_priority_over_hierarchical() {
    let store = seed().await;
    // The manager is ALSO directly assigned to e1.
    assign(&store, "manager", "e1").await;
    let engine = Engine::new(store);
    let result = engine.check_access("manager", "e1", ORG).await.unwrap();
    assert_eq!(result.class, AccessClass::Assigned);
}

#[tokio::test]
async fn admin_reads_and_edits_everything() {
    let engine = Engine::new(seed().await);
    for entity_id in ["e1", "e2", "e3"] {
        let result = engine.check_access("admin", entity_id, ORG).await.unwrap();
        assert_eq!(result.class, AccessClass::Admin);
        assert!(result.read && result.edit_values && result.edit_definition);
    }
}

#[tokio::test]
async fn unrelated_user_gets_none_without_error() {
    let engine = Engine::new(seed().await);
    let result = engine.check_access("outsider", "e1", ORG).await.unwrap();
    assert_eq!(result.class, AccessClass::None);
    assert!(!result.read);
}

#[tokio::test]
async fn empty_org_scope_is_a_structural_error() {
    let engine = Engine::new(seed().await);
    let err = engine.check_access("report", "e1", "  ").await.unwrap_err();
    assert_eq!(err, EngineError::MissingOrgScope);
}

#[tokio::test]
async fn batch_classification_matches_single_checks() {
    let engine = Engine::new(seed().await);
    let ids: Vec<String> = ["e1", "e2", "e3", "absent"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    for user_id in ["admin", "manager", "report", "outsider"] {
        let batch = engine.batch_check_access(user_id, &ids, ORG).await.unwrap();
        for entity_id in ["e1", "e2", "e3"] {
            let single = engine.check_access(user_id, entity_id, ORG).await.unwrap();
            assert_eq!(batch[entity_id], single, "{} on {}", user_id, entity_id);
        }
        assert_eq!(batch["absent"].class, AccessClass::None);
    }
}

#[tokio::test]
async fn require_edit_values_rejects_read_only_tiers() {
    let engine = Engine::new(seed().await);
    engine
        .require_edit_values("report", "e1", ORG)
        .await
        .unwrap();
    let err = engine
        .require_edit_values("report", "e2", ORG)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::Unauthorized {
            user_id: "report".into()
        }
    );
}

#[tokio::test]
async fn subordinate_closure_spans_levels_and_excludes_self() {
    let store = MemoryStore::new();
    store.insert_user(user("top", Role::Executive, None));
    store.insert_user(user("mid", Role::Manager, Some("top")));
    store.insert_user(user("leaf-a", Role::Member, Some("mid")));
    store.insert_user(user("leaf-b", Role::Member, Some("mid")));
    store.insert_user(user("elsewhere", Role::Member, None));

    let engine = Engine::new(store);
    let ids = engine.subordinate_ids("top", ORG).await.unwrap();
    assert_eq!(ids, vec!["leaf-a", "leaf-b", "mid"]);

    assert!(engine.subordinate_ids("leaf-a", ORG).await.unwrap().is_empty());
}

#[tokio::test]
async fn deep_chain_grants_hierarchical_access_transitively() {
    let store = MemoryStore::new();
    store.insert_user(user("top", Role::Executive, None));
    store.insert_user(user("mid", Role::Manager, Some("top")));
    store.insert_user(user("leaf", Role::Member, Some("mid")));
    store.insert_entity(entity("e1", "K1", None));
    assign(&store, "leaf", "e1").await;

    let engine = Engine::new(store);
    let result = engine.check_access("top", "e1", ORG).await.unwrap();
    assert_eq!(result.class, AccessClass::Hierarchical);
}

#[tokio::test]
async fn node_assignment_exposes_the_whole_subtree() {
    let store = MemoryStore::new();
    store.insert_user(user("viewer", Role::Member, None));

    // Node tree: root -> (branch -> leaf). Entities hang off nodes.
    store.insert_node_edge(NodeEdge {
        parent_id: "root".into(),
        child_id: "branch".into(),
    });
    store.insert_node_edge(NodeEdge {
        parent_id: "branch".into(),
        child_id: "leaf".into(),
    });

    let mut on_root = entity("e1", "K1", None);
    on_root.node_id = Some("root".into());
    store.insert_entity(on_root);
    let mut on_leaf = entity("e2", "K2", None);
    on_leaf.node_id = Some("leaf".into());
    store.insert_entity(on_leaf);
    let mut elsewhere = entity("e3", "K3", None);
    elsewhere.node_id = Some("other".into());
    store.insert_entity(elsewhere);

    store.insert_node_assignment(ResponsibilityNodeAssignment {
        assigned_to_id: "viewer".into(),
        root_node_id: "root".into(),
    });

    let engine = Engine::new(store);
    let visible = engine.visible_entity_ids("viewer", ORG).await.unwrap();
    assert!(visible.contains("e1"));
    assert!(visible.contains("e2"));
    assert!(!visible.contains("e3"));
}

#[tokio::test]
async fn kpi_assignment_exposes_exactly_that_kpi() {
    let store = MemoryStore::new();
    store.insert_user(user("viewer", Role::Member, None));
    store.insert_entity(entity("e1", "K1", None));
    store.insert_entity(entity("e2", "K2", None));
    store.insert_kpi_assignment(ResponsibilityKpiAssignment {
        assigned_to_id: "viewer".into(),
        kpi_id: "e1".into(),
    });

    let engine = Engine::new(store);
    let visible = engine.visible_entity_ids("viewer", ORG).await.unwrap();
    assert_eq!(visible.into_iter().collect::<Vec<_>>(), vec!["e1"]);
}

#[tokio::test]
async fn admin_sees_every_entity_unconditionally() {
    let store = MemoryStore::new();
    store.insert_user(user("admin", Role::OrgAdmin, None));
    store.insert_entity(entity("e1", "K1", None));
    store.insert_entity(entity("e2", "K2", None));

    let engine = Engine::new(store);
    let visible = engine.visible_entity_ids("admin", ORG).await.unwrap();
    assert_eq!(visible.len(), 2);
}
