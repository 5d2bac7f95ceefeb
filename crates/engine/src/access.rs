//! Access resolution.
//!
//! Classifies what a user may do with an entity. Classification is a pure
//! function over a precomputed [`AccessContext`]: the context gathers the
//! user's direct assignments, the dependency key-set of their assigned
//! entities' formulas, and the same two sets for their subordinate
//! closure -- once per (user, org) -- after which every entity classifies
//! in O(1). List views classify hundreds of rows against one context.
//!
//! The precedence order is an explicit rule table evaluated first-match
//! wins, so each tier is auditable and testable in isolation:
//!
//! 1. `admin` -- org administrators read and edit everything.
//! 2. `assigned` -- direct assignment: read + edit values.
//! 3. `dependency` -- a formula on one of the user's own entities reads
//!    this entity: read only.
//! 4. `hierarchical` -- the entity is assigned to someone in the user's
//!    subordinate closure: read + edit values (managers may correct a
//!    report's entries but not redefine the KPI).
//! 5. `hierarchical-dependency` -- as (3), keyed off a subordinate's
//!    assignments: read only.
//! 6. `none`.

use std::collections::{BTreeMap, BTreeSet};

use compass_storage::EntityRecord;
use serde::{Deserialize, Serialize};

// ──────────────────────────────────────────────
// Classification result
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessClass {
    Admin,
    Assigned,
    Dependency,
    Hierarchical,
    HierarchicalDependency,
    None,
}

/// A classification and the capability pair it implies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessResult {
    pub class: AccessClass,
    pub read: bool,
    pub edit_values: bool,
    pub edit_definition: bool,
}

impl AccessResult {
    pub fn from_class(class: AccessClass) -> AccessResult {
        let (read, edit_values, edit_definition) = match class {
            AccessClass::Admin => (true, true, true),
            AccessClass::Assigned | AccessClass::Hierarchical => (true, true, false),
            AccessClass::Dependency | AccessClass::HierarchicalDependency => (true, false, false),
            AccessClass::None => (false, false, false),
        };
        AccessResult {
            class,
            read,
            edit_values,
            edit_definition,
        }
    }

    pub fn none() -> AccessResult {
        AccessResult::from_class(AccessClass::None)
    }
}

// ──────────────────────────────────────────────
// Context
// ──────────────────────────────────────────────

/// Everything classification needs about one user, computed once.
#[derive(Debug, Clone, Default)]
pub struct AccessContext {
    pub user_id: String,
    pub is_admin: bool,
    /// Entities directly assigned to the user.
    pub assigned_entity_ids: BTreeSet<String>,
    /// Entity keys referenced by the formulas of the user's assigned
    /// entities.
    pub dependency_keys: BTreeSet<String>,
    /// Entities directly assigned to anyone in the user's subordinate
    /// closure (the user themself excluded).
    pub subordinate_assigned_entity_ids: BTreeSet<String>,
    /// Entity keys referenced by the formulas of subordinate-assigned
    /// entities.
    pub subordinate_dependency_keys: BTreeSet<String>,
}

// ──────────────────────────────────────────────
// Rule table
// ──────────────────────────────────────────────

/// One classification tier: `Some(class)` claims the entity, `None`
/// passes to the next rule.
pub type AccessRule = fn(&AccessContext, &EntityRecord) -> Option<AccessClass>;

/// The precedence-ordered rule table. First match wins.
pub const ACCESS_RULES: &[(&str, AccessRule)] = &[
    ("admin", admin_rule),
    ("assigned", assigned_rule),
    ("dependency", dependency_rule),
    ("hierarchical", hierarchical_rule),
    ("hierarchical-dependency", hierarchical_dependency_rule),
];

fn admin_rule(ctx: &AccessContext, _entity: &EntityRecord) -> Option<AccessClass> {
    ctx.is_admin.then_some(AccessClass::Admin)
}

fn assigned_rule(ctx: &AccessContext, entity: &EntityRecord) -> Option<AccessClass> {
    ctx.assigned_entity_ids
        .contains(&entity.id)
        .then_some(AccessClass::Assigned)
}

fn dependency_rule(ctx: &AccessContext, entity: &EntityRecord) -> Option<AccessClass> {
    ctx.dependency_keys
        .contains(&entity.key)
        .then_some(AccessClass::Dependency)
}

fn hierarchical_rule(ctx: &AccessContext, entity: &EntityRecord) -> Option<AccessClass> {
    ctx.subordinate_assigned_entity_ids
        .contains(&entity.id)
        .then_some(AccessClass::Hierarchical)
}

fn hierarchical_dependency_rule(ctx: &AccessContext, entity: &EntityRecord) -> Option<AccessClass> {
    ctx.subordinate_dependency_keys
        .contains(&entity.key)
        .then_some(AccessClass::HierarchicalDependency)
}

// ──────────────────────────────────────────────
// Classification
// ──────────────────────────────────────────────

/// Classify one entity against a prepared context. O(1).
pub fn classify(ctx: &AccessContext, entity: &EntityRecord) -> AccessResult {
    for (_, rule) in ACCESS_RULES {
        if let Some(class) = rule(ctx, entity) {
            return AccessResult::from_class(class);
        }
    }
    AccessResult::none()
}

/// Classify many entities against one context, keyed by entity id.
pub fn classify_batch<'a>(
    ctx: &AccessContext,
    entities: impl IntoIterator<Item = &'a EntityRecord>,
) -> BTreeMap<String, AccessResult> {
    entities
        .into_iter()
        .map(|entity| (entity.id.clone(), classify(ctx, entity)))
        .collect()
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
