//! compass-engine: entity computation and access resolution.
//!
//! The engine consumes a [`StrategyStore`] (the persistence seam), fetches
//! the relations it needs just-in-time, and runs synchronous, side-effect
//! free computation over the fetched data. The only write is the single
//! atomic value-period upsert after computation.
//!
//! Two independent surfaces:
//!
//! - **Value computation** -- resolve a period window, evaluate an
//!   entity's formula over its variables and the final values of the
//!   entities it references, score achievement, persist.
//! - **Access resolution** -- classify what a user may do with an entity
//!   from direct assignment, formula-dependency propagation, and the
//!   manager/subordinate closure.

pub mod access;
pub mod achievement;
pub mod closure;
pub mod config;
pub mod interp;
pub mod period;
pub mod types;
pub mod value;

use std::collections::{BTreeMap, BTreeSet};

use compass_core::extract_deps;
use compass_storage::{
    EntityRecord, EntityValuePeriodRecord, StrategyStore, UserRecord, ValueStatus,
};
use rust_decimal::Decimal;
use tracing::debug;

// ── Convenience re-exports: key types ────────────────────────────────

pub use access::{
    classify, classify_batch, AccessClass, AccessContext, AccessResult, ACCESS_RULES,
};
pub use achievement::compute_achievement;
pub use closure::{adjacency_from_pairs, build_closure, subtree_ids};
pub use config::{EngineConfig, DEFAULT_ACHIEVEMENT_CAP, DEFAULT_MAX_EVAL_OPS};
pub use interp::evaluate as evaluate_formula;
pub use period::{resolve_period, PeriodWindow};
pub use types::{EngineError, Value, VariableEnv};
pub use value::{compute_all, compute_value, EntityData, PeriodDataSet, ValueOutcome};

// ──────────────────────────────────────────────
// Engine facade
// ──────────────────────────────────────────────

/// The engine facade over a storage backend.
pub struct Engine<S> {
    store: S,
    config: EngineConfig,
}

impl<S: StrategyStore> Engine<S> {
    pub fn new(store: S) -> Self {
        Engine {
            store,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(store: S, config: EngineConfig) -> Self {
        Engine { store, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ── Value computation ────────────────────────────────────────────────────

    /// Compute an entity's value for a period window and persist it.
    ///
    /// Evaluation failures and dependency cycles do not error: they are
    /// reported inside the returned [`ValueOutcome`] so one malformed
    /// formula cannot block a listing. The computed row is written back
    /// through the store's atomic upsert, with the achievement score
    /// derived from the final value; an APPROVED row is left untouched.
    pub async fn compute_entity_value(
        &self,
        org_id: &str,
        entity_id: &str,
        window: &PeriodWindow,
    ) -> Result<ValueOutcome, EngineError> {
        let entity = self.store.entity_by_id(org_id, entity_id).await?;
        let data = self.assemble_period_data(org_id, window).await?;
        let outcome = value::compute_value(&data, &entity.key, &self.config);

        let achievement = achievement::compute_achievement(
            entity.baseline_value,
            outcome.final_value,
            entity.target_value,
            entity.direction,
            entity.achievement_formula.as_deref(),
            &self.config,
        );

        let existing = data
            .entities
            .get(&entity.key)
            .and_then(|e| e.period_row.clone());
        let frozen = existing
            .as_ref()
            .is_some_and(|row| row.status == ValueStatus::Approved);

        if frozen {
            debug!(entity_id = %entity.id, "approved value period left untouched");
        } else {
            let row = EntityValuePeriodRecord {
                id: existing
                    .as_ref()
                    .map(|r| r.id.clone())
                    .unwrap_or_else(|| format!("{}:{}", entity.id, window.start_key())),
                entity_id: entity.id.clone(),
                period_start: window.start_key(),
                period_end: window.end_key(),
                actual_value: existing.as_ref().and_then(|r| r.actual_value),
                calculated_value: outcome.calculated_value,
                final_value: outcome.final_value,
                achievement_value: achievement,
                status: existing
                    .as_ref()
                    .map(|r| r.status)
                    .unwrap_or(ValueStatus::Draft),
            };
            self.store.upsert_value_period(row).await?;
        }

        Ok(outcome)
    }

    /// Compute every entity of the organization for one window, without
    /// persisting -- the batch read path for dashboards.
    pub async fn compute_all_values(
        &self,
        org_id: &str,
        window: &PeriodWindow,
    ) -> Result<BTreeMap<String, ValueOutcome>, EngineError> {
        let data = self.assemble_period_data(org_id, window).await?;
        Ok(value::compute_all(&data, &self.config))
    }

    /// Achievement scoring over explicit inputs (no store access).
    pub fn compute_achievement(
        &self,
        baseline: Option<Decimal>,
        current: Option<Decimal>,
        target: Option<Decimal>,
        direction: compass_storage::Direction,
        override_formula: Option<&str>,
    ) -> Option<Decimal> {
        achievement::compute_achievement(
            baseline,
            current,
            target,
            direction,
            override_formula,
            &self.config,
        )
    }

    async fn assemble_period_data(
        &self,
        org_id: &str,
        window: &PeriodWindow,
    ) -> Result<PeriodDataSet, EngineError> {
        let start_key = window.start_key();
        let mut data = PeriodDataSet::default();

        for record in self.store.entities_by_org(org_id).await? {
            let variables = self.store.variables_for_entity(&record.id).await?;
            let period_row = self.store.value_period(&record.id, &start_key).await?;

            let mut variable_values = BTreeMap::new();
            if let Some(row) = &period_row {
                let code_by_id: BTreeMap<&str, &str> = variables
                    .iter()
                    .map(|v| (v.id.as_str(), v.code.as_str()))
                    .collect();
                for entered in self.store.variable_values_for_period(&row.id).await? {
                    if let Some(code) = code_by_id.get(entered.variable_id.as_str()) {
                        variable_values.insert(code.to_string(), entered.value);
                    }
                }
            }

            data.insert(EntityData {
                record,
                variables,
                period_row,
                variable_values,
            });
        }

        Ok(data)
    }

    // ── Access resolution ────────────────────────────────────────────────────

    /// Build the precomputed classification context for one user.
    ///
    /// Raises `MissingOrgScope` for an empty organization scope -- that is
    /// a programming error upstream, unlike "no access", which is never
    /// an error.
    pub async fn access_context(
        &self,
        user_id: &str,
        org_id: &str,
    ) -> Result<AccessContext, EngineError> {
        require_org_scope(org_id)?;

        let user = self.store.user_by_id(user_id).await?;
        let entities = self.store.entities_by_org(org_id).await?;
        let entities_by_id: BTreeMap<&str, &EntityRecord> =
            entities.iter().map(|e| (e.id.as_str(), e)).collect();

        let assigned_entity_ids: BTreeSet<String> = self
            .store
            .assignments_for_user(user_id)
            .await?
            .into_iter()
            .map(|a| a.entity_id)
            .collect();
        let dependency_keys = formula_dependency_keys(&assigned_entity_ids, &entities_by_id);

        let subordinates = self.subordinate_set(user_id, org_id).await?;
        let mut subordinate_assigned_entity_ids = BTreeSet::new();
        for subordinate in &subordinates {
            for assignment in self.store.assignments_for_user(subordinate).await? {
                subordinate_assigned_entity_ids.insert(assignment.entity_id);
            }
        }
        let subordinate_dependency_keys =
            formula_dependency_keys(&subordinate_assigned_entity_ids, &entities_by_id);

        Ok(AccessContext {
            user_id: user.id,
            is_admin: user.role.is_admin(),
            assigned_entity_ids,
            dependency_keys,
            subordinate_assigned_entity_ids,
            subordinate_dependency_keys,
        })
    }

    /// Classify one user's access to one entity.
    pub async fn check_access(
        &self,
        user_id: &str,
        entity_id: &str,
        org_id: &str,
    ) -> Result<AccessResult, EngineError> {
        let ctx = self.access_context(user_id, org_id).await?;
        let entity = self.store.entity_by_id(org_id, entity_id).await?;
        Ok(access::classify(&ctx, &entity))
    }

    /// Classify one user's access to many entities with one context --
    /// O(1) per entity after the shared precomputation. Ids not present
    /// in the organization classify as `none`.
    pub async fn batch_check_access(
        &self,
        user_id: &str,
        entity_ids: &[String],
        org_id: &str,
    ) -> Result<BTreeMap<String, AccessResult>, EngineError> {
        let ctx = self.access_context(user_id, org_id).await?;
        let entities = self.store.entities_by_org(org_id).await?;
        let by_id: BTreeMap<&str, &EntityRecord> =
            entities.iter().map(|e| (e.id.as_str(), e)).collect();

        Ok(entity_ids
            .iter()
            .map(|id| {
                let result = by_id
                    .get(id.as_str())
                    .map(|entity| access::classify(&ctx, entity))
                    .unwrap_or_else(AccessResult::none);
                (id.clone(), result)
            })
            .collect())
    }

    /// Guard helper: error with `Unauthorized` unless the user may edit
    /// the entity's values.
    pub async fn require_edit_values(
        &self,
        user_id: &str,
        entity_id: &str,
        org_id: &str,
    ) -> Result<AccessResult, EngineError> {
        let result = self.check_access(user_id, entity_id, org_id).await?;
        if !result.edit_values {
            return Err(EngineError::Unauthorized {
                user_id: user_id.to_string(),
            });
        }
        Ok(result)
    }

    /// Ids of every user in the requester's subordinate closure, the
    /// requester excluded.
    pub async fn subordinate_ids(
        &self,
        user_id: &str,
        org_id: &str,
    ) -> Result<Vec<String>, EngineError> {
        require_org_scope(org_id)?;
        Ok(self.subordinate_set(user_id, org_id).await?.into_iter().collect())
    }

    async fn subordinate_set(
        &self,
        user_id: &str,
        org_id: &str,
    ) -> Result<BTreeSet<String>, EngineError> {
        let users = self.store.users_by_org(org_id).await?;
        let edges = manager_adjacency(&users);
        let mut closure = closure::build_closure([user_id.to_string()], &edges);
        closure.remove(user_id);
        Ok(closure)
    }

    // ── Responsibility visibility ────────────────────────────────────────────

    /// The coarse visibility layer for org-chart dashboards: every entity
    /// the user can see through node-subtree grants, direct KPI grants,
    /// or the admin bypass.
    pub async fn visible_entity_ids(
        &self,
        user_id: &str,
        org_id: &str,
    ) -> Result<BTreeSet<String>, EngineError> {
        require_org_scope(org_id)?;

        let user = self.store.user_by_id(user_id).await?;
        let entities = self.store.entities_by_org(org_id).await?;

        if user.role.is_admin() {
            return Ok(entities.into_iter().map(|e| e.id).collect());
        }

        let node_edges = self.store.node_edges(org_id).await?;
        let edges = adjacency_from_pairs(
            node_edges
                .into_iter()
                .map(|edge| (edge.parent_id, edge.child_id)),
        );

        let roots: Vec<String> = self
            .store
            .node_assignments_for_user(user_id)
            .await?
            .into_iter()
            .map(|a| a.root_node_id)
            .collect();
        let visible_nodes = closure::build_closure(roots, &edges);

        let mut visible: BTreeSet<String> = entities
            .iter()
            .filter(|e| {
                e.node_id
                    .as_deref()
                    .is_some_and(|node| visible_nodes.contains(node))
            })
            .map(|e| e.id.clone())
            .collect();

        for grant in self.store.kpi_assignments_for_user(user_id).await? {
            visible.insert(grant.kpi_id);
        }

        Ok(visible)
    }
}

// ──────────────────────────────────────────────
// Shared helpers
// ──────────────────────────────────────────────

fn require_org_scope(org_id: &str) -> Result<(), EngineError> {
    if org_id.trim().is_empty() {
        return Err(EngineError::MissingOrgScope);
    }
    Ok(())
}

/// Union of the entity keys referenced by the formulas of the given
/// entities.
fn formula_dependency_keys(
    entity_ids: &BTreeSet<String>,
    by_id: &BTreeMap<&str, &EntityRecord>,
) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    for id in entity_ids {
        let Some(entity) = by_id.get(id.as_str()) else {
            continue;
        };
        if let Some(formula) = entity.formula.as_deref() {
            keys.extend(extract_deps(formula).entity_keys);
        }
    }
    keys
}

/// Manager→report adjacency, built once per traversal.
fn manager_adjacency(users: &[UserRecord]) -> BTreeMap<String, Vec<String>> {
    adjacency_from_pairs(users.iter().filter_map(|u| {
        u.manager_id
            .clone()
            .map(|manager| (manager, u.id.clone()))
    }))
}

// ──────────────────────────────────────────────
// Integration tests
// ──────────────────────────────────────────────
