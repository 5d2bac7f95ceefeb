use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{
    EntityRecord, EntityValuePeriodRecord, EntityVariableRecord, EntityVariableValueRecord,
    NodeEdge, ResponsibilityKpiAssignment, ResponsibilityNodeAssignment, UserEntityAssignment,
    UserRecord,
};

/// The persistence seam for the Compass engine.
///
/// A `StrategyStore` implementation exposes exactly the query shapes the
/// engine requires: point lookups by id/key, per-entity and per-period
/// listings, assignment listings, and the relation feeds for closure
/// building. The engine fetches just-in-time, computes synchronously over
/// the fetched data, and writes back through a single upsert.
///
/// ## Write discipline
///
/// `upsert_value_period` is the one mutating entry point for computed
/// values: atomic per (entity, period_start), idempotent for identical
/// inputs, and guarded — a row in APPROVED status may only be rewritten
/// by an explicit rejection back to DRAFT
/// (`StorageError::ApprovedRowImmutable` otherwise).
///
/// `put_variable_values` replaces a period's variable rows as one group,
/// so a concurrent reader never observes a half-written set mid
/// formula-evaluation.
///
/// Assignment upserts deduplicate: pairs are unique, never duplicate rows.
///
/// ## Thread safety
///
/// Implementations must be `Send + Sync + 'static` so the engine can be
/// shared across async task boundaries.
#[async_trait]
pub trait StrategyStore: Send + Sync + 'static {
    // ── Entities ─────────────────────────────────────────────────────────────

    /// Point lookup of an entity by id.
    ///
    /// Returns `Err(StorageError::EntityNotFound)` if absent or soft-deleted.
    async fn entity_by_id(&self, org_id: &str, entity_id: &str)
        -> Result<EntityRecord, StorageError>;

    /// Point lookup of an entity by its stable cross-reference key.
    /// Soft-deleted entities are not returned.
    async fn entity_by_key(
        &self,
        org_id: &str,
        key: &str,
    ) -> Result<Option<EntityRecord>, StorageError>;

    /// All live entities in an organization.
    async fn entities_by_org(&self, org_id: &str) -> Result<Vec<EntityRecord>, StorageError>;

    /// Variable definitions owned by an entity.
    async fn variables_for_entity(
        &self,
        entity_id: &str,
    ) -> Result<Vec<EntityVariableRecord>, StorageError>;

    // ── Value periods ────────────────────────────────────────────────────────

    /// Point lookup of the value row for (entity, window), keyed on the
    /// canonical RFC 3339 form of the window start.
    async fn value_period(
        &self,
        entity_id: &str,
        period_start: &str,
    ) -> Result<Option<EntityValuePeriodRecord>, StorageError>;

    /// The single atomic write for computed values. See the trait docs
    /// for the idempotence and APPROVED-row guarantees.
    async fn upsert_value_period(
        &self,
        record: EntityValuePeriodRecord,
    ) -> Result<EntityValuePeriodRecord, StorageError>;

    /// Filled-in variable values for one value period row.
    async fn variable_values_for_period(
        &self,
        value_period_id: &str,
    ) -> Result<Vec<EntityVariableValueRecord>, StorageError>;

    /// Replace a period's variable values as one group.
    async fn put_variable_values(
        &self,
        value_period_id: &str,
        values: Vec<EntityVariableValueRecord>,
    ) -> Result<(), StorageError>;

    // ── Assignments ──────────────────────────────────────────────────────────

    /// Direct entity assignments held by a user.
    async fn assignments_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<UserEntityAssignment>, StorageError>;

    /// Direct assignments over one entity (who may edit its values).
    async fn assignments_for_entity(
        &self,
        entity_id: &str,
    ) -> Result<Vec<UserEntityAssignment>, StorageError>;

    /// Upsert a direct assignment (unique pair semantics).
    async fn upsert_assignment(&self, assignment: UserEntityAssignment)
        -> Result<(), StorageError>;

    /// Subtree-visibility grants held by a user.
    async fn node_assignments_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<ResponsibilityNodeAssignment>, StorageError>;

    /// Single-KPI visibility grants held by a user.
    async fn kpi_assignments_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<ResponsibilityKpiAssignment>, StorageError>;

    // ── Users and hierarchy feeds ────────────────────────────────────────────

    /// Point lookup of a user.
    ///
    /// Returns `Err(StorageError::UserNotFound)` if absent.
    async fn user_by_id(&self, user_id: &str) -> Result<UserRecord, StorageError>;

    /// Direct reports of one manager.
    async fn users_by_manager(&self, manager_id: &str) -> Result<Vec<UserRecord>, StorageError>;

    /// All users in an organization — the feed the engine builds its
    /// manager→report adjacency map from, once per traversal.
    async fn users_by_org(&self, org_id: &str) -> Result<Vec<UserRecord>, StorageError>;

    /// All parent→child node edges in an organization.
    async fn node_edges(&self, org_id: &str) -> Result<Vec<NodeEdge>, StorageError>;
}
