//! Bundled in-memory backend.
//!
//! `MemoryStore` keeps every relation in plain vectors behind one RwLock.
//! It exists for tests and for embedders that assemble their data in
//! process; it implements the full `StrategyStore` contract including the
//! APPROVED-row write guard and unique-pair assignment semantics.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{
    EntityRecord, EntityValuePeriodRecord, EntityVariableRecord, EntityVariableValueRecord,
    NodeEdge, ResponsibilityKpiAssignment, ResponsibilityNodeAssignment, UserEntityAssignment,
    UserRecord, ValueStatus,
};
use crate::traits::StrategyStore;

#[derive(Default)]
struct Inner {
    entities: Vec<EntityRecord>,
    variables: Vec<EntityVariableRecord>,
    value_periods: Vec<EntityValuePeriodRecord>,
    variable_values: Vec<EntityVariableValueRecord>,
    users: Vec<UserRecord>,
    assignments: Vec<UserEntityAssignment>,
    node_assignments: Vec<ResponsibilityNodeAssignment>,
    kpi_assignments: Vec<ResponsibilityKpiAssignment>,
    node_edges: Vec<NodeEdge>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    // ── Seeding (not part of the StrategyStore contract) ─────────────────────

    pub fn insert_entity(&self, entity: EntityRecord) {
        self.write().entities.push(entity);
    }

    pub fn insert_variable(&self, variable: EntityVariableRecord) {
        let mut inner = self.write();
        // Variable codes are unique within their owning entity.
        inner
            .variables
            .retain(|v| !(v.entity_id == variable.entity_id && v.code == variable.code));
        inner.variables.push(variable);
    }

    pub fn insert_user(&self, user: UserRecord) {
        self.write().users.push(user);
    }

    pub fn insert_node_edge(&self, edge: NodeEdge) {
        let mut inner = self.write();
        if !inner.node_edges.contains(&edge) {
            inner.node_edges.push(edge);
        }
    }

    pub fn insert_node_assignment(&self, assignment: ResponsibilityNodeAssignment) {
        let mut inner = self.write();
        if !inner.node_assignments.contains(&assignment) {
            inner.node_assignments.push(assignment);
        }
    }

    pub fn insert_kpi_assignment(&self, assignment: ResponsibilityKpiAssignment) {
        let mut inner = self.write();
        if !inner.kpi_assignments.contains(&assignment) {
            inner.kpi_assignments.push(assignment);
        }
    }
}

#[async_trait]
impl StrategyStore for MemoryStore {
    async fn entity_by_id(
        &self,
        org_id: &str,
        entity_id: &str,
    ) -> Result<EntityRecord, StorageError> {
        self.read()
            .entities
            .iter()
            .find(|e| e.org_id == org_id && e.id == entity_id && !e.deleted)
            .cloned()
            .ok_or_else(|| StorageError::EntityNotFound {
                entity_id: entity_id.to_string(),
            })
    }

    async fn entity_by_key(
        &self,
        org_id: &str,
        key: &str,
    ) -> Result<Option<EntityRecord>, StorageError> {
        Ok(self
            .read()
            .entities
            .iter()
            .find(|e| e.org_id == org_id && e.key == key && !e.deleted)
            .cloned())
    }

    async fn entities_by_org(&self, org_id: &str) -> Result<Vec<EntityRecord>, StorageError> {
        Ok(self
            .read()
            .entities
            .iter()
            .filter(|e| e.org_id == org_id && !e.deleted)
            .cloned()
            .collect())
    }

    async fn variables_for_entity(
        &self,
        entity_id: &str,
    ) -> Result<Vec<EntityVariableRecord>, StorageError> {
        Ok(self
            .read()
            .variables
            .iter()
            .filter(|v| v.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn value_period(
        &self,
        entity_id: &str,
        period_start: &str,
    ) -> Result<Option<EntityValuePeriodRecord>, StorageError> {
        Ok(self
            .read()
            .value_periods
            .iter()
            .find(|r| r.entity_id == entity_id && r.period_start == period_start)
            .cloned())
    }

    async fn upsert_value_period(
        &self,
        record: EntityValuePeriodRecord,
    ) -> Result<EntityValuePeriodRecord, StorageError> {
        let mut inner = self.write();
        let position = inner
            .value_periods
            .iter()
            .position(|r| r.entity_id == record.entity_id && r.period_start == record.period_start);

        let Some(position) = position else {
            inner.value_periods.push(record.clone());
            return Ok(record);
        };
        let existing = &mut inner.value_periods[position];

        if record.status == existing.status {
            // Same-status rewrite: idempotent for identical content, refused
            // outright on an APPROVED row.
            if existing.status == ValueStatus::Approved && *existing != record {
                return Err(StorageError::ApprovedRowImmutable {
                    entity_id: record.entity_id,
                    period_start: record.period_start,
                });
            }
        } else if !existing.status.can_transition_to(record.status) {
            return Err(StorageError::InvalidStatusTransition {
                from: existing.status.as_str().to_string(),
                to: record.status.as_str().to_string(),
            });
        }

        // Row identity is stable across upserts.
        let id = existing.id.clone();
        *existing = record;
        existing.id = id;
        Ok(existing.clone())
    }

    async fn variable_values_for_period(
        &self,
        value_period_id: &str,
    ) -> Result<Vec<EntityVariableValueRecord>, StorageError> {
        Ok(self
            .read()
            .variable_values
            .iter()
            .filter(|v| v.value_period_id == value_period_id)
            .cloned()
            .collect())
    }

    async fn put_variable_values(
        &self,
        value_period_id: &str,
        values: Vec<EntityVariableValueRecord>,
    ) -> Result<(), StorageError> {
        let mut inner = self.write();
        inner
            .variable_values
            .retain(|v| v.value_period_id != value_period_id);
        inner.variable_values.extend(values);
        Ok(())
    }

    async fn assignments_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<UserEntityAssignment>, StorageError> {
        Ok(self
            .read()
            .assignments
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn assignments_for_entity(
        &self,
        entity_id: &str,
    ) -> Result<Vec<UserEntityAssignment>, StorageError> {
        Ok(self
            .read()
            .assignments
            .iter()
            .filter(|a| a.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn upsert_assignment(
        &self,
        assignment: UserEntityAssignment,
    ) -> Result<(), StorageError> {
        let mut inner = self.write();
        if !inner.assignments.contains(&assignment) {
            inner.assignments.push(assignment);
        }
        Ok(())
    }

    async fn node_assignments_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<ResponsibilityNodeAssignment>, StorageError> {
        Ok(self
            .read()
            .node_assignments
            .iter()
            .filter(|a| a.assigned_to_id == user_id)
            .cloned()
            .collect())
    }

    async fn kpi_assignments_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<ResponsibilityKpiAssignment>, StorageError> {
        Ok(self
            .read()
            .kpi_assignments
            .iter()
            .filter(|a| a.assigned_to_id == user_id)
            .cloned()
            .collect())
    }

    async fn user_by_id(&self, user_id: &str) -> Result<UserRecord, StorageError> {
        self.read()
            .users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
            .ok_or_else(|| StorageError::UserNotFound {
                user_id: user_id.to_string(),
            })
    }

    async fn users_by_manager(&self, manager_id: &str) -> Result<Vec<UserRecord>, StorageError> {
        Ok(self
            .read()
            .users
            .iter()
            .filter(|u| u.manager_id.as_deref() == Some(manager_id))
            .cloned()
            .collect())
    }

    async fn users_by_org(&self, org_id: &str) -> Result<Vec<UserRecord>, StorageError> {
        Ok(self
            .read()
            .users
            .iter()
            .filter(|u| u.org_id == org_id)
            .cloned()
            .collect())
    }

    async fn node_edges(&self, org_id: &str) -> Result<Vec<NodeEdge>, StorageError> {
        // Edges are org-scoped through their nodes; the bundled store keeps
        // one organization per instance and returns them all.
        let _ = org_id;
        Ok(self.read().node_edges.clone())
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
