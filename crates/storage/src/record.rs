//! Record types for the relational shapes the engine queries.
//!
//! Timestamps are ISO 8601 / RFC 3339 strings in UTC throughout, matching
//! the wire representation of the backing store. The engine formats period
//! boundaries canonically before lookup, so string equality on
//! `period_start` is exact.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ──────────────────────────────────────────────
// Domain enums
// ──────────────────────────────────────────────

/// Tracking cadence of a KPI-like entity. Non-KPI entities carry none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodType {
    Monthly,
    Quarterly,
    Yearly,
}

/// Whether a rising value is good news or bad news.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    IncreaseIsGood,
    DecreaseIsGood,
}

/// Data type of a formula variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariableDataType {
    Number,
    Percentage,
}

/// Approval status of a value period row.
///
/// DRAFT → SUBMITTED → APPROVED, with rejection returning either of the
/// latter two to DRAFT. No other transitions exist; an APPROVED row is
/// immutable except through rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueStatus {
    Draft,
    Submitted,
    Approved,
}

impl ValueStatus {
    pub fn can_transition_to(self, next: ValueStatus) -> bool {
        matches!(
            (self, next),
            (ValueStatus::Draft, ValueStatus::Submitted)
                | (ValueStatus::Submitted, ValueStatus::Approved)
                | (ValueStatus::Submitted, ValueStatus::Draft)
                | (ValueStatus::Approved, ValueStatus::Draft)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValueStatus::Draft => "DRAFT",
            ValueStatus::Submitted => "SUBMITTED",
            ValueStatus::Approved => "APPROVED",
        }
    }
}

/// User role, ordered by approval rank: a later variant outranks an
/// earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Member,
    Manager,
    Executive,
    OrgAdmin,
}

impl Role {
    /// Organization administrators bypass all access classification.
    pub fn is_admin(self) -> bool {
        self == Role::OrgAdmin
    }
}

// ──────────────────────────────────────────────
// Strategy hierarchy records
// ──────────────────────────────────────────────

/// A node in the strategy hierarchy (pillar, objective, department,
/// initiative, or KPI).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: String,
    pub org_id: String,
    /// Stable key, unique within the organization; the name other
    /// formulas use in `get("KEY")` references.
    pub key: String,
    pub title: String,
    /// Primary node this entity hangs off in the org's node hierarchy.
    pub node_id: Option<String>,
    pub period_type: Option<PeriodType>,
    /// Value formula source. Absent means the entity is filled manually.
    pub formula: Option<String>,
    /// Achievement-override formula source, if any.
    pub achievement_formula: Option<String>,
    pub direction: Direction,
    pub baseline_value: Option<Decimal>,
    pub target_value: Option<Decimal>,
    /// Soft-delete marker; entities referenced by values are never hard
    /// deleted.
    pub deleted: bool,
}

/// A named input slot owned by exactly one entity. Codes are unique
/// within the owning entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityVariableRecord {
    pub id: String,
    pub entity_id: String,
    /// Identifier used inside the owning entity's formula.
    pub code: String,
    pub display_name: String,
    pub data_type: VariableDataType,
    pub is_required: bool,
    /// Static variables carry a fixed value and are never re-entered.
    pub is_static: bool,
    pub static_value: Option<Decimal>,
}

/// One row per (entity, period window).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityValuePeriodRecord {
    pub id: String,
    pub entity_id: String,
    /// RFC 3339 UTC instant of the window's first second.
    pub period_start: String,
    /// RFC 3339 UTC instant of the window's last second.
    pub period_end: String,
    /// Raw manual entry.
    pub actual_value: Option<Decimal>,
    /// Formula output.
    pub calculated_value: Option<Decimal>,
    /// The value used downstream: final ?? calculated ?? actual.
    pub final_value: Option<Decimal>,
    /// Clamped achievement percentage.
    pub achievement_value: Option<Decimal>,
    pub status: ValueStatus,
}

impl EntityValuePeriodRecord {
    /// Resolution order for the downstream value.
    pub fn resolved_value(&self) -> Option<Decimal> {
        self.final_value.or(self.calculated_value).or(self.actual_value)
    }
}

/// The filled-in number for one variable in one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityVariableValueRecord {
    pub id: String,
    pub value_period_id: String,
    pub variable_id: String,
    pub value: Decimal,
}

// ──────────────────────────────────────────────
// Users and assignments
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub org_id: String,
    pub display_name: String,
    pub role: Role,
    /// One manager, many reports; the manager graph must be acyclic.
    pub manager_id: Option<String>,
}

/// Direct grant of value-edit rights over one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntityAssignment {
    pub user_id: String,
    pub entity_id: String,
}

/// Grant of visibility over the entire subtree rooted at a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsibilityNodeAssignment {
    pub assigned_to_id: String,
    pub root_node_id: String,
}

/// Grant of visibility over one KPI-like entity directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponsibilityKpiAssignment {
    pub assigned_to_id: String,
    pub kpi_id: String,
}

/// One parent→child edge in the org's node hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEdge {
    pub parent_id: String,
    pub child_id: String,
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
