/// All errors that can be returned by a StrategyStore implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Entity not found — no record with the given id in the organization.
    #[error("entity not found: {entity_id}")]
    EntityNotFound { entity_id: String },

    /// User not found.
    #[error("user not found: {user_id}")]
    UserNotFound { user_id: String },

    /// A value period row in APPROVED status may only be mutated by an
    /// explicit rejection back to DRAFT. Any other write is refused.
    #[error("value period for entity {entity_id} at {period_start} is approved and immutable")]
    ApprovedRowImmutable {
        entity_id: String,
        period_start: String,
    },

    /// An invalid status transition was requested (e.g. DRAFT → APPROVED
    /// without submission).
    #[error("invalid status transition: {from} → {to}")]
    InvalidStatusTransition { from: String, to: String },

    /// A backend-specific storage error (DB connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
