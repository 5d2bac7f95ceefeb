//! Engine configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Achievement percentages are clamped to `[0, cap]`. The default cap of
/// 150 bounds runaway over-achievement display; it is a display policy,
/// not a numeric limit.
pub const DEFAULT_ACHIEVEMENT_CAP: u32 = 150;

/// Default interpreter operation budget. One unit is charged per AST node
/// visited, which bounds formula runtime deterministically.
pub const DEFAULT_MAX_EVAL_OPS: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper clamp for achievement percentages.
    pub achievement_cap: Decimal,
    /// Interpreter operation budget per formula evaluation.
    pub max_eval_ops: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            achievement_cap: Decimal::from(DEFAULT_ACHIEVEMENT_CAP),
            max_eval_ops: DEFAULT_MAX_EVAL_OPS,
        }
    }
}
