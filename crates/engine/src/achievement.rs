//! Achievement scoring.
//!
//! Measures progress from baseline to target as a clamped percentage.
//! An achievement of `None` means "unknown" -- inputs were missing or an
//! override formula failed -- and is deliberately distinct from zero.

use compass_storage::Direction;
use rust_decimal::Decimal;
use tracing::warn;

use crate::config::EngineConfig;
use crate::interp;
use crate::types::VariableEnv;

/// Compute the achievement percentage for one entity in one period.
///
/// With an override formula present, the formula is evaluated with
/// exactly `baselineValue`, `currentValue`, and `targetValue` bound --
/// each defaulted to 0 when absent, so overrides never fail on missing
/// optional inputs. (Reproduced as observed behavior: the defaulting can
/// flatter partially-filled KPIs.) An override that fails to evaluate
/// yields `None`, not zero.
///
/// Without an override, all three inputs must be present and target must
/// differ from baseline:
///
/// - increase-is-good: `(current - baseline) / (target - baseline) * 100`
/// - decrease-is-good: `(baseline - current) / (baseline - target) * 100`
///
/// The result is clamped to `[0, achievement_cap]`.
pub fn compute_achievement(
    baseline: Option<Decimal>,
    current: Option<Decimal>,
    target: Option<Decimal>,
    direction: Direction,
    override_formula: Option<&str>,
    config: &EngineConfig,
) -> Option<Decimal> {
    if let Some(formula) = override_formula {
        let mut env = VariableEnv::new();
        env.set_var("baselineValue", baseline.unwrap_or(Decimal::ZERO));
        env.set_var("currentValue", current.unwrap_or(Decimal::ZERO));
        env.set_var("targetValue", target.unwrap_or(Decimal::ZERO));

        return match interp::evaluate(formula, &env, config) {
            Ok(n) => Some(clamp(n, config.achievement_cap)),
            Err(err) => {
                warn!(error = %err, "achievement override formula failed");
                None
            }
        };
    }

    let baseline = baseline?;
    let current = current?;
    let target = target?;
    if target == baseline {
        return None;
    }

    let (numerator, denominator) = match direction {
        Direction::IncreaseIsGood => (
            current.checked_sub(baseline)?,
            target.checked_sub(baseline)?,
        ),
        Direction::DecreaseIsGood => (
            baseline.checked_sub(current)?,
            baseline.checked_sub(target)?,
        ),
    };

    let ratio = numerator.checked_div(denominator)?;
    let percentage = ratio.checked_mul(Decimal::ONE_HUNDRED)?;
    Some(clamp(percentage, config.achievement_cap))
}

fn clamp(value: Decimal, cap: Decimal) -> Decimal {
    value.max(Decimal::ZERO).min(cap)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
