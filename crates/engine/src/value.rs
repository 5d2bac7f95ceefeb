//! Entity value calculation.
//!
//! Produces the final value for one entity in one period window. Entities
//! without a formula track their manually entered value; entities with a
//! formula evaluate it over their period variables and the final values
//! of the entities they reference, resolved recursively for the same
//! window.
//!
//! The traversal memoizes resolved final values so shared dependencies
//! are computed once, and marks in-progress entities so a reference cycle
//! is detected and reported instead of recursing unboundedly. A cycle is
//! a configuration error: the computation for that subtree aborts, and no
//! plausible-looking default is substituted.
//!
//! A formula that fails to evaluate never propagates past this module:
//! the entity simply has no calculated value this period, the failure is
//! logged, and unrelated entities are unaffected.

use std::collections::BTreeMap;

use compass_core::extract_deps;
use compass_storage::{EntityRecord, EntityValuePeriodRecord, EntityVariableRecord};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::interp;
use crate::types::{EngineError, VariableEnv};

// ──────────────────────────────────────────────
// Period data set
// ──────────────────────────────────────────────

/// Everything known about one entity for one period window.
#[derive(Debug, Clone)]
pub struct EntityData {
    pub record: EntityRecord,
    pub variables: Vec<EntityVariableRecord>,
    pub period_row: Option<EntityValuePeriodRecord>,
    /// Entered variable values for this period, keyed by variable code.
    pub variable_values: BTreeMap<String, Decimal>,
}

/// The assembled inputs for value computation over one window: all live
/// entities of the organization, keyed by their cross-reference key.
#[derive(Debug, Clone, Default)]
pub struct PeriodDataSet {
    pub entities: BTreeMap<String, EntityData>,
}

impl PeriodDataSet {
    pub fn insert(&mut self, data: EntityData) {
        self.entities.insert(data.record.key.clone(), data);
    }
}

// ──────────────────────────────────────────────
// Outcome
// ──────────────────────────────────────────────

/// Result of computing one entity's value for one period.
///
/// `error` carries the swallowed failure (evaluation error or dependency
/// cycle) for operator display; it is never raised to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueOutcome {
    pub calculated_value: Option<Decimal>,
    pub final_value: Option<Decimal>,
    pub error: Option<EngineError>,
}

struct CalcResult {
    calculated: Option<Decimal>,
    final_value: Option<Decimal>,
    error: Option<EngineError>,
}

// ──────────────────────────────────────────────
// Computation
// ──────────────────────────────────────────────

/// Compute the value of the entity with the given key.
pub fn compute_value(data: &PeriodDataSet, key: &str, config: &EngineConfig) -> ValueOutcome {
    let mut memo = BTreeMap::new();
    compute_with_memo(data, key, config, &mut memo)
}

/// Compute every entity in the data set, sharing the memo so common
/// dependencies are resolved once across the whole listing.
pub fn compute_all(
    data: &PeriodDataSet,
    config: &EngineConfig,
) -> BTreeMap<String, ValueOutcome> {
    let mut memo = BTreeMap::new();
    data.entities
        .keys()
        .map(|key| {
            let outcome = compute_with_memo(data, key, config, &mut memo);
            (key.clone(), outcome)
        })
        .collect()
}

fn compute_with_memo(
    data: &PeriodDataSet,
    key: &str,
    config: &EngineConfig,
    memo: &mut BTreeMap<String, Option<Decimal>>,
) -> ValueOutcome {
    let Some(entity) = data.entities.get(key) else {
        return ValueOutcome {
            calculated_value: None,
            final_value: None,
            error: None,
        };
    };

    let mut stack = vec![key.to_string()];
    let result = compute_entity(data, entity, config, memo, &mut stack);
    stack.pop();

    match result {
        Ok(calc) => {
            memo.insert(key.to_string(), calc.final_value);
            ValueOutcome {
                calculated_value: calc.calculated,
                final_value: calc.final_value,
                error: calc.error,
            }
        }
        Err(err) => {
            // Cyclic configuration: abort this subtree, keep whatever was
            // entered manually or overridden, surface the error.
            warn!(entity_key = %key, error = %err, "aborting value computation");
            let row = entity.period_row.as_ref();
            ValueOutcome {
                calculated_value: None,
                final_value: row
                    .and_then(|r| r.final_value)
                    .or_else(|| row.and_then(|r| r.actual_value)),
                error: Some(err),
            }
        }
    }
}

/// Resolve the final value of a referenced entity, memoized. Returns an
/// error only for dependency cycles.
fn resolve_final(
    data: &PeriodDataSet,
    key: &str,
    config: &EngineConfig,
    memo: &mut BTreeMap<String, Option<Decimal>>,
    stack: &mut Vec<String>,
) -> Result<Option<Decimal>, EngineError> {
    if let Some(value) = memo.get(key) {
        debug!(entity_key = %key, "memoized final value");
        return Ok(*value);
    }
    if let Some(position) = stack.iter().position(|k| k == key) {
        let mut path: Vec<String> = stack[position..].to_vec();
        path.push(key.to_string());
        return Err(EngineError::CyclicDependency { path });
    }

    let Some(entity) = data.entities.get(key) else {
        // Reference to an entity with no data this period: no value, which
        // the referencing formula reports as its own evaluation failure.
        memo.insert(key.to_string(), None);
        return Ok(None);
    };

    stack.push(key.to_string());
    let result = compute_entity(data, entity, config, memo, stack);
    stack.pop();

    let calc = result?;
    memo.insert(key.to_string(), calc.final_value);
    Ok(calc.final_value)
}

fn compute_entity(
    data: &PeriodDataSet,
    entity: &EntityData,
    config: &EngineConfig,
    memo: &mut BTreeMap<String, Option<Decimal>>,
    stack: &mut Vec<String>,
) -> Result<CalcResult, EngineError> {
    let row = entity.period_row.as_ref();
    let actual = row.and_then(|r| r.actual_value);
    let stored_final = row.and_then(|r| r.final_value);

    let Some(source) = entity.record.formula.as_deref() else {
        // Manual tracking: no computation occurs.
        return Ok(CalcResult {
            calculated: None,
            final_value: stored_final.or(actual),
            error: None,
        });
    };

    let deps = extract_deps(source);
    let mut env = VariableEnv::new();

    for dep_key in &deps.entity_keys {
        if let Some(value) = resolve_final(data, dep_key, config, memo, stack)? {
            env.set_entity_value(dep_key.clone(), value);
        }
    }
    for name in &deps.variables {
        env.set_var(name.clone(), variable_value(entity, name));
    }

    match interp::evaluate(source, &env, config) {
        Ok(n) => {
            let calculated = Some(n);
            Ok(CalcResult {
                calculated,
                final_value: stored_final.or(calculated).or(actual),
                error: None,
            })
        }
        Err(err) => {
            warn!(
                entity_key = %entity.record.key,
                error = %err,
                "formula failed; no calculated value this period"
            );
            Ok(CalcResult {
                calculated: None,
                final_value: stored_final.or(actual),
                error: Some(err),
            })
        }
    }
}

/// A variable reads, in order: the value entered for this period, the
/// fixed value of a static variable, and finally 0 -- partial data entry
/// must stay usable in drafts.
fn variable_value(entity: &EntityData, name: &str) -> Decimal {
    if let Some(value) = entity.variable_values.get(name) {
        return *value;
    }
    entity
        .variables
        .iter()
        .find(|v| v.code == name && v.is_static)
        .and_then(|v| v.static_value)
        .unwrap_or(Decimal::ZERO)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use compass_storage::{Direction, ValueStatus};
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn entity(key: &str, formula: Option<&str>) -> EntityData {
        EntityData {
            record: EntityRecord {
                id: format!("id-{}", key),
                org_id: "org".into(),
                key: key.into(),
                title: key.into(),
                node_id: None,
                period_type: Some(compass_storage::PeriodType::Monthly),
                formula: formula.map(str::to_owned),
                achievement_formula: None,
                direction: Direction::IncreaseIsGood,
                baseline_value: None,
                target_value: None,
                deleted: false,
            },
            variables: Vec::new(),
            period_row: None,
            variable_values: BTreeMap::new(),
        }
    }

    fn row(actual: Option<&str>, final_value: Option<&str>) -> EntityValuePeriodRecord {
        EntityValuePeriodRecord {
            id: "vp".into(),
            entity_id: "id".into(),
            period_start: "2026-03-01T00:00:00Z".into(),
            period_end: "2026-03-31T23:59:59Z".into(),
            actual_value: actual.map(dec),
            calculated_value: None,
            final_value: final_value.map(dec),
            achievement_value: None,
            status: ValueStatus::Draft,
        }
    }

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    #[test]
    fn manual_entity_uses_actual_value() {
        let mut data = PeriodDataSet::default();
        let mut e = entity("K1", None);
        e.period_row = Some(row(Some("42"), None));
        data.insert(e);

        let outcome = compute_value(&data, "K1", &config());
        assert_eq!(outcome.calculated_value, None);
        assert_eq!(outcome.final_value, Some(dec("42")));
        assert_eq!(outcome.error, None);
    }

    #[test]
    fn formula_over_variables() {
        let mut data = PeriodDataSet::default();
        let mut e = entity("K1", Some("large_contracts * 2 + small_contracts"));
        e.variable_values.insert("large_contracts".into(), dec("10"));
        e.variable_values.insert("small_contracts".into(), dec("5"));
        data.insert(e);

        let outcome = compute_value(&data, "K1", &config());
        assert_eq!(outcome.calculated_value, Some(dec("25")));
        assert_eq!(outcome.final_value, Some(dec("25")));
    }

    #[test]
    fn unresolved_variables_default_to_zero() {
        let mut data = PeriodDataSet::default();
        let mut e = entity("K1", Some("entered + missing"));
        e.variable_values.insert("entered".into(), dec("9"));
        data.insert(e);

        let outcome = compute_value(&data, "K1", &config());
        assert_eq!(outcome.calculated_value, Some(dec("9")));
    }

    #[test]
    fn static_variables_read_their_fixed_value() {
        let mut data = PeriodDataSet::default();
        let mut e = entity("K1", Some("head_count * factor"));
        e.variables.push(EntityVariableRecord {
            id: "v1".into(),
            entity_id: "id-K1".into(),
            code: "factor".into(),
            display_name: "Factor".into(),
            data_type: compass_storage::VariableDataType::Number,
            is_required: true,
            is_static: true,
            static_value: Some(dec("3")),
        });
        e.variable_values.insert("head_count".into(), dec("7"));
        data.insert(e);

        let outcome = compute_value(&data, "K1", &config());
        assert_eq!(outcome.calculated_value, Some(dec("21")));
    }

    #[test]
    fn cross_entity_references_resolve_recursively() {
        let mut data = PeriodDataSet::default();
        let mut leaf = entity("LEAF", None);
        leaf.period_row = Some(row(Some("100"), None));
        data.insert(leaf);
        let mut mid = entity("MID", Some("get(\"LEAF\") / 2"));
        mid.period_row = None;
        data.insert(mid);
        data.insert(entity("TOP", Some("get(\"MID\") + get(\"LEAF\")")));

        let outcome = compute_value(&data, "TOP", &config());
        assert_eq!(outcome.calculated_value, Some(dec("150")));
    }

    #[test]
    fn stored_final_override_wins_over_calculated() {
        let mut data = PeriodDataSet::default();
        let mut e = entity("K1", Some("1 + 1"));
        e.period_row = Some(row(None, Some("99")));
        data.insert(e);

        let outcome = compute_value(&data, "K1", &config());
        assert_eq!(outcome.calculated_value, Some(dec("2")));
        assert_eq!(outcome.final_value, Some(dec("99")));
    }

    #[test]
    fn cycle_is_reported_and_aborts_the_subtree() {
        let mut data = PeriodDataSet::default();
        data.insert(entity("K1", Some("get(\"K2\") + 1")));
        data.insert(entity("K2", Some("get(\"K1\") + 1")));

        let outcome = compute_value(&data, "K1", &config());
        assert_eq!(outcome.calculated_value, None);
        match outcome.error {
            Some(EngineError::CyclicDependency { path }) => {
                assert_eq!(path, vec!["K1", "K2", "K1"]);
            }
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let mut data = PeriodDataSet::default();
        data.insert(entity("K1", Some("get(\"K1\") * 2")));
        let outcome = compute_value(&data, "K1", &config());
        assert!(matches!(
            outcome.error,
            Some(EngineError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn malformed_formula_does_not_block_unrelated_entities() {
        let mut data = PeriodDataSet::default();
        data.insert(entity("BAD", Some("1 +")));
        let mut good = entity("GOOD", Some("2 * 3"));
        good.period_row = None;
        data.insert(good);

        let outcomes = compute_all(&data, &config());
        assert!(outcomes["BAD"].error.is_some());
        assert_eq!(outcomes["BAD"].calculated_value, None);
        assert_eq!(outcomes["GOOD"].calculated_value, Some(dec("6")));
        assert_eq!(outcomes["GOOD"].error, None);
    }

    #[test]
    fn reference_to_valueless_entity_fails_only_the_referencer() {
        let mut data = PeriodDataSet::default();
        data.insert(entity("EMPTY", None)); // no row, no value
        data.insert(entity("REF", Some("get(\"EMPTY\") * 2")));

        let outcome = compute_value(&data, "REF", &config());
        assert_eq!(outcome.calculated_value, None);
        assert!(matches!(
            outcome.error,
            Some(EngineError::FormulaEvaluationFailed { .. })
        ));
    }

    #[test]
    fn computation_is_deterministic() {
        let mut data = PeriodDataSet::default();
        let mut e = entity("K1", Some("a / b * 100"));
        e.variable_values.insert("a".into(), dec("1"));
        e.variable_values.insert("b".into(), dec("3"));
        data.insert(e);

        let first = compute_value(&data, "K1", &config());
        for _ in 0..5 {
            assert_eq!(compute_value(&data, "K1", &config()), first);
        }
    }

    #[test]
    fn shared_dependency_is_resolved_once_via_memo() {
        // DIAMOND: TOP -> (A, B) -> SHARED. With a shared memo the whole
        // set resolves without recomputing SHARED per branch; the assertion
        // is on the values, the memo keeps it O(entities).
        let mut data = PeriodDataSet::default();
        let mut shared = entity("SHARED", None);
        shared.period_row = Some(row(Some("10"), None));
        data.insert(shared);
        data.insert(entity("A", Some("get(\"SHARED\") + 1")));
        data.insert(entity("B", Some("get(\"SHARED\") + 2")));
        data.insert(entity("TOP", Some("get(\"A\") + get(\"B\")")));

        let outcome = compute_value(&data, "TOP", &config());
        assert_eq!(outcome.calculated_value, Some(dec("23")));
    }
}
