//! Runtime value types and the engine error taxonomy.
//!
//! These types are DISTINCT from compass-core AST types: the interpreter
//! consumes the parsed AST and produces runtime values. All numerics use
//! `rust_decimal::Decimal` -- never `f64` in the evaluation path.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Errors that can occur during computation or access resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A formula source was empty or whitespace-only.
    EmptyFormula,
    /// Lexing, parsing, or runtime evaluation of a formula failed.
    FormulaEvaluationFailed { detail: String },
    /// A formula evaluated successfully but did not yield a number.
    InvalidFormulaResult { got: String },
    /// Cross-entity formula references form a cycle. The path lists the
    /// entity keys along the cycle, ending where it closes.
    CyclicDependency { path: Vec<String> },
    /// An access query arrived without an organization scope. This is a
    /// programming error upstream, not a business condition.
    MissingOrgScope,
    /// A capability check failed for the given user.
    Unauthorized { user_id: String },
    /// The interpreter exceeded its operation budget.
    OpBudgetExhausted { budget: u32 },
    /// Error from the backing store.
    Storage { message: String },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::EmptyFormula => {
                write!(f, "formula source is empty")
            }
            EngineError::FormulaEvaluationFailed { detail } => {
                write!(f, "formula evaluation failed: {}", detail)
            }
            EngineError::InvalidFormulaResult { got } => {
                write!(f, "formula did not produce a number, got {}", got)
            }
            EngineError::CyclicDependency { path } => {
                write!(f, "cyclic formula dependency: {}", path.join(" -> "))
            }
            EngineError::MissingOrgScope => {
                write!(f, "missing organization scope")
            }
            EngineError::Unauthorized { user_id } => {
                write!(f, "user {} is not authorized", user_id)
            }
            EngineError::OpBudgetExhausted { budget } => {
                write!(f, "formula exceeded the operation budget of {}", budget)
            }
            EngineError::Storage { message } => {
                write!(f, "storage error: {}", message)
            }
        }
    }
}

impl std::error::Error for EngineError {}

impl From<compass_storage::StorageError> for EngineError {
    fn from(err: compass_storage::StorageError) -> Self {
        EngineError::Storage {
            message: err.to_string(),
        }
    }
}

// ──────────────────────────────────────────────
// Runtime values
// ──────────────────────────────────────────────

/// A value produced while evaluating a formula expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Number(Decimal),
    Bool(bool),
}

impl Value {
    /// Returns a human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "Number",
            Value::Bool(_) => "Bool",
        }
    }

    /// Extracts a number or returns an evaluation error.
    pub fn as_number(&self) -> Result<Decimal, EngineError> {
        match self {
            Value::Number(n) => Ok(*n),
            other => Err(EngineError::FormulaEvaluationFailed {
                detail: format!("expected a number, got {}", other.type_name()),
            }),
        }
    }

    /// Extracts a boolean or returns an evaluation error.
    pub fn as_bool(&self) -> Result<bool, EngineError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(EngineError::FormulaEvaluationFailed {
                detail: format!("expected a boolean, got {}", other.type_name()),
            }),
        }
    }
}

// ──────────────────────────────────────────────
// Variable environment
// ──────────────────────────────────────────────

/// The named-variable environment a formula evaluates against: local
/// variable bindings plus the resolved values of referenced entities.
///
/// The interpreter sees nothing beyond this environment and the helper
/// functions -- formulas cannot reach ambient state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableEnv {
    vars: BTreeMap<String, Decimal>,
    entity_values: BTreeMap<String, Decimal>,
}

impl VariableEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: Decimal) {
        self.vars.insert(name.into(), value);
    }

    pub fn set_entity_value(&mut self, key: impl Into<String>, value: Decimal) {
        self.entity_values.insert(key.into(), value);
    }

    pub fn var(&self, name: &str) -> Option<Decimal> {
        self.vars.get(name).copied()
    }

    pub fn entity_value(&self, key: &str) -> Option<Decimal> {
        self.entity_values.get(key).copied()
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_accessors() {
        assert_eq!(
            Value::Number(Decimal::from(5)).as_number().unwrap(),
            Decimal::from(5)
        );
        assert!(Value::Bool(true).as_bool().unwrap());
        assert!(Value::Bool(true).as_number().is_err());
        assert!(Value::Number(Decimal::ZERO).as_bool().is_err());
    }

    #[test]
    fn env_keeps_variables_and_entity_values_apart() {
        let mut env = VariableEnv::new();
        env.set_var("x", Decimal::from(1));
        env.set_entity_value("x", Decimal::from(2));
        assert_eq!(env.var("x"), Some(Decimal::from(1)));
        assert_eq!(env.entity_value("x"), Some(Decimal::from(2)));
        assert_eq!(env.var("missing"), None);
    }

    #[test]
    fn error_display() {
        let err = EngineError::CyclicDependency {
            path: vec!["K1".into(), "K2".into(), "K1".into()],
        };
        assert_eq!(err.to_string(), "cyclic formula dependency: K1 -> K2 -> K1");
    }
}
