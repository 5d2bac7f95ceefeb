//! Formula interpreter.
//!
//! Tree-walking evaluation of a parsed formula against a [`VariableEnv`],
//! with short-circuit logical operators, checked decimal arithmetic, and
//! the fixed helper set {abs, sum, avg, min, max}. Every AST node visited
//! charges one unit against the operation budget, so a formula can never
//! run unbounded.
//!
//! The public contract ([`evaluate`]) is the one both entity value
//! formulas and achievement-override formulas are held to: an empty
//! source fails with `EmptyFormula`, any lex/parse/runtime failure with
//! `FormulaEvaluationFailed`, and a successful evaluation that does not
//! yield a number with `InvalidFormulaResult`.

use std::str::FromStr;

use compass_core::{parse, BinaryOp, Expr, HelperFn, UnaryOp};
use rust_decimal::Decimal;

use crate::config::EngineConfig;
use crate::types::{EngineError, Value, VariableEnv};

/// Evaluate a formula source against an environment.
///
/// # Arguments
/// * `source` - formula source text (with or without a leading `return`)
/// * `env` - variable bindings and resolved entity values
/// * `config` - carries the operation budget
///
/// # Returns
/// The finite numeric result, or an `EngineError` per the contract above.
pub fn evaluate(
    source: &str,
    env: &VariableEnv,
    config: &EngineConfig,
) -> Result<Decimal, EngineError> {
    if source.trim().is_empty() {
        return Err(EngineError::EmptyFormula);
    }

    let formula = parse(source).map_err(|e| EngineError::FormulaEvaluationFailed {
        detail: e.to_string(),
    })?;

    let mut budget = OpBudget {
        remaining: config.max_eval_ops,
        limit: config.max_eval_ops,
    };
    let value = eval_expr(&formula.body, env, &mut budget)?;

    match value {
        Value::Number(n) => Ok(n),
        other => Err(EngineError::InvalidFormulaResult {
            got: other.type_name().to_string(),
        }),
    }
}

struct OpBudget {
    remaining: u32,
    limit: u32,
}

impl OpBudget {
    fn charge(&mut self) -> Result<(), EngineError> {
        if self.remaining == 0 {
            return Err(EngineError::OpBudgetExhausted { budget: self.limit });
        }
        self.remaining -= 1;
        Ok(())
    }
}

fn eval_expr(expr: &Expr, env: &VariableEnv, budget: &mut OpBudget) -> Result<Value, EngineError> {
    budget.charge()?;

    match expr {
        Expr::Number(text) => {
            let n = Decimal::from_str(text).map_err(|_| EngineError::FormulaEvaluationFailed {
                detail: format!("invalid number literal '{}'", text),
            })?;
            Ok(Value::Number(n))
        }

        Expr::Bool(b) => Ok(Value::Bool(*b)),

        Expr::Ident(name) => {
            env.var(name)
                .map(Value::Number)
                .ok_or_else(|| EngineError::FormulaEvaluationFailed {
                    detail: format!("unknown variable '{}'", name),
                })
        }

        Expr::EntityRef(key) => {
            env.entity_value(key)
                .map(Value::Number)
                .ok_or_else(|| EngineError::FormulaEvaluationFailed {
                    detail: format!("entity '{}' has no value for this period", key),
                })
        }

        Expr::Call { func, args } => eval_call(*func, args, env, budget),

        Expr::Unary { op, operand } => {
            let val = eval_expr(operand, env, budget)?;
            match op {
                UnaryOp::Neg => Ok(Value::Number(-val.as_number()?)),
                UnaryOp::Not => Ok(Value::Bool(!val.as_bool()?)),
            }
        }

        Expr::Binary { op, left, right } => match op {
            BinaryOp::And => {
                let left_bool = eval_expr(left, env, budget)?.as_bool()?;
                if !left_bool {
                    // Short-circuit: left is false, skip right
                    return Ok(Value::Bool(false));
                }
                let right_bool = eval_expr(right, env, budget)?.as_bool()?;
                Ok(Value::Bool(right_bool))
            }
            BinaryOp::Or => {
                let left_bool = eval_expr(left, env, budget)?.as_bool()?;
                if left_bool {
                    // Short-circuit: left is true, skip right
                    return Ok(Value::Bool(true));
                }
                let right_bool = eval_expr(right, env, budget)?.as_bool()?;
                Ok(Value::Bool(right_bool))
            }
            _ => {
                let left_val = eval_expr(left, env, budget)?;
                let right_val = eval_expr(right, env, budget)?;
                eval_binary(*op, &left_val, &right_val)
            }
        },
    }
}

fn eval_binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, EngineError> {
    match op {
        BinaryOp::Add => arith(left, right, "+", Decimal::checked_add),
        BinaryOp::Sub => arith(left, right, "-", Decimal::checked_sub),
        BinaryOp::Mul => arith(left, right, "*", Decimal::checked_mul),
        BinaryOp::Div => {
            let divisor = right.as_number()?;
            if divisor.is_zero() {
                return Err(EngineError::FormulaEvaluationFailed {
                    detail: "division by zero".to_string(),
                });
            }
            arith(left, right, "/", Decimal::checked_div)
        }

        BinaryOp::Eq | BinaryOp::Ne => {
            let equal = match (left, right) {
                (Value::Number(l), Value::Number(r)) => l == r,
                (Value::Bool(l), Value::Bool(r)) => l == r,
                (l, r) => {
                    return Err(EngineError::FormulaEvaluationFailed {
                        detail: format!(
                            "cannot compare {} with {}",
                            l.type_name(),
                            r.type_name()
                        ),
                    });
                }
            };
            let result = if op == BinaryOp::Eq { equal } else { !equal };
            Ok(Value::Bool(result))
        }

        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let l = left.as_number()?;
            let r = right.as_number()?;
            let result = match op {
                BinaryOp::Lt => l < r,
                BinaryOp::Le => l <= r,
                BinaryOp::Gt => l > r,
                _ => l >= r,
            };
            Ok(Value::Bool(result))
        }

        // And/Or are handled with short-circuiting in eval_expr.
        BinaryOp::And | BinaryOp::Or => Err(EngineError::FormulaEvaluationFailed {
            detail: "logical operator outside expression context".to_string(),
        }),
    }
}

fn arith(
    left: &Value,
    right: &Value,
    symbol: &str,
    op: fn(Decimal, Decimal) -> Option<Decimal>,
) -> Result<Value, EngineError> {
    let l = left.as_number()?;
    let r = right.as_number()?;
    let result = op(l, r).ok_or_else(|| EngineError::FormulaEvaluationFailed {
        detail: format!("arithmetic overflow in '{} {} {}'", l, symbol, r),
    })?;
    Ok(Value::Number(result))
}

fn eval_call(
    func: HelperFn,
    args: &[Expr],
    env: &VariableEnv,
    budget: &mut OpBudget,
) -> Result<Value, EngineError> {
    let mut numbers = Vec::with_capacity(args.len());
    for arg in args {
        numbers.push(eval_expr(arg, env, budget)?.as_number()?);
    }

    // The parser guarantees at least one argument and abs/1 arity.
    let result = match func {
        HelperFn::Abs => numbers[0].abs(),
        HelperFn::Sum => checked_sum(&numbers)?,
        HelperFn::Avg => {
            let total = checked_sum(&numbers)?;
            total
                .checked_div(Decimal::from(numbers.len() as u64))
                .ok_or_else(|| EngineError::FormulaEvaluationFailed {
                    detail: "overflow in avg()".to_string(),
                })?
        }
        HelperFn::Min => numbers.iter().copied().fold(numbers[0], |a, b| a.min(b)),
        HelperFn::Max => numbers.iter().copied().fold(numbers[0], |a, b| a.max(b)),
    };
    Ok(Value::Number(result))
}

fn checked_sum(numbers: &[Decimal]) -> Result<Decimal, EngineError> {
    let mut total = Decimal::ZERO;
    for n in numbers {
        total = total
            .checked_add(*n)
            .ok_or_else(|| EngineError::FormulaEvaluationFailed {
                detail: "arithmetic overflow in sum".to_string(),
            })?;
    }
    Ok(total)
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
