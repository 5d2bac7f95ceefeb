//! Recursive-descent parser for the Compass formula language.
//!
//! Grammar (highest binding last):
//!
//! ```text
//! formula  := "return"? expr ";"? EOF
//! expr     := or
//! or       := and   ( ("||" | "or")  and )*
//! and      := cmp   ( ("&&" | "and") cmp )*
//! cmp      := add   ( ("==" | "!=" | "<" | "<=" | ">" | ">=") add )?
//! add      := mul   ( ("+" | "-") mul )*
//! mul      := unary ( ("*" | "/") unary )*
//! unary    := ("-" | "!" | "not") unary | primary
//! primary  := NUMBER | "true" | "false" | IDENT
//!           | "get" "(" STRING ")"
//!           | HELPER "(" expr ("," expr)* ")"
//!           | "(" expr ")"
//! ```
//!
//! A source with no leading `return` keyword is treated as a single
//! return expression, so `A + B` parses identically to `return A + B;`.

use crate::ast::{BinaryOp, Expr, Formula, HelperFn, UnaryOp};
use crate::error::FormulaError;
use crate::lexer::{lex, Spanned, Token};

/// Parse a formula source into its AST.
pub fn parse(source: &str) -> Result<Formula, FormulaError> {
    let tokens = lex(source)?;
    let mut p = Parser { tokens, pos: 0 };

    // Implicit-return wrapping: a leading `return` is optional.
    if p.peek_word() == Some("return") {
        p.advance();
    }

    let body = p.parse_expr()?;

    if p.peek() == &Token::Semicolon {
        p.advance();
    }
    if p.peek() != &Token::Eof {
        return Err(FormulaError::parse(
            p.line(),
            format!("unexpected trailing input: {}", p.describe_current()),
        ));
    }

    Ok(Formula { body })
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn peek_word(&self) -> Option<&str> {
        match self.peek() {
            Token::Word(w) => Some(w.as_str()),
            _ => None,
        }
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos].line
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), FormulaError> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(FormulaError::parse(
                self.line(),
                format!("expected {}, found {}", what, self.describe_current()),
            ))
        }
    }

    fn describe_current(&self) -> String {
        match self.peek() {
            Token::Word(w) => format!("'{}'", w),
            Token::Str(s) => format!("string \"{}\"", s),
            Token::Number(n) => format!("number {}", n),
            Token::Eof => "end of input".to_string(),
            other => format!("{:?}", other),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, FormulaError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_and()?;
        loop {
            let is_or = self.peek() == &Token::OrOr || self.peek_word() == Some("or");
            if !is_or {
                return Ok(left);
            }
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_and(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_cmp()?;
        loop {
            let is_and = self.peek() == &Token::AndAnd || self.peek_word() == Some("and");
            if !is_and {
                return Ok(left);
            }
            self.advance();
            let right = self.parse_cmp()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_cmp(&mut self) -> Result<Expr, FormulaError> {
        let left = self.parse_add()?;
        let op = match self.peek() {
            Token::EqEq => BinaryOp::Eq,
            Token::Neq => BinaryOp::Ne,
            Token::Lt => BinaryOp::Lt,
            Token::Lte => BinaryOp::Le,
            Token::Gt => BinaryOp::Gt,
            Token::Gte => BinaryOp::Ge,
            _ => return Ok(left),
        };
        self.advance();
        // Comparison is non-associative: `a < b < c` is a parse error.
        let right = self.parse_add()?;
        Ok(Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_add(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_mul()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_mul(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, FormulaError> {
        if self.peek() == &Token::Minus {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        if self.peek() == &Token::Bang || self.peek_word() == Some("not") {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, FormulaError> {
        match self.peek().clone() {
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::Word(w) => match w.as_str() {
                "true" => {
                    self.advance();
                    Ok(Expr::Bool(true))
                }
                "false" => {
                    self.advance();
                    Ok(Expr::Bool(false))
                }
                "get" => {
                    self.advance();
                    self.expect(&Token::LParen, "'(' after get")?;
                    let key = match self.peek().clone() {
                        Token::Str(key) => {
                            self.advance();
                            key
                        }
                        _ => {
                            return Err(FormulaError::parse(
                                self.line(),
                                format!(
                                    "get() takes a quoted entity key, found {}",
                                    self.describe_current()
                                ),
                            ));
                        }
                    };
                    self.expect(&Token::RParen, "')' after entity key")?;
                    Ok(Expr::EntityRef(key))
                }
                "return" => Err(FormulaError::parse(
                    self.line(),
                    "'return' is only allowed at the start of a formula",
                )),
                name => {
                    if let Some(func) = HelperFn::from_name(name) {
                        // Only a call position makes a helper; a bare helper
                        // name is reserved and cannot be a variable.
                        self.advance();
                        self.expect(&Token::LParen, &format!("'(' after {}", func.name()))?;
                        let args = self.parse_args(func)?;
                        return Ok(Expr::Call { func, args });
                    }
                    self.advance();
                    // An identifier followed by '(' is an unknown function,
                    // not a variable reference.
                    if self.peek() == &Token::LParen {
                        return Err(FormulaError::parse(
                            self.line(),
                            format!("unknown function '{}'", name),
                        ));
                    }
                    Ok(Expr::Ident(name.to_string()))
                }
            },
            Token::Eof => Err(FormulaError::parse(self.line(), "unexpected end of input")),
            _ => Err(FormulaError::parse(
                self.line(),
                format!("unexpected {}", self.describe_current()),
            )),
        }
    }

    fn parse_args(&mut self, func: HelperFn) -> Result<Vec<Expr>, FormulaError> {
        let line = self.line();
        let mut args = Vec::new();
        if self.peek() == &Token::RParen {
            self.advance();
        } else {
            loop {
                args.push(self.parse_expr()?);
                match self.peek() {
                    Token::Comma => {
                        self.advance();
                    }
                    Token::RParen => {
                        self.advance();
                        break;
                    }
                    _ => {
                        return Err(FormulaError::parse(
                            self.line(),
                            format!("expected ',' or ')', found {}", self.describe_current()),
                        ));
                    }
                }
            }
        }
        if args.is_empty() {
            return Err(FormulaError::parse(
                line,
                format!("{}() requires at least one argument", func.name()),
            ));
        }
        if func == HelperFn::Abs && args.len() != 1 {
            return Err(FormulaError::parse(
                line,
                format!("abs() takes exactly one argument, got {}", args.len()),
            ));
        }
        Ok(args)
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn implicit_return_wraps_bare_expression() {
        let implicit = parse("A + B").unwrap();
        let explicit = parse("return (A + B);").unwrap();
        assert_eq!(implicit, explicit);
    }

    #[test]
    fn precedence_mul_binds_tighter_than_add() {
        let f = parse("large_contracts * 2 + small_contracts").unwrap();
        match f.body {
            Expr::Binary {
                op: BinaryOp::Add,
                left,
                ..
            } => match *left {
                Expr::Binary {
                    op: BinaryOp::Mul, ..
                } => {}
                other => panic!("expected Mul on the left, got {:?}", other),
            },
            other => panic!("expected Add at the root, got {:?}", other),
        }
    }

    #[test]
    fn parses_entity_ref() {
        let f = parse("get(\"OBJ_REVENUE\") + get('OBJ_MARKET')").unwrap();
        match f.body {
            Expr::Binary { left, right, .. } => {
                assert_eq!(*left, Expr::EntityRef("OBJ_REVENUE".into()));
                assert_eq!(*right, Expr::EntityRef("OBJ_MARKET".into()));
            }
            other => panic!("expected Binary, got {:?}", other),
        }
    }

    #[test]
    fn parses_helper_calls() {
        let f = parse("avg(a, b, c) + abs(-x)").unwrap();
        match f.body {
            Expr::Binary { left, .. } => match *left {
                Expr::Call {
                    func: HelperFn::Avg,
                    ref args,
                } => assert_eq!(args.len(), 3),
                other => panic!("expected avg call, got {:?}", other),
            },
            other => panic!("expected Binary, got {:?}", other),
        }
    }

    #[test]
    fn word_operators_are_aliases() {
        assert_eq!(parse("a and b or not c").unwrap(), parse("a && b || !c").unwrap());
    }

    #[test]
    fn comparison_is_non_associative() {
        assert!(parse("a < b < c").is_err());
    }

    #[test]
    fn rejects_unknown_function() {
        let err = parse("eval(1)").unwrap_err();
        assert!(err.message.contains("unknown function"));
    }

    #[test]
    fn rejects_get_with_bare_identifier() {
        assert!(parse("get(OBJ_REVENUE)").is_err());
    }

    #[test]
    fn rejects_empty_helper_arguments() {
        assert!(parse("sum()").is_err());
        assert!(parse("abs(1, 2)").is_err());
    }

    #[test]
    fn rejects_trailing_tokens() {
        assert!(parse("a + b c").is_err());
    }

    #[test]
    fn helper_names_are_reserved() {
        // `sum` outside call position is not a variable
        assert!(parse("sum + 1").is_err());
    }
}
