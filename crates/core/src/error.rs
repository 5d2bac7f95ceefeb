use serde::{Deserialize, Serialize};

/// A formula lexing or parsing error, with the 1-based source line it
/// occurred on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormulaError {
    pub line: u32,
    pub message: String,
}

impl FormulaError {
    pub fn new(line: u32, message: impl Into<String>) -> Self {
        FormulaError {
            line,
            message: message.into(),
        }
    }

    pub fn lex(line: u32, message: impl Into<String>) -> Self {
        FormulaError::new(line, message)
    }

    pub fn parse(line: u32, message: impl Into<String>) -> Self {
        FormulaError::new(line, message)
    }
}

impl std::fmt::Display for FormulaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for FormulaError {}
