use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which stage of the pipeline detected a problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Start phrase, `BEGIN` or `END` missing, or an empty block.
    Structural,
    /// A character the lexer could not classify.
    Lexical,
    /// Malformed or unresolvable `Formula://` reference.
    Reference,
    /// Malformed assignment, redefinition, or a leftover variable token.
    Variable,
    /// Malformed range list or screening data that could not be resolved.
    Summation,
}

/// How far a run can be trusted. Ordered so escalation is a `max`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Normal,
    Warning,
    Error,
}

/// A problem recorded during a run. The pipeline accumulates these and keeps
/// going; nothing in the pipeline returns one through `Result`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct FormulaError {
    pub kind: ErrorKind,
    /// Pass that recorded the error (0 = locate/clean/lex, 4 = symbol table).
    pub pass: u8,
    pub message: String,
}

impl FormulaError {
    pub fn new(kind: ErrorKind, pass: u8, message: impl Into<String>) -> Self {
        FormulaError {
            kind,
            pass,
            message: message.into(),
        }
    }

    pub fn structural(message: impl Into<String>) -> Self {
        FormulaError::new(ErrorKind::Structural, 0, message)
    }

    pub fn lexical(pass: u8, message: impl Into<String>) -> Self {
        FormulaError::new(ErrorKind::Lexical, pass, message)
    }

    pub fn reference(message: impl Into<String>) -> Self {
        FormulaError::new(ErrorKind::Reference, 1, message)
    }

    pub fn variable(pass: u8, message: impl Into<String>) -> Self {
        FormulaError::new(ErrorKind::Variable, pass, message)
    }

    pub fn summation(message: impl Into<String>) -> Self {
        FormulaError::new(ErrorKind::Summation, 3, message)
    }

    /// Severity this error escalates a run to.
    pub fn severity(&self, relaxed: bool) -> Severity {
        match self.kind {
            ErrorKind::Structural => Severity::Error,
            ErrorKind::Lexical if !relaxed => Severity::Error,
            _ => Severity::Warning,
        }
    }

    /// Serialize with every field present, for the CLI's JSON output.
    pub fn to_json_value(&self) -> serde_json::Value {
        serde_json::json!({
            "kind":    self.kind,
            "message": self.message,
            "pass":    self.pass,
        })
    }
}

/// Errors loading a registry from disk.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid registry JSON in '{}': {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_escalation_by_kind() {
        assert_eq!(
            FormulaError::structural("BEGIN not found.").severity(false),
            Severity::Error
        );
        assert_eq!(FormulaError::lexical(0, "x").severity(false), Severity::Error);
        assert_eq!(FormulaError::lexical(0, "x").severity(true), Severity::Warning);
        assert_eq!(FormulaError::summation("x").severity(false), Severity::Warning);
    }

    #[test]
    fn severity_orders_for_max() {
        assert!(Severity::Normal < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert_eq!(Severity::Warning.max(Severity::Normal), Severity::Warning);
    }

    #[test]
    fn display_is_message() {
        let e = FormulaError::reference("Expected closing paren in Formula reference");
        assert_eq!(e.to_string(), "Expected closing paren in Formula reference");
        assert_eq!(e.to_json_value()["kind"], "reference");
        assert_eq!(e.to_json_value()["pass"], 1);
    }
}
