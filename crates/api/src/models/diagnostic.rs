use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Syntax,
    Semantic,
    Type,
    Warning,
}

impl Severity {
    /// Everything except warnings counts against a successful compilation.
    pub fn is_error(&self) -> bool {
        !matches!(self, Severity::Warning)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Syntax => "syntax",
            Severity::Semantic => "semantic",
            Severity::Type => "type",
            Severity::Warning => "warning",
        };
        f.write_str(s)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Diagnostic {
    pub message: String,
    pub line: u32,
    pub column: u32,
    pub source: String,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        message: impl Into<String>,
        line: u32,
        column: u32,
        source: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            line: line.max(1),
            column: column.max(1),
            source: source.into(),
            severity,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: [{}] {}",
            self.source, self.line, self.column, self.severity, self.message
        )
    }
}
