//! Source positions carried through the resolved tree into diagnostics.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A line/column position in a source file (both 1-based, 0 when synthesized).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    #[serde(default)]
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// A position for code the generator makes up, such as implicit returns.
    pub fn synthesized() -> Self {
        Self::default()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
