use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Compilation phases in execution order.
#[derive(
    Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Initialization,
    Parse,
    ImportResolution,
    SemanticAnalysis,
    Canonicalization,
    InstructionSelection,
    ClassGeneration,
    Output,
    Finalization,
}

impl Phase {
    pub const ALL: [Phase; 9] = [
        Phase::Initialization,
        Phase::Parse,
        Phase::ImportResolution,
        Phase::SemanticAnalysis,
        Phase::Canonicalization,
        Phase::InstructionSelection,
        Phase::ClassGeneration,
        Phase::Output,
        Phase::Finalization,
    ];

    pub fn next(self) -> Option<Phase> {
        let idx = Self::ALL.iter().position(|p| *p == self)?;
        Self::ALL.get(idx + 1).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Initialization => "initialization",
            Phase::Parse => "parse",
            Phase::ImportResolution => "import_resolution",
            Phase::SemanticAnalysis => "semantic_analysis",
            Phase::Canonicalization => "canonicalization",
            Phase::InstructionSelection => "instruction_selection",
            Phase::ClassGeneration => "class_generation",
            Phase::Output => "output",
            Phase::Finalization => "finalization",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = crate::ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .iter()
            .find(|p| p.as_str() == normalized)
            .copied()
            .ok_or_else(|| crate::ApiError::InvalidArgument(format!("unknown phase '{s}'")))
    }
}
