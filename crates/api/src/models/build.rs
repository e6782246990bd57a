use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BuildSystemKind {
    Gradle,
    Maven,
    #[default]
    None,
}

impl fmt::Display for BuildSystemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildSystemKind::Gradle => write!(f, "gradle"),
            BuildSystemKind::Maven => write!(f, "maven"),
            BuildSystemKind::None => write!(f, "none"),
        }
    }
}
