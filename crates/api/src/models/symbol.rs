use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Class,
    Interface,
    Trait,
    Enum,
    EnumConstant,
    Annotation,
    Method,
    Constructor,
    Field,
    Property,
    Closure,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Trait => "trait",
            SymbolKind::Enum => "enum",
            SymbolKind::EnumConstant => "enum_constant",
            SymbolKind::Annotation => "annotation",
            SymbolKind::Method => "method",
            SymbolKind::Constructor => "constructor",
            SymbolKind::Field => "field",
            SymbolKind::Property => "property",
            SymbolKind::Closure => "closure",
        }
    }

    /// Kinds that declare a type usable in a type reference.
    pub fn is_type(&self) -> bool {
        matches!(
            self,
            SymbolKind::Class
                | SymbolKind::Interface
                | SymbolKind::Trait
                | SymbolKind::Enum
                | SymbolKind::Annotation
        )
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SymbolOrigin {
    /// Declared in a source file of the workspace.
    Workspace,
    /// Read from a compiled library archive or class directory.
    Archive,
}

/// 1-based position of a declaration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location {
    pub path: PathBuf,
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(path: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Self {
            path: path.into(),
            line: line.max(1),
            column: column.max(1),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolRecord {
    pub qualified_name: String,
    pub kind: SymbolKind,
    pub location: Location,
    pub origin: SymbolOrigin,
}

impl SymbolRecord {
    pub fn new(
        qualified_name: impl Into<String>,
        kind: SymbolKind,
        location: Location,
        origin: SymbolOrigin,
    ) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            kind,
            location,
            origin,
        }
    }

    /// Last segment of the qualified name, ignoring package and outer types.
    pub fn simple_name(&self) -> &str {
        self.qualified_name
            .rsplit(['.', '$'])
            .next()
            .unwrap_or(&self.qualified_name)
    }

    /// File or archive this record was extracted from.
    pub fn origin_path(&self) -> &Path {
        &self.location.path
    }

    pub fn key(&self) -> SymbolKey {
        SymbolKey(format!(
            "{}\0{}\0{}\0{}\0{}",
            self.qualified_name,
            self.kind.as_str(),
            self.location.path.display(),
            self.location.line,
            self.location.column
        ))
    }
}

/// Unique, totally ordered identity of a record inside the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolKey(String);

impl SymbolKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_name_handles_nested_types() {
        let record = SymbolRecord::new(
            "com.acme.Outer$Inner",
            SymbolKind::Class,
            Location::new("/ws/Outer.groovy", 3, 5),
            SymbolOrigin::Workspace,
        );
        assert_eq!(record.simple_name(), "Inner");
    }

    #[test]
    fn test_location_clamps_to_one() {
        let loc = Location::new("a.groovy", 0, 0);
        assert_eq!((loc.line, loc.column), (1, 1));
    }

    #[test]
    fn test_key_orders_by_name_first() {
        let a = SymbolRecord::new(
            "a.B",
            SymbolKind::Method,
            Location::new("/z.groovy", 9, 1),
            SymbolOrigin::Workspace,
        );
        let b = SymbolRecord::new(
            "a.C",
            SymbolKind::Class,
            Location::new("/a.groovy", 1, 1),
            SymbolOrigin::Workspace,
        );
        assert!(a.key() < b.key());
    }
}
