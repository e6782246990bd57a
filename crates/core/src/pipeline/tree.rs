use groovyscope_api::{DependencyKind, Diagnostic, Phase, Severity};
use groovyscope_groovy::Pos;
use groovyscope_groovy::ast::ModuleNode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// How a type name written in source was bound during import resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resolution {
    /// Declared in the same file.
    Declared,
    /// Bound by an explicit (possibly aliased) import.
    Imported,
    /// Known to exist in the file's own package.
    SamePackage,
    /// One of the packages every Groovy file imports implicitly.
    DefaultImport,
    /// Found in a package imported with `.*`.
    StarImport,
    /// Written fully qualified.
    Qualified,
    /// Not confirmed, but a star import might provide it.
    StarCandidate,
    Unknown,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Resolution::StarCandidate | Resolution::Unknown)
    }
}

/// One type reference bound to the names it may denote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeBinding {
    /// The name as written, without type arguments.
    pub name: String,
    pub pos: Pos,
    pub usage: DependencyKind,
    pub resolution: Resolution,
    /// Qualified names this reference can denote, most likely first.
    pub candidates: Vec<String>,
}

impl TypeBinding {
    pub fn resolved_name(&self) -> Option<&str> {
        if self.resolution.is_resolved() {
            self.candidates.first().map(String::as_str)
        } else {
            None
        }
    }
}

/// A member the compiler adds without it being written in source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticMember {
    /// Qualified owner type, `$`-separated for nested types.
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDescriptor {
    /// Internal owner name, e.g. `com/acme/Foo$Bar`.
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub is_field: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassStub {
    pub internal_name: String,
    pub super_name: String,
    pub interfaces: Vec<String>,
    pub access_flags: u16,
    pub fields: usize,
    pub methods: usize,
}

/// The output of the phases run so far for one source unit.
///
/// Trees are immutable once published. Advancing a phase produces a new
/// tree, so readers never observe a half-updated one.
#[derive(Debug, Clone)]
pub struct CompiledTree {
    pub source_name: String,
    pub source_hash: u64,
    /// Last phase that ran. Its output may be partial when `halted`.
    pub phase: Phase,
    /// Phase the caller asked for.
    pub target: Phase,
    /// The last phase reported errors, so later phases will not run.
    pub halted: bool,
    pub module: Arc<ModuleNode>,
    pub line_count: usize,
    pub diagnostics: Vec<Diagnostic>,
    /// Hash of declared names, supertypes and member signatures.
    pub outline_hash: u64,
    pub bindings: Vec<TypeBinding>,
    pub synthetic: Vec<SyntheticMember>,
    pub descriptors: Vec<MemberDescriptor>,
    pub class_stubs: Vec<ClassStub>,
    pub outputs: Vec<PathBuf>,
    pub fingerprint: Option<u64>,
}

impl CompiledTree {
    pub(crate) fn new(source_name: &str, source_hash: u64, target: Phase) -> Self {
        Self {
            source_name: source_name.to_string(),
            source_hash,
            phase: Phase::Initialization,
            target,
            halted: false,
            module: Arc::new(ModuleNode::default()),
            line_count: 0,
            diagnostics: Vec::new(),
            outline_hash: 0,
            bindings: Vec::new(),
            synthetic: Vec::new(),
            descriptors: Vec::new(),
            class_stubs: Vec::new(),
            outputs: Vec::new(),
            fingerprint: None,
        }
    }

    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.source_name)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity.is_error())
    }

    pub fn diagnostics_of(&self, severity: Severity) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.severity == severity)
    }

    /// Whether a request for `target` can be answered from this tree.
    pub fn satisfies(&self, target: Phase) -> bool {
        self.halted || self.phase >= target
    }
}

/// What `compile_to_phase_with_result` hands back.
#[derive(Debug, Clone)]
pub struct CompilationResult {
    /// `None` only when the source was rejected before parsing.
    pub tree: Option<Arc<CompiledTree>>,
    pub diagnostics: Vec<Diagnostic>,
    pub successful: bool,
}

impl CompilationResult {
    pub(crate) fn from_tree(tree: Arc<CompiledTree>) -> Self {
        let diagnostics = tree.diagnostics.clone();
        let successful = !tree.has_errors();
        Self {
            tree: Some(tree),
            diagnostics,
            successful,
        }
    }

    pub(crate) fn rejected(diagnostic: Diagnostic) -> Self {
        Self {
            tree: None,
            diagnostics: vec![diagnostic],
            successful: false,
        }
    }
}
