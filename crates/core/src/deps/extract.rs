//! What a compiled tree declares and what it refers to.

use crate::pipeline::{CompiledTree, Resolution};
use groovyscope_api::{DependencyKind, Phase};
use groovyscope_groovy::symbols;
use std::path::Path;

const OBJECT: &str = "java.lang.Object";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum Target {
    /// Any of these qualified names; the first file declaring one wins.
    Type(Vec<String>),
    /// Every file in the package.
    Package(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct Reference {
    pub target: Target,
    pub kind: DependencyKind,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FileFacts {
    pub package: String,
    pub declares: Vec<String>,
    pub references: Vec<Reference>,
}

pub(crate) fn declarations(tree: &CompiledTree) -> Vec<String> {
    let module = &tree.module;
    let mut names: Vec<String> = module.all_types().into_iter().map(|(_, q)| q).collect();
    let path = Path::new(&tree.source_name);
    if !module.script.is_empty() && !symbols::is_build_script(path) {
        if let Some(script) = symbols::script_class_name(module, path) {
            if !names.contains(&script) {
                names.push(script);
            }
        }
    }
    names
}

/// Import `a.b.Outer.Inner` may name the nested type `a.b.Outer$Inner`.
fn import_candidates(path: &str) -> Vec<String> {
    let mut out = vec![path.to_string()];
    if let Some((outer, inner)) = path.rsplit_once('.') {
        if outer.rsplit('.').next().is_some_and(|s| s.starts_with(char::is_uppercase)) {
            out.push(format!("{outer}${inner}"));
        }
    }
    out
}

pub(crate) fn references(tree: &CompiledTree) -> Vec<Reference> {
    let mut refs = Vec::new();

    for import in &tree.module.imports {
        let target = if import.is_star {
            if import.is_static {
                Target::Type(import_candidates(&import.path))
            } else {
                Target::Package(import.path.clone())
            }
        } else {
            Target::Type(import_candidates(import.type_path()))
        };
        refs.push(Reference {
            target,
            kind: DependencyKind::Import,
        });
    }

    for binding in &tree.bindings {
        if binding.candidates.iter().any(|c| c == OBJECT) {
            continue;
        }
        let candidates = match binding.resolution {
            Resolution::Unknown | Resolution::StarCandidate => binding.candidates.clone(),
            _ => binding.candidates.iter().take(1).cloned().collect(),
        };
        refs.push(Reference {
            target: Target::Type(candidates),
            kind: binding.usage,
        });
    }

    refs.sort();
    refs.dedup();
    refs
}

pub(crate) fn facts(tree: &CompiledTree) -> FileFacts {
    FileFacts {
        package: tree.module.package_name().unwrap_or("").to_string(),
        declares: declarations(tree),
        references: references(tree),
    }
}

/// Whether references were bound for this tree.
pub(crate) fn has_bindings(tree: &CompiledTree) -> bool {
    tree.phase >= Phase::ImportResolution
}
