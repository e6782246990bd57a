//! Symbol extraction from a parsed module.

use crate::ast::{
    ClosureNode, EnumConstantDecl, FieldDecl, MethodDecl, ModuleNode, TypeDecl, TypeKind, Visitor,
    walk_type,
};
use crate::lexer::Pos;
use groovyscope_api::{Location, SymbolKind, SymbolOrigin, SymbolRecord};
use std::path::{Path, PathBuf};

/// Build scripts are configuration, not classes worth searching for.
pub fn is_build_script(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.ends_with(".gradle") || name.ends_with(".gradle.kts")
}

/// Gradle's Kotlin DSL. Not Groovy, so never parsed.
pub fn is_kotlin_script(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.ends_with(".gradle.kts"))
}

/// Name of the class Groovy generates for a script file.
pub fn script_class_name(module: &ModuleNode, path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    Some(module.qualify(stem))
}

pub fn extract_symbols(module: &ModuleNode, path: &Path) -> Vec<SymbolRecord> {
    let script = if is_build_script(path) || module.script.is_empty() {
        None
    } else {
        script_class_name(module, path)
    };

    let mut collector = SymbolCollector {
        module,
        path: path.to_path_buf(),
        scope: Vec::new(),
        script,
        records: Vec::new(),
    };

    if let Some(script) = collector.script.clone() {
        let declared_elsewhere = module
            .types
            .iter()
            .any(|t| module.qualify(&t.name) == script);
        if !declared_elsewhere {
            collector.push(script, SymbolKind::Class, Pos::new(1, 1));
        }
    }

    collector.visit_module(module);
    collector.records
}

struct SymbolCollector<'a> {
    module: &'a ModuleNode,
    path: PathBuf,
    /// Qualified names of the enclosing types, innermost last.
    scope: Vec<String>,
    script: Option<String>,
    records: Vec<SymbolRecord>,
}

impl SymbolCollector<'_> {
    fn push(&mut self, qualified_name: String, kind: SymbolKind, pos: Pos) {
        self.records.push(SymbolRecord::new(
            qualified_name,
            kind,
            Location::new(self.path.clone(), pos.line, pos.column),
            SymbolOrigin::Workspace,
        ));
    }

    fn owner(&self) -> Option<&str> {
        self.scope.last().map(String::as_str)
    }

    fn type_kind(decl: &TypeDecl) -> SymbolKind {
        match decl.kind {
            TypeKind::Class if decl.has_annotation("Trait") => SymbolKind::Trait,
            TypeKind::Class => SymbolKind::Class,
            TypeKind::Interface => SymbolKind::Interface,
            TypeKind::Trait => SymbolKind::Trait,
            TypeKind::Enum => SymbolKind::Enum,
            TypeKind::Annotation => SymbolKind::Annotation,
        }
    }
}

impl Visitor for SymbolCollector<'_> {
    fn visit_type(&mut self, decl: &TypeDecl) {
        let qualified = match self.owner() {
            Some(outer) => format!("{outer}${}", decl.name),
            None => self.module.qualify(&decl.name),
        };
        self.push(qualified.clone(), Self::type_kind(decl), decl.pos);
        self.scope.push(qualified);
        walk_type(self, decl);
        self.scope.pop();
    }

    fn visit_field(&mut self, owner: &TypeDecl, field: &FieldDecl) {
        let Some(owner_name) = self.owner() else { return };
        let kind = match owner.kind {
            TypeKind::Class | TypeKind::Trait if field.is_property() => SymbolKind::Property,
            _ => SymbolKind::Field,
        };
        let name = format!("{owner_name}.{}", field.name);
        self.push(name, kind, field.pos);
    }

    fn visit_method(&mut self, owner: Option<&TypeDecl>, method: &MethodDecl) {
        let container = match owner {
            Some(_) => self.owner().map(str::to_string),
            None => self.script.clone(),
        };
        if let Some(container) = container {
            self.push(format!("{container}.{}", method.name), SymbolKind::Method, method.pos);
        }
    }

    fn visit_constructor(&mut self, _owner: &TypeDecl, ctor: &MethodDecl) {
        if let Some(owner) = self.owner() {
            let name = format!("{owner}.<init>");
            self.push(name, SymbolKind::Constructor, ctor.pos);
        }
    }

    fn visit_enum_constant(&mut self, _owner: &TypeDecl, constant: &EnumConstantDecl) {
        if let Some(owner) = self.owner() {
            let name = format!("{owner}.{}", constant.name);
            self.push(name, SymbolKind::EnumConstant, constant.pos);
        }
    }

    fn visit_closure(&mut self, owner: Option<&TypeDecl>, closure: &ClosureNode) {
        let container = match owner {
            Some(_) => self.owner().map(str::to_string),
            None => self.script.clone(),
        };
        if let Some(container) = container {
            self.push(format!("{container}.<closure>"), SymbolKind::Closure, closure.pos);
        }
    }
}
