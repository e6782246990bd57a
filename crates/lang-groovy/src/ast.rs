//! Engine-owned syntax tree.
//!
//! The tree only models declarations and the positions of closures; method
//! bodies and initializer expressions are skipped by the parser. Consumers
//! walk it through [`Visitor`].

use crate::lexer::Pos;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Module,
    Package,
    Import,
    Class,
    Interface,
    Trait,
    Enum,
    AnnotationType,
    Field,
    Property,
    Method,
    Constructor,
    EnumConstant,
    Initializer,
    Closure,
    Annotation,
    TypeRef,
    Parameter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modifier {
    Public,
    Protected,
    Private,
    Static,
    Abstract,
    Final,
    Synchronized,
    Native,
    Transient,
    Volatile,
    Strictfp,
    Default,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers(pub Vec<Modifier>);

impl Modifiers {
    pub fn has(&self, modifier: Modifier) -> bool {
        self.0.contains(&modifier)
    }

    pub fn has_visibility(&self) -> bool {
        self.has(Modifier::Public) || self.has(Modifier::Protected) || self.has(Modifier::Private)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationNode {
    pub name: String,
    pub pos: Pos,
}

impl AnnotationNode {
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

/// A type as written in source, e.g. `java.util.Map<String, List<Foo>>[]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeRef {
    pub name: String,
    pub args: Vec<TypeRef>,
    pub array_dims: u8,
    pub pos: Pos,
}

pub const PRIMITIVES: &[&str] = &[
    "boolean", "byte", "char", "short", "int", "long", "float", "double", "void",
];

impl TypeRef {
    pub fn simple(name: impl Into<String>, pos: Pos) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            array_dims: 0,
            pos,
        }
    }

    pub fn is_primitive(&self) -> bool {
        self.array_dims == 0 && PRIMITIVES.contains(&self.name.as_str())
    }

    pub fn is_qualified(&self) -> bool {
        self.name.contains('.')
    }

    /// First segment, the part an import or declaration binds.
    pub fn head(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }

    /// Visits this reference and every type argument, depth first.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a TypeRef)) {
        f(self);
        for arg in &self.args {
            arg.walk(f);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDecl {
    pub name: String,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportDecl {
    pub path: String,
    pub is_static: bool,
    pub is_star: bool,
    pub alias: Option<String>,
    pub pos: Pos,
}

impl ImportDecl {
    /// Name the import binds in the file scope; `None` for star imports.
    pub fn bound_name(&self) -> Option<&str> {
        if self.is_star {
            return None;
        }
        self.alias
            .as_deref()
            .or_else(|| self.path.rsplit('.').next())
    }

    /// The imported type for static member imports, the path otherwise.
    pub fn type_path(&self) -> &str {
        if self.is_static && !self.is_star {
            self.path.rsplit_once('.').map(|(t, _)| t).unwrap_or(&self.path)
        } else {
            &self.path
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeKind {
    Class,
    Interface,
    Trait,
    Enum,
    Annotation,
}

impl TypeKind {
    pub fn node_kind(&self) -> NodeKind {
        match self {
            TypeKind::Class => NodeKind::Class,
            TypeKind::Interface => NodeKind::Interface,
            TypeKind::Trait => NodeKind::Trait,
            TypeKind::Enum => NodeKind::Enum,
            TypeKind::Annotation => NodeKind::AnnotationType,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            TypeKind::Class => "class",
            TypeKind::Interface => "interface",
            TypeKind::Trait => "trait",
            TypeKind::Enum => "enum",
            TypeKind::Annotation => "@interface",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureNode {
    pub pos: Pos,
    /// Nesting level inside the enclosing member, starting at 0.
    pub depth: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InitializerKind {
    String,
    Number,
    Boolean,
    Null,
    Closure,
    List,
    Expression,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub pos: Pos,
    pub modifiers: Modifiers,
    pub annotations: Vec<AnnotationNode>,
    /// `None` for `def` and untyped declarations.
    pub type_ref: Option<TypeRef>,
    pub initializer: Option<InitializerKind>,
    pub closures: Vec<ClosureNode>,
}

impl FieldDecl {
    /// Groovy turns a field without an access modifier into a property.
    pub fn is_property(&self) -> bool {
        !self.modifiers.has_visibility()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub type_ref: Option<TypeRef>,
    pub pos: Pos,
    pub has_default: bool,
    pub varargs: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    pub pos: Pos,
    pub modifiers: Modifiers,
    pub annotations: Vec<AnnotationNode>,
    pub type_params: Vec<String>,
    /// `None` for `def` methods and constructors.
    pub return_type: Option<TypeRef>,
    pub params: Vec<Parameter>,
    pub throws: Vec<TypeRef>,
    pub has_body: bool,
    pub closures: Vec<ClosureNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumConstantDecl {
    pub name: String,
    pub pos: Pos,
    pub annotations: Vec<AnnotationNode>,
    pub closures: Vec<ClosureNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializerDecl {
    pub is_static: bool,
    pub pos: Pos,
    pub closures: Vec<ClosureNode>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Member {
    Field(FieldDecl),
    Method(MethodDecl),
    Constructor(MethodDecl),
    EnumConstant(EnumConstantDecl),
    Type(TypeDecl),
    Initializer(InitializerDecl),
}

impl Member {
    pub fn kind(&self) -> NodeKind {
        match self {
            Member::Field(f) if f.is_property() => NodeKind::Property,
            Member::Field(_) => NodeKind::Field,
            Member::Method(_) => NodeKind::Method,
            Member::Constructor(_) => NodeKind::Constructor,
            Member::EnumConstant(_) => NodeKind::EnumConstant,
            Member::Type(t) => t.kind.node_kind(),
            Member::Initializer(_) => NodeKind::Initializer,
        }
    }

    pub fn closures(&self) -> &[ClosureNode] {
        match self {
            Member::Field(f) => &f.closures,
            Member::Method(m) | Member::Constructor(m) => &m.closures,
            Member::EnumConstant(c) => &c.closures,
            Member::Initializer(i) => &i.closures,
            Member::Type(_) => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDecl {
    pub kind: TypeKind,
    pub name: String,
    pub pos: Pos,
    pub modifiers: Modifiers,
    pub annotations: Vec<AnnotationNode>,
    pub type_params: Vec<String>,
    pub extends: Vec<TypeRef>,
    pub implements: Vec<TypeRef>,
    pub members: Vec<Member>,
    pub end: Pos,
    /// False when the body was cut short by a syntax error or end of input.
    pub complete: bool,
}

impl TypeDecl {
    pub fn fields(&self) -> impl Iterator<Item = &FieldDecl> {
        self.members.iter().filter_map(|m| match m {
            Member::Field(f) => Some(f),
            _ => None,
        })
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodDecl> {
        self.members.iter().filter_map(|m| match m {
            Member::Method(m) => Some(m),
            _ => None,
        })
    }

    pub fn constructors(&self) -> impl Iterator<Item = &MethodDecl> {
        self.members.iter().filter_map(|m| match m {
            Member::Constructor(c) => Some(c),
            _ => None,
        })
    }

    pub fn nested_types(&self) -> impl Iterator<Item = &TypeDecl> {
        self.members.iter().filter_map(|m| match m {
            Member::Type(t) => Some(t),
            _ => None,
        })
    }

    pub fn is_abstract(&self) -> bool {
        matches!(self.kind, TypeKind::Interface | TypeKind::Trait | TypeKind::Annotation)
            || self.modifiers.has(Modifier::Abstract)
    }

    pub fn has_annotation(&self, simple_name: &str) -> bool {
        self.annotations.iter().any(|a| a.simple_name() == simple_name)
    }
}

/// Statements and methods outside any type declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptBody {
    pub methods: Vec<MethodDecl>,
    pub closures: Vec<ClosureNode>,
    pub statement_count: usize,
}

impl ScriptBody {
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty() && self.statement_count == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleNode {
    pub package: Option<PackageDecl>,
    pub imports: Vec<ImportDecl>,
    pub types: Vec<TypeDecl>,
    pub script: ScriptBody,
    pub end: Pos,
}

impl ModuleNode {
    pub fn package_name(&self) -> Option<&str> {
        self.package.as_ref().map(|p| p.name.as_str())
    }

    /// Qualifies a top-level name with the module package.
    pub fn qualify(&self, name: &str) -> String {
        match self.package_name() {
            Some(pkg) if !pkg.is_empty() => format!("{pkg}.{name}"),
            _ => name.to_string(),
        }
    }

    /// Every declared type with its qualified name, outer types first.
    pub fn all_types(&self) -> Vec<(&TypeDecl, String)> {
        fn collect<'a>(
            decl: &'a TypeDecl,
            qualified: String,
            out: &mut Vec<(&'a TypeDecl, String)>,
        ) {
            out.push((decl, qualified.clone()));
            for nested in decl.nested_types() {
                collect(nested, format!("{qualified}${}", nested.name), out);
            }
        }

        let mut out = Vec::new();
        for decl in &self.types {
            collect(decl, self.qualify(&decl.name), &mut out);
        }
        out
    }
}

/// Read-only traversal over the tree.
///
/// Default methods walk into children; override a hook and call the
/// matching `walk_*` function to keep descending.
pub trait Visitor {
    fn visit_module(&mut self, module: &ModuleNode) {
        walk_module(self, module);
    }

    fn visit_import(&mut self, _import: &ImportDecl) {}

    fn visit_type(&mut self, decl: &TypeDecl) {
        walk_type(self, decl);
    }

    fn visit_field(&mut self, _owner: &TypeDecl, _field: &FieldDecl) {}

    fn visit_method(&mut self, _owner: Option<&TypeDecl>, _method: &MethodDecl) {}

    fn visit_constructor(&mut self, _owner: &TypeDecl, _ctor: &MethodDecl) {}

    fn visit_enum_constant(&mut self, _owner: &TypeDecl, _constant: &EnumConstantDecl) {}

    fn visit_closure(&mut self, _owner: Option<&TypeDecl>, _closure: &ClosureNode) {}
}

pub fn walk_module<V: Visitor + ?Sized>(visitor: &mut V, module: &ModuleNode) {
    for import in &module.imports {
        visitor.visit_import(import);
    }
    for decl in &module.types {
        visitor.visit_type(decl);
    }
    for method in &module.script.methods {
        visitor.visit_method(None, method);
        for closure in &method.closures {
            visitor.visit_closure(None, closure);
        }
    }
    for closure in &module.script.closures {
        visitor.visit_closure(None, closure);
    }
}

pub fn walk_type<V: Visitor + ?Sized>(visitor: &mut V, decl: &TypeDecl) {
    for member in &decl.members {
        match member {
            Member::Field(f) => visitor.visit_field(decl, f),
            Member::Method(m) => visitor.visit_method(Some(decl), m),
            Member::Constructor(c) => visitor.visit_constructor(decl, c),
            Member::EnumConstant(c) => visitor.visit_enum_constant(decl, c),
            Member::Type(t) => visitor.visit_type(t),
            Member::Initializer(_) => {}
        }
        for closure in member.closures() {
            visitor.visit_closure(Some(decl), closure);
        }
    }
}
