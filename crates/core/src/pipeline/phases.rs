//! The individual compilation phases.
//!
//! Each phase reads the tree produced so far, appends its own output and
//! diagnostics, and reports whether compilation may continue.

use super::TypeLookup;
use super::tree::{
    ClassStub, CompiledTree, MemberDescriptor, Resolution, SyntheticMember, TypeBinding,
};
use groovyscope_api::{DependencyKind, Diagnostic, Phase, Severity, SymbolKind};
use groovyscope_groovy::ast::{
    AnnotationNode, InitializerKind, Member, MethodDecl, Modifier, ModuleNode, PRIMITIVES, TypeDecl,
    TypeKind, TypeRef,
};
use groovyscope_groovy::{LineIndex, Pos, parse_with_index, symbols};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use xxhash_rust::xxh3::Xxh3;

pub(crate) struct PhaseContext<'a> {
    pub source: &'a str,
    pub lookup: Option<&'a dyn TypeLookup>,
}

/// Runs `phase` on `tree`, then records it as the tree's phase.
pub(crate) fn run_phase(phase: Phase, tree: &mut CompiledTree, ctx: &PhaseContext<'_>) {
    let halted = match phase {
        Phase::Initialization => {
            tree.line_count = LineIndex::new(ctx.source).line_count();
            false
        }
        Phase::Parse => parse(tree, ctx),
        Phase::ImportResolution => {
            resolve_imports(tree, ctx);
            false
        }
        Phase::SemanticAnalysis => {
            analyze(tree, ctx);
            false
        }
        Phase::Canonicalization => {
            canonicalize(tree);
            false
        }
        Phase::InstructionSelection => {
            select_instructions(tree);
            false
        }
        Phase::ClassGeneration => {
            generate_classes(tree);
            false
        }
        Phase::Output => {
            tree.outputs = tree
                .class_stubs
                .iter()
                .map(|stub| PathBuf::from(format!("{}.class", stub.internal_name)))
                .collect();
            false
        }
        Phase::Finalization => {
            tree.fingerprint = Some(fingerprint(tree));
            false
        }
    };
    tree.phase = phase;
    tree.halted = halted;
}

fn diagnostic(tree: &CompiledTree, severity: Severity, message: String, pos: Pos) -> Diagnostic {
    Diagnostic::new(severity, message, pos.line, pos.column, tree.source_name.clone())
}

// ---- Parse ----

fn parse(tree: &mut CompiledTree, ctx: &PhaseContext<'_>) -> bool {
    let lines = LineIndex::new(ctx.source);
    let output = parse_with_index(ctx.source, &tree.source_name, &lines);
    let halted = output.has_errors();
    tree.outline_hash = outline_hash(&output.module);
    tree.module = Arc::new(output.module);
    tree.diagnostics.extend(output.diagnostics);
    halted
}

fn type_text(type_ref: &TypeRef) -> String {
    let mut out = type_ref.name.clone();
    if !type_ref.args.is_empty() {
        let args: Vec<String> = type_ref.args.iter().map(type_text).collect();
        out.push('<');
        out.push_str(&args.join(","));
        out.push('>');
    }
    for _ in 0..type_ref.array_dims {
        out.push_str("[]");
    }
    out
}

fn signature_text(method: &MethodDecl) -> String {
    let params: Vec<String> = method
        .params
        .iter()
        .map(|p| p.type_ref.as_ref().map(type_text).unwrap_or_else(|| "def".into()))
        .collect();
    let ret = method
        .return_type
        .as_ref()
        .map(type_text)
        .unwrap_or_else(|| "def".into());
    let is_static = method.modifiers.has(Modifier::Static);
    format!("{}{}({})->{}", if is_static { "static " } else { "" }, method.name, params.join(","), ret)
}

/// Hash of everything other files can observe: declared names, supertypes
/// and member signatures. Method bodies do not contribute.
pub(crate) fn outline_hash(module: &ModuleNode) -> u64 {
    let mut hasher = Xxh3::new();
    let mut feed = |s: &str| {
        hasher.write(s.as_bytes());
        hasher.write_u8(0);
    };

    feed(module.package_name().unwrap_or(""));
    for (decl, qualified) in module.all_types() {
        feed(decl.kind.keyword());
        feed(&qualified);
        for t in decl.extends.iter().chain(&decl.implements) {
            feed(&type_text(t));
        }
        for member in &decl.members {
            match member {
                Member::Field(f) => {
                    feed(&f.name);
                    feed(&f.type_ref.as_ref().map(type_text).unwrap_or_default());
                    feed(if f.is_property() { "property" } else { "field" });
                }
                Member::Method(m) => feed(&signature_text(m)),
                Member::Constructor(c) => feed(&format!("<init>{}", signature_text(c))),
                Member::EnumConstant(c) => feed(&c.name),
                Member::Type(_) | Member::Initializer(_) => {}
            }
        }
    }
    for method in &module.script.methods {
        feed(&signature_text(method));
    }
    hasher.finish()
}

// ---- Import resolution ----

const DEFAULT_PACKAGES: &[&str] = &[
    "java.lang",
    "java.util",
    "java.io",
    "java.net",
    "groovy.lang",
    "groovy.util",
];

/// Well-known types from the implicitly imported packages.
static DEFAULT_TYPES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let groups: &[(&str, &[&str])] = &[
        (
            "java.lang",
            &[
                "Object", "String", "Integer", "Long", "Short", "Byte", "Double", "Float",
                "Boolean", "Character", "Number", "Math", "System", "Thread", "Runnable",
                "Exception", "RuntimeException", "Error", "Throwable", "IllegalArgumentException",
                "IllegalStateException", "UnsupportedOperationException", "NullPointerException",
                "IndexOutOfBoundsException", "ArithmeticException", "ClassCastException",
                "NumberFormatException", "InterruptedException", "ClassNotFoundException",
                "CloneNotSupportedException", "SecurityException", "Iterable", "Comparable",
                "CharSequence", "StringBuilder", "StringBuffer", "Class", "Enum", "Void",
                "Override", "Deprecated", "SuppressWarnings", "FunctionalInterface", "Cloneable",
                "AutoCloseable", "Process", "Runtime", "ThreadLocal", "Record",
            ],
        ),
        (
            "java.util",
            &[
                "List", "Map", "Set", "Collection", "ArrayList", "HashMap", "HashSet",
                "LinkedList", "LinkedHashMap", "LinkedHashSet", "TreeMap", "TreeSet", "Iterator",
                "Optional", "Date", "Arrays", "Collections", "Objects", "UUID", "Random",
                "Scanner", "Properties", "Queue", "Deque", "ArrayDeque", "Stack", "Vector",
                "Locale", "Comparator", "SortedMap", "SortedSet", "NavigableMap", "NavigableSet",
                "Calendar", "Timer", "ListIterator", "EnumMap", "EnumSet", "BitSet",
            ],
        ),
        (
            "java.io",
            &[
                "File", "InputStream", "OutputStream", "Reader", "Writer", "IOException",
                "Serializable", "Closeable", "BufferedReader", "BufferedWriter", "PrintStream",
                "PrintWriter", "FileReader", "FileWriter", "FileInputStream", "FileOutputStream",
                "InputStreamReader", "OutputStreamWriter", "UncheckedIOException",
                "FileNotFoundException", "StringReader", "StringWriter",
            ],
        ),
        (
            "java.net",
            &[
                "URL", "URI", "Socket", "ServerSocket", "URLConnection", "HttpURLConnection",
                "InetAddress", "MalformedURLException", "URISyntaxException",
            ],
        ),
        ("java.math", &["BigDecimal", "BigInteger"]),
        (
            "groovy.lang",
            &[
                "Closure", "GString", "Binding", "Script", "MetaClass", "GroovyObject", "Range",
                "IntRange", "Delegate", "Grab", "Singleton", "Lazy", "Newify", "Mixin",
                "Category", "Tuple", "Tuple2", "DelegatesTo", "GroovyShell", "GroovyClassLoader",
                "MissingMethodException", "MissingPropertyException", "Reference", "Writable",
            ],
        ),
        (
            "groovy.util",
            &[
                "Expando", "ConfigObject", "ConfigSlurper", "NodeBuilder", "Node", "NodeList",
                "ObjectGraphBuilder", "BuilderSupport", "Eval", "Proxy", "OrderBy",
                "FactoryBuilderSupport",
            ],
        ),
    ];
    let mut map = HashMap::new();
    for (package, names) in groups {
        for name in *names {
            map.insert(*name, *package);
        }
    }
    map
});

struct Scope<'m> {
    module: &'m ModuleNode,
    /// Simple and dotted relative names of declared types, to qualified names.
    declared: HashMap<String, String>,
    imports: HashMap<&'m str, &'m str>,
    star_packages: Vec<&'m str>,
}

impl<'m> Scope<'m> {
    fn new(module: &'m ModuleNode) -> Self {
        let mut declared = HashMap::new();
        let prefix = module.package_name().map(|p| format!("{p}.")).unwrap_or_default();
        for (decl, qualified) in module.all_types() {
            let relative = qualified
                .strip_prefix(&prefix)
                .unwrap_or(&qualified)
                .replace('$', ".");
            declared.entry(decl.name.clone()).or_insert_with(|| qualified.clone());
            declared.insert(relative, qualified);
        }

        let mut imports = HashMap::new();
        let mut star_packages = Vec::new();
        for import in &module.imports {
            if import.is_star {
                if !import.is_static {
                    star_packages.push(import.path.as_str());
                }
            } else if let Some(bound) = import.bound_name() {
                let target = if import.is_static {
                    import.path.as_str()
                } else {
                    import.type_path()
                };
                imports.insert(bound, target);
            }
        }

        Self {
            module,
            declared,
            imports,
            star_packages,
        }
    }

    fn resolve(&self, name: &str, lookup: Option<&dyn TypeLookup>) -> (Resolution, Vec<String>) {
        let knows = |q: &str| lookup.is_some_and(|l| l.type_kind(q).is_some_and(|k| k.is_type()));

        if let Some(q) = self.declared.get(name) {
            return (Resolution::Declared, vec![q.clone()]);
        }

        if let Some((head, rest)) = name.split_once('.') {
            let nested = rest.replace('.', "$");
            if let Some(q) = self.declared.get(head) {
                return (Resolution::Declared, vec![format!("{q}${nested}")]);
            }
            if let Some(path) = self.imports.get(head) {
                return (Resolution::Imported, vec![format!("{path}${nested}")]);
            }
            if let Some(package) = DEFAULT_TYPES.get(head) {
                return (
                    Resolution::DefaultImport,
                    vec![format!("{package}.{head}${nested}")],
                );
            }
            return (Resolution::Qualified, vec![name.to_string()]);
        }

        if let Some(path) = self.imports.get(name) {
            return (Resolution::Imported, vec![(*path).to_string()]);
        }

        let same_package = self.module.qualify(name);
        if knows(&same_package) {
            return (Resolution::SamePackage, vec![same_package]);
        }

        if let Some(package) = DEFAULT_TYPES.get(name) {
            return (Resolution::DefaultImport, vec![format!("{package}.{name}")]);
        }
        for package in DEFAULT_PACKAGES {
            let q = format!("{package}.{name}");
            if knows(&q) {
                return (Resolution::DefaultImport, vec![q]);
            }
        }

        for package in &self.star_packages {
            let q = format!("{package}.{name}");
            if knows(&q) {
                return (Resolution::StarImport, vec![q]);
            }
        }

        let mut candidates = vec![same_package];
        candidates.extend(self.star_packages.iter().map(|p| format!("{p}.{name}")));
        if self.star_packages.is_empty() {
            (Resolution::Unknown, candidates)
        } else {
            (Resolution::StarCandidate, candidates)
        }
    }
}

struct Binder<'a, 'm> {
    scope: Scope<'m>,
    lookup: Option<&'a dyn TypeLookup>,
    type_params: Vec<String>,
    bindings: Vec<TypeBinding>,
}

impl Binder<'_, '_> {
    fn bind(&mut self, type_ref: &TypeRef, usage: DependencyKind) {
        type_ref.walk(&mut |t| {
            if PRIMITIVES.contains(&t.name.as_str()) || self.type_params.iter().any(|p| *p == t.name)
            {
                return;
            }
            let (resolution, candidates) = self.scope.resolve(&t.name, self.lookup);
            self.bindings.push(TypeBinding {
                name: t.name.clone(),
                pos: t.pos,
                usage,
                resolution,
                candidates,
            });
        });
    }

    fn bind_annotations(&mut self, annotations: &[AnnotationNode]) {
        for annotation in annotations {
            self.bind(
                &TypeRef::simple(annotation.name.clone(), annotation.pos),
                DependencyKind::Annotation,
            );
        }
    }

    fn bind_method(&mut self, method: &MethodDecl) {
        let outer = self.type_params.len();
        self.type_params.extend(method.type_params.iter().cloned());
        self.bind_annotations(&method.annotations);
        if let Some(ret) = &method.return_type {
            self.bind(ret, DependencyKind::SignatureType);
        }
        for param in &method.params {
            if let Some(t) = &param.type_ref {
                self.bind(t, DependencyKind::SignatureType);
            }
        }
        for t in &method.throws {
            self.bind(t, DependencyKind::SignatureType);
        }
        self.type_params.truncate(outer);
    }

    fn bind_type(&mut self, decl: &TypeDecl) {
        let outer = self.type_params.len();
        self.type_params.extend(decl.type_params.iter().cloned());
        self.bind_annotations(&decl.annotations);

        let extends_usage = if matches!(decl.kind, TypeKind::Interface | TypeKind::Trait) {
            DependencyKind::Interface
        } else {
            DependencyKind::Supertype
        };
        for t in &decl.extends {
            self.bind(t, extends_usage);
        }
        for t in &decl.implements {
            self.bind(t, DependencyKind::Interface);
        }

        for member in &decl.members {
            match member {
                Member::Field(f) => {
                    self.bind_annotations(&f.annotations);
                    if let Some(t) = &f.type_ref {
                        self.bind(t, DependencyKind::FieldType);
                    }
                }
                Member::Method(m) | Member::Constructor(m) => self.bind_method(m),
                Member::EnumConstant(c) => self.bind_annotations(&c.annotations),
                Member::Type(nested) => self.bind_type(nested),
                Member::Initializer(_) => {}
            }
        }
        self.type_params.truncate(outer);
    }
}

fn resolve_imports(tree: &mut CompiledTree, ctx: &PhaseContext<'_>) {
    let module = Arc::clone(&tree.module);
    let mut binder = Binder {
        scope: Scope::new(&module),
        lookup: ctx.lookup,
        type_params: Vec::new(),
        bindings: Vec::new(),
    };
    for decl in &module.types {
        binder.bind_type(decl);
    }
    for method in &module.script.methods {
        binder.bind_method(method);
    }

    let mut warned = HashSet::new();
    for binding in &binder.bindings {
        if binding.resolution == Resolution::Unknown && warned.insert(binding.name.clone()) {
            let message = format!("unable to resolve class {}", binding.name);
            let d = diagnostic(tree, Severity::Warning, message, binding.pos);
            tree.diagnostics.push(d);
        }
    }
    tree.bindings = binder.bindings;
}

// ---- Semantic analysis ----

fn analyze(tree: &mut CompiledTree, ctx: &PhaseContext<'_>) {
    let module = Arc::clone(&tree.module);
    let mut errors: Vec<(String, Pos)> = Vec::new();

    // Resolved kind of each supertype reference, by position.
    let resolved: HashMap<Pos, &TypeBinding> = tree
        .bindings
        .iter()
        .filter(|b| matches!(b.usage, DependencyKind::Supertype | DependencyKind::Interface))
        .map(|b| (b.pos, b))
        .collect();
    let declared_kinds: HashMap<String, TypeKind> = module
        .all_types()
        .into_iter()
        .map(|(decl, q)| (q, decl.kind))
        .collect();
    let kind_of = |t: &TypeRef| -> Option<SymbolKind> {
        let binding = resolved.get(&t.pos)?;
        let q = binding.resolved_name()?;
        match declared_kinds.get(q) {
            Some(TypeKind::Class) => Some(SymbolKind::Class),
            Some(TypeKind::Enum) => Some(SymbolKind::Enum),
            Some(_) => Some(SymbolKind::Interface),
            None => ctx.lookup.and_then(|l| l.type_kind(q)),
        }
    };

    let mut seen_types = HashSet::new();
    for (decl, qualified) in module.all_types() {
        if !seen_types.insert(qualified.clone()) {
            errors.push((format!("duplicate class definition {qualified}"), decl.pos));
        }

        if decl.kind == TypeKind::Class && decl.extends.len() > 1 {
            errors.push((
                format!("class {} cannot extend more than one class", decl.name),
                decl.extends[1].pos,
            ));
        }
        if decl.kind == TypeKind::Interface {
            for t in &decl.extends {
                if matches!(kind_of(t), Some(SymbolKind::Class | SymbolKind::Enum)) {
                    errors.push((
                        format!("interface {} cannot extend class {}", decl.name, t.name),
                        t.pos,
                    ));
                }
            }
        }
        if decl.kind == TypeKind::Class {
            for t in &decl.implements {
                if matches!(kind_of(t), Some(SymbolKind::Class | SymbolKind::Enum)) {
                    errors.push((
                        format!("class {} cannot implement class {}", decl.name, t.name),
                        t.pos,
                    ));
                }
            }
        }

        let mut members = HashSet::new();
        for member in &decl.members {
            match member {
                Member::Field(f) => {
                    if !members.insert(format!("field {}", f.name)) {
                        errors.push((
                            format!("duplicate field {} in {}", f.name, decl.name),
                            f.pos,
                        ));
                    }
                }
                Member::Method(m) => {
                    if !members.insert(format!("method {}", erased_signature(m))) {
                        errors.push((
                            format!("duplicate method {} in {}", m.name, decl.name),
                            m.pos,
                        ));
                    }
                    let is_abstract = m.modifiers.has(Modifier::Abstract);
                    let concrete_owner = matches!(decl.kind, TypeKind::Class | TypeKind::Enum)
                        && !decl.modifiers.has(Modifier::Abstract);
                    if is_abstract && concrete_owner {
                        errors.push((
                            format!(
                                "abstract method {} in non-abstract class {}",
                                m.name, decl.name
                            ),
                            m.pos,
                        ));
                    } else if !m.has_body
                        && !is_abstract
                        && !m.modifiers.has(Modifier::Native)
                        && matches!(decl.kind, TypeKind::Class | TypeKind::Enum)
                    {
                        errors.push((
                            format!("method {} in {} must have a body", m.name, decl.name),
                            m.pos,
                        ));
                    }
                }
                Member::Constructor(c) => {
                    if matches!(decl.kind, TypeKind::Interface | TypeKind::Annotation) {
                        errors.push((
                            format!("constructor not allowed in interface {}", decl.name),
                            c.pos,
                        ));
                    } else if !members.insert(format!("ctor {}", erased_signature(c))) {
                        errors.push((
                            format!("duplicate constructor in {}", decl.name),
                            c.pos,
                        ));
                    }
                }
                Member::EnumConstant(c) => {
                    if !members.insert(format!("field {}", c.name)) {
                        errors.push((
                            format!("duplicate enum constant {} in {}", c.name, decl.name),
                            c.pos,
                        ));
                    }
                }
                Member::Type(_) | Member::Initializer(_) => {}
            }
        }
    }

    let mut script_methods = HashSet::new();
    for m in &module.script.methods {
        if !script_methods.insert(erased_signature(m)) {
            errors.push((format!("duplicate method {} in script", m.name), m.pos));
        }
    }

    errors.extend(inheritance_cycles(&module, &tree.bindings));

    for (message, pos) in errors {
        let d = diagnostic(tree, Severity::Semantic, message, pos);
        tree.diagnostics.push(d);
    }
}

/// Name and parameter types, the part overloads must differ in.
fn erased_signature(method: &MethodDecl) -> String {
    let params: Vec<&str> = method
        .params
        .iter()
        .map(|p| p.type_ref.as_ref().map(|t| t.name.as_str()).unwrap_or("Object"))
        .collect();
    format!("{}({})", method.name, params.join(","))
}

/// Cycles among the supertypes declared in this module.
fn inheritance_cycles(module: &ModuleNode, bindings: &[TypeBinding]) -> Vec<(String, Pos)> {
    let by_pos: HashMap<Pos, &TypeBinding> = bindings.iter().map(|b| (b.pos, b)).collect();
    let mut supers: HashMap<String, Vec<String>> = HashMap::new();
    let mut positions: HashMap<String, Pos> = HashMap::new();
    for (decl, qualified) in module.all_types() {
        let parents = decl
            .extends
            .iter()
            .chain(&decl.implements)
            .filter_map(|t| by_pos.get(&t.pos))
            .filter(|b| b.resolution == Resolution::Declared)
            .filter_map(|b| b.resolved_name().map(str::to_string))
            .collect();
        supers.insert(qualified.clone(), parents);
        positions.insert(qualified, decl.pos);
    }

    let mut errors = Vec::new();
    let mut names: Vec<&String> = supers.keys().collect();
    names.sort();
    for start in names {
        let mut stack: Vec<&str> = supers[start].iter().map(String::as_str).collect();
        let mut visited = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == start {
                let pos = positions.get(start).copied().unwrap_or_default();
                errors.push((format!("cyclic inheritance involving {start}"), pos));
                break;
            }
            if visited.insert(current) {
                if let Some(parents) = supers.get(current) {
                    stack.extend(parents.iter().map(String::as_str));
                }
            }
        }
    }
    errors
}

// ---- Canonicalization ----

const NUMERIC: &[&str] = &["byte", "short", "int", "long", "float", "double"];

fn literal_mismatch(type_name: &str, init: InitializerKind) -> bool {
    match init {
        InitializerKind::Null | InitializerKind::List | InitializerKind::Closure => true,
        InitializerKind::Expression => false,
        InitializerKind::String => NUMERIC.contains(&type_name) || type_name == "boolean",
        InitializerKind::Boolean => type_name != "boolean",
        InitializerKind::Number => type_name == "boolean",
    }
}

fn initializer_name(init: InitializerKind) -> &'static str {
    match init {
        InitializerKind::String => "String",
        InitializerKind::Number => "number",
        InitializerKind::Boolean => "boolean",
        InitializerKind::Null => "null",
        InitializerKind::Closure => "Closure",
        InitializerKind::List => "List",
        InitializerKind::Expression => "expression",
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn canonicalize(tree: &mut CompiledTree) {
    let module = Arc::clone(&tree.module);
    let mut errors: Vec<(String, Pos)> = Vec::new();
    let mut synthetic = Vec::new();
    let binding_index = BindingIndex::new(&tree.bindings);

    for (decl, qualified) in module.all_types() {
        for field in decl.fields() {
            let (Some(t), Some(init)) = (&field.type_ref, field.initializer) else {
                continue;
            };
            if t.is_primitive() && literal_mismatch(&t.name, init) {
                errors.push((
                    format!(
                        "cannot assign {} to field {} of type {}",
                        initializer_name(init),
                        field.name,
                        t.name
                    ),
                    field.pos,
                ));
            }
        }

        if decl.kind == TypeKind::Class && decl.constructors().next().is_none() {
            synthetic.push(SyntheticMember {
                owner: qualified.clone(),
                name: "<init>".into(),
                descriptor: "()V".into(),
            });
        }

        if matches!(decl.kind, TypeKind::Class | TypeKind::Trait) {
            let declared: HashSet<&str> = decl.methods().map(|m| m.name.as_str()).collect();
            for field in decl.fields().filter(|f| f.is_property()) {
                let desc = binding_index.descriptor(field.type_ref.as_ref(), &[]);
                let cap = capitalize(&field.name);
                let mut getters = vec![format!("get{cap}")];
                if desc == "Z" {
                    getters.push(format!("is{cap}"));
                }
                for getter in getters {
                    if !declared.contains(getter.as_str()) {
                        synthetic.push(SyntheticMember {
                            owner: qualified.clone(),
                            name: getter,
                            descriptor: format!("(){desc}"),
                        });
                    }
                }
                let setter = format!("set{cap}");
                if !field.modifiers.has(Modifier::Final) && !declared.contains(setter.as_str()) {
                    synthetic.push(SyntheticMember {
                        owner: qualified.clone(),
                        name: setter,
                        descriptor: format!("({desc})V"),
                    });
                }
            }
        }
    }
    tree.synthetic = synthetic;
    for (message, pos) in errors {
        let d = diagnostic(tree, Severity::Type, message, pos);
        tree.diagnostics.push(d);
    }
}

// ---- Instruction selection ----

struct BindingIndex<'a> {
    by_site: HashMap<(Pos, &'a str), &'a TypeBinding>,
}

impl<'a> BindingIndex<'a> {
    fn new(bindings: &'a [TypeBinding]) -> Self {
        Self {
            by_site: bindings
                .iter()
                .map(|b| ((b.pos, b.name.as_str()), b))
                .collect(),
        }
    }

    /// JVM descriptor for a declared type; untyped and generic types erase to `Object`.
    fn descriptor(&self, type_ref: Option<&TypeRef>, type_params: &[String]) -> String {
        let Some(t) = type_ref else {
            return "Ljava/lang/Object;".into();
        };
        let mut out = "[".repeat(t.array_dims as usize);
        let base = match t.name.as_str() {
            "boolean" => "Z".to_string(),
            "byte" => "B".to_string(),
            "char" => "C".to_string(),
            "short" => "S".to_string(),
            "int" => "I".to_string(),
            "long" => "J".to_string(),
            "float" => "F".to_string(),
            "double" => "D".to_string(),
            "void" => "V".to_string(),
            name if type_params.iter().any(|p| p == name) => "Ljava/lang/Object;".to_string(),
            name => {
                let qualified = self
                    .by_site
                    .get(&(t.pos, name))
                    .and_then(|b| b.candidates.first())
                    .map(String::as_str)
                    .unwrap_or(name);
                format!("L{};", qualified.replace('.', "/"))
            }
        };
        out.push_str(&base);
        out
    }

    fn method_descriptor(&self, method: &MethodDecl, type_params: &[String], is_ctor: bool) -> String {
        let mut scope: Vec<String> = type_params.to_vec();
        scope.extend(method.type_params.iter().cloned());
        let mut out = String::from("(");
        for param in &method.params {
            if param.varargs {
                out.push('[');
            }
            out.push_str(&self.descriptor(param.type_ref.as_ref(), &scope));
        }
        out.push(')');
        if is_ctor {
            out.push('V');
        } else {
            out.push_str(&self.descriptor(method.return_type.as_ref(), &scope));
        }
        out
    }
}

fn internal_name(qualified: &str) -> String {
    qualified.replace('.', "/")
}

fn script_class(tree: &CompiledTree) -> Option<String> {
    if tree.module.script.is_empty() {
        return None;
    }
    symbols::script_class_name(&tree.module, Path::new(&tree.source_name))
        .filter(|name| !tree.module.all_types().iter().any(|(_, q)| q == name))
}

fn select_instructions(tree: &mut CompiledTree) {
    let module = Arc::clone(&tree.module);
    let index = BindingIndex::new(&tree.bindings);
    let mut descriptors = Vec::new();

    for (decl, qualified) in module.all_types() {
        let owner = internal_name(&qualified);
        for member in &decl.members {
            let (name, descriptor, is_field) = match member {
                Member::Field(f) => (
                    f.name.clone(),
                    index.descriptor(f.type_ref.as_ref(), &decl.type_params),
                    true,
                ),
                Member::EnumConstant(c) => (c.name.clone(), format!("L{owner};"), true),
                Member::Method(m) => (
                    m.name.clone(),
                    index.method_descriptor(m, &decl.type_params, false),
                    false,
                ),
                Member::Constructor(c) => (
                    "<init>".to_string(),
                    index.method_descriptor(c, &decl.type_params, true),
                    false,
                ),
                Member::Type(_) | Member::Initializer(_) => continue,
            };
            descriptors.push(MemberDescriptor {
                owner: owner.clone(),
                name,
                descriptor,
                is_field,
            });
        }
    }

    for member in &tree.synthetic {
        descriptors.push(MemberDescriptor {
            owner: internal_name(&member.owner),
            name: member.name.clone(),
            descriptor: member.descriptor.clone(),
            is_field: false,
        });
    }

    if let Some(script) = script_class(tree) {
        let owner = internal_name(&script);
        for method in &module.script.methods {
            descriptors.push(MemberDescriptor {
                owner: owner.clone(),
                name: method.name.clone(),
                descriptor: index.method_descriptor(method, &[], false),
                is_field: false,
            });
        }
        descriptors.push(MemberDescriptor {
            owner,
            name: "run".into(),
            descriptor: "()Ljava/lang/Object;".into(),
            is_field: false,
        });
    }

    tree.descriptors = descriptors;
}

// ---- Class generation ----

const ACC_PUBLIC: u16 = 0x0001;
const ACC_FINAL: u16 = 0x0010;
const ACC_SUPER: u16 = 0x0020;
const ACC_INTERFACE: u16 = 0x0200;
const ACC_ABSTRACT: u16 = 0x0400;
const ACC_ANNOTATION: u16 = 0x2000;
const ACC_ENUM: u16 = 0x4000;

fn generate_classes(tree: &mut CompiledTree) {
    let module = Arc::clone(&tree.module);
    let resolved: HashMap<Pos, String> = tree
        .bindings
        .iter()
        .filter_map(|b| Some((b.pos, internal_name(b.candidates.first()?))))
        .collect();
    let count = |owner: &str, fields: bool| {
        tree.descriptors
            .iter()
            .filter(|d| d.owner == owner && d.is_field == fields)
            .count()
    };

    let mut stubs = Vec::new();
    for (decl, qualified) in module.all_types() {
        let name = internal_name(&qualified);
        let supers: Vec<String> = decl
            .extends
            .iter()
            .map(|t| resolved.get(&t.pos).cloned().unwrap_or_else(|| internal_name(&t.name)))
            .collect();
        let implemented: Vec<String> = decl
            .implements
            .iter()
            .map(|t| resolved.get(&t.pos).cloned().unwrap_or_else(|| internal_name(&t.name)))
            .collect();

        let mut flags = if decl.modifiers.has(Modifier::Private) || decl.modifiers.has(Modifier::Protected) {
            0
        } else {
            ACC_PUBLIC
        };
        let (super_name, mut interfaces) = match decl.kind {
            TypeKind::Class => {
                flags |= ACC_SUPER;
                if decl.modifiers.has(Modifier::Abstract) {
                    flags |= ACC_ABSTRACT;
                }
                if decl.modifiers.has(Modifier::Final) {
                    flags |= ACC_FINAL;
                }
                let super_name = supers
                    .first()
                    .cloned()
                    .unwrap_or_else(|| "java/lang/Object".into());
                (super_name, implemented)
            }
            TypeKind::Enum => {
                flags |= ACC_SUPER | ACC_FINAL | ACC_ENUM;
                ("java/lang/Enum".to_string(), implemented)
            }
            TypeKind::Interface | TypeKind::Trait => {
                flags |= ACC_INTERFACE | ACC_ABSTRACT;
                ("java/lang/Object".to_string(), supers)
            }
            TypeKind::Annotation => {
                flags |= ACC_INTERFACE | ACC_ABSTRACT | ACC_ANNOTATION;
                (
                    "java/lang/Object".to_string(),
                    vec!["java/lang/annotation/Annotation".to_string()],
                )
            }
        };
        if matches!(decl.kind, TypeKind::Class | TypeKind::Enum) {
            interfaces.push("groovy/lang/GroovyObject".into());
        }

        stubs.push(ClassStub {
            fields: count(&name, true),
            methods: count(&name, false),
            internal_name: name,
            super_name,
            interfaces,
            access_flags: flags,
        });
    }

    if let Some(script) = script_class(tree) {
        let name = internal_name(&script);
        stubs.push(ClassStub {
            fields: 0,
            methods: count(&name, false),
            internal_name: name,
            super_name: "groovy/lang/Script".into(),
            interfaces: Vec::new(),
            access_flags: ACC_PUBLIC | ACC_SUPER,
        });
    }

    tree.class_stubs = stubs;
}

// ---- Finalization ----

fn fingerprint(tree: &CompiledTree) -> u64 {
    let mut hasher = Xxh3::new();
    hasher.write_u64(tree.source_hash);
    hasher.write_u64(tree.outline_hash);
    for d in &tree.descriptors {
        hasher.write(d.owner.as_bytes());
        hasher.write(d.name.as_bytes());
        hasher.write(d.descriptor.as_bytes());
    }
    for stub in &tree.class_stubs {
        hasher.write(stub.internal_name.as_bytes());
        hasher.write(stub.super_name.as_bytes());
        hasher.write_u16(stub.access_flags);
    }
    hasher.finish()
}
