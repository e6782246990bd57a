//! Declaration-level recursive descent parser.
//!
//! The parser never fails: every problem becomes a syntax diagnostic and
//! parsing resumes at the next line, `;` or `}` boundary. Method bodies and
//! initializers are scanned for closures but not modelled.

mod decl;

use crate::ast::{ClosureNode, ImportDecl, ModuleNode, PackageDecl};
use crate::lexer::{LineIndex, Pos, Span, Token, tokenize};
use groovyscope_api::{Diagnostic, Severity};

/// Result of parsing one source file.
#[derive(Debug, Clone)]
pub struct ParseOutput {
    pub module: ModuleNode,
    pub diagnostics: Vec<Diagnostic>,
}

impl ParseOutput {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Syntax)
    }
}

pub fn parse(source: &str, source_name: &str) -> ParseOutput {
    let lines = LineIndex::new(source);
    parse_with_index(source, source_name, &lines)
}

pub fn parse_with_index(source: &str, source_name: &str, lines: &LineIndex) -> ParseOutput {
    let (tokens, lex_errors) = tokenize(source);
    let mut parser = Parser {
        source,
        source_name,
        lines,
        tokens,
        pos: 0,
        diagnostics: Vec::new(),
        unclosed_body: false,
    };

    for err in lex_errors {
        let pos = parser.lines.pos(source, err.span.start);
        parser.error_at(err.message, pos);
    }

    let module = parser.parse_module();
    ParseOutput {
        module,
        diagnostics: parser.diagnostics,
    }
}

/// How far [`Parser::scan`] consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    /// After an opening `{`, through the matching `}`.
    Block,
    /// Up to the end of a statement, stopping before a closing `}`.
    Statement,
    /// Like `Statement`, but also stops before a top-level `,`.
    Initializer,
    /// Up to a top-level `,` or `)`.
    Argument,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParenKind {
    Plain,
    /// Condition of `if`, `for`, `while` and friends.
    Control,
    /// Constructor arguments of `new T(...)`.
    New,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BraceKind {
    Block,
    Closure,
    /// Body of an anonymous class.
    ClassBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Open {
    Paren(ParenKind),
    Bracket,
    Brace(BraceKind),
}

impl Open {
    fn closed_by(&self, tok: Token<'_>) -> bool {
        matches!(
            (self, tok),
            (Open::Paren(_), Token::RParen)
                | (Open::Bracket, Token::RBracket)
                | (Open::Brace(_), Token::RBrace)
        )
    }
}

pub(crate) struct Parser<'src, 'idx> {
    source: &'src str,
    source_name: &'src str,
    lines: &'idx LineIndex,
    tokens: Vec<(Token<'src>, Span)>,
    pos: usize,
    diagnostics: Vec<Diagnostic>,
    /// Set when a method body ran to the end of input.
    unclosed_body: bool,
}

impl<'src> Parser<'src, '_> {
    // ---- Cursor helpers ----

    fn peek(&self) -> Option<Token<'src>> {
        self.peek_at(0)
    }

    fn peek_at(&self, n: usize) -> Option<Token<'src>> {
        self.tokens.get(self.pos + n).map(|(t, _)| *t)
    }

    fn token_at(&self, idx: usize) -> Option<Token<'src>> {
        self.tokens.get(idx).map(|(t, _)| *t)
    }

    fn prev(&self) -> Option<Token<'src>> {
        self.pos.checked_sub(1).and_then(|i| self.token_at(i))
    }

    fn bump(&mut self) -> Option<Token<'src>> {
        let tok = self.peek()?;
        self.pos += 1;
        Some(tok)
    }

    fn at(&self, tok: Token<'src>) -> bool {
        self.peek() == Some(tok)
    }

    fn eat(&mut self, tok: Token<'src>) -> bool {
        if self.at(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_newlines(&mut self) {
        while self.at(Token::Newline) {
            self.pos += 1;
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(Token::Newline | Token::Semi)) {
            self.pos += 1;
        }
    }

    /// Position of the current token, or end of input.
    fn current_pos(&self) -> Pos {
        match self.tokens.get(self.pos) {
            Some((_, span)) => self.lines.pos(self.source, span.start),
            None => self.end_pos(),
        }
    }

    fn end_pos(&self) -> Pos {
        self.lines.pos(self.source, self.source.len())
    }

    fn error_at(&mut self, message: impl Into<String>, pos: Pos) {
        self.diagnostics.push(Diagnostic::new(
            Severity::Syntax,
            message,
            pos.line,
            pos.column,
            self.source_name,
        ));
    }

    fn error_here(&mut self, message: impl Into<String>) {
        let pos = self.current_pos();
        self.error_at(message, pos);
    }

    /// Identifier-like token text, including soft keywords usable as names.
    fn name_of(tok: Token<'src>) -> Option<&'src str> {
        match tok {
            Token::Ident(s) => Some(s),
            Token::Trait => Some("trait"),
            Token::Var => Some("var"),
            Token::As => Some("as"),
            _ => None,
        }
    }

    fn eat_name(&mut self) -> Option<(&'src str, Pos)> {
        let name = Self::name_of(self.peek()?)?;
        let pos = self.current_pos();
        self.pos += 1;
        Some((name, pos))
    }

    /// Dotted name such as `com.acme.Foo`.
    fn parse_qualified_name(&mut self) -> Option<(String, Pos)> {
        let (first, pos) = self.eat_name()?;
        let mut name = first.to_string();
        while self.at(Token::Dot) {
            match self.peek_at(1).and_then(Self::name_of) {
                Some(next) => {
                    name.push('.');
                    name.push_str(next);
                    self.pos += 2;
                }
                None => break,
            }
        }
        Some((name, pos))
    }

    // ---- Module level ----

    fn parse_module(&mut self) -> ModuleNode {
        let mut module = ModuleNode::default();

        loop {
            self.skip_separators();
            let Some(tok) = self.peek() else { break };

            match tok {
                Token::Package => self.parse_package(&mut module),
                Token::Import => self.parse_import(&mut module),
                Token::RBrace | Token::RParen | Token::RBracket => {
                    self.error_here(format!("unexpected {tok}"));
                    self.pos += 1;
                }
                Token::Error => {
                    self.pos += 1;
                }
                _ => self.parse_top_level_item(&mut module),
            }
        }

        module.end = self.end_pos();
        module
    }

    fn parse_package(&mut self, module: &mut ModuleNode) {
        self.pos += 1;
        match self.parse_qualified_name() {
            Some((name, pos)) => {
                if module.package.is_some() {
                    self.error_at("duplicate package declaration", pos);
                } else {
                    module.package = Some(PackageDecl { name, pos });
                }
            }
            None => {
                self.error_here("expected package name");
                self.scan(Scan::Statement, &mut Vec::new());
            }
        }
    }

    fn parse_import(&mut self, module: &mut ModuleNode) {
        let start = self.current_pos();
        self.pos += 1;
        let is_static = self.eat(Token::Static);

        let Some((mut path, _)) = self.parse_qualified_name() else {
            self.error_here("expected import path");
            self.scan(Scan::Statement, &mut Vec::new());
            return;
        };

        let mut is_star = false;
        if self.at(Token::Dot) && self.peek_at(1) == Some(Token::Star) {
            self.pos += 2;
            is_star = true;
        }

        let mut alias = None;
        if self.eat(Token::As) {
            match self.eat_name() {
                Some((name, _)) => alias = Some(name.to_string()),
                None => self.error_here("expected alias after 'as'"),
            }
        }

        if is_star && alias.is_some() {
            self.error_at("star import cannot have an alias", start);
        }

        if !matches!(self.peek(), None | Some(Token::Newline | Token::Semi)) {
            self.error_here("unexpected tokens after import");
            self.scan(Scan::Statement, &mut Vec::new());
        }

        path.shrink_to_fit();
        module.imports.push(ImportDecl {
            path,
            is_static,
            is_star,
            alias,
            pos: start,
        });
    }

    fn parse_top_level_item(&mut self, module: &mut ModuleNode) {
        let start = self.pos;
        let (annotations, modifiers) = self.parse_annotations_and_modifiers();

        if self.at_type_start() {
            if let Some(decl) = self.parse_type_decl(annotations, modifiers) {
                module.types.push(decl);
            }
            return;
        }

        let has_prefix = !annotations.is_empty() || !modifiers.is_empty();
        if self.looks_like_method(has_prefix, true) {
            let method = self.parse_method(annotations, modifiers, false);
            module.script.methods.push(method);
            self.unclosed_body = false;
            return;
        }

        // Plain script statement: rewind over any annotations so closures in
        // their arguments are seen by the scan.
        self.pos = start;
        module.script.statement_count += 1;
        let before = self.pos;
        self.scan(Scan::Statement, &mut module.script.closures);
        if self.pos == before {
            self.error_here(format!(
                "unexpected {}",
                self.peek().map(|t| t.to_string()).unwrap_or_default()
            ));
            self.pos += 1;
        }
    }

    // ---- Token scanning ----

    /// Skips tokens according to `mode`, recording every closure literal.
    /// Returns false when input ended before a `Block` was closed.
    fn scan(&mut self, mode: Scan, closures: &mut Vec<ClosureNode>) -> bool {
        let mut stack: Vec<Open> = Vec::new();
        let mut closed_paren: Option<ParenKind> = None;
        let mut closure_depth: u16 = 0;

        loop {
            let Some(tok) = self.peek() else {
                return mode != Scan::Block;
            };

            if stack.is_empty() {
                match (mode, tok) {
                    (Scan::Block, Token::RBrace) => {
                        self.pos += 1;
                        return true;
                    }
                    (Scan::Statement | Scan::Initializer | Scan::Argument, Token::RBrace) => {
                        return true;
                    }
                    (Scan::Statement | Scan::Initializer, Token::Semi) => return true,
                    (Scan::Initializer | Scan::Argument, Token::Comma) => return true,
                    (Scan::Argument, Token::RParen) => return true,
                    (Scan::Statement | Scan::Initializer, Token::Newline)
                        if !self.line_continues() =>
                    {
                        return true;
                    }
                    _ => {}
                }
            }

            let pos = self.current_pos();
            let opened = match tok {
                Token::LBrace => Some(Open::Brace(
                    self.brace_kind(stack.last().copied(), closed_paren),
                )),
                Token::LParen => Some(Open::Paren(self.paren_kind())),
                Token::LBracket => Some(Open::Bracket),
                _ => None,
            };
            self.pos += 1;
            closed_paren = None;

            if let Some(open) = opened {
                if open == Open::Brace(BraceKind::Closure) {
                    closures.push(ClosureNode {
                        pos,
                        depth: closure_depth,
                    });
                    closure_depth += 1;
                }
                stack.push(open);
                continue;
            }

            if matches!(tok, Token::RBrace | Token::RParen | Token::RBracket) {
                // Unwind to the matching opener; stray closers are ignored.
                let Some(idx) = stack.iter().rposition(|open| open.closed_by(tok)) else {
                    continue;
                };
                while stack.len() > idx {
                    match stack.pop() {
                        Some(Open::Brace(BraceKind::Closure)) => {
                            closure_depth = closure_depth.saturating_sub(1);
                        }
                        Some(Open::Paren(kind)) if stack.len() == idx => {
                            closed_paren = Some(kind);
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn brace_kind(&self, enclosing: Option<Open>, closed_paren: Option<ParenKind>) -> BraceKind {
        // method bodies of an anonymous class
        if enclosing == Some(Open::Brace(BraceKind::ClassBody)) {
            return BraceKind::Block;
        }
        match closed_paren {
            Some(ParenKind::New) => BraceKind::ClassBody,
            Some(ParenKind::Plain) => BraceKind::Closure,
            Some(ParenKind::Control) => BraceKind::Block,
            None if self.opens_closure() => BraceKind::Closure,
            None => BraceKind::Block,
        }
    }

    /// Whether the `{` at the cursor starts a closure, judged by the token before it.
    fn opens_closure(&self) -> bool {
        match self.prev() {
            Some(
                Token::Assign
                | Token::LParen
                | Token::Comma
                | Token::Colon
                | Token::LBracket
                | Token::Arrow
                | Token::Op
                | Token::Question
                | Token::Return
                | Token::Star
                | Token::Amp,
            ) => true,
            Some(Token::Ident(_)) => {
                let before = self.pos.checked_sub(2).and_then(|i| self.token_at(i));
                !matches!(
                    before,
                    Some(
                        Token::Class
                            | Token::Interface
                            | Token::Trait
                            | Token::Enum
                            | Token::Extends
                            | Token::Implements
                    )
                )
            }
            _ => false,
        }
    }

    /// Classifies the `(` at the cursor.
    fn paren_kind(&self) -> ParenKind {
        let Some(prev) = self.prev() else {
            return ParenKind::Plain;
        };
        if prev.is_control() {
            return ParenKind::Control;
        }
        // new Foo<Bar>( ... ) { ... }
        let mut idx = self.pos;
        for _ in 0..16 {
            let Some(i) = idx.checked_sub(1) else { break };
            idx = i;
            match self.token_at(idx) {
                Some(Token::New) => return ParenKind::New,
                Some(
                    Token::Ident(_)
                    | Token::Dot
                    | Token::Lt
                    | Token::Gt
                    | Token::Comma
                    | Token::Question,
                ) => {}
                _ => break,
            }
        }
        ParenKind::Plain
    }

    /// At a newline outside brackets: does the statement go on?
    fn line_continues(&self) -> bool {
        if self.prev().is_some_and(|t| t.continues_line()) {
            return true;
        }
        let mut idx = self.pos;
        while self.token_at(idx) == Some(Token::Newline) {
            idx += 1;
        }
        matches!(self.token_at(idx), Some(Token::Dot | Token::NavDot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{InitializerKind, Member, TypeKind};

    fn parse_ok(source: &str) -> ModuleNode {
        let out = parse(source, "Test.groovy");
        assert!(
            !out.has_errors(),
            "unexpected diagnostics: {:?}",
            out.diagnostics
        );
        out.module
    }

    #[test]
    fn test_package_and_imports() {
        let module = parse_ok(
            "package com.acme\n\
             import java.util.List\n\
             import static java.lang.Math.max\n\
             import groovy.transform.*\n\
             import java.util.concurrent.ConcurrentHashMap as CHM\n",
        );
        assert_eq!(module.package_name(), Some("com.acme"));
        assert_eq!(module.imports.len(), 4);
        assert_eq!(module.imports[0].bound_name(), Some("List"));
        assert!(module.imports[1].is_static);
        assert_eq!(module.imports[1].type_path(), "java.lang.Math");
        assert!(module.imports[2].is_star);
        assert_eq!(module.imports[2].path, "groovy.transform");
        assert_eq!(module.imports[3].bound_name(), Some("CHM"));
    }

    #[test]
    fn test_class_with_members() {
        let module = parse_ok(
            r#"
            class Person extends Base implements Comparable<Person>, Serializable {
                String name
                private int age = 3
                static final Map<String, List<Integer>> CACHE = [:]

                Person(String name) { this.name = name }

                def greet(String other = "you") {
                    [1, 2].each { println it }
                    return "hi"
                }

                abstract void run()
            }
            "#,
        );
        let person = &module.types[0];
        assert_eq!(person.kind, TypeKind::Class);
        assert_eq!(person.name, "Person");
        assert!(person.complete);
        assert_eq!(person.extends[0].name, "Base");
        assert_eq!(person.implements.len(), 2);
        assert_eq!(person.implements[0].args[0].name, "Person");

        let fields: Vec<_> = person.fields().collect();
        assert_eq!(fields.len(), 3);
        assert!(fields[0].is_property());
        assert!(!fields[1].is_property());
        assert_eq!(fields[1].initializer, Some(InitializerKind::Number));
        assert_eq!(fields[2].type_ref.as_ref().map(|t| t.args.len()), Some(2));

        assert_eq!(person.constructors().count(), 1);
        let methods: Vec<_> = person.methods().collect();
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[0].name, "greet");
        assert!(methods[0].params[0].has_default);
        assert_eq!(methods[0].closures.len(), 1);
        assert!(!methods[1].has_body);
    }

    #[test]
    fn test_type_kinds() {
        let module = parse_ok(
            "interface A {}\ntrait B {}\nenum C { X, Y }\n@interface D { String value() default '' }\n",
        );
        let kinds: Vec<_> = module.types.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TypeKind::Interface,
                TypeKind::Trait,
                TypeKind::Enum,
                TypeKind::Annotation
            ]
        );
        let constants: Vec<_> = module.types[2]
            .members
            .iter()
            .filter(|m| matches!(m, Member::EnumConstant(_)))
            .collect();
        assert_eq!(constants.len(), 2);
    }

    #[test]
    fn test_enum_with_body() {
        let module = parse_ok(
            "enum Planet {\n  MERCURY(1.0), VENUS(2.0)\n\n  final double mass\n  Planet(double m) { mass = m }\n}\n",
        );
        let planet = &module.types[0];
        assert_eq!(planet.members.len(), 4);
        assert!(matches!(planet.members[3], Member::Constructor(_)));
    }

    #[test]
    fn test_nested_types() {
        let module = parse_ok("class Outer {\n  static class Inner {\n    def x\n  }\n}\n");
        let all = module.all_types();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].1, "Outer$Inner");
    }

    #[test]
    fn test_script_methods_and_closures() {
        let module = parse_ok(
            "def helper(x) { x * 2 }\nprintln helper(2)\nlist.each { item ->\n  item.collect { it }\n}\n",
        );
        assert_eq!(module.script.methods.len(), 1);
        assert_eq!(module.script.statement_count, 2);
        assert_eq!(module.script.closures.len(), 2);
        assert_eq!(module.script.closures[1].depth, 1);
    }

    #[test]
    fn test_blocks_are_not_closures() {
        let module = parse_ok(
            "class A {\n  def run() {\n    if (x) { y() } else { z() }\n    for (i in 0..3) { }\n    try { } catch (e) { } finally { }\n    new Runnable() { void run() {} }\n  }\n}\n",
        );
        let run = module.types[0].methods().next().unwrap();
        assert!(run.closures.is_empty(), "{:?}", run.closures);
    }

    #[test]
    fn test_multiline_statement_continuation() {
        let module = parse_ok("def total = 1 +\n   2\nitems\n   .findAll { it }\n");
        assert_eq!(module.script.statement_count, 2);
        assert_eq!(module.script.closures.len(), 1);
    }

    #[test]
    fn test_missing_closing_brace_keeps_partial_type() {
        let out = parse("class Broken {\n  String a\n  def m() {\n", "Broken.groovy");
        assert!(out.has_errors());
        let broken = &out.module.types[0];
        assert_eq!(broken.name, "Broken");
        assert!(!broken.complete);
        assert_eq!(broken.fields().count(), 1);
    }

    #[test]
    fn test_recovers_after_bad_member() {
        let out = parse("class A {\n  ) junk\n  String ok\n}\n", "A.groovy");
        assert_eq!(out.diagnostics.len(), 1);
        assert_eq!(out.diagnostics[0].line, 2);
        assert_eq!(out.module.types[0].fields().count(), 1);
        assert!(out.module.types[0].complete);
    }

    #[test]
    fn test_unterminated_comment_yields_partial_tree() {
        let out = parse("class Visible {\n  int a\n}\n/* dangling", "C.groovy");
        assert!(out.has_errors());
        assert!(
            out.diagnostics
                .iter()
                .any(|d| d.message.contains("unterminated block comment"))
        );
        assert_eq!(out.module.types.len(), 1);
    }
}
