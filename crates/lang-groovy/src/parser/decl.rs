use super::{Parser, Scan};
use crate::ast::{
    AnnotationNode, ClosureNode, EnumConstantDecl, FieldDecl, InitializerDecl, InitializerKind,
    Member, MethodDecl, Modifier, Modifiers, Parameter, TypeDecl, TypeKind, TypeRef,
};
use crate::lexer::{Pos, Token};

impl<'src> Parser<'src, '_> {
    // ---- Modifiers and annotations ----

    pub(super) fn parse_annotations_and_modifiers(&mut self) -> (Vec<AnnotationNode>, Modifiers) {
        let mut annotations = Vec::new();
        let mut modifiers = Vec::new();

        loop {
            match self.peek() {
                Some(Token::At) if self.peek_at(1) != Some(Token::Interface) => {
                    let pos = self.current_pos();
                    self.pos += 1;
                    match self.parse_qualified_name() {
                        Some((name, _)) => annotations.push(AnnotationNode { name, pos }),
                        None => self.error_here("expected annotation name"),
                    }
                    if self.at(Token::LParen) {
                        self.pos += 1;
                        self.skip_balanced_parens();
                    }
                }
                Some(tok) if tok.is_modifier() => {
                    // `default` only acts as a modifier ahead of a declaration
                    if tok == Token::Default && self.peek_at(1) == Some(Token::Colon) {
                        break;
                    }
                    self.pos += 1;
                    if let Some(m) = modifier_of(tok) {
                        if modifiers.contains(&m) {
                            self.error_at(format!("repeated modifier '{}'", tok_text(tok)), self.prev_pos());
                        }
                        modifiers.push(m);
                    }
                }
                _ => break,
            }
            self.skip_newlines();
        }

        (annotations, Modifiers(modifiers))
    }

    fn prev_pos(&self) -> Pos {
        match self.pos.checked_sub(1).and_then(|i| self.tokens.get(i)) {
            Some((_, span)) => self.lines.pos(self.source, span.start),
            None => Pos::new(1, 1),
        }
    }

    /// Consumes up to and including the `)` matching an already consumed `(`.
    fn skip_balanced_parens(&mut self) {
        let mut scratch = Vec::new();
        loop {
            self.scan(Scan::Argument, &mut scratch);
            match self.bump() {
                Some(Token::RParen) | None => return,
                // `,` or a stray `}` inside the argument list
                Some(_) => {}
            }
        }
    }

    // ---- Type declarations ----

    pub(super) fn at_type_start(&self) -> bool {
        match self.peek() {
            Some(Token::Class | Token::Interface | Token::Trait | Token::Enum) => true,
            Some(Token::At) => self.peek_at(1) == Some(Token::Interface),
            _ => false,
        }
    }

    pub(super) fn parse_type_decl(
        &mut self,
        annotations: Vec<AnnotationNode>,
        modifiers: Modifiers,
    ) -> Option<TypeDecl> {
        let kind = match self.bump()? {
            Token::Class => TypeKind::Class,
            Token::Interface => TypeKind::Interface,
            Token::Trait => TypeKind::Trait,
            Token::Enum => TypeKind::Enum,
            _ => {
                // `@interface`
                self.pos += 1;
                TypeKind::Annotation
            }
        };

        let Some((name, pos)) = self.eat_name() else {
            self.error_here(format!("expected a name after '{}'", kind.keyword()));
            self.scan(Scan::Statement, &mut Vec::new());
            return None;
        };

        let mut decl = TypeDecl {
            kind,
            name: name.to_string(),
            pos,
            modifiers,
            annotations,
            type_params: Vec::new(),
            extends: Vec::new(),
            implements: Vec::new(),
            members: Vec::new(),
            end: pos,
            complete: false,
        };

        if self.at(Token::Lt) {
            decl.type_params = self.parse_type_params();
        }

        loop {
            self.skip_newlines();
            match self.peek() {
                Some(Token::Extends) => {
                    self.pos += 1;
                    let list = self.parse_type_list();
                    decl.extends.extend(list);
                }
                Some(Token::Implements) => {
                    self.pos += 1;
                    let list = self.parse_type_list();
                    decl.implements.extend(list);
                }
                _ => break,
            }
        }

        if !self.eat(Token::LBrace) {
            self.error_here(format!("expected '{{' to open {} {}", kind.keyword(), decl.name));
            decl.end = self.current_pos();
            self.scan(Scan::Statement, &mut Vec::new());
            return Some(decl);
        }

        if kind == TypeKind::Enum {
            self.parse_enum_constants(&mut decl);
        }
        self.parse_type_body(&mut decl);
        Some(decl)
    }

    fn parse_type_list(&mut self) -> Vec<TypeRef> {
        let mut list = Vec::new();
        loop {
            self.skip_newlines();
            match self.parse_type_ref() {
                Some(t) => list.push(t),
                None => {
                    self.error_here("expected a type name");
                    break;
                }
            }
            if !self.eat(Token::Comma) {
                break;
            }
        }
        list
    }

    fn parse_type_body(&mut self, decl: &mut TypeDecl) {
        loop {
            self.skip_separators();
            match self.peek() {
                None => {
                    let end = self.end_pos();
                    self.error_at(
                        format!("missing '}}' to close {} {}", decl.kind.keyword(), decl.name),
                        end,
                    );
                    decl.end = end;
                    return;
                }
                Some(Token::RBrace) => {
                    decl.end = self.current_pos();
                    self.pos += 1;
                    decl.complete = true;
                    return;
                }
                Some(Token::LBrace) => {
                    if !self.parse_initializer(decl, false) {
                        decl.end = self.end_pos();
                        return;
                    }
                }
                Some(Token::Static) if self.peek_at(1) == Some(Token::LBrace) => {
                    self.pos += 1;
                    if !self.parse_initializer(decl, true) {
                        decl.end = self.end_pos();
                        return;
                    }
                }
                Some(_) => {
                    if !self.parse_member(decl) {
                        decl.end = self.end_pos();
                        return;
                    }
                }
            }
        }
    }

    fn parse_initializer(&mut self, decl: &mut TypeDecl, is_static: bool) -> bool {
        let pos = self.current_pos();
        self.pos += 1;
        let mut closures = Vec::new();
        let closed = self.scan(Scan::Block, &mut closures);
        decl.members.push(Member::Initializer(InitializerDecl {
            is_static,
            pos,
            closures,
        }));
        if !closed {
            self.report_unclosed_body(decl);
        }
        closed
    }

    fn report_unclosed_body(&mut self, decl: &TypeDecl) {
        let end = self.end_pos();
        self.error_at(
            format!("missing '}}' to close {} {}", decl.kind.keyword(), decl.name),
            end,
        );
    }

    fn parse_enum_constants(&mut self, decl: &mut TypeDecl) {
        loop {
            self.skip_newlines();
            let start = self.pos;
            let (annotations, _) = self.parse_annotations_and_modifiers();
            let is_constant = matches!(self.peek(), Some(Token::Ident(_)))
                && matches!(
                    self.peek_at(1),
                    Some(
                        Token::Comma
                            | Token::LParen
                            | Token::LBrace
                            | Token::Semi
                            | Token::RBrace
                            | Token::Newline
                    ) | None
                );
            if !is_constant {
                self.pos = start;
                return;
            }

            let Some((name, pos)) = self.eat_name() else {
                self.pos = start;
                return;
            };
            let mut closures = Vec::new();
            if self.eat(Token::LParen) {
                loop {
                    self.scan(Scan::Argument, &mut closures);
                    match self.bump() {
                        Some(Token::RParen) | None => break,
                        Some(_) => {}
                    }
                }
            }
            if self.eat(Token::LBrace) && !self.scan(Scan::Block, &mut closures) {
                self.error_at(format!("missing '}}' to close enum constant {name}"), pos);
            }
            decl.members.push(Member::EnumConstant(EnumConstantDecl {
                name: name.to_string(),
                pos,
                annotations,
                closures,
            }));

            self.skip_newlines();
            if !self.eat(Token::Comma) {
                self.eat(Token::Semi);
                return;
            }
        }
    }

    /// Parses one member. Returns false when input ended inside it.
    fn parse_member(&mut self, decl: &mut TypeDecl) -> bool {
        let start = self.pos;
        let (annotations, modifiers) = self.parse_annotations_and_modifiers();

        if self.at_type_start() {
            let Some(nested) = self.parse_type_decl(annotations, modifiers) else {
                return true;
            };
            let complete = nested.complete;
            decl.members.push(Member::Type(nested));
            if !complete && self.peek().is_none() {
                self.report_unclosed_body(decl);
                return false;
            }
            return true;
        }

        // Constructor: `Name(` where Name is the enclosing type.
        let is_ctor = matches!(self.peek(), Some(Token::Ident(n)) if n == decl.name)
            && self.peek_at(1) == Some(Token::LParen);
        if is_ctor {
            let ctor = self.parse_method(annotations, modifiers, true);
            decl.members.push(Member::Constructor(ctor));
            return self.finish_member(decl);
        }

        let has_prefix = !annotations.is_empty() || !modifiers.is_empty();
        if self.looks_like_method(has_prefix, false) {
            let method = self.parse_method(annotations, modifiers, false);
            decl.members.push(Member::Method(method));
            return self.finish_member(decl);
        }

        if self.looks_like_field(has_prefix) {
            self.parse_fields(decl, annotations, modifiers);
            return self.finish_member(decl);
        }

        // Nothing recognizable: report once, then skip the line.
        let here = self.peek().map(|t| t.to_string()).unwrap_or_default();
        self.error_here(format!(
            "unexpected {here} in {} {}",
            decl.kind.keyword(),
            decl.name
        ));
        self.scan(Scan::Statement, &mut Vec::new());
        if self.pos == start {
            self.pos += 1;
        }
        true
    }

    /// A member whose body ran to the end of input leaves the type open.
    fn finish_member(&mut self, decl: &TypeDecl) -> bool {
        if std::mem::take(&mut self.unclosed_body) {
            self.report_unclosed_body(decl);
            return false;
        }
        true
    }

    // ---- Methods ----

    /// After annotations and modifiers: `[<T>] (def | void | Type)? name (`.
    /// Script level methods must also show a body, which tells them apart
    /// from command expressions such as `println helper(2)`.
    pub(super) fn looks_like_method(&self, has_prefix: bool, require_body: bool) -> bool {
        let mut idx = self.pos;
        if self.token_at(idx) == Some(Token::Lt) {
            match self.skip_angles(idx) {
                Some(end) => idx = end,
                None => return false,
            }
        }

        match self.token_at(idx) {
            Some(Token::Def | Token::Void) => idx += 1,
            _ => match self.scan_type_ref(idx) {
                Some(end) if matches!(self.token_at(end), Some(Token::Ident(_) | Token::Str(_))) => {
                    idx = end
                }
                _ if has_prefix => {}
                _ => return false,
            },
        }

        let named = matches!(
            self.token_at(idx),
            Some(Token::Ident(_) | Token::Str(_) | Token::Trait | Token::Var)
        ) && self.token_at(idx + 1) == Some(Token::LParen);
        if !named || !require_body {
            return named;
        }

        let Some(mut after) = self.matching_paren(idx + 1) else {
            return false;
        };
        while self.token_at(after) == Some(Token::Newline) {
            after += 1;
        }
        matches!(self.token_at(after), Some(Token::LBrace | Token::Throws))
    }

    /// Index just past the `)` matching the `(` at `idx`.
    fn matching_paren(&self, idx: usize) -> Option<usize> {
        let mut depth = 0usize;
        let mut i = idx;
        loop {
            match self.token_at(i)? {
                Token::LParen => depth += 1,
                Token::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i + 1);
                    }
                }
                _ => {}
            }
            i += 1;
        }
    }

    pub(super) fn parse_method(
        &mut self,
        annotations: Vec<AnnotationNode>,
        modifiers: Modifiers,
        is_ctor: bool,
    ) -> MethodDecl {
        let type_params = if self.at(Token::Lt) {
            self.parse_type_params()
        } else {
            Vec::new()
        };

        let mut return_type = None;
        if !is_ctor {
            match self.peek() {
                Some(Token::Def) => self.pos += 1,
                Some(Token::Void) => {
                    return_type = Some(TypeRef::simple("void", self.current_pos()));
                    self.pos += 1;
                }
                _ => {
                    let is_typed = self
                        .scan_type_ref(self.pos)
                        .is_some_and(|end| matches!(self.token_at(end), Some(Token::Ident(_) | Token::Str(_))));
                    if is_typed {
                        return_type = self.parse_type_ref();
                    }
                }
            }
        }

        let pos = self.current_pos();
        let name = match self.bump() {
            Some(Token::Str(s)) => unquote(s).to_string(),
            Some(tok) => Self::name_of(tok).unwrap_or_default().to_string(),
            None => String::new(),
        };

        let mut closures = Vec::new();
        let params = if self.eat(Token::LParen) {
            self.parse_params(&mut closures)
        } else {
            Vec::new()
        };

        let mut throws = Vec::new();
        self.skip_newlines_if(|t| t == Token::Throws);
        if self.eat(Token::Throws) {
            throws = self.parse_type_list();
        }

        // annotation member default: `String value() default 'x'`
        if self.eat(Token::Default) {
            self.scan(Scan::Statement, &mut closures);
        }

        self.skip_newlines_if(|t| t == Token::LBrace);
        let mut has_body = false;
        if self.eat(Token::LBrace) {
            has_body = true;
            if !self.scan(Scan::Block, &mut closures) {
                self.unclosed_body = true;
                self.error_at(format!("missing '}}' to close method {name}"), pos);
            }
        }

        MethodDecl {
            name,
            pos,
            modifiers,
            annotations,
            type_params,
            return_type,
            params,
            throws,
            has_body,
            closures,
        }
    }

    /// Skips newlines only when the next real token satisfies `pred`.
    fn skip_newlines_if(&mut self, pred: impl Fn(Token<'src>) -> bool) {
        let mut idx = self.pos;
        while self.token_at(idx) == Some(Token::Newline) {
            idx += 1;
        }
        if self.token_at(idx).is_some_and(pred) {
            self.pos = idx;
        }
    }

    fn parse_params(&mut self, closures: &mut Vec<ClosureNode>) -> Vec<Parameter> {
        let mut params = Vec::new();
        loop {
            self.skip_newlines();
            if self.eat(Token::RParen) {
                return params;
            }
            let Some(tok) = self.peek() else {
                return params;
            };
            let start = self.pos;
            let _ = self.parse_annotations_and_modifiers();

            let mut type_ref = None;
            let mut varargs = false;
            if !self.eat(Token::Def) {
                if let Some(end) = self.scan_type_ref(self.pos) {
                    let next = self.token_at(end);
                    let names_follow = matches!(next, Some(Token::Ident(_)))
                        || (next == Some(Token::Ellipsis)
                            && matches!(self.token_at(end + 1), Some(Token::Ident(_))));
                    if names_follow {
                        type_ref = self.parse_type_ref();
                        varargs = self.eat(Token::Ellipsis);
                    }
                }
            }

            match self.eat_name() {
                Some((name, pos)) => {
                    let has_default = self.eat(Token::Assign);
                    if has_default {
                        self.scan(Scan::Argument, closures);
                    }
                    params.push(Parameter {
                        name: name.to_string(),
                        type_ref,
                        pos,
                        has_default,
                        varargs,
                    });
                }
                None => {
                    self.error_here(format!("unexpected {tok} in parameter list"));
                    self.scan(Scan::Argument, closures);
                }
            }

            self.skip_newlines();
            match self.peek() {
                Some(Token::Comma) => self.pos += 1,
                Some(Token::RParen) => {}
                None => return params,
                Some(_) => {
                    self.error_here("expected ',' or ')' in parameter list");
                    self.scan(Scan::Argument, closures);
                    if self.pos == start {
                        self.pos += 1;
                    }
                    if !matches!(self.peek(), Some(Token::Comma | Token::RParen)) {
                        return params;
                    }
                    self.eat(Token::Comma);
                }
            }
        }
    }

    // ---- Fields ----

    fn looks_like_field(&self, has_prefix: bool) -> bool {
        match self.peek() {
            Some(Token::Def | Token::Var) => true,
            Some(tok) if Self::name_of(tok).is_some() => {
                let typed = self
                    .scan_type_ref(self.pos)
                    .is_some_and(|end| matches!(self.token_at(end), Some(Token::Ident(_))));
                typed || has_prefix
            }
            _ => false,
        }
    }

    fn parse_fields(
        &mut self,
        decl: &mut TypeDecl,
        annotations: Vec<AnnotationNode>,
        modifiers: Modifiers,
    ) {
        let mut type_ref = None;
        if !self.eat(Token::Def) && !self.eat(Token::Var) {
            let typed = self
                .scan_type_ref(self.pos)
                .is_some_and(|end| matches!(self.token_at(end), Some(Token::Ident(_))));
            if typed {
                type_ref = self.parse_type_ref();
            }
        }

        loop {
            let Some((name, pos)) = self.eat_name() else {
                self.error_here("expected a field name");
                self.scan(Scan::Statement, &mut Vec::new());
                return;
            };

            let mut closures = Vec::new();
            let mut initializer = None;
            if self.eat(Token::Assign) {
                self.skip_newlines();
                initializer = Some(match self.peek() {
                    Some(Token::Str(_) | Token::TextBlock) => InitializerKind::String,
                    Some(Token::Number(_)) => InitializerKind::Number,
                    Some(Token::True | Token::False) => InitializerKind::Boolean,
                    Some(Token::Null) => InitializerKind::Null,
                    Some(Token::LBrace) => InitializerKind::Closure,
                    Some(Token::LBracket) => InitializerKind::List,
                    _ => InitializerKind::Expression,
                });
                // a literal followed by more tokens is an expression
                let first = self.pos;
                self.scan(Scan::Initializer, &mut closures);
                let literal = matches!(
                    initializer,
                    Some(InitializerKind::String | InitializerKind::Number | InitializerKind::Boolean | InitializerKind::Null)
                );
                if literal && self.pos > first + 1 {
                    initializer = Some(InitializerKind::Expression);
                }
            }

            decl.members.push(Member::Field(FieldDecl {
                name: name.to_string(),
                pos,
                modifiers: modifiers.clone(),
                annotations: annotations.clone(),
                type_ref: type_ref.clone(),
                initializer,
                closures,
            }));

            if !self.eat(Token::Comma) {
                break;
            }
            self.skip_newlines();
        }

        if !matches!(
            self.peek(),
            None | Some(Token::Newline | Token::Semi | Token::RBrace)
        ) {
            self.error_here("expected end of field declaration");
            self.scan(Scan::Statement, &mut Vec::new());
        }
    }

    // ---- Type references ----

    /// Index just past a type reference starting at `idx`, without consuming.
    pub(super) fn scan_type_ref(&self, idx: usize) -> Option<usize> {
        let mut i = idx;
        self.token_at(i).and_then(Self::name_of)?;
        i += 1;
        while self.token_at(i) == Some(Token::Dot)
            && self.token_at(i + 1).and_then(Self::name_of).is_some()
        {
            i += 2;
        }
        if self.token_at(i) == Some(Token::Lt) {
            i = self.skip_angles(i)?;
        }
        while self.token_at(i) == Some(Token::LBracket) && self.token_at(i + 1) == Some(Token::RBracket) {
            i += 2;
        }
        Some(i)
    }

    /// Index just past the `>` matching the `<` at `idx`.
    fn skip_angles(&self, idx: usize) -> Option<usize> {
        let mut depth = 0usize;
        let mut i = idx;
        loop {
            match self.token_at(i)? {
                Token::Lt => depth += 1,
                Token::Gt => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i + 1);
                    }
                }
                Token::Ident(_)
                | Token::Dot
                | Token::Comma
                | Token::Question
                | Token::Extends
                | Token::Amp
                | Token::LBracket
                | Token::RBracket
                | Token::Newline => {}
                _ => return None,
            }
            i += 1;
        }
    }

    pub(super) fn parse_type_ref(&mut self) -> Option<TypeRef> {
        let (name, pos) = self.parse_qualified_name()?;
        let mut type_ref = TypeRef::simple(name, pos);

        if self.eat(Token::Lt) {
            loop {
                self.skip_newlines();
                if self.eat(Token::Question) {
                    let bounded = self.eat(Token::Extends)
                        || (self.peek() == Some(Token::Ident("super")) && self.bump().is_some());
                    if bounded {
                        if let Some(bound) = self.parse_type_ref() {
                            type_ref.args.push(bound);
                        }
                    }
                } else if let Some(arg) = self.parse_type_ref() {
                    type_ref.args.push(arg);
                } else {
                    self.error_here("expected a type argument");
                    break;
                }
                self.skip_newlines();
                if !self.eat(Token::Comma) {
                    break;
                }
            }
            if !self.eat(Token::Gt) {
                self.error_here("expected '>' to close type arguments");
            }
        }

        while self.at(Token::LBracket) && self.peek_at(1) == Some(Token::RBracket) {
            self.pos += 2;
            type_ref.array_dims = type_ref.array_dims.saturating_add(1);
        }
        Some(type_ref)
    }

    /// `<T, U extends Comparable<U>>`, returning the declared names.
    pub(super) fn parse_type_params(&mut self) -> Vec<String> {
        let mut names = Vec::new();
        let Some(end) = self.skip_angles(self.pos) else {
            self.error_here("malformed type parameters");
            self.pos += 1;
            return names;
        };
        let mut depth = 0usize;
        let mut expect_name = false;
        while self.pos < end {
            match self.peek() {
                Some(Token::Lt) => {
                    depth += 1;
                    expect_name = depth == 1;
                }
                Some(Token::Gt) => depth = depth.saturating_sub(1),
                Some(Token::Comma) => expect_name = depth == 1,
                Some(Token::Ident(name)) if expect_name => {
                    names.push(name.to_string());
                    expect_name = false;
                }
                _ => {}
            }
            self.pos += 1;
        }
        names
    }
}

fn modifier_of(tok: Token<'_>) -> Option<Modifier> {
    Some(match tok {
        Token::Public => Modifier::Public,
        Token::Protected => Modifier::Protected,
        Token::Private => Modifier::Private,
        Token::Static => Modifier::Static,
        Token::Abstract => Modifier::Abstract,
        Token::Final => Modifier::Final,
        Token::Synchronized => Modifier::Synchronized,
        Token::Native => Modifier::Native,
        Token::Transient => Modifier::Transient,
        Token::Volatile => Modifier::Volatile,
        Token::Strictfp => Modifier::Strictfp,
        Token::Default => Modifier::Default,
        _ => return None,
    })
}

fn tok_text(tok: Token<'_>) -> String {
    format!("{tok:?}").to_lowercase()
}

fn unquote(s: &str) -> &str {
    s.get(1..s.len().saturating_sub(1)).unwrap_or(s)
}
