//! Groovy tokenizer built on Logos.
//!
//! Comments are dropped, newlines are kept because Groovy statements end at
//! line breaks. Lexer errors never abort: they are reported as syntax
//! diagnostics and scanning resumes after the offending bytes.

use logos::{Lexer, Logos};
use std::fmt;
use std::ops::Range;

/// Byte range in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl From<Range<usize>> for Span {
    fn from(range: Range<usize>) -> Self {
        Self {
            start: range.start,
            end: range.end,
        }
    }
}

/// 1-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

impl Pos {
    pub fn new(line: u32, column: u32) -> Self {
        Self {
            line: line.max(1),
            column: column.max(1),
        }
    }
}

/// Maps byte offsets to line/column pairs.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { line_starts }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    pub fn pos(&self, source: &str, offset: usize) -> Pos {
        let offset = offset.min(source.len());
        let line = match self.line_starts.binary_search(&offset) {
            Ok(l) => l,
            Err(l) => l - 1,
        };
        let start = self.line_starts[line];
        let column = source
            .get(start..offset)
            .map(|s| s.chars().count())
            .unwrap_or(offset - start);
        Pos::new(line as u32 + 1, column as u32 + 1)
    }
}

fn block_comment<'s>(lex: &mut Lexer<'s, Token<'s>>) -> bool {
    match lex.remainder().find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            true
        }
        None => {
            lex.bump(lex.remainder().len());
            false
        }
    }
}

fn triple_quoted<'s>(lex: &mut Lexer<'s, Token<'s>>, delimiter: &str) -> bool {
    let rest = lex.remainder();
    let mut search = 0;
    while let Some(found) = rest[search..].find(delimiter) {
        let at = search + found;
        let escaped = rest[..at].chars().rev().take_while(|c| *c == '\\').count() % 2 == 1;
        if !escaped {
            lex.bump(at + delimiter.len());
            return true;
        }
        search = at + 1;
    }
    lex.bump(rest.len());
    false
}

fn triple_double<'s>(lex: &mut Lexer<'s, Token<'s>>) -> bool {
    triple_quoted(lex, "\"\"\"")
}

fn triple_single<'s>(lex: &mut Lexer<'s, Token<'s>>) -> bool {
    triple_quoted(lex, "'''")
}

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\f]+")]
#[logos(skip r"\\\r?\n")]
pub enum Token<'src> {
    // ===== Trivia kept for the parser =====
    #[token("\n")]
    Newline,

    #[regex(r"//[^\n]*")]
    LineComment,

    #[token("/*", block_comment)]
    BlockComment,

    #[regex(r"#![^\n]*")]
    Shebang,

    // ===== Literals =====
    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| lex.slice())]
    #[regex(r"'([^'\\\n]|\\.)*'", |lex| lex.slice())]
    Str(&'src str),

    #[token("\"\"\"", triple_double)]
    #[token("'''", triple_single)]
    TextBlock,

    #[regex(r"[0-9][0-9_]*(\.[0-9][0-9_]*)?([eE][+-]?[0-9]+)?[a-zA-Z]?", |lex| lex.slice())]
    #[regex(r"0[xX][0-9a-fA-F_]+[lLiI]?", |lex| lex.slice())]
    Number(&'src str),

    #[regex(r"[a-zA-Z_$][a-zA-Z0-9_$]*", |lex| lex.slice())]
    Ident(&'src str),

    // ===== Declaration keywords =====
    #[token("package")]
    Package,
    #[token("import")]
    Import,
    #[token("class")]
    Class,
    #[token("interface")]
    Interface,
    #[token("trait")]
    Trait,
    #[token("enum")]
    Enum,
    #[token("extends")]
    Extends,
    #[token("implements")]
    Implements,
    #[token("throws")]
    Throws,
    #[token("def")]
    Def,
    #[token("var")]
    Var,
    #[token("void")]
    Void,
    #[token("as")]
    As,
    #[token("new")]
    New,
    #[token("default")]
    Default,

    // ===== Modifiers =====
    #[token("public")]
    Public,
    #[token("protected")]
    Protected,
    #[token("private")]
    Private,
    #[token("static")]
    Static,
    #[token("abstract")]
    Abstract,
    #[token("final")]
    Final,
    #[token("synchronized")]
    Synchronized,
    #[token("native")]
    Native,
    #[token("transient")]
    Transient,
    #[token("volatile")]
    Volatile,
    #[token("strictfp")]
    Strictfp,

    // ===== Statement keywords =====
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("for")]
    For,
    #[token("while")]
    While,
    #[token("do")]
    Do,
    #[token("switch")]
    Switch,
    #[token("case")]
    Case,
    #[token("try")]
    Try,
    #[token("catch")]
    Catch,
    #[token("finally")]
    Finally,
    #[token("return")]
    Return,
    #[token("throw")]
    Throw,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    // ===== Punctuation =====
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token(".")]
    Dot,
    #[token("?.")]
    #[token("*.")]
    #[token(".&")]
    #[token(".@")]
    NavDot,
    #[token("...")]
    Ellipsis,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("=")]
    Assign,
    #[token("->")]
    Arrow,
    #[token("@")]
    At,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,
    #[token("*", priority = 3)]
    Star,
    #[token("&")]
    Amp,

    /// Any other operator; only its presence matters to the parser.
    #[regex(r"==|!=|<=|>=|&&|\|\||\+\+|--|\?:|\*\*|=~|==~|<=>|\.\.|\.\.<|[+\-*/%^|!~]=?")]
    Op,

    /// Placeholder produced by [`tokenize`] for bytes Logos could not match.
    Error,
}

impl Token<'_> {
    pub fn is_modifier(&self) -> bool {
        matches!(
            self,
            Token::Public
                | Token::Protected
                | Token::Private
                | Token::Static
                | Token::Abstract
                | Token::Final
                | Token::Synchronized
                | Token::Native
                | Token::Transient
                | Token::Volatile
                | Token::Strictfp
                | Token::Default
        )
    }

    /// Keywords that introduce a parenthesized condition followed by a block.
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Token::If | Token::For | Token::While | Token::Switch | Token::Catch | Token::Synchronized
        )
    }

    /// Tokens after which a line break does not end the statement.
    pub fn continues_line(&self) -> bool {
        matches!(
            self,
            Token::Op
                | Token::Assign
                | Token::Comma
                | Token::Dot
                | Token::NavDot
                | Token::Arrow
                | Token::Question
                | Token::Colon
                | Token::Star
                | Token::Amp
                | Token::Lt
                | Token::LParen
                | Token::LBracket
                | Token::New
                | Token::Return
        )
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Newline => write!(f, "newline"),
            Token::Str(s) | Token::Number(s) | Token::Ident(s) => write!(f, "'{s}'"),
            Token::TextBlock => write!(f, "text block"),
            Token::LBrace => write!(f, "'{{'"),
            Token::RBrace => write!(f, "'}}'"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
            Token::Error => write!(f, "invalid input"),
            other => write!(f, "{}", format!("{other:?}").to_lowercase()),
        }
    }
}

/// A lexer failure, already positioned for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

/// Tokenizes `source`, dropping comments and collecting lexer errors.
pub fn tokenize(source: &str) -> (Vec<(Token<'_>, Span)>, Vec<LexError>) {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let mut lexer = Token::lexer(source);

    while let Some(result) = lexer.next() {
        let span: Span = lexer.span().into();
        match result {
            Ok(Token::LineComment | Token::BlockComment | Token::Shebang) => {}
            Ok(token) => tokens.push((token, span)),
            Err(()) => {
                let slice = lexer.slice();
                let message = if slice.starts_with("/*") {
                    "unterminated block comment".to_string()
                } else if slice.starts_with("\"\"\"") || slice.starts_with("'''") {
                    "unterminated text block".to_string()
                } else if slice.starts_with('"') || slice.starts_with('\'') {
                    "unterminated string literal".to_string()
                } else if slice.is_ascii() {
                    format!("unexpected character '{}'", slice.escape_debug())
                } else {
                    // Non-ASCII identifiers and symbols are tolerated silently.
                    continue;
                };
                errors.push(LexError { message, span });
                tokens.push((Token::Error, span));
            }
        }
    }

    (tokens, errors)
}
