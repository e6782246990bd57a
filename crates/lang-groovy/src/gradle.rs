//! Gradle build and settings scripts, read from the token stream.
//!
//! Only the declarative subset matters here: `dependencies { ... }` entries
//! in string, map or `project(...)` notation, `rootProject.name` and
//! `include` calls. Anything dynamic is ignored.

use crate::error::{GroovyError, Result};
use crate::lexer::{Span, Token, tokenize};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradleDependency {
    pub group: Option<String>,
    pub name: String,
    pub version: Option<String>,
    pub is_project: bool,
    pub configuration: String,
}

impl GradleDependency {
    /// `group:name:version` for external dependencies, the project path otherwise.
    pub fn coordinate(&self) -> String {
        match (&self.group, &self.version) {
            (Some(g), Some(v)) => format!("{g}:{}:{v}", self.name),
            (Some(g), None) => format!("{g}:{}", self.name),
            _ => self.name.clone(),
        }
    }

    /// Configurations only visible to tests.
    pub fn is_test_only(&self) -> bool {
        self.configuration.starts_with("test") || self.configuration.starts_with("androidTest")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradleSettings {
    pub root_project_name: Option<String>,
    pub included_projects: Vec<String>,
}

/// Calls whose string arguments are not library coordinates.
const NON_COORDINATE_CALLS: &[&str] = &[
    "platform",
    "enforcedPlatform",
    "files",
    "fileTree",
    "gradleApi",
    "localGroovy",
    "testFixtures",
];

type Tokens<'a> = Vec<(Token<'a>, Span)>;

fn lex(source: &str) -> Result<Tokens<'_>> {
    let (tokens, errors) = tokenize(source);
    match errors.into_iter().find(|e| !e.message.starts_with("unexpected")) {
        Some(e) => Err(GroovyError::Parsing(format!(
            "{} at byte {}",
            e.message, e.span.start
        ))),
        None => Ok(tokens),
    }
}

fn string_value(token: &Token<'_>) -> Option<String> {
    match token {
        Token::Str(s) if s.len() >= 2 => Some(s[1..s.len() - 1].to_string()),
        _ => None,
    }
}

fn ident_is(token: Option<&Token<'_>>, name: &str) -> bool {
    matches!(token, Some(Token::Ident(n)) if *n == name)
}

/// Simple `name = 'value'` assignments, used to expand `$name` in coordinates.
fn collect_string_variables(tokens: &[(Token<'_>, Span)]) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for window in tokens.windows(3) {
        if let [(Token::Ident(name), _), (Token::Assign, _), (value, _)] = window {
            if let Some(value) = string_value(value) {
                vars.insert((*name).to_string(), value);
            }
        }
    }
    vars
}

fn expand(value: &str, vars: &HashMap<String, String>) -> String {
    if !value.contains('$') {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(idx) = rest.find('$') {
        out.push_str(&rest[..idx]);
        let after = &rest[idx + 1..];
        let (name, consumed) = if let Some(inner) = after.strip_prefix('{') {
            match inner.find('}') {
                Some(end) => (&inner[..end], end + 2),
                None => ("", 0),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '.'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };
        match vars.get(name) {
            Some(v) if consumed > 0 => out.push_str(v),
            _ => {
                out.push('$');
                out.push_str(&after[..consumed]);
            }
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);
    out
}

/// Index one past the brace matching the `{` at `open`.
fn block_end(tokens: &[(Token<'_>, Span)], open: usize) -> usize {
    let mut depth = 0usize;
    for (i, (tok, _)) in tokens.iter().enumerate().skip(open) {
        match tok {
            Token::LBrace => depth += 1,
            Token::RBrace => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
    }
    tokens.len()
}

fn next_significant(tokens: &[(Token<'_>, Span)], mut idx: usize) -> usize {
    while matches!(tokens.get(idx), Some((Token::Newline, _))) {
        idx += 1;
    }
    idx
}

/// Splits a block body into top-level statements.
fn statements<'t, 'a>(body: &'t [(Token<'a>, Span)]) -> Vec<&'t [(Token<'a>, Span)]> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, (tok, _)) in body.iter().enumerate() {
        match tok {
            Token::LParen | Token::LBracket | Token::LBrace => depth += 1,
            Token::RParen | Token::RBracket | Token::RBrace => depth -= 1,
            Token::Newline | Token::Semi if depth <= 0 => {
                let continued = i
                    .checked_sub(1)
                    .and_then(|p| body.get(p))
                    .is_some_and(|(t, _)| t.continues_line());
                if !continued {
                    if i > start {
                        out.push(&body[start..i]);
                    }
                    start = i + 1;
                }
            }
            _ => {}
        }
    }
    if body.len() > start {
        out.push(&body[start..]);
    }
    out
}

fn parse_coordinate(
    value: &str,
    configuration: &str,
    vars: &HashMap<String, String>,
) -> Option<GradleDependency> {
    let value = expand(value, vars);
    let coordinate = value.split('@').next().unwrap_or("");
    let parts: Vec<&str> = coordinate.split(':').collect();
    if parts.len() < 2 || parts.iter().take(2).any(|p| p.is_empty()) {
        return None;
    }
    Some(GradleDependency {
        group: Some(parts[0].to_string()),
        name: parts[1].to_string(),
        version: parts.get(2).filter(|v| !v.is_empty()).map(|v| v.to_string()),
        is_project: false,
        configuration: configuration.to_string(),
    })
}

fn parse_statement(
    stmt: &[(Token<'_>, Span)],
    vars: &HashMap<String, String>,
    out: &mut Vec<GradleDependency>,
) {
    let Some((Token::Ident(configuration), _)) = stmt.first() else {
        return;
    };
    let toks: Vec<&Token<'_>> = stmt[1..].iter().map(|(t, _)| t).collect();

    // Map notation: group: 'g', name: 'n', version: 'v'
    let mut map: HashMap<&str, String> = HashMap::new();
    for w in toks.windows(3) {
        if let [Token::Ident(key), Token::Colon, value] = w {
            if let Some(v) = string_value(value) {
                map.insert(*key, expand(&v, vars));
            }
        }
    }
    if let Some(name) = map.get("name").filter(|_| !map.contains_key("path")) {
        out.push(GradleDependency {
            group: map.get("group").cloned(),
            name: name.clone(),
            version: map.get("version").cloned(),
            is_project: false,
            configuration: configuration.to_string(),
        });
        return;
    }

    let mut paren_depth = 0usize;
    // Paren depth at which a call that hides its arguments was opened.
    let mut hidden_from: Option<usize> = None;
    let mut brace_depth = 0usize;
    let mut i = 0;
    while i < toks.len() {
        match toks[i] {
            Token::LBrace => brace_depth += 1,
            Token::RBrace => brace_depth = brace_depth.saturating_sub(1),
            Token::LParen => paren_depth += 1,
            Token::RParen => {
                paren_depth = paren_depth.saturating_sub(1);
                if hidden_from.is_some_and(|d| paren_depth < d) {
                    hidden_from = None;
                }
            }
            Token::Ident("project") if brace_depth == 0 && hidden_from.is_none() => {
                if matches!(toks.get(i + 1), Some(Token::LParen)) {
                    let mut j = i + 2;
                    if ident_is(toks.get(j).copied(), "path")
                        && matches!(toks.get(j + 1), Some(Token::Colon))
                    {
                        j += 2;
                    }
                    if let Some(path) = toks.get(j).and_then(|t| string_value(t)) {
                        out.push(GradleDependency {
                            group: None,
                            name: path,
                            version: None,
                            is_project: true,
                            configuration: configuration.to_string(),
                        });
                    }
                    // Skip to the closing paren of project(...)
                    let mut depth = 0usize;
                    let mut k = i + 1;
                    while k < toks.len() {
                        match toks[k] {
                            Token::LParen => depth += 1,
                            Token::RParen => {
                                depth -= 1;
                                if depth == 0 {
                                    break;
                                }
                            }
                            _ => {}
                        }
                        k += 1;
                    }
                    i = k + 1;
                    continue;
                }
            }
            Token::Ident(call) if NON_COORDINATE_CALLS.contains(call) => {
                if matches!(toks.get(i + 1), Some(Token::LParen)) && hidden_from.is_none() {
                    hidden_from = Some(paren_depth + 1);
                }
            }
            tok @ Token::Str(_) if brace_depth == 0 && hidden_from.is_none() => {
                if let Some(value) = string_value(tok) {
                    if let Some(dep) = parse_coordinate(&value, configuration, vars) {
                        out.push(dep);
                    }
                }
            }
            _ => {}
        }
        i += 1;
    }
}

/// Extracts dependency declarations from a `build.gradle(.kts)` script.
///
/// `buildscript { dependencies { ... } }` entries are build classpath, not
/// compile dependencies, and are ignored.
pub fn parse_dependencies(source_code: &str) -> Result<Vec<GradleDependency>> {
    let tokens = lex(source_code)?;
    let vars = collect_string_variables(&tokens);
    let mut dependencies = Vec::new();

    let mut i = 0;
    while i < tokens.len() {
        let tok = &tokens[i].0;
        let is_block = |name: &str| {
            ident_is(Some(tok), name)
                && matches!(
                    tokens.get(next_significant(&tokens, i + 1)),
                    Some((Token::LBrace, _))
                )
        };
        if is_block("buildscript") {
            i = block_end(&tokens, next_significant(&tokens, i + 1));
            continue;
        }
        if is_block("dependencies") {
            let open = next_significant(&tokens, i + 1);
            let end = block_end(&tokens, open);
            let body_end = if matches!(tokens.get(end - 1), Some((Token::RBrace, _))) {
                end - 1
            } else {
                end
            };
            for stmt in statements(&tokens[open + 1..body_end]) {
                parse_statement(stmt, &vars, &mut dependencies);
            }
            i = end;
            continue;
        }
        i += 1;
    }

    Ok(dependencies)
}

/// Extracts the root project name and included project paths from a
/// `settings.gradle(.kts)` script.
pub fn parse_settings(source_code: &str) -> Result<GradleSettings> {
    let tokens = lex(source_code)?;
    let mut settings = GradleSettings::default();

    let toks: Vec<&Token<'_>> = tokens.iter().map(|(t, _)| t).collect();
    let mut i = 0;
    while i < toks.len() {
        match toks[i] {
            Token::Ident("rootProject")
                if matches!(toks.get(i + 1), Some(Token::Dot))
                    && ident_is(toks.get(i + 2).copied(), "name")
                    && matches!(toks.get(i + 3), Some(Token::Assign)) =>
            {
                if let Some(name) = toks.get(i + 4).and_then(|t| string_value(t)) {
                    settings.root_project_name = Some(name);
                }
                i += 5;
                continue;
            }
            Token::Ident("include") => {
                let mut j = i + 1;
                let parenthesized = matches!(toks.get(j), Some(Token::LParen));
                if parenthesized {
                    j += 1;
                }
                loop {
                    while parenthesized && matches!(toks.get(j), Some(Token::Newline)) {
                        j += 1;
                    }
                    match toks.get(j).and_then(|t| string_value(t)) {
                        Some(path) => settings.included_projects.push(path),
                        None => break,
                    }
                    j += 1;
                    if matches!(toks.get(j), Some(Token::Comma)) {
                        j += 1;
                        while matches!(toks.get(j), Some(Token::Newline)) {
                            j += 1;
                        }
                    } else {
                        break;
                    }
                }
                i = j;
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    Ok(settings)
}

/// Converts an include path such as `:core:spring-boot` to a directory relative
/// to the settings file.
pub fn project_dir(include_path: &str) -> std::path::PathBuf {
    include_path
        .split(':')
        .filter(|segment| !segment.is_empty())
        .collect()
}
