//! Structural reader for module sources: imports, top-level bindings,
//! decorated classes, and call sites. Rewrites are expressed as [`Edit`]s
//! against the original text.

use super::lexer::{tokenize, Span, Token, TokenKind};
use crate::parse::ParseError;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportName {
    pub imported: String,
    pub local: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDecl {
    pub span: Span,
    pub specifier: String,
    pub specifier_span: Span,
    pub specifier_quote: char,
    pub default: Option<String>,
    pub namespace: Option<String>,
    pub named: Vec<ImportName>,
}

impl ImportDecl {
    /// Local names this declaration binds.
    pub fn locals(&self) -> impl Iterator<Item = &str> {
        self.default
            .iter()
            .chain(self.namespace.iter())
            .map(String::as_str)
            .chain(self.named.iter().map(|n| n.local.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecoratorArg {
    Ident(String),
    Str(String),
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decorator {
    pub name: String,
    pub args: Vec<DecoratorArg>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassMember {
    pub name: String,
    pub decorators: Vec<Decorator>,
    pub is_method: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: Option<String>,
    pub decorators: Vec<Decorator>,
    pub members: Vec<ClassMember>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StringArg {
    pub value: String,
    pub quote: char,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScopeProperty {
    pub entries: Vec<ScopeEntry>,
    /// Span of the object literal the arrow function returns.
    pub object_span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionsObject {
    pub span: Span,
    pub keys: Vec<String>,
    pub scope: Option<ScopeProperty>,
}

/// A `precompileTemplate(template, options?)` style call.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateCall {
    pub template: StringArg,
    pub options: Option<OptionsObject>,
    /// Offset of the closing parenthesis.
    pub close_paren: usize,
}

/// Replace `span` of the source with `text`. Empty spans insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub span: Span,
    pub text: String,
}

impl Edit {
    pub fn replace(span: Span, text: impl Into<String>) -> Self {
        Self {
            span,
            text: text.into(),
        }
    }

    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self::replace(Span::new(at, at), text)
    }
}

/// Apply non-overlapping edits to `source`.
pub fn apply_edits(source: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|e| (e.span.start, e.span.end));
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for edit in edits {
        debug_assert!(edit.span.start >= cursor, "overlapping edits");
        out.push_str(&source[cursor..edit.span.start]);
        out.push_str(&edit.text);
        cursor = edit.span.end;
    }
    out.push_str(&source[cursor..]);
    out
}

#[derive(Debug)]
pub struct Module {
    tokens: Vec<Token>,
    source_len: usize,
    imports: Vec<ImportDecl>,
    bindings: BTreeSet<String>,
    classes: Vec<ClassDecl>,
}

impl Module {
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        let tokens = tokenize(source)?;
        let mut module = Module {
            tokens,
            source_len: source.len(),
            imports: Vec::new(),
            bindings: BTreeSet::new(),
            classes: Vec::new(),
        };
        module.scan()?;
        Ok(module)
    }

    pub fn imports(&self) -> &[ImportDecl] {
        &self.imports
    }

    /// Every name bound at module level.
    pub fn bindings(&self) -> &BTreeSet<String> {
        &self.bindings
    }

    pub fn classes(&self) -> &[ClassDecl] {
        &self.classes
    }

    /// Import declaration binding `local`, if any.
    pub fn import_for(&self, local: &str) -> Option<&ImportDecl> {
        self.imports.iter().find(|i| i.locals().any(|l| l == local))
    }

    /// Local name under which `imported` is imported from `specifier`.
    pub fn local_name_of(&self, specifier: &str, imported: &str) -> Option<&str> {
        self.imports
            .iter()
            .filter(|i| i.specifier == specifier)
            .flat_map(|i| i.named.iter())
            .find(|n| n.imported == imported)
            .map(|n| n.local.as_str())
    }

    /// Offset right after the last import declaration.
    pub fn import_insertion_point(&self) -> usize {
        self.imports.last().map(|i| i.span.end).unwrap_or(0)
    }

    /// Find the first call to `callee` and read it as a template call.
    pub fn find_template_call(&self, callee: &str) -> Result<Option<TemplateCall>, ParseError> {
        let tokens = &self.tokens;
        let Some(at) = (0..tokens.len()).find(|&i| {
            tokens[i].is_ident(callee)
                && tokens.get(i + 1).is_some_and(|t| t.is_punct("("))
                && !(i > 0 && tokens[i - 1].is_punct("."))
        }) else {
            return Ok(None);
        };

        let open = at + 1;
        let close = self.matching(open)?;
        let args = self.split_args(open + 1, close);
        let Some(first) = args.first().filter(|a| a.len() == 1) else {
            return Err(self.error_at(open, format!("{} expects a template string", callee)));
        };
        let token = &tokens[first.start];
        let Some(value) = token.string_value() else {
            return Err(self.error_at(
                first.start,
                format!("{} expects a literal template string", callee),
            ));
        };
        let quote = match &token.kind {
            TokenKind::Str { quote, .. } => *quote,
            _ => '`',
        };
        let template = StringArg {
            value: value.to_string(),
            quote,
            span: token.span,
        };

        let options = match args.get(1) {
            Some(range) if tokens[range.start].is_punct("{") => {
                Some(self.options_object(range.start)?)
            }
            Some(range) => {
                return Err(self.error_at(range.start, "template options must be an object literal"))
            }
            None => None,
        };

        Ok(Some(TemplateCall {
            template,
            options,
            close_paren: tokens[close].span.start,
        }))
    }

    fn scan(&mut self) -> Result<(), ParseError> {
        let mut i = 0;
        let mut pending: Vec<Decorator> = Vec::new();
        while i < self.tokens.len() {
            let token = &self.tokens[i];
            if token.is_punct("{") || token.is_punct("(") || token.is_punct("[") {
                i = self.matching(i)? + 1;
                continue;
            }
            if token.is_punct("@") {
                let (decorator, next) = self.decorator(i)?;
                pending.push(decorator);
                i = next;
                continue;
            }
            match token.ident() {
                Some("import") if self.is_import_declaration(i) => {
                    let (decl, next) = self.import_decl(i)?;
                    self.bindings.extend(decl.locals().map(str::to_string));
                    self.imports.push(decl);
                    i = next;
                }
                Some("const" | "let" | "var") => {
                    i = self.declaration(i + 1)?;
                }
                Some("function") => {
                    let mut j = i + 1;
                    if self.tokens.get(j).is_some_and(|t| t.is_punct("*")) {
                        j += 1;
                    }
                    if let Some(name) = self.tokens.get(j).and_then(Token::ident) {
                        self.bindings.insert(name.to_string());
                    }
                    i = j;
                }
                Some("class") => {
                    let decorators = std::mem::take(&mut pending);
                    let (class, next) = self.class(i, decorators)?;
                    if let Some(name) = &class.name {
                        self.bindings.insert(name.clone());
                    }
                    self.classes.push(class);
                    i = next;
                }
                Some("export" | "default") => i += 1,
                _ => {
                    pending.clear();
                    i += 1;
                }
            }
        }
        Ok(())
    }

    fn is_import_declaration(&self, i: usize) -> bool {
        !matches!(
            self.tokens.get(i + 1),
            Some(t) if t.is_punct("(") || t.is_punct(".")
        )
    }

    fn import_decl(&self, start: usize) -> Result<(ImportDecl, usize), ParseError> {
        let tokens = &self.tokens;
        let mut i = start + 1;
        let mut default = None;
        let mut namespace = None;
        let mut named = Vec::new();

        if tokens.get(i).and_then(Token::string_value).is_none() {
            loop {
                let Some(token) = tokens.get(i) else {
                    return Err(self.error_at(start, "unterminated import declaration"));
                };
                if token.is_punct("*") {
                    if !tokens.get(i + 1).is_some_and(|t| t.is_ident("as")) {
                        return Err(self.error_at(i, "expected 'as' after '*'"));
                    }
                    namespace = tokens.get(i + 2).and_then(Token::ident).map(str::to_string);
                    if namespace.is_none() {
                        return Err(self.error_at(i + 2, "expected namespace name"));
                    }
                    i += 3;
                } else if token.is_punct("{") {
                    let close = self.matching(i)?;
                    named = self.import_names(i + 1, close)?;
                    i = close + 1;
                } else if let Some(name) = token.ident() {
                    default = Some(name.to_string());
                    i += 1;
                } else {
                    return Err(self.error_at(i, "unexpected token in import declaration"));
                }

                match tokens.get(i) {
                    Some(t) if t.is_punct(",") => i += 1,
                    Some(t) if t.is_ident("from") => {
                        i += 1;
                        break;
                    }
                    _ => return Err(self.error_at(i, "expected 'from'")),
                }
            }
        }

        let Some(spec_token) = tokens.get(i) else {
            return Err(self.error_at(start, "import declaration is missing its module"));
        };
        let (specifier, specifier_quote) = match &spec_token.kind {
            TokenKind::Str { value, quote } => (value.clone(), *quote),
            _ => return Err(self.error_at(i, "expected module specifier string")),
        };
        let specifier_span = spec_token.span;
        let mut end = spec_token.span.end;
        i += 1;
        if let Some(semi) = tokens.get(i).filter(|t| t.is_punct(";")) {
            end = semi.span.end;
            i += 1;
        }

        Ok((
            ImportDecl {
                span: Span::new(tokens[start].span.start, end),
                specifier,
                specifier_span,
                specifier_quote,
                default,
                namespace,
                named,
            },
            i,
        ))
    }

    fn import_names(&self, from: usize, to: usize) -> Result<Vec<ImportName>, ParseError> {
        let mut names = Vec::new();
        for range in self.split_args(from, to) {
            let parts = &self.tokens[range.start..range.end];
            let name_of = |t: &Token| {
                t.ident()
                    .or_else(|| t.string_value())
                    .map(str::to_string)
                    .ok_or_else(|| self.error_at(range.start, "expected import name"))
            };
            let name = match parts {
                [single] => {
                    let n = name_of(single)?;
                    ImportName {
                        imported: n.clone(),
                        local: n,
                    }
                }
                [imported, keyword, local] if keyword.is_ident("as") => ImportName {
                    imported: name_of(imported)?,
                    local: name_of(local)?,
                },
                _ => return Err(self.error_at(range.start, "malformed import specifier")),
            };
            names.push(name);
        }
        Ok(names)
    }

    /// Record names bound by `const`/`let`/`var` and return where to resume.
    fn declaration(&mut self, mut i: usize) -> Result<usize, ParseError> {
        loop {
            let Some(token) = self.tokens.get(i) else {
                return Ok(i);
            };
            if let Some(name) = token.ident() {
                self.bindings.insert(name.to_string());
                i += 1;
            } else if token.is_punct("{") || token.is_punct("[") {
                let close = self.matching(i)?;
                for j in i + 1..close {
                    let Some(name) = self.tokens[j].ident() else {
                        continue;
                    };
                    let next = &self.tokens[j + 1];
                    let prev = &self.tokens[j - 1];
                    let is_key = next.is_punct(":");
                    let is_default = prev.is_punct("=");
                    if !is_key && !is_default {
                        self.bindings.insert(name.to_string());
                    }
                }
                i = close + 1;
            } else {
                return Ok(i);
            }

            // Skip the initializer up to a comma that introduces another binding.
            let mut depth = 0usize;
            loop {
                let Some(token) = self.tokens.get(i) else {
                    return Ok(i);
                };
                match &token.kind {
                    TokenKind::Punct("{" | "(" | "[") => depth += 1,
                    TokenKind::Punct("}" | ")" | "]") if depth == 0 => return Ok(i),
                    TokenKind::Punct("}" | ")" | "]") => depth -= 1,
                    TokenKind::Punct(";") if depth == 0 => return Ok(i + 1),
                    TokenKind::Punct(",") if depth == 0 => {
                        i += 1;
                        break;
                    }
                    _ if depth == 0 && token.newline_before && token.ident().is_some() => {
                        if self.is_statement_start(i) {
                            return Ok(i);
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
        }
    }

    fn is_statement_start(&self, i: usize) -> bool {
        matches!(
            self.tokens[i].ident(),
            Some("import" | "export" | "const" | "let" | "var" | "function" | "class")
        ) && !self.tokens[i - 1].is_punct("=")
    }

    fn decorator(&self, at: usize) -> Result<(Decorator, usize), ParseError> {
        let tokens = &self.tokens;
        let mut i = at + 1;
        let mut name = tokens
            .get(i)
            .and_then(Token::ident)
            .ok_or_else(|| self.error_at(at, "expected decorator name"))?
            .to_string();
        i += 1;
        while tokens.get(i).is_some_and(|t| t.is_punct(".")) {
            let part = tokens
                .get(i + 1)
                .and_then(Token::ident)
                .ok_or_else(|| self.error_at(i, "expected decorator member"))?;
            name.push('.');
            name.push_str(part);
            i += 2;
        }

        let mut args = Vec::new();
        let mut end = tokens[i - 1].span.end;
        if tokens.get(i).is_some_and(|t| t.is_punct("(")) {
            let close = self.matching(i)?;
            for range in self.split_args(i + 1, close) {
                let parts = &tokens[range.start..range.end];
                args.push(match parts {
                    [t] => match (t.ident(), t.string_value()) {
                        (Some(name), _) => DecoratorArg::Ident(name.to_string()),
                        (_, Some(value)) => DecoratorArg::Str(value.to_string()),
                        _ => DecoratorArg::Other,
                    },
                    _ => DecoratorArg::Other,
                });
            }
            end = tokens[close].span.end;
            i = close + 1;
        }

        Ok((
            Decorator {
                name,
                args,
                span: Span::new(tokens[at].span.start, end),
            },
            i,
        ))
    }

    fn class(
        &self,
        at: usize,
        decorators: Vec<Decorator>,
    ) -> Result<(ClassDecl, usize), ParseError> {
        let tokens = &self.tokens;
        let mut i = at + 1;
        let mut name = None;
        if let Some(ident) = tokens.get(i).and_then(Token::ident) {
            if ident != "extends" {
                name = Some(ident.to_string());
                i += 1;
            }
        }
        while !tokens.get(i).map_or(true, |t| t.is_punct("{")) {
            if tokens[i].is_punct("(") || tokens[i].is_punct("[") {
                i = self.matching(i)?;
            }
            i += 1;
        }
        if i >= tokens.len() {
            return Err(self.error_at(at, "class declaration is missing its body"));
        }
        let close = self.matching(i)?;
        let members = self.class_members(i + 1, close)?;

        let start = decorators
            .first()
            .map(|d| d.span.start)
            .unwrap_or(tokens[at].span.start);
        Ok((
            ClassDecl {
                name,
                decorators,
                members,
                span: Span::new(start, tokens[close].span.end),
            },
            close + 1,
        ))
    }

    fn class_members(&self, from: usize, to: usize) -> Result<Vec<ClassMember>, ParseError> {
        let tokens = &self.tokens;
        let mut members = Vec::new();
        let mut decorators = Vec::new();
        let mut i = from;
        while i < to {
            let token = &tokens[i];
            if token.is_punct(";") {
                i += 1;
                continue;
            }
            if token.is_punct("@") {
                let (decorator, next) = self.decorator(i)?;
                decorators.push(decorator);
                i = next;
                continue;
            }
            if matches!(token.ident(), Some("static" | "get" | "set" | "async" | "accessor"))
                && i + 1 < to
                && member_name(&tokens[i + 1]).is_some()
            {
                i += 1;
                continue;
            }
            if token.is_punct("*") {
                i += 1;
                continue;
            }

            let start = decorators
                .first()
                .map(|d: &Decorator| d.span.start)
                .unwrap_or(token.span.start);
            let name = if token.is_punct("[") {
                let close = self.matching(i)?;
                i = close;
                String::new()
            } else {
                member_name(token)
                    .ok_or_else(|| self.error_at(i, "expected class member"))?
                    .to_string()
            };
            i += 1;

            let is_method = tokens.get(i).is_some_and(|t| t.is_punct("("));
            let end;
            if is_method {
                let params_close = self.matching(i)?;
                let mut j = params_close + 1;
                while j < to && !tokens[j].is_punct("{") {
                    j += 1;
                }
                if j >= to {
                    return Err(self.error_at(i, "method is missing its body"));
                }
                let body_close = self.matching(j)?;
                end = tokens[body_close].span.end;
                i = body_close + 1;
            } else {
                let mut j = i;
                while j < to {
                    let t = &tokens[j];
                    if t.is_punct(";") || (t.newline_before && !continues_expression(&tokens[j - 1])) {
                        break;
                    }
                    if t.is_punct("{") || t.is_punct("(") || t.is_punct("[") {
                        j = self.matching(j)?;
                    }
                    j += 1;
                }
                end = tokens[j.min(to) - 1].span.end;
                i = j;
            }

            members.push(ClassMember {
                name,
                decorators: std::mem::take(&mut decorators),
                is_method,
                span: Span::new(start, end),
            });
        }
        Ok(members)
    }

    fn options_object(&self, open: usize) -> Result<OptionsObject, ParseError> {
        let tokens = &self.tokens;
        let close = self.matching(open)?;
        let mut keys = Vec::new();
        let mut scope = None;
        for range in self.split_args(open + 1, close) {
            let parts = &tokens[range.start..range.end];
            let Some(key) = parts.first().and_then(member_name) else {
                continue;
            };
            keys.push(key.to_string());
            if key == "scope" {
                scope = Some(self.scope_property(range.start, range.end)?);
            }
        }
        Ok(OptionsObject {
            span: Span::new(tokens[open].span.start, tokens[close].span.end),
            keys,
            scope,
        })
    }

    /// Read `scope: () => ({ A, b: B })`.
    fn scope_property(&self, from: usize, to: usize) -> Result<ScopeProperty, ParseError> {
        let tokens = &self.tokens;
        let unsupported = || self.error_at(from, "scope must be written as `() => ({ ... })`");
        let shape_ok = to - from >= 6
            && tokens[from + 1].is_punct(":")
            && tokens[from + 2].is_punct("(")
            && tokens[from + 3].is_punct(")")
            && tokens[from + 4].is_punct("=>")
            && tokens[from + 5].is_punct("(");
        if !shape_ok {
            return Err(unsupported());
        }
        let paren = from + 5;
        let paren_close = self.matching(paren)?;
        let open = paren + 1;
        if paren_close + 1 != to || !tokens[open].is_punct("{") {
            return Err(unsupported());
        }
        let close = self.matching(open)?;
        if close + 1 != paren_close {
            return Err(unsupported());
        }

        let mut entries = Vec::new();
        for range in self.split_args(open + 1, close) {
            let parts = &tokens[range.start..range.end];
            let entry = match parts {
                [only] => only.ident().map(|name| ScopeEntry {
                    key: name.to_string(),
                    value: name.to_string(),
                }),
                [key, colon, value] if colon.is_punct(":") => {
                    match (member_name(key), value.ident()) {
                        (Some(k), Some(v)) => Some(ScopeEntry {
                            key: k.to_string(),
                            value: v.to_string(),
                        }),
                        _ => None,
                    }
                }
                _ => None,
            };
            entries.push(entry.ok_or_else(|| {
                self.error_at(range.start, "scope entries must be identifiers")
            })?);
        }

        Ok(ScopeProperty {
            entries,
            object_span: Span::new(tokens[open].span.start, tokens[close].span.end),
        })
    }

    /// Index of the bracket closing the one at `open`.
    fn matching(&self, open: usize) -> Result<usize, ParseError> {
        let mut depth = 0usize;
        for (i, token) in self.tokens.iter().enumerate().skip(open) {
            match &token.kind {
                TokenKind::Punct("{" | "(" | "[") => depth += 1,
                TokenKind::Punct("}" | ")" | "]") => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(i);
                    }
                }
                _ => {}
            }
        }
        Err(self.error_at(open, "unbalanced brackets"))
    }

    /// Split `from..to` on top-level commas, dropping empty trailing parts.
    fn split_args(&self, from: usize, to: usize) -> Vec<std::ops::Range<usize>> {
        let mut ranges = Vec::new();
        let mut start = from;
        let mut depth = 0usize;
        for i in from..to {
            match &self.tokens[i].kind {
                TokenKind::Punct("{" | "(" | "[") => depth += 1,
                TokenKind::Punct("}" | ")" | "]") => depth = depth.saturating_sub(1),
                TokenKind::Punct(",") if depth == 0 => {
                    if i > start {
                        ranges.push(start..i);
                    }
                    start = i + 1;
                }
                _ => {}
            }
        }
        if to > start {
            ranges.push(start..to);
        }
        ranges
    }

    fn error_at(&self, index: usize, message: impl Into<String>) -> ParseError {
        let offset = self
            .tokens
            .get(index)
            .map(|t| t.span.start)
            .unwrap_or(self.source_len);
        ParseError::new(offset, message)
    }
}

fn member_name(token: &Token) -> Option<&str> {
    token.ident().or_else(|| token.string_value())
}

fn continues_expression(token: &Token) -> bool {
    matches!(
        &token.kind,
        TokenKind::Punct(
            "=" | "." | "," | "+" | "-" | "*" | "/" | "?" | ":" | "&&" | "||" | "??" | "=>"
        )
    )
}
