//! Tokenizer for the module syntax subset card sources are written in.

use crate::parse::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    /// String literal, already unescaped.
    Str { value: String, quote: char },
    /// Template literal; `None` when it contains `${}` interpolations.
    Template(Option<String>),
    Number,
    Punct(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// A line break separates this token from the previous one.
    pub newline_before: bool,
}

impl Token {
    pub fn is_punct(&self, p: &str) -> bool {
        matches!(&self.kind, TokenKind::Punct(q) if *q == p)
    }

    pub fn ident(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_ident(&self, name: &str) -> bool {
        self.ident() == Some(name)
    }

    /// Value of a string or interpolation-free template literal.
    pub fn string_value(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Str { value, .. } => Some(value),
            TokenKind::Template(Some(value)) => Some(value),
            _ => None,
        }
    }
}

const PUNCTUATORS: &[&str] = &[
    "...", "===", "!==", "**=", "<<=", ">>=", ">>>", "=>", "==", "!=", "<=", ">=", "&&", "||",
    "??", "?.", "++", "--", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "**", "<<", ">>",
    "{", "}", "(", ")", "[", "]", ";", ",", "<", ">", "+", "-", "*", "/", "%", "&", "|", "^",
    "!", "~", "?", ":", "=", ".", "@", "#",
];

pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(source).run()
}

struct Lexer<'s> {
    source: &'s str,
    pos: usize,
    tokens: Vec<Token>,
}

impl<'s> Lexer<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            pos: 0,
            tokens: Vec::new(),
        }
    }

    fn rest(&self) -> &'s str {
        &self.source[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        loop {
            let newline_before = self.skip_trivia()?;
            let Some(c) = self.peek() else {
                return Ok(self.tokens);
            };
            let start = self.pos;
            let kind = if c == '"' || c == '\'' {
                self.string(c)?
            } else if c == '`' {
                self.template()?
            } else if c.is_ascii_digit() {
                self.number()
            } else if is_ident_start(c) {
                TokenKind::Ident(self.ident())
            } else {
                self.punct()?
            };
            self.tokens.push(Token {
                kind,
                span: Span::new(start, self.pos),
                newline_before,
            });
        }
    }

    /// Skip whitespace and comments, reporting whether a newline was crossed.
    fn skip_trivia(&mut self) -> Result<bool, ParseError> {
        let mut newline = false;
        loop {
            let rest = self.rest();
            if let Some(c) = rest.chars().next().filter(|c| c.is_whitespace()) {
                newline |= c == '\n';
                self.pos += c.len_utf8();
            } else if rest.starts_with("//") {
                let end = rest.find('\n').unwrap_or(rest.len());
                self.pos += end;
            } else if rest.starts_with("/*") {
                let Some(end) = rest[2..].find("*/") else {
                    return Err(ParseError::new(self.pos, "unterminated block comment"));
                };
                newline |= rest[..end + 2].contains('\n');
                self.pos += end + 4;
            } else {
                return Ok(newline);
            }
        }
    }

    fn string(&mut self, quote: char) -> Result<TokenKind, ParseError> {
        let start = self.pos;
        self.pos += 1;
        let mut value = String::new();
        loop {
            let Some(c) = self.peek() else {
                return Err(ParseError::new(start, "unterminated string literal"));
            };
            self.pos += c.len_utf8();
            match c {
                '\\' => self.escape(&mut value, start)?,
                '\n' => return Err(ParseError::new(start, "unterminated string literal")),
                c if c == quote => return Ok(TokenKind::Str { value, quote }),
                c => value.push(c),
            }
        }
    }

    fn escape(&mut self, value: &mut String, start: usize) -> Result<(), ParseError> {
        let Some(c) = self.peek() else {
            return Err(ParseError::new(start, "unterminated escape sequence"));
        };
        self.pos += c.len_utf8();
        match c {
            'n' => value.push('\n'),
            't' => value.push('\t'),
            'r' => value.push('\r'),
            'b' => value.push('\u{8}'),
            'f' => value.push('\u{c}'),
            'v' => value.push('\u{b}'),
            '0' => value.push('\0'),
            '\n' => {}
            'u' => {
                let rest = self.rest();
                let (digits, consumed) = if let Some(braced) = rest.strip_prefix('{') {
                    let end = braced
                        .find('}')
                        .ok_or_else(|| ParseError::new(self.pos, "invalid unicode escape"))?;
                    (&braced[..end], end + 2)
                } else {
                    (rest.get(..4).unwrap_or(rest), 4)
                };
                let ch = u32::from_str_radix(digits, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| ParseError::new(self.pos, "invalid unicode escape"))?;
                value.push(ch);
                self.pos += consumed;
            }
            'x' => {
                let digits = self.rest().get(..2).unwrap_or("");
                let ch = u8::from_str_radix(digits, 16)
                    .map(char::from)
                    .map_err(|_| ParseError::new(self.pos, "invalid hex escape"))?;
                value.push(ch);
                self.pos += 2;
            }
            other => value.push(other),
        }
        Ok(())
    }

    fn template(&mut self) -> Result<TokenKind, ParseError> {
        let start = self.pos;
        self.pos += 1;
        let mut value = String::new();
        let mut interpolated = false;
        loop {
            let Some(c) = self.peek() else {
                return Err(ParseError::new(start, "unterminated template literal"));
            };
            self.pos += c.len_utf8();
            match c {
                '\\' => self.escape(&mut value, start)?,
                '`' => break,
                '$' if self.peek() == Some('{') => {
                    interpolated = true;
                    self.pos += 1;
                    self.skip_interpolation(start)?;
                }
                c => value.push(c),
            }
        }
        Ok(TokenKind::Template((!interpolated).then_some(value)))
    }

    fn skip_interpolation(&mut self, start: usize) -> Result<(), ParseError> {
        let mut depth = 1usize;
        while depth > 0 {
            self.skip_trivia()?;
            let Some(c) = self.peek() else {
                return Err(ParseError::new(start, "unterminated template literal"));
            };
            match c {
                '"' | '\'' => {
                    self.string(c)?;
                }
                '`' => {
                    self.template()?;
                }
                '{' => {
                    depth += 1;
                    self.pos += 1;
                }
                '}' => {
                    depth -= 1;
                    self.pos += 1;
                }
                c => self.pos += c.len_utf8(),
            }
        }
        Ok(())
    }

    fn number(&mut self) -> TokenKind {
        let len = self
            .rest()
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '.' || c == '_'))
            .unwrap_or(self.rest().len());
        self.pos += len;
        TokenKind::Number
    }

    fn ident(&mut self) -> String {
        let len = self
            .rest()
            .find(|c: char| !is_ident_continue(c))
            .unwrap_or(self.rest().len());
        let name = &self.rest()[..len];
        self.pos += len;
        name.to_string()
    }

    fn punct(&mut self) -> Result<TokenKind, ParseError> {
        let rest = self.rest();
        for p in PUNCTUATORS {
            if rest.starts_with(p) {
                self.pos += p.len();
                return Ok(TokenKind::Punct(*p));
            }
        }
        let c = rest.chars().next().unwrap_or_default();
        Err(ParseError::new(
            self.pos,
            format!("unexpected character '{}'", c),
        ))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Render `value` as a string literal delimited by `quote`.
pub fn quote_string(value: &str, quote: char) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push(quote);
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' if quote != '`' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' if quote != '`' => out.push_str("\\t"),
            '$' if quote == '`' && chars.peek() == Some(&'{') => out.push_str("\\$"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}
