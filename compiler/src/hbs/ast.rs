//! Syntax tree of the template dialect.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Raw text, exactly as written.
    Text(String),
    Comment(Comment),
    HtmlComment(String),
    Mustache(Mustache),
    /// A `{{{ }}}` mustache.
    TrustedMustache(Mustache),
    Block(Block),
    Element(Element),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub value: String,
    /// Written in the `{{!-- --}}` form.
    pub dashed: bool,
}

/// `~` marks written just inside a pair of mustache delimiters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Strip {
    pub open: bool,
    pub close: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mustache {
    pub call: Call,
    pub strip: Strip,
}

impl From<Call> for Mustache {
    fn from(call: Call) -> Self {
        Self {
            call,
            strip: Strip::default(),
        }
    }
}

/// Callee plus arguments, as found in mustaches and sub-expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub path: Expr,
    pub params: Vec<Expr>,
    pub hash: Vec<HashPair>,
}

impl Call {
    pub fn path(path: Expr) -> Self {
        Self {
            path,
            params: Vec::new(),
            hash: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HashPair {
    pub key: String,
    pub value: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub call: Call,
    pub block_params: Vec<String>,
    pub program: Vec<Node>,
    pub inverse: Option<Vec<Node>>,
    /// Written as `{{else <call>}}` inside another block's inverse.
    pub chained: bool,
    /// On the opening tag, or on `{{else <call>}}` for a chained block.
    pub strip: Strip,
    /// On a plain `{{else}}`.
    pub inverse_strip: Strip,
    /// On `{{/name}}`. Unused on chained blocks.
    pub close_strip: Strip,
}

impl Block {
    pub fn new(call: Call, block_params: Vec<String>, program: Vec<Node>) -> Self {
        Self {
            call,
            block_params,
            program,
            inverse: None,
            chained: false,
            strip: Strip::default(),
            inverse_strip: Strip::default(),
            close_strip: Strip::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub tag: String,
    pub attributes: Vec<Attribute>,
    pub modifiers: Vec<Call>,
    pub block_params: Vec<String>,
    pub children: Vec<Node>,
    pub self_closing: bool,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attributes: Vec::new(),
            modifiers: Vec::new(),
            block_params: Vec::new(),
            children: Vec::new(),
            self_closing: false,
        }
    }

    pub fn is_void(&self) -> bool {
        VOID_ELEMENTS.contains(&self.tag.as_str())
    }
}

pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub value: AttrValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// `<input disabled>`
    Valueless,
    /// `quote` is `None` for an unquoted value.
    Text { value: String, quote: Option<char> },
    /// Whitespace control inside a tag has no text to act on and is not kept.
    Mustache(Call),
    /// Quoted value mixing text and mustaches.
    Concat { parts: Vec<ConcatPart>, quote: char },
}

impl AttrValue {
    pub fn text(value: impl Into<String>) -> Self {
        AttrValue::Text {
            value: value.into(),
            quote: Some('"'),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConcatPart {
    Text(String),
    Mustache(Call),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Path(PathExpr),
    String(String),
    /// Numeric literal as written.
    Number(String),
    Bool(bool),
    Null,
    Undefined,
    SubExpr(Box<Call>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathHead {
    /// `@name`
    Arg(String),
    This,
    Var(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    pub head: PathHead,
    pub tail: Vec<String>,
}

impl PathExpr {
    pub fn arg(name: impl Into<String>, tail: Vec<String>) -> Self {
        Self {
            head: PathHead::Arg(name.into()),
            tail,
        }
    }

    pub fn var(name: impl Into<String>, tail: Vec<String>) -> Self {
        Self {
            head: PathHead::Var(name.into()),
            tail,
        }
    }

    pub fn is_arg(&self, name: &str) -> bool {
        matches!(&self.head, PathHead::Arg(n) if n == name)
    }

    /// Parse a dotted path such as `@model.author.name`.
    pub fn from_dotted(original: &str) -> Option<Self> {
        let mut parts = original.split('.');
        let first = parts.next()?;
        let tail: Vec<String> = parts.map(str::to_string).collect();
        if first.is_empty() || tail.iter().any(String::is_empty) {
            return None;
        }
        let head = if let Some(arg) = first.strip_prefix('@') {
            if arg.is_empty() {
                return None;
            }
            PathHead::Arg(arg.to_string())
        } else if first == "this" {
            PathHead::This
        } else {
            PathHead::Var(first.to_string())
        };
        Some(Self { head, tail })
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.head {
            PathHead::Arg(name) => write!(f, "@{}", name)?,
            PathHead::This => f.write_str("this")?,
            PathHead::Var(name) => f.write_str(name)?,
        }
        for segment in &self.tail {
            write!(f, ".{}", segment)?;
        }
        Ok(())
    }
}
