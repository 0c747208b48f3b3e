use super::ast::*;
use crate::parse::ParseError;

/// Parse template source into its top-level nodes.
pub fn parse_template(source: &str) -> Result<Vec<Node>, ParseError> {
    let mut parser = Parser { src: source, pos: 0 };
    let (nodes, stop) = parser.nodes()?;
    match stop {
        Stop::Eof => Ok(nodes),
        Stop::CloseTag { name, at } => Err(ParseError::new(
            at,
            format!("closing tag </{}> without a matching open tag", name),
        )),
        Stop::CloseBlock { name, at, .. } => Err(ParseError::new(
            at,
            format!("{{{{/{}}}}} without a matching block", name),
        )),
        Stop::Else { at, .. } => Err(ParseError::new(at, "{{else}} outside of a block")),
    }
}

/// What ended a run of sibling nodes.
enum Stop {
    Eof,
    CloseTag { name: String, at: usize },
    CloseBlock { name: String, at: usize, strip: Strip },
    Else { chained: Option<Call>, at: usize, strip: Strip },
}

struct BlockBody {
    program: Vec<Node>,
    inverse: Option<Vec<Node>>,
    inverse_strip: Strip,
    close_strip: Strip,
}

struct Parser<'s> {
    src: &'s str,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn rest(&self) -> &'s str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn eat(&mut self, s: &str) -> bool {
        if self.rest().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, s: &str) -> Result<(), ParseError> {
        if self.eat(s) {
            Ok(())
        } else {
            Err(ParseError::new(self.pos, format!("expected '{}'", s)))
        }
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.src.len() - trimmed.len();
    }

    fn nodes(&mut self) -> Result<(Vec<Node>, Stop), ParseError> {
        let mut nodes = Vec::new();
        let mut text_start = self.pos;
        loop {
            let rest = self.rest();
            if rest.is_empty() {
                push_text(&mut nodes, &self.src[text_start..self.pos]);
                return Ok((nodes, Stop::Eof));
            }

            if rest.starts_with("\\{{") {
                let end = rest.find("}}").map(|i| i + 2).unwrap_or(rest.len());
                self.pos += end;
                continue;
            }

            if rest.starts_with("{{") {
                push_text(&mut nodes, &self.src[text_start..self.pos]);
                match self.mustache()? {
                    Ok(node) => nodes.push(node),
                    Err(stop) => return Ok((nodes, stop)),
                }
                text_start = self.pos;
                continue;
            }

            if rest.starts_with("<!--") {
                push_text(&mut nodes, &self.src[text_start..self.pos]);
                let Some(end) = rest.find("-->") else {
                    return Err(ParseError::new(self.pos, "unterminated HTML comment"));
                };
                nodes.push(Node::HtmlComment(rest[4..end].to_string()));
                self.pos += end + 3;
                text_start = self.pos;
                continue;
            }

            if let Some(close) = rest.strip_prefix("</") {
                push_text(&mut nodes, &self.src[text_start..self.pos]);
                let at = self.pos;
                let Some(end) = close.find('>') else {
                    return Err(ParseError::new(at, "unterminated closing tag"));
                };
                let name = close[..end].trim().to_string();
                self.pos += 2 + end + 1;
                return Ok((nodes, Stop::CloseTag { name, at }));
            }

            if rest.starts_with('<') && rest[1..].starts_with(is_tag_start) {
                push_text(&mut nodes, &self.src[text_start..self.pos]);
                nodes.push(Node::Element(self.element()?));
                text_start = self.pos;
                continue;
            }

            self.pos += rest.chars().next().map_or(1, char::len_utf8);
        }
    }

    /// Parse anything starting with `{{`. Returns `Err(stop)` for tokens that
    /// end the enclosing run of nodes.
    fn mustache(&mut self) -> Result<Result<Node, Stop>, ParseError> {
        let at = self.pos;
        let rest = self.rest();

        if let Some(body) = rest.strip_prefix("{{!--") {
            let Some(end) = body.find("--}}") else {
                return Err(ParseError::new(at, "unterminated comment"));
            };
            self.pos += 5 + end + 4;
            return Ok(Ok(Node::Comment(Comment {
                value: body[..end].to_string(),
                dashed: true,
            })));
        }
        if let Some(body) = rest.strip_prefix("{{!") {
            let Some(end) = body.find("}}") else {
                return Err(ParseError::new(at, "unterminated comment"));
            };
            self.pos += 3 + end + 2;
            return Ok(Ok(Node::Comment(Comment {
                value: body[..end].to_string(),
                dashed: false,
            })));
        }

        if self.eat("{{{") {
            let open = self.eat("~");
            let call = self.call(at)?;
            let close = self.close("}}}")?;
            return Ok(Ok(Node::TrustedMustache(Mustache {
                call,
                strip: Strip { open, close },
            })));
        }

        self.expect("{{")?;
        let open = self.eat("~");
        self.skip_ws();

        if self.eat("#") {
            return self.block(at, open).map(|b| Ok(Node::Block(b)));
        }

        if self.eat("/") {
            self.skip_ws();
            let name = self.word().to_string();
            let close = self.close("}}")?;
            return Ok(Err(Stop::CloseBlock {
                name,
                at,
                strip: Strip { open, close },
            }));
        }

        if self.is_else() {
            self.pos += "else".len();
            self.skip_ws();
            let chained = if self.at_close("}}") {
                None
            } else {
                Some(self.call(at)?)
            };
            let close = self.close("}}")?;
            return Ok(Err(Stop::Else {
                chained,
                at,
                strip: Strip { open, close },
            }));
        }

        let call = self.call(at)?;
        let close = self.close("}}")?;
        Ok(Ok(Node::Mustache(Mustache {
            call,
            strip: Strip { open, close },
        })))
    }

    fn is_else(&self) -> bool {
        let rest = self.rest();
        rest.starts_with("else")
            && rest[4..]
                .chars()
                .next()
                .is_some_and(|c| c.is_whitespace() || c == '}' || c == '~')
    }

    fn block(&mut self, at: usize, open: bool) -> Result<Block, ParseError> {
        let call = self.call(at)?;
        let block_params = self.block_params()?;
        let close = self.close("}}")?;
        let name = match &call.path {
            Expr::Path(path) => path.to_string(),
            _ => return Err(ParseError::new(at, "block helper must be a path")),
        };
        let body = self.block_body(&name, at)?;
        Ok(Block {
            call,
            block_params,
            program: body.program,
            inverse: body.inverse,
            chained: false,
            strip: Strip { open, close },
            inverse_strip: body.inverse_strip,
            close_strip: body.close_strip,
        })
    }

    fn block_body(&mut self, name: &str, at: usize) -> Result<BlockBody, ParseError> {
        let (program, stop) = self.nodes()?;
        let mut body = BlockBody {
            program,
            inverse: None,
            inverse_strip: Strip::default(),
            close_strip: Strip::default(),
        };
        match stop {
            Stop::CloseBlock {
                name: closing,
                at: close_at,
                strip,
            } => {
                check_close(name, &closing, close_at)?;
                body.close_strip = strip;
            }
            Stop::Else {
                chained: None,
                strip,
                ..
            } => {
                let (inverse, stop) = self.nodes()?;
                match stop {
                    Stop::CloseBlock {
                        name: closing,
                        at: close_at,
                        strip: close_strip,
                    } => {
                        check_close(name, &closing, close_at)?;
                        body.close_strip = close_strip;
                    }
                    _ => return Err(unclosed_block(name, at)),
                }
                body.inverse = Some(inverse);
                body.inverse_strip = strip;
            }
            Stop::Else {
                chained: Some(call),
                strip,
                ..
            } => {
                let chained = self.block_body(name, at)?;
                body.close_strip = chained.close_strip;
                body.inverse = Some(vec![Node::Block(Block {
                    call,
                    block_params: Vec::new(),
                    program: chained.program,
                    inverse: chained.inverse,
                    chained: true,
                    strip,
                    inverse_strip: chained.inverse_strip,
                    close_strip: chained.close_strip,
                })]);
            }
            _ => return Err(unclosed_block(name, at)),
        }
        Ok(body)
    }

    fn at_close(&self, closer: &str) -> bool {
        let rest = self.rest();
        rest.starts_with(closer) || (rest.starts_with('~') && rest[1..].starts_with(closer))
    }

    /// Consume `closer`, reporting whether a `~` preceded it.
    fn close(&mut self, closer: &str) -> Result<bool, ParseError> {
        self.skip_ws();
        let strip = self.eat("~");
        self.expect(closer)?;
        Ok(strip)
    }

    fn call(&mut self, at: usize) -> Result<Call, ParseError> {
        self.skip_ws();
        let path = self.expr()?;
        let mut call = Call::path(path);
        loop {
            self.skip_ws();
            let rest = self.rest();
            if rest.is_empty() {
                return Err(ParseError::new(at, "unterminated mustache"));
            }
            if rest.starts_with(|c: char| c == '}' || c == ')' || c == '~') || self.at_block_params() {
                return Ok(call);
            }
            let word = self.word();
            if !word.is_empty() && self.src[self.pos + word.len()..].starts_with('=') {
                self.pos += word.len() + 1;
                let value = self.expr()?;
                call.hash.push(HashPair {
                    key: word.to_string(),
                    value,
                });
            } else {
                call.params.push(self.expr()?);
            }
        }
    }

    fn at_block_params(&self) -> bool {
        let rest = self.rest();
        rest.starts_with("as") && rest[2..].trim_start().starts_with('|')
    }

    fn block_params(&mut self) -> Result<Vec<String>, ParseError> {
        self.skip_ws();
        if !self.at_block_params() {
            return Ok(Vec::new());
        }
        self.pos += 2;
        self.skip_ws();
        self.expect("|")?;
        let rest = self.rest();
        let Some(end) = rest.find('|') else {
            return Err(ParseError::new(self.pos, "unterminated block params"));
        };
        let params: Vec<String> = rest[..end].split_whitespace().map(str::to_string).collect();
        if params.is_empty() {
            return Err(ParseError::new(self.pos, "empty block params"));
        }
        self.pos += end + 1;
        Ok(params)
    }

    /// Run of characters that can make up a path or literal.
    fn word(&self) -> &'s str {
        let rest = self.rest();
        let end = rest
            .find(|c: char| {
                c.is_whitespace() || matches!(c, '}' | ')' | '(' | '=' | '|' | '~' | '"' | '\'')
            })
            .unwrap_or(rest.len());
        &rest[..end]
    }

    fn expr(&mut self) -> Result<Expr, ParseError> {
        self.skip_ws();
        let at = self.pos;
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let call = self.call(at)?;
                self.skip_ws();
                self.expect(")")?;
                Ok(Expr::SubExpr(Box::new(call)))
            }
            Some(quote @ ('"' | '\'')) => {
                let body = &self.rest()[1..];
                let Some(end) = body.find(quote) else {
                    return Err(ParseError::new(at, "unterminated string literal"));
                };
                let value = body[..end].to_string();
                self.pos += end + 2;
                Ok(Expr::String(value))
            }
            _ => {
                let word = self.word();
                if word.is_empty() {
                    return Err(ParseError::new(at, "expected an expression"));
                }
                self.pos += word.len();
                let expr = match word {
                    "true" => Expr::Bool(true),
                    "false" => Expr::Bool(false),
                    "null" => Expr::Null,
                    "undefined" => Expr::Undefined,
                    w if is_number(w) => Expr::Number(w.to_string()),
                    w => Expr::Path(
                        PathExpr::from_dotted(w)
                            .ok_or_else(|| ParseError::new(at, format!("invalid path '{}'", w)))?,
                    ),
                };
                Ok(expr)
            }
        }
    }

    fn element(&mut self) -> Result<Element, ParseError> {
        let at = self.pos;
        self.expect("<")?;
        let rest = self.rest();
        let end = rest
            .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
            .unwrap_or(rest.len());
        let mut element = Element::new(&rest[..end]);
        self.pos += end;

        loop {
            self.skip_ws();
            if self.eat("/>") {
                element.self_closing = true;
                return Ok(element);
            }
            if self.eat(">") {
                break;
            }
            if self.rest().is_empty() {
                return Err(ParseError::new(at, format!("unterminated <{}> tag", element.tag)));
            }
            if self.rest().starts_with("{{") {
                let modifier_at = self.pos;
                self.pos += 2;
                self.eat("~");
                element.modifiers.push(self.call(modifier_at)?);
                self.close("}}")?;
                continue;
            }
            if self.at_block_params() {
                element.block_params = self.block_params()?;
                continue;
            }
            element.attributes.push(self.attribute()?);
        }

        if element.is_void() {
            return Ok(element);
        }

        let (children, stop) = self.nodes()?;
        match stop {
            Stop::CloseTag { name, .. } if name == element.tag => {
                element.children = children;
                Ok(element)
            }
            Stop::CloseTag { name, at } => Err(ParseError::new(
                at,
                format!("closing tag </{}> does not match <{}>", name, element.tag),
            )),
            _ => Err(ParseError::new(at, format!("unclosed element <{}>", element.tag))),
        }
    }

    fn attribute(&mut self) -> Result<Attribute, ParseError> {
        let at = self.pos;
        let rest = self.rest();
        let end = rest
            .find(|c: char| c.is_whitespace() || matches!(c, '=' | '>' | '/'))
            .unwrap_or(rest.len());
        if end == 0 {
            return Err(ParseError::new(at, "expected attribute name"));
        }
        let name = rest[..end].to_string();
        self.pos += end;

        if !self.eat("=") {
            return Ok(Attribute {
                name,
                value: AttrValue::Valueless,
            });
        }

        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                self.concat(quote)?
            }
            Some('{') if self.rest().starts_with("{{") => {
                let mustache_at = self.pos;
                self.pos += 2;
                self.eat("~");
                let call = self.call(mustache_at)?;
                self.close("}}")?;
                AttrValue::Mustache(call)
            }
            _ => {
                let rest = self.rest();
                let end = rest
                    .find(|c: char| c.is_whitespace() || c == '>')
                    .unwrap_or(rest.len());
                self.pos += end;
                AttrValue::Text {
                    value: rest[..end].to_string(),
                    quote: None,
                }
            }
        };
        Ok(Attribute { name, value })
    }

    fn concat(&mut self, quote: char) -> Result<AttrValue, ParseError> {
        let at = self.pos;
        let mut parts = Vec::new();
        let mut text_start = self.pos;
        loop {
            let rest = self.rest();
            let Some(c) = rest.chars().next() else {
                return Err(ParseError::new(at, "unterminated attribute value"));
            };
            if c == quote {
                if self.pos > text_start {
                    parts.push(ConcatPart::Text(self.src[text_start..self.pos].to_string()));
                }
                self.pos += 1;
                break;
            }
            if rest.starts_with("{{") {
                if self.pos > text_start {
                    parts.push(ConcatPart::Text(self.src[text_start..self.pos].to_string()));
                }
                let mustache_at = self.pos;
                self.pos += 2;
                self.eat("~");
                parts.push(ConcatPart::Mustache(self.call(mustache_at)?));
                self.close("}}")?;
                text_start = self.pos;
                continue;
            }
            self.pos += c.len_utf8();
        }

        let quote = Some(quote);
        Ok(match parts.as_slice() {
            [] => AttrValue::Text {
                value: String::new(),
                quote,
            },
            [ConcatPart::Text(text)] => AttrValue::Text {
                value: text.clone(),
                quote,
            },
            _ => AttrValue::Concat {
                parts,
                quote: quote.unwrap_or('"'),
            },
        })
    }
}

fn push_text(nodes: &mut Vec<Node>, text: &str) {
    if !text.is_empty() {
        nodes.push(Node::Text(text.to_string()));
    }
}

fn is_tag_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '@' || c == ':'
}

fn is_number(word: &str) -> bool {
    let digits = word.strip_prefix('-').unwrap_or(word);
    !digits.is_empty()
        && digits.starts_with(|c: char| c.is_ascii_digit())
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
}

fn check_close(open: &str, close: &str, at: usize) -> Result<(), ParseError> {
    if open == close {
        Ok(())
    } else {
        Err(ParseError::new(
            at,
            format!("{{{{/{}}}}} does not match {{{{#{}}}}}", close, open),
        ))
    }
}

fn unclosed_block(name: &str, at: usize) -> ParseError {
    ParseError::new(at, format!("unclosed block {{{{#{}}}}}", name))
}
