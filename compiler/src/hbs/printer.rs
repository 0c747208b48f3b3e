use super::ast::*;

/// Render nodes back to template source.
pub fn print_template(nodes: &[Node]) -> String {
    let mut out = String::new();
    print_nodes(&mut out, nodes);
    out
}

fn print_nodes(out: &mut String, nodes: &[Node]) {
    for node in nodes {
        print_node(out, node);
    }
}

fn print_node(out: &mut String, node: &Node) {
    match node {
        Node::Text(text) => out.push_str(text),
        Node::Comment(comment) if comment.dashed => {
            out.push_str("{{!--");
            out.push_str(&comment.value);
            out.push_str("--}}");
        }
        Node::Comment(comment) => {
            out.push_str("{{!");
            out.push_str(&comment.value);
            out.push_str("}}");
        }
        Node::HtmlComment(value) => {
            out.push_str("<!--");
            out.push_str(value);
            out.push_str("-->");
        }
        Node::Mustache(mustache) => {
            open_tag(out, "{{", mustache.strip);
            print_call(out, &mustache.call);
            close_tag(out, "}}", mustache.strip);
        }
        Node::TrustedMustache(mustache) => {
            open_tag(out, "{{{", mustache.strip);
            print_call(out, &mustache.call);
            close_tag(out, "}}}", mustache.strip);
        }
        Node::Block(block) => print_block(out, block),
        Node::Element(element) => print_element(out, element),
    }
}

fn open_tag(out: &mut String, delimiter: &str, strip: Strip) {
    out.push_str(delimiter);
    if strip.open {
        out.push('~');
    }
}

fn close_tag(out: &mut String, delimiter: &str, strip: Strip) {
    if strip.close {
        out.push('~');
    }
    out.push_str(delimiter);
}

fn print_block(out: &mut String, block: &Block) {
    open_tag(out, "{{", block.strip);
    out.push_str(if block.chained { "else " } else { "#" });
    print_call(out, &block.call);
    print_block_params(out, &block.block_params);
    close_tag(out, "}}", block.strip);
    print_nodes(out, &block.program);

    match block.inverse.as_deref() {
        Some([Node::Block(chained)]) if chained.chained => print_block(out, chained),
        Some(inverse) => {
            open_tag(out, "{{", block.inverse_strip);
            out.push_str("else");
            close_tag(out, "}}", block.inverse_strip);
            print_nodes(out, inverse);
        }
        None => {}
    }

    if !block.chained {
        open_tag(out, "{{", block.close_strip);
        out.push('/');
        print_expr(out, &block.call.path);
        close_tag(out, "}}", block.close_strip);
    }
}

fn print_element(out: &mut String, element: &Element) {
    out.push('<');
    out.push_str(&element.tag);
    for attribute in &element.attributes {
        out.push(' ');
        out.push_str(&attribute.name);
        match &attribute.value {
            AttrValue::Valueless => {}
            AttrValue::Text { value, quote } => {
                out.push('=');
                match quote {
                    None if is_bare_value(value) => out.push_str(value),
                    _ => {
                        let quote = quote.unwrap_or_else(|| quote_for(value));
                        out.push(quote);
                        out.push_str(value);
                        out.push(quote);
                    }
                }
            }
            AttrValue::Mustache(call) => {
                out.push_str("={{");
                print_call(out, call);
                out.push_str("}}");
            }
            AttrValue::Concat { parts, quote } => {
                out.push('=');
                out.push(*quote);
                for part in parts {
                    match part {
                        ConcatPart::Text(text) => out.push_str(text),
                        ConcatPart::Mustache(call) => {
                            out.push_str("{{");
                            print_call(out, call);
                            out.push_str("}}");
                        }
                    }
                }
                out.push(*quote);
            }
        }
    }
    for modifier in &element.modifiers {
        out.push_str(" {{");
        print_call(out, modifier);
        out.push_str("}}");
    }
    print_block_params(out, &element.block_params);

    if element.self_closing {
        out.push_str(" />");
        return;
    }
    out.push('>');
    if element.is_void() && element.children.is_empty() {
        return;
    }
    print_nodes(out, &element.children);
    out.push_str("</");
    out.push_str(&element.tag);
    out.push('>');
}

/// Whether an attribute value can be written without quotes.
fn is_bare_value(value: &str) -> bool {
    !value.is_empty()
        && !value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '=' | '<' | '>' | '`'))
}

fn quote_for(value: &str) -> char {
    if value.contains('"') {
        '\''
    } else {
        '"'
    }
}

fn print_block_params(out: &mut String, params: &[String]) {
    if !params.is_empty() {
        out.push_str(" as |");
        out.push_str(&params.join(" "));
        out.push('|');
    }
}

fn print_call(out: &mut String, call: &Call) {
    print_expr(out, &call.path);
    for param in &call.params {
        out.push(' ');
        print_expr(out, param);
    }
    for pair in &call.hash {
        out.push(' ');
        out.push_str(&pair.key);
        out.push('=');
        print_expr(out, &pair.value);
    }
}

fn print_expr(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Path(path) => out.push_str(&path.to_string()),
        Expr::String(value) => {
            let quote = quote_for(value);
            out.push(quote);
            out.push_str(value);
            out.push(quote);
        }
        Expr::Number(n) => out.push_str(n),
        Expr::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Expr::Null => out.push_str("null"),
        Expr::Undefined => out.push_str("undefined"),
        Expr::SubExpr(call) => {
            out.push('(');
            print_call(out, call);
            out.push(')');
        }
    }
}
