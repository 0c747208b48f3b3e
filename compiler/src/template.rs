//! Component transformation.
//!
//! A component source calls `precompileTemplate(template, options)`. Field
//! references in the template (`<@fields.author />` or `{{@fields.author}}`)
//! are either spliced inline, when the field card's embedded component has
//! an inline template, or turned into an import plus a scope binding. The
//! rewritten source is registered under a filename derived from the field
//! table.

use crate::builder::ModuleDefiner;
use crate::error::{CompileError, Result};
use crate::hbs::{
    self, AttrValue, Attribute, Block, Call, ConcatPart, Element, Expr, HashPair, Mustache, Node,
    PathExpr, Strip,
};
use crate::js::{apply_edits, quote_string, Edit, Module, ScopeEntry, TemplateCall};
use crate::types::{ComponentInfo, Field, Fields, Format};
use crate::utils::{last_url_segment, similar_names, split_extension, to_pascal_case};
use indexmap::{IndexMap, IndexSet};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

pub const TEMPLATE_CALLEE: &str = "precompileTemplate";

const FIELDS_TAG_PREFIX: &str = "@fields.";
const FIELDS_ARG: &str = "fields";
const MODEL_ARG: &str = "model";

/// One component file to compile.
#[derive(Debug, Clone, Copy)]
pub struct ComponentSource<'a> {
    /// Card the compiled module is registered for.
    pub card_url: &'a str,
    /// Card that authored the template.
    pub source_card_url: &'a str,
    pub format: Format,
    pub file: &'a str,
    pub source: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransformedComponent {
    pub source: String,
    pub template: String,
    pub used_fields: Vec<String>,
    pub deserialize: Option<BTreeMap<String, Vec<String>>>,
    pub inline_hbs: Option<String>,
    /// `(local identifier, module)` per emitted import.
    pub imports: Vec<(String, String)>,
}

/// Transform a component against `fields` and register it with `definer`.
pub async fn compile_component(
    definer: &dyn ModuleDefiner,
    input: ComponentSource<'_>,
    fields: &Fields,
) -> Result<ComponentInfo> {
    let transformed = transform_component(&input, fields)?;
    let filename = content_addressed_filename(input.file, fields);
    let module_name = definer
        .define(input.card_url, &filename, &transformed.source)
        .await?;
    debug!(
        url = %input.card_url,
        format = %input.format,
        module = %module_name,
        imports = transformed.imports.len(),
        inline = transformed.inline_hbs.is_some(),
        "compiled component"
    );

    Ok(ComponentInfo {
        module_name,
        used_fields: transformed.used_fields,
        deserialize: transformed.deserialize,
        inline_hbs: transformed.inline_hbs,
        source_card_url: input.source_card_url.to_string(),
    })
}

/// `<stem>-<hash><ext>`, the hash covering every field name and field card
/// URL in table order.
pub fn content_addressed_filename(file: &str, fields: &Fields) -> String {
    let mut hasher = Sha256::new();
    for (name, field) in fields {
        hasher.update(name.as_bytes());
        hasher.update(field.card.url.as_bytes());
    }
    let digest = hex::encode(hasher.finalize());
    let (stem, ext) = split_extension(file);
    format!("{}-{}{}", stem, &digest[..16], ext)
}

pub fn transform_component(input: &ComponentSource<'_>, fields: &Fields) -> Result<TransformedComponent> {
    let syntax = |offset: usize, message: String| CompileError::Syntax {
        url: input.card_url.to_string(),
        file: input.file.to_string(),
        format: Some(input.format),
        offset,
        message,
    };

    let module = Module::parse(input.source).map_err(|e| syntax(e.offset, e.message))?;
    let call = module
        .find_template_call(TEMPLATE_CALLEE)
        .map_err(|e| syntax(e.offset, e.message))?
        .ok_or_else(|| syntax(0, format!("component does not call {}", TEMPLATE_CALLEE)))?;
    let template = hbs::parse_template(&call.template.value)
        .map_err(|e| syntax(e.offset, format!("in template: {}", e.message)))?;

    let existing_scope: Vec<ScopeEntry> = call
        .options
        .as_ref()
        .and_then(|options| options.scope.as_ref())
        .map(|scope| scope.entries.clone())
        .unwrap_or_default();

    let mut names = Namespace::default();
    names.reserve(module.bindings().iter().cloned());
    names.reserve(existing_scope.iter().map(|entry| entry.key.clone()));
    names.reserve(block_params(&template));

    let mut rewriter = Rewriter {
        card_url: input.card_url,
        format: input.format,
        names,
        imports: IndexMap::new(),
        used: IndexSet::new(),
    };
    let rewritten = rewriter.nodes(&template, &Context::root(fields))?;
    let printed = hbs::print_template(&rewritten);

    let added: Vec<ScopeEntry> = rewriter
        .imports
        .values()
        .map(|ident| ScopeEntry {
            key: ident.clone(),
            value: ident.clone(),
        })
        .collect();

    let mut edits = vec![Edit::replace(
        call.template.span,
        quote_string(&printed, call.template.quote),
    )];
    if !added.is_empty() {
        edits.push(import_edit(&module, &rewriter.imports));
        edits.push(scope_edit(&call, &existing_scope, &added));
    }
    let source = apply_edits(input.source, edits);

    let scope_is_empty = existing_scope.is_empty() && added.is_empty();
    let deserialize = deserialize_paths(fields, &rewriter.used);
    Ok(TransformedComponent {
        source,
        inline_hbs: scope_is_empty.then(|| printed.clone()),
        template: printed,
        used_fields: rewriter.used.into_iter().collect(),
        deserialize,
        imports: rewriter
            .imports
            .into_iter()
            .map(|(module, ident)| (ident, module))
            .collect(),
    })
}

/// Names bound in a template's lexical scope.
#[derive(Debug, Default)]
struct Namespace {
    taken: BTreeSet<String>,
}

impl Namespace {
    fn reserve(&mut self, names: impl IntoIterator<Item = String>) {
        self.taken.extend(names);
    }

    /// `base` if free, else the first free `base1`, `base2`, ...
    fn allocate(&mut self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut counter = 0usize;
        while self.taken.contains(&candidate) {
            counter += 1;
            candidate = format!("{}{}", base, counter);
        }
        self.taken.insert(candidate.clone());
        candidate
    }
}

/// Where `@model` points and which fields are in reach.
struct Context<'f> {
    fields: &'f Fields,
    model: PathExpr,
    /// Used-field path of the model; `None` for the card itself.
    prefix: Option<String>,
}

impl<'f> Context<'f> {
    fn root(fields: &'f Fields) -> Self {
        Self {
            fields,
            model: PathExpr::arg(MODEL_ARG, Vec::new()),
            prefix: None,
        }
    }

    fn usage(&self, tail: &[String]) -> Option<String> {
        match (&self.prefix, tail.is_empty()) {
            (None, true) => None,
            (None, false) => Some(tail.join(".")),
            (Some(prefix), true) => Some(prefix.clone()),
            (Some(prefix), false) => Some(format!("{}.{}", prefix, tail.join("."))),
        }
    }

    fn model_path(&self, tail: &[String]) -> PathExpr {
        let mut path = self.model.clone();
        path.tail.extend(tail.iter().cloned());
        path
    }
}

struct Rewriter<'a> {
    card_url: &'a str,
    format: Format,
    names: Namespace,
    /// Child module to local identifier.
    imports: IndexMap<String, String>,
    used: IndexSet<String>,
}

impl Rewriter<'_> {
    fn nodes(&mut self, nodes: &[Node], ctx: &Context<'_>) -> Result<Vec<Node>> {
        let mut out = Vec::with_capacity(nodes.len());
        // Set by a `~}}` on a field mustache, which is replaced by its field.
        let mut strip_next = false;
        for node in nodes {
            let strip_start = std::mem::take(&mut strip_next);
            if let Some((path, strip)) = field_mustache(node) {
                if strip.open {
                    trim_trailing_text(&mut out);
                }
                out.extend(self.field_reference(&path, &[], &[], ctx)?);
                strip_next = strip.close;
                continue;
            }
            match node {
                Node::Mustache(mustache) => out.push(Node::Mustache(self.mustache(mustache, ctx))),
                Node::TrustedMustache(mustache) => {
                    out.push(Node::TrustedMustache(self.mustache(mustache, ctx)))
                }
                Node::Block(block) => out.push(Node::Block(self.block(block, ctx)?)),
                Node::Element(element) => match element.tag.strip_prefix(FIELDS_TAG_PREFIX) {
                    Some(path) => {
                        let path: Vec<String> = path.split('.').map(str::to_string).collect();
                        let attributes = self.attributes(&element.attributes, ctx);
                        let children = self.nodes(&element.children, ctx)?;
                        out.extend(self.field_reference(&path, &attributes, &children, ctx)?);
                    }
                    None => out.push(Node::Element(self.element(element, ctx)?)),
                },
                Node::Text(text) if strip_start => {
                    let text = text.trim_start();
                    if !text.is_empty() {
                        out.push(Node::Text(text.to_string()));
                    }
                }
                Node::Text(_) | Node::Comment(_) | Node::HtmlComment(_) => out.push(node.clone()),
            }
        }
        Ok(out)
    }

    /// Expand a reference to `path` (field names) into nodes rendering it.
    /// `attributes` and `children` are already rewritten for `ctx`.
    fn field_reference(
        &mut self,
        path: &[String],
        attributes: &[Attribute],
        children: &[Node],
        ctx: &Context<'_>,
    ) -> Result<Vec<Node>> {
        let Some((name, rest)) = path.split_first() else {
            return Ok(Vec::new());
        };
        let field = ctx.fields.get(name).ok_or_else(|| self.unknown_field(name, ctx))?;
        let usage = ctx
            .usage(std::slice::from_ref(name))
            .unwrap_or_else(|| name.clone());
        self.used.insert(usage.clone());

        let value_path = ctx.model_path(std::slice::from_ref(name));
        let (inner, each) = if field.field_type.is_plural() {
            let item = self.names.allocate(&format!("{}Item", name));
            let inner = Context {
                fields: &field.card.fields,
                model: PathExpr::var(item.clone(), Vec::new()),
                prefix: Some(usage),
            };
            (inner, Some((value_path, item)))
        } else {
            let inner = Context {
                fields: &field.card.fields,
                model: value_path,
                prefix: Some(usage),
            };
            (inner, None)
        };

        let body = if rest.is_empty() {
            self.render_field(field, attributes, children, &inner)?
        } else {
            self.field_reference(rest, attributes, children, &inner)?
        };

        Ok(match each {
            Some((list, item)) => vec![each_block(list, item, body)],
            None => body,
        })
    }

    fn render_field(
        &mut self,
        field: &Field,
        attributes: &[Attribute],
        children: &[Node],
        ctx: &Context<'_>,
    ) -> Result<Vec<Node>> {
        let child = &field.card.embedded;
        for used in &child.used_fields {
            let tail: Vec<String> = used.split('.').map(str::to_string).collect();
            if let Some(path) = ctx.usage(&tail) {
                self.used.insert(path);
            }
        }

        if let Some(fragment) = &child.inline_hbs {
            let nodes = hbs::parse_template(fragment).map_err(|e| CompileError::Syntax {
                url: field.card.url.clone(),
                file: child.module_name.clone(),
                format: Some(Format::Embedded),
                offset: e.offset,
                message: e.message,
            })?;
            if !attributes.is_empty() {
                debug!(
                    url = %self.card_url,
                    field = %field.name,
                    "attributes on an inlined field reference are dropped"
                );
            }
            if !children.is_empty() {
                warn!(
                    url = %self.card_url,
                    field = %field.name,
                    "block content of an inlined field reference is dropped"
                );
            }
            self.names.reserve(block_params(&nodes));
            return self.nodes(&nodes, ctx);
        }

        let ident = self.import(&child.module_name, &field.card.url);
        let model_arg = format!("@{}", MODEL_ARG);
        let mut element = Element::new(ident);
        element.attributes.extend(
            attributes
                .iter()
                .filter(|a| a.name != model_arg)
                .cloned(),
        );
        element.attributes.insert(
            0,
            Attribute {
                name: model_arg,
                value: AttrValue::Mustache(Call::path(Expr::Path(ctx.model.clone()))),
            },
        );
        element.children = children.to_vec();
        element.self_closing = element.children.is_empty();
        Ok(vec![Node::Element(element)])
    }

    fn import(&mut self, module: &str, card_url: &str) -> String {
        if let Some(ident) = self.imports.get(module) {
            return ident.clone();
        }
        let base = format!("{}Field", to_pascal_case(last_url_segment(card_url)));
        let ident = self.names.allocate(&base);
        self.imports.insert(module.to_string(), ident.clone());
        ident
    }

    fn unknown_field(&self, name: &str, ctx: &Context<'_>) -> CompileError {
        CompileError::UnknownField {
            url: self.card_url.to_string(),
            format: self.format,
            field: ctx
                .usage(&[name.to_string()])
                .unwrap_or_else(|| name.to_string()),
            suggestions: similar_names(name, ctx.fields.keys().map(String::as_str)),
        }
    }

    fn block(&mut self, block: &Block, ctx: &Context<'_>) -> Result<Block> {
        Ok(Block {
            call: self.call(&block.call, ctx),
            block_params: block.block_params.clone(),
            program: self.nodes(&block.program, ctx)?,
            inverse: match &block.inverse {
                Some(inverse) => Some(self.nodes(inverse, ctx)?),
                None => None,
            },
            chained: block.chained,
            strip: block.strip,
            inverse_strip: block.inverse_strip,
            close_strip: block.close_strip,
        })
    }

    fn element(&mut self, element: &Element, ctx: &Context<'_>) -> Result<Element> {
        Ok(Element {
            tag: element.tag.clone(),
            attributes: self.attributes(&element.attributes, ctx),
            modifiers: element
                .modifiers
                .iter()
                .map(|m| self.call(m, ctx))
                .collect(),
            block_params: element.block_params.clone(),
            children: self.nodes(&element.children, ctx)?,
            self_closing: element.self_closing,
        })
    }

    fn attributes(&mut self, attributes: &[Attribute], ctx: &Context<'_>) -> Vec<Attribute> {
        attributes
            .iter()
            .map(|attribute| Attribute {
                name: attribute.name.clone(),
                value: match &attribute.value {
                    AttrValue::Mustache(call) => AttrValue::Mustache(self.call(call, ctx)),
                    AttrValue::Concat { parts, quote } => AttrValue::Concat {
                        parts: parts
                            .iter()
                            .map(|part| match part {
                                ConcatPart::Mustache(call) => {
                                    ConcatPart::Mustache(self.call(call, ctx))
                                }
                                ConcatPart::Text(_) => part.clone(),
                            })
                            .collect(),
                        quote: *quote,
                    },
                    other => other.clone(),
                },
            })
            .collect()
    }

    fn mustache(&mut self, mustache: &Mustache, ctx: &Context<'_>) -> Mustache {
        Mustache {
            call: self.call(&mustache.call, ctx),
            strip: mustache.strip,
        }
    }

    fn call(&mut self, call: &Call, ctx: &Context<'_>) -> Call {
        Call {
            path: self.expr(&call.path, ctx),
            params: call.params.iter().map(|p| self.expr(p, ctx)).collect(),
            hash: call
                .hash
                .iter()
                .map(|pair| HashPair {
                    key: pair.key.clone(),
                    value: self.expr(&pair.value, ctx),
                })
                .collect(),
        }
    }

    fn expr(&mut self, expr: &Expr, ctx: &Context<'_>) -> Expr {
        match expr {
            Expr::Path(path) if path.is_arg(MODEL_ARG) => {
                if let Some(used) = ctx.usage(&path.tail) {
                    self.used.insert(used);
                }
                Expr::Path(ctx.model_path(&path.tail))
            }
            Expr::SubExpr(call) => Expr::SubExpr(Box::new(self.call(call, ctx))),
            other => other.clone(),
        }
    }
}

/// Drop whitespace at the end of the last node when it is text.
fn trim_trailing_text(out: &mut Vec<Node>) {
    if let Some(Node::Text(text)) = out.last_mut() {
        let len = text.trim_end().len();
        text.truncate(len);
        if text.is_empty() {
            out.pop();
        }
    }
}

/// Field path and whitespace control of a field mustache, in either the
/// `{{ }}` or the `{{{ }}}` form.
fn field_mustache(node: &Node) -> Option<(Vec<String>, Strip)> {
    match node {
        Node::Mustache(mustache) | Node::TrustedMustache(mustache) => {
            field_marker(&mustache.call).map(|path| (path, mustache.strip))
        }
        _ => None,
    }
}

/// Field names of a bare `@fields.a.b` call.
fn field_marker(call: &Call) -> Option<Vec<String>> {
    match &call.path {
        Expr::Path(path)
            if path.is_arg(FIELDS_ARG)
                && !path.tail.is_empty()
                && call.params.is_empty()
                && call.hash.is_empty() =>
        {
            Some(path.tail.clone())
        }
        _ => None,
    }
}

fn each_block(list: PathExpr, item: String, body: Vec<Node>) -> Node {
    let call = Call {
        path: Expr::Path(PathExpr::var("each", Vec::new())),
        params: vec![Expr::Path(list)],
        hash: Vec::new(),
    };
    Node::Block(Block::new(call, vec![item], body))
}

fn block_params(nodes: &[Node]) -> Vec<String> {
    fn walk(nodes: &[Node], out: &mut Vec<String>) {
        for node in nodes {
            match node {
                Node::Block(block) => {
                    out.extend(block.block_params.iter().cloned());
                    walk(&block.program, out);
                    if let Some(inverse) = &block.inverse {
                        walk(inverse, out);
                    }
                }
                Node::Element(element) => {
                    out.extend(element.block_params.iter().cloned());
                    walk(&element.children, out);
                }
                _ => {}
            }
        }
    }
    let mut out = Vec::new();
    walk(nodes, &mut out);
    out
}

fn import_edit(module: &Module, imports: &IndexMap<String, String>) -> Edit {
    let at = module.import_insertion_point();
    let text: String = imports
        .iter()
        .map(|(specifier, ident)| {
            let line = format!("import {} from {};", ident, quote_string(specifier, '"'));
            if at == 0 {
                format!("{}\n", line)
            } else {
                format!("\n{}", line)
            }
        })
        .collect();
    Edit::insert(at, text)
}

fn scope_edit(call: &TemplateCall, existing: &[ScopeEntry], added: &[ScopeEntry]) -> Edit {
    let entries = existing
        .iter()
        .chain(added)
        .map(|entry| {
            if entry.key == entry.value {
                entry.key.clone()
            } else {
                format!("{}: {}", entry.key, entry.value)
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    let scope = format!("scope: () => ({{ {} }})", entries);

    match &call.options {
        Some(options) => match &options.scope {
            Some(property) => Edit::replace(property.object_span, format!("{{ {} }}", entries)),
            None if options.keys.is_empty() => {
                Edit::replace(options.span, format!("{{ {} }}", scope))
            }
            None => {
                warn!(keys = ?options.keys, "template options have no scope, adding one");
                Edit::insert(options.span.start + 1, format!(" {},", scope))
            }
        },
        None => Edit::insert(call.close_paren, format!(", {{ {} }}", scope)),
    }
}

/// Serializer name to the used paths whose leaf field card declares it.
fn deserialize_paths(
    fields: &Fields,
    used: &IndexSet<String>,
) -> Option<BTreeMap<String, Vec<String>>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for path in used {
        if let Some(serializer) = leaf_serializer(fields, path) {
            map.entry(serializer.to_string())
                .or_default()
                .push(path.clone());
        }
    }
    (!map.is_empty()).then_some(map)
}

fn leaf_serializer<'f>(fields: &'f Fields, path: &str) -> Option<&'f str> {
    let mut current = fields;
    let mut leaf = None;
    for segment in path.split('.') {
        let field = current.get(segment)?;
        current = &field.card.fields;
        leaf = Some(field);
    }
    leaf?.card.deserializer.as_deref()
}
