//! Schema resolution: field declarations and the parent pointer read from a
//! card's schema source, field lookup through the builder, and the
//! collision-checked merge with inherited fields.

use crate::builder::Builder;
use crate::error::{CompileError, Result};
use crate::js::{apply_edits, quote_string, DecoratorArg, Edit, Module};
use crate::types::{Field, FieldType, Fields};
use crate::utils::resolve_card_specifier;
use futures::future::try_join_all;
use std::collections::HashMap;
use tracing::debug;

/// Decorator that declares the schema-level parent.
const ADOPTS_DECORATOR: &str = "adopts";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDeclaration {
    pub name: String,
    pub field_type: FieldType,
    pub card_url: String,
}

/// What a schema source declares about its card.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SchemaMeta {
    pub parent: Option<String>,
    pub fields: Vec<FieldDeclaration>,
}

/// A parsed schema source.
#[derive(Debug)]
pub struct Schema {
    pub file: String,
    source: String,
    module: Module,
    pub meta: SchemaMeta,
}

impl Schema {
    pub fn analyze(card_url: &str, file: &str, source: &str, types_module: &str) -> Result<Self> {
        let module = Module::parse(source).map_err(|e| CompileError::Syntax {
            url: card_url.to_string(),
            file: file.to_string(),
            format: None,
            offset: e.offset,
            message: e.message,
        })?;
        let meta = read_declarations(card_url, &module, types_module)?;
        debug!(
            url = %card_url,
            fields = meta.fields.len(),
            parent = ?meta.parent,
            "analyzed schema"
        );
        Ok(Self {
            file: file.to_string(),
            source: source.to_string(),
            module,
            meta,
        })
    }

    /// Rewrite card imports to the compiled schema modules of the cards they
    /// name. `schema_modules` maps card URL to schema module.
    pub fn transform(&self, card_url: &str, schema_modules: &HashMap<String, String>) -> String {
        let edits = self
            .module
            .imports()
            .iter()
            .filter_map(|import| {
                let target = resolve_card_specifier(card_url, &import.specifier)?;
                let schema_module = schema_modules.get(&target)?;
                Some(Edit::replace(
                    import.specifier_span,
                    quote_string(schema_module, import.specifier_quote),
                ))
            })
            .collect();
        apply_edits(&self.source, edits)
    }
}

fn read_declarations(card_url: &str, module: &Module, types_module: &str) -> Result<SchemaMeta> {
    let Some(class) = module
        .classes()
        .iter()
        .find(|c| !c.decorators.is_empty() || c.members.iter().any(|m| !m.decorators.is_empty()))
        .or_else(|| module.classes().first())
    else {
        return Ok(SchemaMeta::default());
    };

    let imported_as = |local: &str| -> Option<String> {
        module
            .import_for(local)
            .filter(|import| import.specifier == types_module)
            .and_then(|import| import.named.iter().find(|n| n.local == local))
            .map(|n| n.imported.clone())
    };

    let card_argument = |field: &str, args: &[DecoratorArg]| -> Result<String> {
        let invalid = |reason: String| CompileError::InvalidFieldDeclaration {
            url: card_url.to_string(),
            field: field.to_string(),
            reason,
        };
        let [DecoratorArg::Ident(ident)] = args else {
            return Err(invalid(
                "expected a single card identifier as the decorator argument".to_string(),
            ));
        };
        let import = module
            .import_for(ident)
            .ok_or_else(|| invalid(format!("'{}' is not imported", ident)))?;
        resolve_card_specifier(card_url, &import.specifier).ok_or_else(|| {
            invalid(format!(
                "'{}' is imported from '{}', which is not a card",
                ident, import.specifier
            ))
        })
    };

    let mut meta = SchemaMeta::default();
    for decorator in &class.decorators {
        if imported_as(&decorator.name).as_deref() == Some(ADOPTS_DECORATOR) {
            let class_name = class.name.clone().unwrap_or_else(|| "default".to_string());
            meta.parent = Some(card_argument(&class_name, &decorator.args)?);
        }
    }

    for member in &class.members {
        let mut declared: Option<FieldType> = None;
        for decorator in &member.decorators {
            let Some(field_type) = imported_as(&decorator.name)
                .as_deref()
                .and_then(FieldType::from_decorator)
            else {
                continue;
            };
            if declared.is_some() {
                return Err(CompileError::InvalidFieldDeclaration {
                    url: card_url.to_string(),
                    field: member.name.clone(),
                    reason: "more than one field decorator".to_string(),
                });
            }
            if member.is_method || member.name.is_empty() {
                return Err(CompileError::InvalidFieldDeclaration {
                    url: card_url.to_string(),
                    field: member.name.clone(),
                    reason: "fields must be named class properties".to_string(),
                });
            }
            declared = Some(field_type);
            meta.fields.push(FieldDeclaration {
                name: member.name.clone(),
                field_type,
                card_url: card_argument(&member.name, &decorator.args)?,
            });
        }
    }
    Ok(meta)
}

/// Look up every declared field's card through the builder. Lookups are
/// issued concurrently; the result keeps declaration order.
pub async fn resolve_fields(
    builder: &dyn Builder,
    declarations: &[FieldDeclaration],
) -> Result<Fields> {
    let cards = try_join_all(
        declarations
            .iter()
            .map(|decl| builder.get_compiled_card(&decl.card_url)),
    )
    .await?;

    Ok(declarations
        .iter()
        .zip(cards)
        .map(|(decl, card)| {
            (
                decl.name.clone(),
                Field {
                    name: decl.name.clone(),
                    field_type: decl.field_type,
                    card,
                },
            )
        })
        .collect())
}

/// Parent fields first, then own fields. Redefining an inherited field is
/// an error naming every colliding field.
pub fn merge_fields(card_url: &str, parent_url: &str, parent: &Fields, own: Fields) -> Result<Fields> {
    let mut collisions: Vec<String> = own
        .keys()
        .filter(|name| parent.contains_key(*name))
        .cloned()
        .collect();
    if !collisions.is_empty() {
        collisions.sort();
        return Err(CompileError::FieldCollision {
            url: card_url.to_string(),
            parent: parent_url.to_string(),
            fields: collisions,
        });
    }

    let mut merged = parent.clone();
    merged.extend(own);
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TYPES_MODULE;

    const POST_SCHEMA: &str = r#"
import { contains, containsMany, belongsTo as link, adopts } from "@cardstack/types";
import string from "https://cardstack.com/base/string";
import date from "https://cardstack.com/base/date";
import Person from "../person";
import Article from "./article";

export default @adopts(Article) class Post {
  @contains(string) title;
  @containsMany(date) milestones;
  @link(Person) author;
  summary() { return this.title; }
}
"#;

    #[test]
    fn test_analyze_fields_and_parent() {
        let schema =
            Schema::analyze("https://demo.com/post", "schema.js", POST_SCHEMA, TYPES_MODULE)
                .unwrap();

        assert_eq!(
            schema.meta.parent.as_deref(),
            Some("https://demo.com/post/article")
        );
        assert_eq!(
            schema.meta.fields,
            vec![
                FieldDeclaration {
                    name: "title".into(),
                    field_type: FieldType::Contains,
                    card_url: "https://cardstack.com/base/string".into(),
                },
                FieldDeclaration {
                    name: "milestones".into(),
                    field_type: FieldType::ContainsMany,
                    card_url: "https://cardstack.com/base/date".into(),
                },
                FieldDeclaration {
                    name: "author".into(),
                    field_type: FieldType::BelongsTo,
                    card_url: "https://demo.com/person".into(),
                },
            ]
        );
    }

    #[test]
    fn test_decorators_from_other_modules_are_ignored() {
        let source = r#"
import { contains } from "./my-decorators";
import string from "https://cardstack.com/base/string";
export default class Note {
  @contains(string) body;
}
"#;
        let schema =
            Schema::analyze("https://demo.com/note", "schema.js", source, TYPES_MODULE).unwrap();
        assert!(schema.meta.fields.is_empty());
    }

    #[test]
    fn test_field_argument_must_be_imported_card() {
        let source = r#"
import { contains } from "@cardstack/types";
import { helper } from "some-package";
export default class Note {
  @contains(helper) body;
}
"#;
        let err = Schema::analyze("https://demo.com/note", "schema.js", source, TYPES_MODULE)
            .unwrap_err();
        assert!(matches!(
            err,
            CompileError::InvalidFieldDeclaration { ref field, .. } if field == "body"
        ));

        let source = r#"
import { contains } from "@cardstack/types";
export default class Note {
  @contains(Missing) body;
}
"#;
        let err = Schema::analyze("https://demo.com/note", "schema.js", source, TYPES_MODULE)
            .unwrap_err();
        assert!(err.to_string().contains("'Missing' is not imported"));
    }

    #[test]
    fn test_schema_syntax_error_names_card_and_file() {
        let err = Schema::analyze(
            "https://demo.com/note",
            "schema.js",
            "export default class Note { @contains(",
            TYPES_MODULE,
        )
        .unwrap_err();
        match err {
            CompileError::Syntax { url, file, format, .. } => {
                assert_eq!(url, "https://demo.com/note");
                assert_eq!(file, "schema.js");
                assert_eq!(format, None);
            }
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn test_transform_rewrites_card_imports() {
        let schema =
            Schema::analyze("https://demo.com/post", "schema.js", POST_SCHEMA, TYPES_MODULE)
                .unwrap();
        let modules = HashMap::from([
            (
                "https://demo.com/person".to_string(),
                "@cardstack/compiled/demo.com-person/schema.js".to_string(),
            ),
            (
                "https://cardstack.com/base/string".to_string(),
                "@cardstack/compiled/cardstack.com-base-string/schema.js".to_string(),
            ),
        ]);
        let out = schema.transform("https://demo.com/post", &modules);

        assert!(out.contains(r#"import Person from "@cardstack/compiled/demo.com-person/schema.js";"#));
        assert!(out.contains(
            r#"import string from "@cardstack/compiled/cardstack.com-base-string/schema.js";"#
        ));
        assert!(out.contains(r#"import Article from "./article";"#));
        assert!(out.contains(r#"from "@cardstack/types";"#));
    }
}
