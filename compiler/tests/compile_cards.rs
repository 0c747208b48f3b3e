use cardhost_compiler::base::{DATE_CARD_URL, STRING_CARD_URL};
use cardhost_compiler::{
    AssetType, Builder, CardDocument, CardModel, CardValue, CompileError, CompilerConfig, Format,
    MemoryBuilder, RawCard, SerializerRegistry, ValidationError, BASE_CARD_URL,
};
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

const TEMPLATE_IMPORT: &str =
    r#"import { precompileTemplate } from "@ember/template-compilation";"#;

fn component(template: &str) -> String {
    format!(
        "{}\nexport default precompileTemplate({:?}, {{ strictMode: true }});\n",
        TEMPLATE_IMPORT, template
    )
}

fn schema(imports: &str, class: &str) -> String {
    format!(
        "import {{ contains, containsMany, belongsTo, hasMany, adopts }} from \"@cardstack/types\";\n{}\nexport default {}\n",
        imports, class
    )
}

fn builder() -> MemoryBuilder {
    MemoryBuilder::with_base_realm(CompilerConfig::default())
}

fn person() -> RawCard {
    RawCard::new("https://demo.com/person")
        .with_schema(
            "schema.js",
            schema(
                r#"import string from "https://cardstack.com/base/string";
import date from "https://cardstack.com/base/date";"#,
                "class Person { @contains(string) name; @contains(date) birthdate; }",
            ),
        )
        .with_template(
            Format::Embedded,
            "embedded.js",
            format!(
                "{}\nimport formatName from \"./format-name\";\nexport default precompileTemplate(\"<b>{{{{formatName @model.name}}}}</b>\", {{ strictMode: true, scope: () => ({{ formatName }}) }});\n",
                TEMPLATE_IMPORT
            ),
        )
}

fn tag() -> RawCard {
    RawCard::new("https://demo.com/tag")
        .with_schema(
            "schema.js",
            schema(
                r#"import string from "https://cardstack.com/base/string";"#,
                "class Tag { @contains(string) name; }",
            ),
        )
        .with_template(
            Format::Embedded,
            "embedded.js",
            component(r#"<span class="tag">{{@model.name}}</span>"#),
        )
}

fn article() -> RawCard {
    RawCard::new("https://demo.com/article")
        .with_schema(
            "schema.js",
            schema(
                r#"import string from "https://cardstack.com/base/string";"#,
                "class Article { @contains(string) title; }",
            ),
        )
        .with_template(
            Format::Isolated,
            "isolated.js",
            component("<h1><@fields.title /></h1>"),
        )
}

#[tokio::test]
async fn test_child_card_template_is_inlined() {
    let builder = builder();
    builder.add_raw_card(tag());
    builder.add_raw_card(
        RawCard::new("https://demo.com/post")
            .with_schema(
                "schema.js",
                schema(r#"import Tag from "../tag";"#, "class Post { @contains(Tag) tag; }"),
            )
            .with_template(Format::Embedded, "embedded.js", component("<@fields.tag/>")),
    );

    let post = builder
        .get_compiled_card("https://demo.com/post")
        .await
        .expect("post should compile");

    assert_eq!(
        post.embedded.inline_hbs.as_deref(),
        Some(r#"<span class="tag">{{@model.tag.name}}</span>"#)
    );
    assert_eq!(post.embedded.used_fields, vec!["tag", "tag.name"]);
    assert_eq!(post.embedded.source_card_url, "https://demo.com/post");

    let source = builder
        .module_source(&post.embedded.module_name)
        .expect("embedded module should be defined");
    assert!(source.contains("{{@model.tag.name}}"));
    assert!(!source.contains("TagField"));
    assert!(!source.contains("demo.com-tag"));
}

#[tokio::test]
async fn test_inlined_markup_keeps_quotes_and_whitespace_control() {
    let builder = builder();
    builder.add_raw_card(
        RawCard::new("https://demo.com/quote")
            .with_schema(
                "schema.js",
                schema(
                    r#"import string from "https://cardstack.com/base/string";"#,
                    "class Quote { @contains(string) text; }",
                ),
            )
            .with_template(
                Format::Embedded,
                "embedded.js",
                component(r#"<q data-x='a "b"'>{{~@model.text~}}</q>"#),
            ),
    );
    builder.add_raw_card(
        RawCard::new("https://demo.com/post")
            .with_schema(
                "schema.js",
                schema(r#"import Quote from "../quote";"#, "class Post { @contains(Quote) quote; }"),
            )
            .with_template(
                Format::Isolated,
                "isolated.js",
                component(r#"<h1 data-x='a "b"'><@fields.quote /></h1>"#),
            ),
    );

    let quote = builder
        .get_compiled_card("https://demo.com/quote")
        .await
        .unwrap();
    assert_eq!(
        quote.embedded.inline_hbs.as_deref(),
        Some(r#"<q data-x='a "b"'>{{~@model.text~}}</q>"#)
    );

    let post = builder
        .get_compiled_card("https://demo.com/post")
        .await
        .unwrap();
    assert_eq!(
        post.isolated.inline_hbs.as_deref(),
        Some(r#"<h1 data-x='a "b"'><q data-x='a "b"'>{{~@model.quote.text~}}</q></h1>"#)
    );
}

#[tokio::test]
async fn test_child_card_with_scope_is_imported() {
    let builder = builder();
    builder.add_raw_card(person());
    builder.add_raw_card(
        RawCard::new("https://demo.com/post")
            .with_schema(
                "schema.js",
                schema(
                    r#"import Person from "../person";"#,
                    "class Post { @belongsTo(Person) author; }",
                ),
            )
            .with_template(
                Format::Isolated,
                "isolated.js",
                component("<article><@fields.author /></article>"),
            ),
    );

    let person = builder
        .get_compiled_card("https://demo.com/person")
        .await
        .unwrap();
    assert!(person.embedded.inline_hbs.is_none());

    let post = builder
        .get_compiled_card("https://demo.com/post")
        .await
        .unwrap();
    assert!(post.isolated.inline_hbs.is_none());
    assert_eq!(
        post.isolated.used_fields,
        vec!["author", "author.name"]
    );

    let source = builder.module_source(&post.isolated.module_name).unwrap();
    assert!(source.contains(&format!(
        "import PersonField from \"{}\";",
        person.embedded.module_name
    )));
    assert!(source.contains("<article><PersonField @model={{@model.author}} /></article>"));
    assert!(source.contains("{ scope: () => ({ PersonField }), strictMode: true }"));
}

#[tokio::test]
async fn test_compiled_schema_imports_field_schema_modules() {
    let builder = builder();
    builder.add_raw_card(person());
    builder.add_raw_card(
        RawCard::new("https://demo.com/post")
            .with_schema(
                "schema.js",
                schema(
                    r#"import Person from "../person";"#,
                    "class Post { @belongsTo(Person) author; }",
                ),
            )
            .with_template(Format::Isolated, "isolated.js", component("")),
    );

    let person = builder
        .get_compiled_card("https://demo.com/person")
        .await
        .unwrap();
    let post = builder
        .get_compiled_card("https://demo.com/post")
        .await
        .unwrap();

    assert_eq!(post.schema_module, "@cardstack/compiled/demo.com-post/schema.js");
    let source = builder.module_source(&post.schema_module).unwrap();
    assert!(source.contains(&format!("import Person from \"{}\";", person.schema_module)));
}

#[tokio::test]
async fn test_inherited_fields_and_adoption_chain() {
    let builder = builder();
    builder.add_raw_card(article());
    builder.add_raw_card(
        RawCard::new("https://demo.com/blog-post")
            .with_adopts_from("https://demo.com/article")
            .with_schema(
                "schema.js",
                schema(
                    r#"import string from "https://cardstack.com/base/string";"#,
                    "class BlogPost { @contains(string) subtitle; }",
                ),
            ),
    );

    let article = builder
        .get_compiled_card("https://demo.com/article")
        .await
        .unwrap();
    let post = builder
        .get_compiled_card("https://demo.com/blog-post")
        .await
        .unwrap();

    assert_eq!(
        post.fields.keys().collect::<Vec<_>>(),
        vec!["title", "subtitle"]
    );
    assert_eq!(
        post.adoption_chain(),
        vec![
            "https://demo.com/blog-post",
            "https://demo.com/article",
            BASE_CARD_URL
        ]
    );

    // Own schema: the inherited template is recompiled for this card.
    assert_eq!(post.isolated.source_card_url, "https://demo.com/article");
    assert_ne!(post.isolated.module_name, article.isolated.module_name);
    assert!(post
        .isolated
        .module_name
        .starts_with("@cardstack/compiled/demo.com-blog-post/isolated-"));
    let article_file = article.isolated.module_name.rsplit('/').next().unwrap();
    let post_file = post.isolated.module_name.rsplit('/').next().unwrap();
    assert_ne!(article_file, post_file);
    assert_eq!(
        post.isolated.inline_hbs.as_deref(),
        Some("<h1>{{@model.title}}</h1>")
    );
}

#[tokio::test]
async fn test_card_without_schema_reuses_parent_components() {
    let builder = builder();
    builder.add_raw_card(article());
    builder.add_raw_card(
        RawCard::new("https://demo.com/news")
            .with_adopts_from("https://demo.com/article")
            .with_data(json!({ "title": "Breaking" }).as_object().cloned().unwrap()),
    );

    let article = builder
        .get_compiled_card("https://demo.com/article")
        .await
        .unwrap();
    let news = builder
        .get_compiled_card("https://demo.com/news")
        .await
        .unwrap();

    assert_eq!(news.isolated, article.isolated);
    assert_eq!(news.embedded, article.embedded);
    assert_eq!(news.schema_module, article.schema_module);
    assert_eq!(news.data.as_ref().unwrap()["title"], "Breaking");
}

#[tokio::test]
async fn test_module_names_are_stable_across_builders() {
    let compile = || async {
        let builder = builder();
        builder.add_raw_card(article());
        builder
            .get_compiled_card("https://demo.com/article")
            .await
            .unwrap()
            .isolated
            .module_name
            .clone()
    };
    assert_eq!(compile().await, compile().await);
}

#[tokio::test]
async fn test_field_collision_names_parent() {
    let builder = builder();
    builder.add_raw_card(article());
    builder.add_raw_card(
        RawCard::new("https://demo.com/bad")
            .with_adopts_from("https://demo.com/article")
            .with_schema(
                "schema.js",
                schema(
                    r#"import string from "https://cardstack.com/base/string";"#,
                    "class Bad { @contains(string) title; }",
                ),
            ),
    );

    let err = builder
        .get_compiled_card("https://demo.com/bad")
        .await
        .unwrap_err();
    match err {
        CompileError::FieldCollision { url, parent, fields } => {
            assert_eq!(url, "https://demo.com/bad");
            assert_eq!(parent, "https://demo.com/article");
            assert_eq!(fields, vec!["title"]);
        }
        other => panic!("expected field collision, got {other:?}"),
    }
}

#[tokio::test]
async fn test_conflicting_parents() {
    let builder = builder();
    builder.add_raw_card(article());
    builder.add_raw_card(person());
    builder.add_raw_card(
        RawCard::new("https://demo.com/post")
            .with_adopts_from("https://demo.com/person")
            .with_schema(
                "schema.js",
                schema(
                    r#"import Article from "../article";"#,
                    "@adopts(Article) class Post {}",
                ),
            ),
    );

    let err = builder
        .get_compiled_card("https://demo.com/post")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CompileError::ConflictingParent { ref document, ref schema, .. }
            if document == "https://demo.com/person" && schema == "https://demo.com/article"
    ));
}

#[tokio::test]
async fn test_schema_parent_is_used_without_document_pointer() {
    let builder = builder();
    builder.add_raw_card(article());
    builder.add_raw_card(RawCard::new("https://demo.com/post").with_schema(
        "schema.js",
        schema(
            r#"import Article from "../article";"#,
            "@adopts(Article) class Post {}",
        ),
    ));

    let post = builder
        .get_compiled_card("https://demo.com/post")
        .await
        .unwrap();
    assert_eq!(
        post.adopts_from.as_ref().map(|p| p.url.as_str()),
        Some("https://demo.com/article")
    );
    assert_eq!(post.fields.keys().collect::<Vec<_>>(), vec!["title"]);
}

#[tokio::test]
async fn test_adoption_cycles_are_detected() {
    let builder = builder();
    builder.add_raw_card(
        RawCard::new("https://demo.com/ouroboros").with_adopts_from("https://demo.com/ouroboros"),
    );
    builder.add_raw_card(RawCard::new("https://demo.com/a").with_adopts_from("https://demo.com/b"));
    builder.add_raw_card(RawCard::new("https://demo.com/b").with_adopts_from("https://demo.com/a"));

    let err = builder
        .get_compiled_card("https://demo.com/ouroboros")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        CompileError::AdoptionCycle { ref chain, .. } if chain.len() == 2
    ));

    let err = builder
        .get_compiled_card("https://demo.com/a")
        .await
        .unwrap_err();
    match err {
        CompileError::AdoptionCycle { url, chain } => {
            assert_eq!(url, "https://demo.com/a");
            assert_eq!(
                chain,
                vec!["https://demo.com/a", "https://demo.com/b", "https://demo.com/a"]
            );
        }
        other => panic!("expected adoption cycle, got {other:?}"),
    }
}

fn friendly(url: &str, class: &str, field_type: &str, field: &str) -> RawCard {
    let field_url = format!("https://demo.com/{}", field_type.to_lowercase());
    RawCard::new(url)
        .with_schema(
            "schema.js",
            schema(
                &format!("import {} from {:?};", field_type, field_url),
                &format!("class {} {{ {} }}", class, field),
            ),
        )
        .with_template(Format::Isolated, "isolated.js", component(""))
}

#[tokio::test]
async fn test_self_referencing_field_is_a_dependency_cycle() {
    let builder = builder();
    builder.add_raw_card(friendly(
        "https://demo.com/person",
        "Friend",
        "Person",
        "@belongsTo(Person) friend;",
    ));

    let err = builder
        .get_compiled_card("https://demo.com/person")
        .await
        .unwrap_err();
    match err {
        CompileError::DependencyCycle { ref url, ref chain } => {
            assert_eq!(url, "https://demo.com/person");
            assert_eq!(chain, &vec!["https://demo.com/person", "https://demo.com/person"]);
        }
        ref other => panic!("expected dependency cycle, got {other:?}"),
    }
    assert!(!err.is_client_error());
}

#[tokio::test]
async fn test_mutually_referencing_fields_are_a_dependency_cycle() {
    let builder = builder();
    builder.add_raw_card(friendly(
        "https://demo.com/person",
        "Owner",
        "Pet",
        "@hasMany(Pet) pets;",
    ));
    builder.add_raw_card(friendly(
        "https://demo.com/pet",
        "Animal",
        "Person",
        "@belongsTo(Person) owner;",
    ));

    let err = builder
        .get_compiled_card("https://demo.com/person")
        .await
        .unwrap_err();
    match err {
        CompileError::DependencyCycle { chain, .. } => assert_eq!(
            chain,
            vec![
                "https://demo.com/person",
                "https://demo.com/pet",
                "https://demo.com/person"
            ]
        ),
        other => panic!("expected dependency cycle, got {other:?}"),
    }
}

#[tokio::test]
async fn test_field_type_adopting_from_owner_is_a_dependency_cycle() {
    let builder = builder();
    builder.add_raw_card(friendly(
        "https://demo.com/person",
        "Owner",
        "Pet",
        "@contains(Pet) pet;",
    ));
    builder.add_raw_card(
        RawCard::new("https://demo.com/pet").with_adopts_from("https://demo.com/person"),
    );

    let err = builder
        .get_compiled_card("https://demo.com/person")
        .await
        .unwrap_err();
    assert!(matches!(err, CompileError::DependencyCycle { ref chain, .. } if chain.len() == 3));
}

#[tokio::test]
async fn test_repeated_field_type_is_not_a_cycle() {
    let builder = builder();
    builder.add_raw_card(person());
    builder.add_raw_card(
        RawCard::new("https://demo.com/post")
            .with_schema(
                "schema.js",
                schema(
                    r#"import Person from "https://demo.com/person";"#,
                    "class Post { @belongsTo(Person) author; @belongsTo(Person) editor; }",
                ),
            )
            .with_template(Format::Isolated, "isolated.js", component("")),
    );

    let post = builder
        .get_compiled_card("https://demo.com/post")
        .await
        .unwrap();
    assert_eq!(post.fields["author"].card.url, "https://demo.com/person");
    assert_eq!(post.fields["editor"].card.url, "https://demo.com/person");
}

#[tokio::test]
async fn test_missing_cards_are_not_found() {
    let builder = builder();
    builder.add_raw_card(
        RawCard::new("https://demo.com/orphan").with_adopts_from("https://demo.com/missing"),
    );
    builder.add_raw_card(
        RawCard::new("https://demo.com/post")
            .with_schema(
                "schema.js",
                schema(r#"import Ghost from "../ghost";"#, "class Post { @contains(Ghost) ghost; }"),
            )
            .with_template(Format::Isolated, "isolated.js", component("")),
    );

    let err = builder
        .get_compiled_card("https://demo.com/orphan")
        .await
        .unwrap_err();
    assert!(matches!(err, CompileError::CardNotFound { ref url } if url == "https://demo.com/missing"));

    let err = builder
        .get_compiled_card("https://demo.com/post")
        .await
        .unwrap_err();
    assert!(matches!(err, CompileError::CardNotFound { ref url } if url == "https://demo.com/ghost"));
}

#[tokio::test]
async fn test_unexpected_data_fields_are_client_errors() {
    let builder = builder();
    builder.add_raw_card(
        RawCard::new("https://demo.com/post")
            .with_schema(
                "schema.js",
                schema(
                    r#"import string from "https://cardstack.com/base/string";"#,
                    "class Post { @contains(string) title; }",
                ),
            )
            .with_data(json!({ "nonexistentField": 1 }).as_object().cloned().unwrap()),
    );

    let err = builder
        .get_compiled_card("https://demo.com/post")
        .await
        .unwrap_err();
    assert!(err.is_client_error());
    match err {
        CompileError::Validation(ValidationError::UnexpectedFields { url, fields }) => {
            assert_eq!(url, "https://demo.com/post");
            assert_eq!(fields, vec!["nonexistentField"]);
        }
        other => panic!("expected unexpected fields, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_field_in_template() {
    let builder = builder();
    builder.add_raw_card(
        RawCard::new("https://demo.com/post")
            .with_schema(
                "schema.js",
                schema(
                    r#"import string from "https://cardstack.com/base/string";"#,
                    "class Post { @contains(string) title; }",
                ),
            )
            .with_template(Format::Isolated, "isolated.js", component("<@fields.titel />")),
    );

    let err = builder
        .get_compiled_card("https://demo.com/post")
        .await
        .unwrap_err();
    assert!(!err.is_client_error());
    assert!(err.to_string().contains("Did you mean 'title'?"));
    assert!(matches!(
        err,
        CompileError::UnknownField { format: Format::Isolated, ref field, .. } if field == "titel"
    ));
}

#[tokio::test]
async fn test_pointer_to_missing_file() {
    let builder = builder();
    let mut raw = RawCard::new("https://demo.com/post");
    raw.schema = Some("schema.js".to_string());
    builder.add_raw_card(raw);

    let err = builder
        .get_compiled_card("https://demo.com/post")
        .await
        .unwrap_err();
    assert!(matches!(err, CompileError::MissingFile { pointer: "schema", .. }));
}

#[tokio::test]
async fn test_root_card_requires_schema() {
    let builder = MemoryBuilder::new(CompilerConfig::default());
    builder.add_raw_card(RawCard::new(BASE_CARD_URL));
    let err = builder.get_compiled_card(BASE_CARD_URL).await.unwrap_err();
    assert!(matches!(err, CompileError::MissingSchema { .. }));
}

#[tokio::test]
async fn test_root_card_terminates_chain() {
    let builder = builder();
    let base = builder.get_compiled_card(BASE_CARD_URL).await.unwrap();
    assert!(base.adopts_from.is_none());
    assert!(base.fields.is_empty());
    assert_eq!(base.adoption_chain(), vec![BASE_CARD_URL]);

    let string = builder.get_compiled_card(STRING_CARD_URL).await.unwrap();
    assert_eq!(string.adoption_chain(), vec![STRING_CARD_URL, BASE_CARD_URL]);
    assert_eq!(string.embedded.inline_hbs.as_deref(), Some("{{@model}}"));
}

#[tokio::test]
async fn test_assets_are_collected() {
    let builder = builder();
    builder.add_raw_card(
        article()
            .with_file("article.css", "h1 { color: red; }")
            .with_file("notes.txt", "todo"),
    );
    let article = builder
        .get_compiled_card("https://demo.com/article")
        .await
        .unwrap();
    let assets: Vec<_> = article
        .assets
        .iter()
        .map(|a| (a.path.as_str(), a.asset_type))
        .collect();
    assert_eq!(
        assets,
        vec![("article.css", AssetType::Css), ("notes.txt", AssetType::Unknown)]
    );
}

#[tokio::test]
async fn test_deserializer_is_inherited() {
    let builder = builder();
    builder.add_raw_card(RawCard::new("https://demo.com/birthday").with_adopts_from(DATE_CARD_URL));
    builder.add_raw_card(
        RawCard::new("https://demo.com/party")
            .with_schema(
                "schema.js",
                schema(
                    r#"import Birthday from "../birthday";"#,
                    "class Party { @contains(Birthday) when; }",
                ),
            )
            .with_template(Format::Isolated, "isolated.js", component("<p>{{@model.when}}</p>")),
    );

    let birthday = builder
        .get_compiled_card("https://demo.com/birthday")
        .await
        .unwrap();
    assert_eq!(birthday.deserializer.as_deref(), Some("date"));

    let party = builder
        .get_compiled_card("https://demo.com/party")
        .await
        .unwrap();
    let deserialize = party.isolated.deserialize.clone().unwrap();
    assert_eq!(deserialize["date"], vec!["when"]);
}

#[tokio::test]
async fn test_model_round_trips_compiled_card_data() {
    let builder = builder();
    builder.add_raw_card(
        RawCard::new("https://demo.com/event")
            .with_schema(
                "schema.js",
                schema(
                    r#"import string from "https://cardstack.com/base/string";
import date from "https://cardstack.com/base/date";"#,
                    "class Event { @contains(string) name; @containsMany(date) days; }",
                ),
            )
            .with_template(
                Format::Isolated,
                "isolated.js",
                component("<h1>{{@model.name}}</h1><@fields.days />"),
            )
            .with_data(
                json!({ "name": "Fair", "days": ["2021-06-01", "2021-06-02"] })
                    .as_object()
                    .cloned()
                    .unwrap(),
            ),
    );

    let event = builder
        .get_compiled_card("https://demo.com/event")
        .await
        .unwrap();
    let info = &event.isolated;
    assert_eq!(info.deserialize.as_ref().unwrap()["date"], vec!["days"]);

    let registry = Arc::new(SerializerRegistry::with_defaults());
    let document = CardModel::serialize_card(&event, Format::Isolated, &registry).unwrap();
    assert_eq!(
        document.to_json()["data"]["meta"]["componentModule"],
        json!(info.module_name)
    );

    let model =
        CardModel::from_document(CardDocument::from_json(document.to_json()).unwrap(), info, registry)
            .unwrap();
    assert_eq!(
        model.data().unwrap()["days"],
        CardValue::List(vec![
            CardValue::Date(NaiveDate::from_ymd_opt(2021, 6, 1).unwrap()),
            CardValue::Date(NaiveDate::from_ymd_opt(2021, 6, 2).unwrap()),
        ])
    );
    assert_eq!(
        model.serialize().unwrap().data.attributes,
        event.data.clone()
    );
}
