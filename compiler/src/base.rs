//! Built-in cards every realm can adopt from or use as field types.

use crate::types::{Format, RawCard, BASE_CARD_URL};

pub const STRING_CARD_URL: &str = "https://cardstack.com/base/string";
pub const DATE_CARD_URL: &str = "https://cardstack.com/base/date";
pub const DATETIME_CARD_URL: &str = "https://cardstack.com/base/datetime";

const BASE_SCHEMA: &str = "export default class Base {}\n";

fn component(template: &str) -> String {
    format!(
        r#"import {{ setComponentTemplate }} from "@ember/component";
import {{ precompileTemplate }} from "@ember/template-compilation";
import templateOnlyComponent from "@ember/component/template-only";
export default setComponentTemplate(
  precompileTemplate({template:?}, {{ strictMode: true }}),
  templateOnlyComponent()
);
"#
    )
}

fn primitive(url: &str, deserializer: Option<&str>) -> RawCard {
    let template = component("{{@model}}");
    let card = RawCard::new(url)
        .with_adopts_from(BASE_CARD_URL)
        .with_template(Format::Isolated, "isolated.js", template.clone())
        .with_template(Format::Embedded, "embedded.js", template);
    match deserializer {
        Some(name) => card.with_deserializer(name),
        None => card,
    }
}

/// The base card plus the primitive `string`, `date` and `datetime` cards.
pub fn base_realm() -> Vec<RawCard> {
    let empty = component("");
    vec![
        RawCard::new(BASE_CARD_URL)
            .with_schema("schema.js", BASE_SCHEMA)
            .with_template(Format::Isolated, "isolated.js", empty.clone())
            .with_template(Format::Embedded, "embedded.js", empty),
        primitive(STRING_CARD_URL, None),
        primitive(DATE_CARD_URL, Some("date")),
        primitive(DATETIME_CARD_URL, Some("datetime")),
    ]
}
