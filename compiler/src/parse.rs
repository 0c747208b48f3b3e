//! Parsing entry points shared by the syntax layers and loaders

use crate::types::RawCard;
use std::fmt;

/// A syntax error at a byte offset of the parsed source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at offset {}", self.message, self.offset)
    }
}

impl std::error::Error for ParseError {}

/// Parse a raw card from its JSON document form.
pub fn parse_raw_card_content(content: &str) -> Result<RawCard, String> {
    let card: RawCard =
        serde_json::from_str(content).map_err(|e| format!("Failed to parse card JSON: {}", e))?;
    if card.url.is_empty() {
        return Err("Card JSON has an empty url".to_string());
    }
    Ok(card)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_raw_card_content() {
        let json = r#"{
            "url": "https://demo.com/tag",
            "files": {
                "embedded.js": "export default 1;",
                "tag.css": ".tag {}"
            },
            "embedded": "embedded.js",
            "deserializer": "date"
        }"#;
        let card = parse_raw_card_content(json).expect("card should parse");

        assert_eq!(card.url, "https://demo.com/tag");
        assert_eq!(card.files.len(), 2);
        assert_eq!(card.embedded.as_deref(), Some("embedded.js"));
        assert_eq!(card.deserializer.as_deref(), Some("date"));
        assert!(card.adopts_from.is_none());
    }

    #[test]
    fn test_parse_raw_card_requires_url() {
        let err = parse_raw_card_content(r#"{ "url": "" }"#).unwrap_err();
        assert!(err.contains("empty url"));

        let err = parse_raw_card_content("{").unwrap_err();
        assert!(err.starts_with("Failed to parse card JSON"));
    }
}
