//! Core type definitions for raw and compiled cards

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// URL of the root card every adoption chain terminates at.
pub const BASE_CARD_URL: &str = "https://cardstack.com/base/base";

/// Module the schema decorators are imported from.
pub const TYPES_MODULE: &str = "@cardstack/types";

/// Author-supplied card definition.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCard {
    pub url: String,
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isolated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adopts_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    /// Name of the primitive serializer values of this card are stored with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deserializer: Option<String>,
}

impl RawCard {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_file(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        self.files.insert(name.into(), source.into());
        self
    }

    pub fn with_schema(mut self, name: impl Into<String>, source: impl Into<String>) -> Self {
        let name = name.into();
        self.files.insert(name.clone(), source.into());
        self.schema = Some(name);
        self
    }

    pub fn with_template(
        mut self,
        format: Format,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.files.insert(name.clone(), source.into());
        match format {
            Format::Isolated => self.isolated = Some(name),
            Format::Embedded => self.embedded = Some(name),
        }
        self
    }

    pub fn with_adopts_from(mut self, url: impl Into<String>) -> Self {
        self.adopts_from = Some(url.into());
        self
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_deserializer(mut self, name: impl Into<String>) -> Self {
        self.deserializer = Some(name.into());
        self
    }

    pub fn template_file(&self, format: Format) -> Option<&str> {
        match format {
            Format::Isolated => self.isolated.as_deref(),
            Format::Embedded => self.embedded.as_deref(),
        }
    }

    pub fn file(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(String::as_str)
    }
}

/// Display mode of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Format {
    Isolated,
    Embedded,
}

impl Format {
    pub const ALL: [Format; 2] = [Format::Isolated, Format::Embedded];

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Isolated => "isolated",
            Format::Embedded => "embedded",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    /// Singular reference to another card.
    BelongsTo,
    /// Plural reference to other cards.
    HasMany,
    /// Singular embedded card value.
    Contains,
    /// Plural embedded card values.
    ContainsMany,
}

impl FieldType {
    /// Map a decorator name as exported by the types module.
    pub fn from_decorator(name: &str) -> Option<Self> {
        match name {
            "belongsTo" => Some(FieldType::BelongsTo),
            "hasMany" => Some(FieldType::HasMany),
            "contains" => Some(FieldType::Contains),
            "containsMany" => Some(FieldType::ContainsMany),
            _ => None,
        }
    }

    pub fn is_plural(&self) -> bool {
        matches!(self, FieldType::HasMany | FieldType::ContainsMany)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(serialize_with = "serialize_card_url")]
    pub card: Arc<CompiledCard>,
}

/// Field table of a compiled card, parent fields first.
pub type Fields = IndexMap<String, Field>;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledCard {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    pub fields: Fields,
    pub schema_module: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_optional_card_url"
    )]
    pub adopts_from: Option<Arc<CompiledCard>>,
    pub isolated: ComponentInfo,
    pub embedded: ComponentInfo,
    pub assets: Vec<Asset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deserializer: Option<String>,
}

impl CompiledCard {
    pub fn component(&self, format: Format) -> &ComponentInfo {
        match format {
            Format::Isolated => &self.isolated,
            Format::Embedded => &self.embedded,
        }
    }

    /// URLs from this card up to the root, this card first.
    pub fn adoption_chain(&self) -> Vec<&str> {
        let mut chain = vec![self.url.as_str()];
        let mut current = self.adopts_from.as_deref();
        while let Some(card) = current {
            chain.push(card.url.as_str());
            current = card.adopts_from.as_deref();
        }
        chain
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentInfo {
    pub module_name: String,
    pub used_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deserialize: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, rename = "inlineHBS", skip_serializing_if = "Option::is_none")]
    pub inline_hbs: Option<String>,
    #[serde(rename = "sourceCardURL")]
    pub source_card_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AssetType {
    Css,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Asset {
    #[serde(rename = "type")]
    pub asset_type: AssetType,
    pub path: String,
}

impl Asset {
    /// Classify a card file by its extension.
    pub fn from_path(path: impl Into<String>) -> Self {
        let path = path.into();
        let asset_type = if path.to_ascii_lowercase().ends_with(".css") {
            AssetType::Css
        } else {
            AssetType::Unknown
        };
        Self { asset_type, path }
    }
}

fn serialize_card_url<S: Serializer>(card: &Arc<CompiledCard>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&card.url)
}

fn serialize_optional_card_url<S: Serializer>(
    card: &Option<Arc<CompiledCard>>,
    s: S,
) -> Result<S::Ok, S::Error> {
    match card {
        Some(card) => s.serialize_str(&card.url),
        None => s.serialize_none(),
    }
}
