//! Runtime card model: one card instance's data, deserialized on demand,
//! mutated through path setters, and written back to the wire document.

use crate::codec::{self, Direction};
use crate::error::ModelError;
use crate::serializers::{CardValue, SerializerRegistry};
use crate::types::{CompiledCard, ComponentInfo, Format};
use indexmap::IndexMap;
use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const CARD_RESOURCE_TYPE: &str = "card";

/// `{ data: { type, id?, attributes?, meta? } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardDocument {
    pub data: ResourceObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceObject {
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResourceMeta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMeta {
    pub component_module: String,
}

impl CardDocument {
    pub fn from_json(value: Value) -> Result<Self, ModelError> {
        let document: CardDocument = serde_json::from_value(value)
            .map_err(|e| ModelError::InvalidDocument(e.to_string()))?;
        if document.data.resource_type != CARD_RESOURCE_TYPE {
            return Err(ModelError::InvalidDocument(format!(
                "expected type '{}', found '{}'",
                CARD_RESOURCE_TYPE, document.data.resource_type
            )));
        }
        Ok(document)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

type Record = IndexMap<String, CardValue>;

pub struct CardModel {
    id: Option<String>,
    attributes: Record,
    deserialize: BTreeMap<String, Vec<String>>,
    registry: Arc<SerializerRegistry>,
    data: OnceCell<Record>,
}

impl std::fmt::Debug for CardModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardModel")
            .field("id", &self.id)
            .field("deserialized", &self.data.get().is_some())
            .finish()
    }
}

impl CardModel {
    /// Wrap a wire document for the component that will render it.
    pub fn from_document(
        document: CardDocument,
        component: &ComponentInfo,
        registry: Arc<SerializerRegistry>,
    ) -> Result<Self, ModelError> {
        let deserialize = component.deserialize.clone().unwrap_or_default();
        if let Some(unknown) = deserialize.keys().find(|name| registry.get(name).is_none()) {
            return Err(ModelError::UnknownSerializer(unknown.clone()));
        }
        Ok(Self {
            id: document.data.id,
            attributes: to_record(document.data.attributes),
            deserialize,
            registry,
            data: OnceCell::new(),
        })
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Deserialized data, computed on first access.
    pub fn data(&self) -> Result<&Record, ModelError> {
        self.data.get_or_try_init(|| {
            let mut data = self.attributes.clone();
            apply_all(&mut data, &self.deserialize, &self.registry, Direction::Deserialize)?;
            Ok::<_, ModelError>(data)
        })
    }

    /// Replace the wrapped document; previously deserialized data is dropped.
    pub fn set_document(&mut self, document: CardDocument) -> Result<(), ModelError> {
        if document.data.resource_type != CARD_RESOURCE_TYPE {
            return Err(ModelError::InvalidDocument(format!(
                "expected type '{}', found '{}'",
                CARD_RESOURCE_TYPE, document.data.resource_type
            )));
        }
        self.id = document.data.id;
        self.attributes = to_record(document.data.attributes);
        self.data = OnceCell::new();
        Ok(())
    }

    /// Root of the path setters: `model.setters().field("author").field("name").set(v)`.
    pub fn setters(&mut self) -> Setter<'_> {
        Setter {
            model: self,
            path: Vec::new(),
        }
    }

    pub fn serialize(&self) -> Result<CardDocument, ModelError> {
        let mut data = self.data()?.clone();
        apply_all(&mut data, &self.deserialize, &self.registry, Direction::Serialize)?;
        Ok(CardDocument {
            data: ResourceObject {
                resource_type: CARD_RESOURCE_TYPE.to_string(),
                id: self.id.clone(),
                attributes: Some(to_attributes(&data)),
                meta: None,
            },
        })
    }

    /// Serialize a compiled card's own data for one of its components.
    pub fn serialize_card(
        card: &CompiledCard,
        format: Format,
        registry: &SerializerRegistry,
    ) -> Result<CardDocument, ModelError> {
        let component = card.component(format);
        let mut data = to_record(card.data.clone());
        if let Some(deserialize) = &component.deserialize {
            apply_all(&mut data, deserialize, registry, Direction::Serialize)?;
        }
        Ok(CardDocument {
            data: ResourceObject {
                resource_type: CARD_RESOURCE_TYPE.to_string(),
                id: Some(card.url.clone()),
                attributes: Some(to_attributes(&data)),
                meta: Some(ResourceMeta {
                    component_module: component.module_name.clone(),
                }),
            },
        })
    }

    fn data_mut(&mut self) -> Result<&mut Record, ModelError> {
        self.data()?;
        self.data
            .get_mut()
            .ok_or_else(|| ModelError::InvalidDocument("card data is not loaded".to_string()))
    }
}

/// One path into a card's data, bound to the model it writes to.
pub struct Setter<'m> {
    model: &'m mut CardModel,
    path: Vec<String>,
}

impl<'m> Setter<'m> {
    /// Descend one field.
    pub fn field(mut self, name: impl Into<String>) -> Setter<'m> {
        self.path.push(name.into());
        self
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// Assign at this path, creating intermediate records where a key is
    /// missing or null. Numeric segments index into lists.
    pub fn set(self, value: impl Into<CardValue>) -> Result<(), ModelError> {
        let Some((leaf, parents)) = self.path.split_last() else {
            return Err(ModelError::EmptyPath);
        };
        let invalid = |reason: String| ModelError::InvalidPath {
            path: self.path.join("."),
            reason,
        };
        let root = self.model.data_mut()?;
        let Some((first, rest)) = parents.split_first() else {
            root.insert(leaf.clone(), value.into());
            return Ok(());
        };
        let mut current = record_slot(root, first);
        for key in rest {
            current = child(current, key).map_err(invalid)?;
        }
        match current {
            CardValue::Record(record) => {
                record.insert(leaf.clone(), value.into());
            }
            CardValue::List(items) => {
                let slot = list_slot(items, leaf).map_err(invalid)?;
                *slot = value.into();
            }
            _ => return Err(invalid(format!("parent of '{}' is not a record or list", leaf))),
        }
        Ok(())
    }
}

fn record_slot<'a>(record: &'a mut Record, key: &str) -> &'a mut CardValue {
    let slot = record.entry(key.to_string()).or_insert(CardValue::Null);
    if matches!(slot, CardValue::Null) {
        *slot = CardValue::record();
    }
    slot
}

fn list_slot<'a>(items: &'a mut [CardValue], key: &str) -> Result<&'a mut CardValue, String> {
    let index: usize = key
        .parse()
        .map_err(|_| format!("'{}' is not a list index", key))?;
    let len = items.len();
    items
        .get_mut(index)
        .ok_or_else(|| format!("index {} is out of range for a list of {}", index, len))
}

fn child<'a>(value: &'a mut CardValue, key: &str) -> Result<&'a mut CardValue, String> {
    match value {
        CardValue::Record(record) => Ok(record_slot(record, key)),
        CardValue::List(items) => list_slot(items, key),
        _ => Err(format!("cannot descend into '{}' through a scalar value", key)),
    }
}

fn apply_all(
    data: &mut Record,
    deserialize: &BTreeMap<String, Vec<String>>,
    registry: &SerializerRegistry,
    direction: Direction,
) -> Result<(), ModelError> {
    for (name, paths) in deserialize {
        let serializer = registry
            .get(name)
            .ok_or_else(|| ModelError::UnknownSerializer(name.clone()))?;
        for path in paths {
            codec::apply(data, path, serializer, direction)?;
        }
    }
    Ok(())
}

fn to_record(attributes: Option<Map<String, Value>>) -> Record {
    attributes
        .unwrap_or_default()
        .into_iter()
        .map(|(k, v)| (k, CardValue::from(v)))
        .collect()
}

fn to_attributes(data: &Record) -> Map<String, Value> {
    data.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()
}
