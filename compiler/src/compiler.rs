//! Compile orchestration: turns a [`RawCard`] into a [`CompiledCard`].

use crate::builder::{Builder, ModuleDefiner};
use crate::error::{CompileError, Result, ValidationError};
use crate::schema::{merge_fields, resolve_fields, Schema};
use crate::template::{compile_component, ComponentSource};
use crate::types::{
    Asset, CompiledCard, ComponentInfo, Fields, Format, RawCard, BASE_CARD_URL, TYPES_MODULE,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

tokio::task_local! {
    /// URLs on the current chain of nested compiles, outermost first.
    static COMPILING: Vec<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerConfig {
    /// Root of every adoption chain.
    pub base_card_url: String,
    /// Module the schema decorators are imported from.
    pub types_module: String,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            base_card_url: BASE_CARD_URL.to_string(),
            types_module: TYPES_MODULE.to_string(),
        }
    }
}

impl CompilerConfig {
    pub fn with_base_card_url(mut self, url: impl Into<String>) -> Self {
        self.base_card_url = url.into();
        self
    }

    pub fn with_types_module(mut self, module: impl Into<String>) -> Self {
        self.types_module = module.into();
        self
    }
}

/// The compiled base card, fetched once and shared by every compiler that
/// holds a clone of the cache.
#[derive(Debug, Clone, Default)]
pub struct BaseCardCache(Arc<OnceCell<Arc<CompiledCard>>>);

impl BaseCardCache {
    pub fn get(&self) -> Option<Arc<CompiledCard>> {
        self.0.get().cloned()
    }
}

pub struct Compiler<'a> {
    builder: &'a dyn Builder,
    definer: &'a dyn ModuleDefiner,
    config: CompilerConfig,
    base_cache: BaseCardCache,
}

impl<'a> Compiler<'a> {
    pub fn new(
        builder: &'a dyn Builder,
        definer: &'a dyn ModuleDefiner,
        config: CompilerConfig,
    ) -> Self {
        Self {
            builder,
            definer,
            config,
            base_cache: BaseCardCache::default(),
        }
    }

    pub fn with_base_cache(mut self, cache: BaseCardCache) -> Self {
        self.base_cache = cache;
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Compile `raw`. Field and parent cards are compiled through the
    /// builder first; a card that ends up depending on itself is an error.
    #[tracing::instrument(skip_all, fields(url = %raw.url))]
    pub async fn compile(&self, raw: &RawCard) -> Result<CompiledCard> {
        let mut chain = COMPILING.try_with(|chain| chain.clone()).unwrap_or_default();
        if chain.contains(&raw.url) {
            chain.push(raw.url.clone());
            return Err(CompileError::DependencyCycle {
                url: raw.url.clone(),
                chain,
            });
        }
        chain.push(raw.url.clone());
        COMPILING.scope(chain, self.compile_card(raw)).await
    }

    async fn compile_card(&self, raw: &RawCard) -> Result<CompiledCard> {
        check_pointers(raw)?;

        let schema = match raw.schema.as_deref() {
            Some(file) => Some(Schema::analyze(
                &raw.url,
                file,
                raw.file(file).unwrap_or_default(),
                &self.config.types_module,
            )?),
            None => None,
        };
        let schema_parent = schema.as_ref().and_then(|s| s.meta.parent.as_deref());

        let parent = match self.declared_parent(raw, schema_parent)? {
            Some(parent_url) => {
                self.check_adoption_chain(raw, &parent_url).await?;
                Some(self.parent_card(&parent_url).await?)
            }
            None => None,
        };

        let own_fields = match &schema {
            Some(schema) => resolve_fields(self.builder, &schema.meta.fields).await?,
            None => Fields::new(),
        };
        let fields = match &parent {
            Some(parent) => merge_fields(&raw.url, &parent.url, &parent.fields, own_fields)?,
            None => own_fields,
        };
        debug!(fields = fields.len(), "resolved fields");

        let schema_module = match (&schema, &parent) {
            (Some(schema), _) => self.define_schema(raw, schema, &fields, parent.as_deref()).await?,
            (None, Some(parent)) => parent.schema_module.clone(),
            (None, None) => {
                return Err(CompileError::MissingSchema {
                    url: raw.url.clone(),
                })
            }
        };

        let deserializer = raw
            .deserializer
            .clone()
            .or_else(|| parent.as_ref().and_then(|p| p.deserializer.clone()));

        let isolated = self
            .component(raw, Format::Isolated, &fields, schema.is_some(), parent.as_deref())
            .await?;
        let embedded = self
            .component(raw, Format::Embedded, &fields, schema.is_some(), parent.as_deref())
            .await?;

        let card = CompiledCard {
            url: raw.url.clone(),
            data: raw.data.clone(),
            fields,
            schema_module,
            adopts_from: parent,
            isolated,
            embedded,
            assets: assets(raw),
            deserializer,
        };
        assert_valid_compiled_card(&card)?;

        info!(
            fields = card.fields.len(),
            assets = card.assets.len(),
            parent = ?card.adopts_from.as_ref().map(|p| p.url.as_str()),
            "compiled card"
        );
        Ok(card)
    }

    /// Parent URL of `raw`, or `None` for the root card.
    fn declared_parent(&self, raw: &RawCard, schema_parent: Option<&str>) -> Result<Option<String>> {
        if raw.url == self.config.base_card_url {
            return Ok(None);
        }
        match (raw.adopts_from.as_deref(), schema_parent) {
            (Some(document), Some(schema)) if document != schema => {
                Err(CompileError::ConflictingParent {
                    url: raw.url.clone(),
                    document: document.to_string(),
                    schema: schema.to_string(),
                })
            }
            (Some(url), _) | (None, Some(url)) => Ok(Some(url.to_string())),
            (None, None) => Ok(Some(self.config.base_card_url.clone())),
        }
    }

    /// Walk raw parent pointers from `raw` up to the base card.
    async fn check_adoption_chain(&self, raw: &RawCard, parent_url: &str) -> Result<()> {
        let mut chain = vec![raw.url.clone()];
        let mut next = Some(parent_url.to_string());

        while let Some(url) = next {
            if chain.contains(&url) {
                chain.push(url);
                return Err(CompileError::AdoptionCycle {
                    url: raw.url.clone(),
                    chain,
                });
            }
            chain.push(url.clone());
            if url == self.config.base_card_url {
                break;
            }

            let ancestor = self.builder.get_raw_card(&url).await?;
            let schema_parent = match ancestor.schema.as_deref() {
                Some(file) => Schema::analyze(
                    &ancestor.url,
                    file,
                    ancestor.file(file).unwrap_or_default(),
                    &self.config.types_module,
                )?
                .meta
                .parent,
                None => None,
            };
            next = self.declared_parent(&ancestor, schema_parent.as_deref())?;
        }

        debug!(chain = ?chain, "adoption chain");
        Ok(())
    }

    async fn parent_card(&self, url: &str) -> Result<Arc<CompiledCard>> {
        if url == self.config.base_card_url {
            let base = self
                .base_cache
                .0
                .get_or_try_init(|| self.builder.get_compiled_card(url))
                .await?;
            return Ok(base.clone());
        }
        self.builder.get_compiled_card(url).await
    }

    async fn define_schema(
        &self,
        raw: &RawCard,
        schema: &Schema,
        fields: &Fields,
        parent: Option<&CompiledCard>,
    ) -> Result<String> {
        let mut schema_modules: HashMap<String, String> = fields
            .values()
            .map(|field| (field.card.url.clone(), field.card.schema_module.clone()))
            .collect();
        if let Some(parent) = parent {
            schema_modules.insert(parent.url.clone(), parent.schema_module.clone());
        }

        let source = schema.transform(&raw.url, &schema_modules);
        self.definer.define(&raw.url, &schema.file, &source).await
    }

    async fn component(
        &self,
        raw: &RawCard,
        format: Format,
        fields: &Fields,
        has_own_schema: bool,
        parent: Option<&CompiledCard>,
    ) -> Result<ComponentInfo> {
        if let Some(file) = raw.template_file(format) {
            let input = ComponentSource {
                card_url: &raw.url,
                source_card_url: &raw.url,
                format,
                file,
                source: raw.file(file).unwrap_or_default(),
            };
            return compile_component(self.definer, input, fields).await;
        }

        let Some(parent) = parent else {
            return Err(CompileError::MissingComponent {
                url: raw.url.clone(),
                format,
            });
        };
        let inherited = parent.component(format);
        if !has_own_schema {
            debug!(format = %format, module = %inherited.module_name, "reusing parent component");
            return Ok(inherited.clone());
        }

        let source_card = self.builder.get_raw_card(&inherited.source_card_url).await?;
        let file = source_card
            .template_file(format)
            .ok_or_else(|| CompileError::MissingComponent {
                url: source_card.url.clone(),
                format,
            })?;
        let source = source_card
            .file(file)
            .ok_or_else(|| CompileError::MissingFile {
                url: source_card.url.clone(),
                pointer: format.as_str(),
                file: file.to_string(),
            })?;
        debug!(
            format = %format,
            source_card = %source_card.url,
            "recompiling inherited component"
        );
        let input = ComponentSource {
            card_url: &raw.url,
            source_card_url: &source_card.url,
            format,
            file,
            source,
        };
        compile_component(self.definer, input, fields).await
    }
}

fn check_pointers(raw: &RawCard) -> Result<()> {
    let pointers = [
        ("schema", raw.schema.as_deref()),
        ("isolated", raw.isolated.as_deref()),
        ("embedded", raw.embedded.as_deref()),
    ];
    for (pointer, file) in pointers {
        if let Some(file) = file {
            if !raw.files.contains_key(file) {
                return Err(CompileError::MissingFile {
                    url: raw.url.clone(),
                    pointer,
                    file: file.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Every file that is not the schema or a template, classified by extension.
fn assets(raw: &RawCard) -> Vec<Asset> {
    let pointers = [
        raw.schema.as_deref(),
        raw.isolated.as_deref(),
        raw.embedded.as_deref(),
    ];
    raw.files
        .keys()
        .filter(|name| !pointers.contains(&Some(name.as_str())))
        .map(|name| Asset::from_path(name.as_str()))
        .collect()
}

/// Boundary check for compiled cards handed to other layers.
pub fn assert_valid_compiled_card(card: &CompiledCard) -> std::result::Result<(), ValidationError> {
    if card.url.is_empty() {
        return Err(ValidationError::MissingUrl);
    }
    if card.schema_module.is_empty() {
        return Err(ValidationError::MissingSchemaModule {
            url: card.url.clone(),
        });
    }
    if let Some(data) = &card.data {
        let mut unexpected: Vec<String> = data
            .keys()
            .filter(|key| !card.fields.contains_key(*key))
            .cloned()
            .collect();
        if !unexpected.is_empty() {
            unexpected.sort();
            return Err(ValidationError::UnexpectedFields {
                url: card.url.clone(),
                fields: unexpected,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AssetType;
    use serde_json::{json, Map, Value};

    fn card(data: Option<Value>) -> CompiledCard {
        CompiledCard {
            url: "https://demo.com/post".to_string(),
            data: data.and_then(|v| v.as_object().cloned()),
            fields: Fields::new(),
            schema_module: "@cardstack/compiled/demo.com-post/schema.js".to_string(),
            adopts_from: None,
            isolated: ComponentInfo::default(),
            embedded: ComponentInfo::default(),
            assets: Vec::new(),
            deserializer: None,
        }
    }

    #[test]
    fn test_validation_rejects_missing_url_and_schema_module() {
        let mut c = card(None);
        c.url.clear();
        assert_eq!(assert_valid_compiled_card(&c), Err(ValidationError::MissingUrl));

        let mut c = card(None);
        c.schema_module.clear();
        assert!(matches!(
            assert_valid_compiled_card(&c),
            Err(ValidationError::MissingSchemaModule { .. })
        ));
    }

    #[test]
    fn test_validation_lists_unexpected_data_keys() {
        let c = card(Some(json!({ "zeta": 1, "alpha": 2 })));
        assert_eq!(
            assert_valid_compiled_card(&c),
            Err(ValidationError::UnexpectedFields {
                url: "https://demo.com/post".to_string(),
                fields: vec!["alpha".to_string(), "zeta".to_string()],
            })
        );
        assert!(assert_valid_compiled_card(&card(Some(Value::Object(Map::new())))).is_ok());
    }

    #[test]
    fn test_assets_exclude_pointed_files() {
        let raw = RawCard::new("https://demo.com/post")
            .with_schema("schema.js", "")
            .with_template(Format::Isolated, "isolated.js", "")
            .with_file("styles.css", "p {}")
            .with_file("logo.svg", "<svg/>");
        let assets = assets(&raw);
        assert_eq!(
            assets,
            vec![
                Asset {
                    asset_type: AssetType::Unknown,
                    path: "logo.svg".to_string()
                },
                Asset {
                    asset_type: AssetType::Css,
                    path: "styles.css".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_pointer_to_missing_file() {
        let mut raw = RawCard::new("https://demo.com/post");
        raw.embedded = Some("embedded.js".to_string());
        let err = check_pointers(&raw).unwrap_err();
        assert!(matches!(
            err,
            CompileError::MissingFile { pointer: "embedded", ref file, .. } if file == "embedded.js"
        ));
    }

    #[test]
    fn test_config_builders() {
        let config = CompilerConfig::default()
            .with_base_card_url("https://local/base")
            .with_types_module("@local/types");
        assert_eq!(config.base_card_url, "https://local/base");
        assert_eq!(config.types_module, "@local/types");
        assert_eq!(CompilerConfig::default().base_card_url, BASE_CARD_URL);
    }
}
