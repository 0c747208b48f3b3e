//! Collaborators the compiler depends on, and an in-memory implementation
//! of both.

use crate::base::base_realm;
use crate::compiler::{BaseCardCache, Compiler, CompilerConfig};
use crate::error::{CompileError, Result};
use crate::types::{CompiledCard, RawCard};
use crate::utils::encode_card_url;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Prefix of module identifiers handed out by [`MemoryBuilder`].
pub const COMPILED_MODULE_PREFIX: &str = "@cardstack/compiled";

/// Fetches cards by URL.
#[async_trait]
pub trait Builder: Send + Sync {
    async fn get_raw_card(&self, url: &str) -> Result<RawCard>;

    async fn get_compiled_card(&self, url: &str) -> Result<Arc<CompiledCard>>;
}

/// Registers generated source under a module identifier.
#[async_trait]
pub trait ModuleDefiner: Send + Sync {
    /// Returns the identifier the source can be loaded under. The same
    /// owner, filename and source always yield the same identifier.
    async fn define(&self, card_url: &str, local_path: &str, source: &str) -> Result<String>;
}

/// Builder and module definer backed by in-process maps.
///
/// Compiled cards are compiled on first request and cached by URL for the
/// lifetime of the builder.
#[derive(Default)]
pub struct MemoryBuilder {
    raw: DashMap<String, RawCard>,
    compiled: DashMap<String, Arc<CompiledCard>>,
    modules: DashMap<String, String>,
    config: CompilerConfig,
    base_cache: BaseCardCache,
}

impl MemoryBuilder {
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Builder preloaded with the built-in base realm cards.
    pub fn with_base_realm(config: CompilerConfig) -> Self {
        let builder = Self::new(config);
        for card in base_realm() {
            builder.add_raw_card(card);
        }
        builder
    }

    /// Register or replace a raw card. Replacing drops every cached compiled
    /// card, since any of them may depend on it.
    pub fn add_raw_card(&self, card: RawCard) {
        if self.raw.insert(card.url.clone(), card).is_some() {
            self.compiled.clear();
        }
    }

    pub fn raw_card_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.raw.iter().map(|e| e.key().clone()).collect();
        urls.sort();
        urls
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn compiler(&self) -> Compiler<'_> {
        Compiler::new(self, self, self.config.clone()).with_base_cache(self.base_cache.clone())
    }

    pub fn module_source(&self, module_id: &str) -> Option<String> {
        self.modules.get(module_id).map(|entry| entry.value().clone())
    }

    /// Every defined module as `(id, source)`, sorted by id.
    pub fn modules(&self) -> Vec<(String, String)> {
        let mut modules: Vec<(String, String)> = self
            .modules
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        modules.sort();
        modules
    }
}

#[async_trait]
impl Builder for MemoryBuilder {
    async fn get_raw_card(&self, url: &str) -> Result<RawCard> {
        self.raw
            .get(url)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CompileError::CardNotFound {
                url: url.to_string(),
            })
    }

    async fn get_compiled_card(&self, url: &str) -> Result<Arc<CompiledCard>> {
        if let Some(card) = self.compiled.get(url).map(|entry| entry.value().clone()) {
            debug!(url = %url, "compiled card cache hit");
            return Ok(card);
        }

        let raw = self.get_raw_card(url).await?;
        let card = Arc::new(self.compiler().compile(&raw).await?);
        self.compiled.insert(url.to_string(), card.clone());
        info!(url = %url, "compiled card");
        Ok(card)
    }
}

#[async_trait]
impl ModuleDefiner for MemoryBuilder {
    async fn define(&self, card_url: &str, local_path: &str, source: &str) -> Result<String> {
        let id = format!(
            "{}/{}/{}",
            COMPILED_MODULE_PREFIX,
            encode_card_url(card_url),
            local_path
        );
        self.modules.insert(id.clone(), source.to_string());
        debug!(module = %id, "defined module");
        Ok(id)
    }
}
