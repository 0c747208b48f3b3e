use anyhow::{Context, Result};
use cardhost_compiler::CompilerConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Main configuration structure for cards.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardsConfig {
    pub project: ProjectConfig,

    #[serde(default)]
    pub realms: Vec<RealmConfig>,

    #[serde(default)]
    pub output: Option<OutputConfig>,

    #[serde(default)]
    pub compiler: Option<CompilerSection>,
}

/// Project-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
}

/// A directory of cards served under one URL prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealmConfig {
    /// e.g. "https://demo.com/"
    pub url: String,

    /// Directory holding one sub-directory per card, relative to the config file
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
}

fn default_output_dir() -> String {
    "./compiled".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompilerSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_card_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub types_module: Option<String>,
}

impl CardsConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: CardsConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Try to load config, returning None if file doesn't exist
    pub fn load_optional<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.project.name.is_empty() {
            anyhow::bail!("Project name cannot be empty");
        }

        let mut urls = HashSet::new();
        for realm in &self.realms {
            let url = Url::parse(&realm.url)
                .with_context(|| format!("Realm URL is not a valid URL: {}", realm.url))?;
            if url.scheme() != "http" && url.scheme() != "https" {
                anyhow::bail!("Realm URL must be http(s): {}", realm.url);
            }
            if !urls.insert(realm.normalized_url()) {
                anyhow::bail!("Duplicate realm URL: {}", realm.url);
            }
            if realm.path.is_empty() {
                anyhow::bail!("Realm {} has an empty path", realm.url);
            }
        }

        if let Some(base) = self.compiler.as_ref().and_then(|c| c.base_card_url.as_ref()) {
            Url::parse(base).with_context(|| format!("base_card_url is not a valid URL: {}", base))?;
        }

        Ok(())
    }

    /// Get the output directory for compiled modules
    pub fn get_output_dir(&self) -> &str {
        self.output
            .as_ref()
            .map(|o| o.dir.as_str())
            .unwrap_or("./compiled")
    }

    pub fn compiler_config(&self) -> CompilerConfig {
        let mut config = CompilerConfig::default();
        if let Some(section) = &self.compiler {
            if let Some(url) = &section.base_card_url {
                config = config.with_base_card_url(url.clone());
            }
            if let Some(module) = &section.types_module {
                config = config.with_types_module(module.clone());
            }
        }
        config
    }

    /// Realm directories resolved against the directory containing the config file.
    pub fn realm_dirs(&self, config_path: &Path) -> Vec<(&RealmConfig, PathBuf)> {
        let root = config_path.parent().unwrap_or_else(|| Path::new("."));
        self.realms
            .iter()
            .map(|realm| (realm, root.join(&realm.path)))
            .collect()
    }
}

impl RealmConfig {
    /// Realm URL with exactly one trailing slash.
    pub fn normalized_url(&self) -> String {
        format!("{}/", self.url.trim_end_matches('/'))
    }
}
