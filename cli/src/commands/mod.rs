pub mod compile;
pub mod config;
pub mod list;
pub mod validate;

use crate::config::CardsConfig;
use crate::realm::load_realm;
use anyhow::{Context, Result};
use cardhost_compiler::utils::similar_names;
use cardhost_compiler::{Builder, CompileError, CompiledCard, MemoryBuilder, RawCard};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Configuration plus every card found in its realms.
pub struct Workspace {
    pub config: CardsConfig,
    pub cards: Vec<RawCard>,
    pub builder: MemoryBuilder,
}

pub fn load_workspace(config_path: &str) -> Result<Workspace> {
    let path = Path::new(config_path);
    let config = CardsConfig::load(path)
        .context("Failed to load configuration. Create a cards.toml or pass --config.")?;

    let mut cards = Vec::new();
    for (realm, dir) in config.realm_dirs(path) {
        cards.extend(load_realm(&realm.normalized_url(), &dir)?);
    }

    let builder = MemoryBuilder::with_base_realm(config.compiler_config());
    for card in &cards {
        builder.add_raw_card(card.clone());
    }
    tracing::info!(cards = cards.len(), "loaded workspace");

    Ok(Workspace {
        config,
        cards,
        builder,
    })
}

impl Workspace {
    /// The requested URLs, or every realm card when none are given.
    pub fn select(&self, urls: &[String]) -> Result<Vec<String>> {
        if urls.is_empty() {
            return Ok(self.cards.iter().map(|c| c.url.clone()).collect());
        }

        let known = self.builder.raw_card_urls();
        for url in urls {
            if !known.contains(url) {
                let suggestions = similar_names(url, known.iter().map(String::as_str));
                match suggestions.first() {
                    Some(candidate) => {
                        anyhow::bail!("Unknown card: {}. Did you mean {}?", url, candidate)
                    }
                    None => anyhow::bail!("Unknown card: {}", url),
                }
            }
        }
        Ok(urls.to_vec())
    }

    /// Compile each URL in order, keeping every outcome.
    pub fn compile_all(&self, urls: &[String], mut on_done: impl FnMut(&str)) -> Result<Outcomes> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("Failed to start async runtime")?;

        let mut outcomes = Outcomes::default();
        runtime.block_on(async {
            for url in urls {
                match self.builder.get_compiled_card(url).await {
                    Ok(card) => outcomes.compiled.push(card),
                    Err(err) => outcomes.failed.push((url.clone(), err)),
                }
                on_done(url);
            }
        });
        Ok(outcomes)
    }
}

#[derive(Default)]
pub struct Outcomes {
    pub compiled: Vec<Arc<CompiledCard>>,
    pub failed: Vec<(String, CompileError)>,
}

impl Outcomes {
    pub fn into_result(self) -> Result<Vec<Arc<CompiledCard>>> {
        if self.failed.is_empty() {
            return Ok(self.compiled);
        }
        let validation_only = self.failed.iter().all(|(_, err)| err.is_client_error());
        Err(CompileFailures {
            count: self.failed.len(),
            validation_only,
        }
        .into())
    }
}

/// Returned when at least one card failed; details are already printed.
#[derive(Debug)]
pub struct CompileFailures {
    pub count: usize,
    pub validation_only: bool,
}

impl fmt::Display for CompileFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.validation_only {
            "failed validation"
        } else {
            "failed to compile"
        };
        write!(f, "{} {}", crate::ui::plural(self.count, "card"), noun)
    }
}

impl std::error::Error for CompileFailures {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn workspace_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("cards.toml"),
            "[project]\nname = \"demo\"\n\n[[realms]]\nurl = \"https://demo.com\"\npath = \"cards\"\n",
        );
        let note = dir.path().join("cards/note");
        write(
            &note.join("card.json"),
            r#"{ "schema": "schema.js", "isolated": "isolated.js", "data": { "body": "hi" } }"#,
        );
        write(
            &note.join("schema.js"),
            r#"import { contains } from "@cardstack/types";
import string from "https://cardstack.com/base/string";
export default class Note { @contains(string) body; }
"#,
        );
        write(
            &note.join("isolated.js"),
            r#"import { precompileTemplate } from "@ember/template-compilation";
export default precompileTemplate("<p><@fields.body /></p>");
"#,
        );
        let broken = dir.path().join("cards/broken");
        write(
            &broken.join("card.json"),
            r#"{ "adoptsFrom": "../note", "data": { "title": "nope" } }"#,
        );
        dir
    }

    #[test]
    fn test_workspace_compiles_realm_cards() {
        let dir = workspace_dir();
        let config_path = dir.path().join("cards.toml");
        let workspace = load_workspace(config_path.to_str().unwrap()).unwrap();

        let targets = workspace.select(&[]).unwrap();
        assert_eq!(targets, vec!["https://demo.com/broken", "https://demo.com/note"]);

        let mut seen = Vec::new();
        let outcomes = workspace
            .compile_all(&targets, |url| seen.push(url.to_string()))
            .unwrap();
        assert_eq!(seen, targets);
        assert_eq!(outcomes.compiled.len(), 1);
        assert_eq!(
            outcomes.compiled[0].isolated.inline_hbs.as_deref(),
            Some("<p>{{@model.body}}</p>")
        );

        let (url, err) = &outcomes.failed[0];
        assert_eq!(url, "https://demo.com/broken");
        assert!(err.is_client_error());

        let failure = outcomes.into_result().unwrap_err();
        let failure = failure.downcast_ref::<CompileFailures>().unwrap();
        assert!(failure.validation_only);
        assert_eq!(failure.to_string(), "1 card failed validation");
    }

    #[test]
    fn test_select_suggests_known_cards() {
        let dir = workspace_dir();
        let workspace =
            load_workspace(dir.path().join("cards.toml").to_str().unwrap()).unwrap();
        let err = workspace
            .select(&["https://demo.com/notes".to_string()])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unknown card: https://demo.com/notes. Did you mean https://demo.com/note?"
        );
    }
}
