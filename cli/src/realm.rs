//! Loading card realms from disk.
//!
//! ```text
//! cards/
//!   post/
//!     card.json      { "schema": "schema.js", "isolated": "isolated.js", ... }
//!     schema.js
//!     isolated.js
//!     post.css
//! ```
//!
//! The card URL is the realm URL followed by the directory name.

use anyhow::{Context, Result};
use cardhost_compiler::utils::resolve_card_specifier;
use cardhost_compiler::RawCard;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

pub const MANIFEST_FILE: &str = "card.json";

/// `card.json`: a raw card without its url and files.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CardManifest {
    schema: Option<String>,
    isolated: Option<String>,
    embedded: Option<String>,
    adopts_from: Option<String>,
    data: Option<Map<String, Value>>,
    deserializer: Option<String>,
}

/// Every card under `dir`, sorted by URL.
pub fn load_realm(realm_url: &str, dir: &Path) -> Result<Vec<RawCard>> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read realm directory: {}", dir.display()))?;

    let mut cards = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() || !path.join(MANIFEST_FILE).is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let url = format!("{}/{}", realm_url.trim_end_matches('/'), name);
        cards.push(load_card(&url, &path)?);
    }
    cards.sort_by(|a, b| a.url.cmp(&b.url));
    debug!(realm = %realm_url, cards = cards.len(), "loaded realm");
    Ok(cards)
}

pub fn load_card(url: &str, dir: &Path) -> Result<RawCard> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let contents = fs::read_to_string(&manifest_path)
        .with_context(|| format!("Failed to read {}", manifest_path.display()))?;
    let manifest: CardManifest = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", manifest_path.display()))?;

    let mut files = BTreeMap::new();
    collect_files(dir, dir, &mut files)?;

    let adopts_from = manifest
        .adopts_from
        .map(|parent| resolve_card_specifier(url, &parent).unwrap_or(parent));

    Ok(RawCard {
        url: url.to_string(),
        files,
        schema: manifest.schema,
        isolated: manifest.isolated,
        embedded: manifest.embedded,
        adopts_from,
        data: manifest.data,
        deserializer: manifest.deserializer,
    })
}

fn collect_files(root: &Path, dir: &Path, files: &mut BTreeMap<String, String>) -> Result<()> {
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, files)?;
            continue;
        }
        let relative = path
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if name == MANIFEST_FILE {
            continue;
        }
        let source = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read card file: {}", path.display()))?;
        files.insert(name, source);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) {
        let path = dir.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_load_realm_reads_cards() {
        let realm = tempfile::tempdir().unwrap();
        let post = realm.path().join("post");
        write(
            &post,
            "card.json",
            r#"{ "schema": "schema.js", "adoptsFrom": "../article", "data": { "title": "Hi" } }"#,
        );
        write(&post, "schema.js", "export default class Post {}");
        write(&post, "styles/post.css", "h1 {}");
        write(&realm.path().join("notes"), "readme.txt", "not a card");

        let cards = load_realm("https://demo.com/", realm.path()).unwrap();
        assert_eq!(cards.len(), 1);
        let card = &cards[0];
        assert_eq!(card.url, "https://demo.com/post");
        assert_eq!(card.adopts_from.as_deref(), Some("https://demo.com/article"));
        assert_eq!(
            card.files.keys().collect::<Vec<_>>(),
            vec!["schema.js", "styles/post.css"]
        );
        assert_eq!(card.data.as_ref().unwrap()["title"], "Hi");
    }

    #[test]
    fn test_unknown_manifest_keys_are_rejected() {
        let realm = tempfile::tempdir().unwrap();
        write(&realm.path().join("post"), "card.json", r#"{ "url": "https://x" }"#);
        let err = load_realm("https://demo.com", realm.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse"));
    }
}
