use anyhow::Result;
use cardhost_compiler::{Format, RawCard};
use colored::Colorize;
use serde_json::json;

use super::load_workspace;
use crate::ui;

pub fn list(config_path: &str, json: bool) -> Result<()> {
    let workspace = load_workspace(config_path)?;

    if json {
        let cards: Vec<_> = workspace
            .cards
            .iter()
            .map(|card| {
                json!({
                    "url": card.url,
                    "adoptsFrom": card.adopts_from,
                    "schema": card.schema,
                    "formats": formats(card),
                    "files": card.files.len(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&cards)?);
        return Ok(());
    }

    if workspace.cards.is_empty() {
        ui::print_warning("No cards found in the configured realms");
        return Ok(());
    }

    println!(
        "{} ({})",
        workspace.config.project.name.bold(),
        ui::plural(workspace.cards.len(), "card")
    );
    for card in &workspace.cards {
        let parent = card.adopts_from.as_deref().unwrap_or("-");
        let formats = formats(card);
        ui::print_bullet(&format!(
            "{} {} {}",
            card.url.cyan(),
            format!("← {}", parent).dimmed(),
            if formats.is_empty() {
                String::new()
            } else {
                format!("[{}]", formats.join(", "))
            }
        ));
    }
    Ok(())
}

/// Formats the card supplies its own template for.
fn formats(card: &RawCard) -> Vec<&'static str> {
    Format::ALL
        .into_iter()
        .filter(|format| card.template_file(*format).is_some())
        .map(|format| format.as_str())
        .collect()
}
