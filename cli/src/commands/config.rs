use anyhow::{Context, Result};
use colored::Colorize;

use crate::config::CardsConfig;
use crate::ui;

pub fn validate(config_path: &str) -> Result<()> {
    ui::print_step("Validating configuration...");

    let Some(config) = CardsConfig::load_optional(config_path)
        .context("Failed to load configuration")?
    else {
        anyhow::bail!(
            "Configuration file not found: {}\nCreate a cards.toml or pass --config.",
            config_path
        );
    };

    ui::print_success("Configuration is valid!");
    println!();
    println!("{} {}", "Project:".bold(), config.project.name);
    println!("{} {}", "Output:".bold(), config.get_output_dir());

    let compiler = config.compiler_config();
    println!("{} {}", "Base card:".bold(), compiler.base_card_url);

    if config.realms.is_empty() {
        ui::print_warning("No realms configured");
    } else {
        println!("{}", "Realms:".bold());
        for realm in &config.realms {
            ui::print_bullet(&format!("{} → {}", realm.normalized_url(), realm.path));
        }
    }
    Ok(())
}
