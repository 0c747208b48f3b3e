use anyhow::{Context, Result};
use cardhost_compiler::CompiledCard;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::load_workspace;
use crate::ui;

pub fn compile(config_path: &str, urls: &[String], json: bool) -> Result<()> {
    let workspace = load_workspace(config_path)?;
    let targets = workspace.select(urls)?;

    if !json {
        ui::print_step(&format!("Compiling {}...", ui::plural(targets.len(), "card")));
    }
    let bar = (!json).then(|| ui::create_progress_bar(targets.len() as u64, "compiling"));
    let outcomes = workspace.compile_all(&targets, |url| {
        if let Some(bar) = &bar {
            bar.set_message(url.to_string());
            bar.inc(1);
        }
    })?;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    if !json {
        for (url, err) in &outcomes.failed {
            ui::print_error(&format!("{} [{}]", url, ui::format_error_kind(err)));
            ui::print_info(&err.to_string());
        }
    }
    let compiled = outcomes.into_result()?;

    let output_dir = Path::new(workspace.config.get_output_dir());
    let written = write_modules(output_dir, &workspace.builder.modules())?;

    if json {
        print_json(&compiled)?;
        return Ok(());
    }

    for card in &compiled {
        ui::print_success(&card.url);
        ui::print_info(&format!(
            "{} · {} · schema {}",
            ui::plural(card.fields.len(), "field"),
            ui::plural(card.assets.len(), "asset"),
            card.schema_module
        ));
    }
    println!();
    ui::print_success(&format!(
        "Wrote {} to {}",
        ui::plural(written.len(), "module"),
        output_dir.display()
    ));
    Ok(())
}

/// Write each `(module id, source)` to `<dir>/<module id>`.
pub fn write_modules(dir: &Path, modules: &[(String, String)]) -> Result<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(modules.len());
    for (id, source) in modules {
        let path = dir.join(id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        fs::write(&path, source)
            .with_context(|| format!("Failed to write module: {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

fn print_json(compiled: &[Arc<CompiledCard>]) -> Result<()> {
    let cards: Vec<&CompiledCard> = compiled.iter().map(|c| c.as_ref()).collect();
    println!("{}", serde_json::to_string_pretty(&cards)?);
    Ok(())
}
