use anyhow::Result;
use serde_json::json;

use super::load_workspace;
use crate::ui;

pub fn validate(config_path: &str, urls: &[String], json: bool) -> Result<()> {
    let workspace = load_workspace(config_path)?;
    let targets = workspace.select(urls)?;
    let outcomes = workspace.compile_all(&targets, |_| {})?;

    if json {
        let failures: Vec<_> = outcomes
            .failed
            .iter()
            .map(|(url, err)| {
                json!({
                    "url": url,
                    "kind": format!("{:?}", err.kind()).to_lowercase(),
                    "message": err.to_string(),
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "checked": targets.len(),
                "failures": failures,
            }))?
        );
    } else if outcomes.failed.is_empty() {
        ui::print_success(&format!("{} valid", ui::plural(targets.len(), "card")));
    } else {
        for (url, err) in &outcomes.failed {
            ui::print_error(&format!("{} [{}]", url, ui::format_error_kind(err)));
            ui::print_info(&err.to_string());
        }
    }

    outcomes.into_result().map(|_| ())
}
