//! Config command handlers

use std::path::Path;

use anyhow::{bail, Context, Result};

use notesync_core::Config;

use crate::output::{Output, OutputFormat};

/// Show the effective configuration
pub fn show(config: &Config, config_path: &Path, output: &Output) -> Result<()> {
    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "api_url": config.api_url,
                    "ws_url": config.push_url(),
                    "edit_debounce_ms": config.edit_debounce_ms,
                    "reconnect_delay_ms": config.reconnect_delay_ms,
                    "config_file": config_path,
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", config.api_url);
        }
        OutputFormat::Human => {
            let ws_note = if config.ws_url.is_some() { "" } else { " (derived)" };
            println!("Configuration:");
            println!("  api_url:            {}", config.api_url);
            println!("  ws_url:             {}{}", config.push_url(), ws_note);
            println!("  edit_debounce_ms:   {}", config.edit_debounce_ms);
            println!("  reconnect_delay_ms: {}", config.reconnect_delay_ms);
            println!();
            println!("Config file: {}", config_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value and save it to the config file
pub fn set(key: String, value: String, config_path: &Path, output: &Output) -> Result<()> {
    let mut config = Config::load_from_path(config_path).context("Failed to load configuration")?;

    match key.as_str() {
        "api_url" => {
            config.api_url = value.trim_end_matches('/').to_string();
        }
        "ws_url" => {
            config.ws_url = if value.is_empty() || value == "none" {
                None
            } else {
                Some(value.clone())
            };
        }
        "edit_debounce_ms" => {
            config.edit_debounce_ms = value
                .parse()
                .context("Invalid value for edit_debounce_ms. Use a whole number of milliseconds.")?;
        }
        "reconnect_delay_ms" => {
            config.reconnect_delay_ms = value
                .parse()
                .context("Invalid value for reconnect_delay_ms. Use a whole number of milliseconds.")?;
        }
        _ => {
            bail!(
                "Unknown configuration key: '{}'\n\
                 Valid keys: api_url, ws_url, edit_debounce_ms, reconnect_delay_ms",
                key
            );
        }
    }

    config
        .save_to_path(config_path)
        .context("Failed to save configuration")?;

    output.success(&format!("Set {} = {}", key, value));

    Ok(())
}
