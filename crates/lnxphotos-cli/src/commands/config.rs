//! Config command - View and validate LNXPhotos configuration
//!
//! The CLI never writes the config file; edit it by hand and check it with
//! `lnxphotos config validate`.

use anyhow::{Context as _, Result};
use clap::Subcommand;
use lnxphotos_core::config::Config;
use tracing::info;

use super::Context;
use crate::output::plural;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display the effective configuration
    Show,
    /// Validate the configuration file
    Validate,
    /// Print the configuration file location
    Path,
}

impl ConfigCommand {
    pub async fn execute(&self, ctx: &Context) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(ctx),
            ConfigCommand::Validate => self.execute_validate(ctx),
            ConfigCommand::Path => self.execute_path(ctx),
        }
    }

    fn execute_show(&self, ctx: &Context) -> Result<()> {
        let formatter = ctx.formatter();
        let mut config = ctx.load_config()?;
        // Never echo the credential
        if config.auth.access_token.is_some() {
            config.auth.access_token = Some("<redacted>".to_string());
        }

        info!(config_path = %ctx.config_path.display(), "Showing configuration");

        if ctx.format.is_json() {
            let json = serde_json::to_value(&config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
        } else {
            formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
            formatter.info("");

            let yaml = serde_yaml::to_string(&config)
                .context("Failed to serialize configuration to YAML")?;
            for line in yaml.lines() {
                formatter.info(line);
            }
        }

        Ok(())
    }

    fn execute_validate(&self, ctx: &Context) -> Result<()> {
        let formatter = ctx.formatter();
        let path = &ctx.config_path;

        if !path.exists() {
            if ctx.format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": true,
                    "config_path": path.display().to_string(),
                    "errors": [],
                    "defaults": true,
                }));
            } else {
                formatter.info(&format!("Configuration file not found at {}", path.display()));
                formatter.success("Built-in defaults are valid");
            }
            return Ok(());
        }

        let config = match Config::load(path) {
            Ok(config) => config,
            Err(e) => {
                if ctx.format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": path.display().to_string(),
                        "errors": [format!("Failed to parse configuration: {e}")],
                    }));
                } else {
                    formatter.error(&format!("Failed to parse configuration: {e}"));
                    formatter.info(&format!("File: {}", path.display()));
                }
                return Ok(());
            }
        };

        info!(config_path = %path.display(), "Validating configuration");
        let errors = config.validate();

        if ctx.format.is_json() {
            let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": path.display().to_string(),
                "errors": error_strings,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", path.display()));
        } else {
            formatter.error(&format!(
                "Configuration has {}:",
                plural(errors.len(), "error")
            ));
            formatter.info(&format!("File: {}", path.display()));
            formatter.info("");
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }

        Ok(())
    }

    fn execute_path(&self, ctx: &Context) -> Result<()> {
        let formatter = ctx.formatter();
        if ctx.format.is_json() {
            formatter.print_json(&serde_json::json!({
                "config_path": ctx.config_path.display().to_string(),
                "exists": ctx.config_path.exists(),
            }));
        } else {
            println!("{}", ctx.config_path.display());
        }
        Ok(())
    }
}
