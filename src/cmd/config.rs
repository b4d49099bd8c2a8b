//! Configuration view and validation: `orion config`.

use std::path::Path;

use anyhow::Result;
use orion::config::OrionConfig;

use super::super::ConfigCommands;

pub fn cmd_config(
    path: &Path,
    config: &OrionConfig,
    command: Option<ConfigCommands>,
) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            if path.exists() {
                println!("# Config file: {}", path.display());
            } else {
                println!("# No config file at {}; showing defaults", path.display());
            }
            println!("# Effective values include environment overrides; secrets redacted");
            println!();

            let mut shown = config.clone();
            if shown.auth.jwt_secret.is_some() {
                shown.auth.jwt_secret = Some("<redacted>".to_string());
            }
            if shown.integrations.whatsapp_access_token.is_some() {
                shown.integrations.whatsapp_access_token = Some("<redacted>".to_string());
            }
            if shown.integrations.whatsapp_verify_token.is_some() {
                shown.integrations.whatsapp_verify_token = Some("<redacted>".to_string());
            }
            print!("{}", shown.to_toml_string()?);
        }
        Some(ConfigCommands::Validate) => {
            let problems = config.validate();
            if problems.is_empty() {
                println!("Configuration is valid");
            } else {
                println!("Configuration problems:");
                for problem in &problems {
                    println!("  - {}", problem);
                }
                anyhow::bail!("{} configuration problem(s) found", problems.len());
            }
        }
    }
    Ok(())
}
