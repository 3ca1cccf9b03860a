use std::path::Path;

use serde::Serialize;
use tandem_core::util::normalize_text_option;
use tandem_core::TandemConfig;

use crate::cli::ConfigCommands;
use crate::commands::common::CliContext;
use crate::error::CliError;

const REDACTED: &str = "<redacted>";

#[derive(Debug, Serialize)]
pub struct ConfigView {
    pub config_path: String,
    pub data_dir: String,
    pub api_base_url: Option<String>,
    pub owner_id: Option<String>,
    pub quiet_period_ms: u64,
    pub access_token: Option<&'static str>,
    pub auth_required: bool,
}

/// Fields given to `config init`; `None` keeps the stored value.
#[derive(Debug, Default)]
pub struct ConfigUpdates {
    pub api_base_url: Option<String>,
    pub owner_id: Option<String>,
    pub access_token: Option<String>,
    pub quiet_period_ms: Option<u64>,
    pub auth_required: Option<bool>,
}

pub fn run_config(command: ConfigCommands, context: &CliContext) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            api_base_url,
            owner_id,
            access_token,
            quiet_period_ms,
            auth_required,
        } => {
            let updates = ConfigUpdates {
                api_base_url,
                owner_id,
                access_token,
                quiet_period_ms,
                auth_required,
            };
            let config = run_config_init(&context.config_path, updates)?;
            println!("Config written to {}", context.config_path.display());

            let missing = missing_sync_fields(&config);
            if missing.is_empty() {
                println!("Sync is ready. Run `tandem sync`.");
            } else {
                println!("Config is missing: {}", missing.join(", "));
            }
            Ok(())
        }
        ConfigCommands::Show { json } => {
            let view = config_view(context)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                for line in format_config_lines(&view) {
                    println!("{line}");
                }
            }
            Ok(())
        }
    }
}

/// Merge non-empty fields of `updates` into the file at `path` and save it.
///
/// Environment overrides are not applied.
pub fn run_config_init(path: &Path, updates: ConfigUpdates) -> Result<TandemConfig, CliError> {
    let mut config = TandemConfig::load(path)?;

    if let Some(value) = normalize_text_option(updates.api_base_url) {
        config.api_base_url = Some(value);
    }
    if let Some(value) = normalize_text_option(updates.owner_id) {
        config.owner_id = Some(value);
    }
    if let Some(value) = normalize_text_option(updates.access_token) {
        config.access_token = Some(value);
    }
    if let Some(value) = updates.quiet_period_ms {
        config.quiet_period_ms = value;
    }
    if let Some(value) = updates.auth_required {
        config.auth_required = value;
    }

    let config = config.normalized()?;
    config.save(path)?;
    Ok(config)
}

pub fn missing_sync_fields(config: &TandemConfig) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if config.api_base_url.is_none() {
        missing.push("api_base_url");
    }
    if config.owner_id.is_none() {
        missing.push("owner_id");
    }
    missing
}

pub fn config_view(context: &CliContext) -> Result<ConfigView, CliError> {
    let config = &context.config;
    Ok(ConfigView {
        config_path: context.config_path.display().to_string(),
        data_dir: context.data_dir()?.display().to_string(),
        api_base_url: config.api_base_url.clone(),
        owner_id: config.owner_id.clone(),
        quiet_period_ms: config.quiet_period_ms,
        access_token: config.access_token.as_ref().map(|_| REDACTED),
        auth_required: config.auth_required,
    })
}

pub fn format_config_lines(view: &ConfigView) -> Vec<String> {
    let unset = || "(unset)".to_string();
    vec![
        format!("config_path      {}", view.config_path),
        format!("data_dir         {}", view.data_dir),
        format!(
            "api_base_url     {}",
            view.api_base_url.clone().unwrap_or_else(unset)
        ),
        format!("owner_id         {}", view.owner_id.clone().unwrap_or_else(unset)),
        format!("quiet_period_ms  {}", view.quiet_period_ms),
        format!(
            "access_token     {}",
            view.access_token.map_or_else(unset, str::to_string)
        ),
        format!("auth_required    {}", view.auth_required),
    ]
}
