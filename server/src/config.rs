use std::{env, fmt::Display, fs::read_to_string, path::PathBuf, str::FromStr};

use tracing::{info, warn};

use crate::sheets::SheetsConfig;

const DEFAULT_ALLOWED_EMAILS: &str =
    "owner@bagcraftpro.com,staff@bagcraftpro.com,demo@bagcraft.com";

pub struct Config {
    pub port: u16,
    /// Base URL attachments are served under.
    pub public_url: String,
    pub data_dir: PathBuf,
    /// Presence selects the remote order store; absence means fallback mode.
    pub redis_url: Option<String>,
    /// Presence means sessions must carry a provider-resolved profile;
    /// absence enables the deterministic demo identity.
    pub provider: Option<String>,
    pub allowed_emails: Vec<String>,
    /// Spreadsheet sync config from the environment. A config persisted via
    /// the API takes precedence over this.
    pub sheets: Option<SheetsConfig>,
}

impl Config {
    pub fn load() -> Self {
        let port = try_load("RUST_PORT", "1111");

        Self {
            port,
            public_url: try_load("PUBLIC_URL", &format!("http://localhost:{port}")),
            data_dir: PathBuf::from(try_load::<String>("DATA_DIR", "data")),
            redis_url: maybe_var("REDIS_URL"),
            provider: maybe_var("IDENTITY_PROVIDER"),
            allowed_emails: try_load::<String>("ALLOWED_EMAILS", DEFAULT_ALLOWED_EMAILS)
                .split(',')
                .map(|email| email.trim().to_string())
                .filter(|email| !email.is_empty())
                .collect(),
            sheets: sheets_from_env(),
        }
    }
}

fn sheets_from_env() -> Option<SheetsConfig> {
    let api_key = secret_or_var("GOOGLE_SHEETS_API_KEY")?;
    let spreadsheet_id = maybe_var("GOOGLE_SPREADSHEET_ID")?;

    let config = SheetsConfig {
        spreadsheet_id,
        api_key,
        repair_range: try_load("GOOGLE_REPAIRS_RANGE", "Repairs!A:H"),
        job_range: try_load("GOOGLE_JOBS_RANGE", "Jobs!A:I"),
    };

    if config.is_complete() {
        info!("Spreadsheet sync configured from environment");
        Some(config)
    } else {
        warn!("Spreadsheet environment config incomplete, sync disabled");
        None
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn maybe_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

/// Docker-style secret file first, plain environment variable second.
fn secret_or_var(name: &str) -> Option<String> {
    let path = format!("/run/secrets/{name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .ok()
        .filter(|s| !s.is_empty())
        .or_else(|| maybe_var(name))
}
