//! Runtime settings resolved from parameters, environment, and defaults.
//!
//! Precedence is `-name value` parameter, then `KEEL_SETUP_*` environment
//! variable, then the built-in default.

use std::{path::PathBuf, time::Duration};

use url::Url;

use crate::{
    cli::params::Parameters,
    constants::{
        DB_DEFAULT_PORT, DB_SERVICE_HOST, DEFAULT_LICENSE_API_URL,
        DEFAULT_OUTPUT_DIR,
    },
    error::SetupError,
};

const DEFAULT_LICENSE_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MIGRATION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct SetupSettings {
    /// `-out`, `KEEL_SETUP_OUTPUT_DIR`.
    pub output_dir: PathBuf,
    /// `KEEL_LICENSE_API_URL`.
    pub license_api_url: Url,
    /// `KEEL_SETUP_LICENSE_TIMEOUT`.
    pub license_timeout: Duration,
    /// `KEEL_SETUP_MIGRATION_TIMEOUT`, applied to each script separately.
    pub migration_timeout: Duration,
    /// `-dbhost`, `KEEL_SETUP_DB_HOST`.
    pub db_host: String,
    /// `-dbport`, `KEEL_SETUP_DB_PORT`.
    pub db_port: u16,
    /// `-email`, `KEEL_SETUP_CERTBOT_EMAIL`.
    pub certbot_email: Option<String>,
}

impl SetupSettings {
    /// Resolve against the process environment.
    pub fn resolve(params: &Parameters) -> Result<Self, SetupError> {
        Self::resolve_with(params, |name| std::env::var(name).ok())
    }

    /// Resolve using an injectable environment lookup.
    pub fn resolve_with<F>(
        params: &Parameters,
        env: F,
    ) -> Result<Self, SetupError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |param: &str, var: &str| -> Option<String> {
            params
                .get(param)
                .map(str::to_string)
                .or_else(|| env(var))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let output_dir = lookup("out", "KEEL_SETUP_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));

        let api_raw = env("KEEL_LICENSE_API_URL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_LICENSE_API_URL.to_string());
        let license_api_url = Url::parse(api_raw.trim()).map_err(|err| {
            SetupError::UserInput(format!(
                "KEEL_LICENSE_API_URL '{api_raw}' is not a valid URL: {err}"
            ))
        })?;

        let license_timeout = parse_duration_var(
            &env,
            "KEEL_SETUP_LICENSE_TIMEOUT",
            DEFAULT_LICENSE_TIMEOUT,
        )?;
        let migration_timeout = parse_duration_var(
            &env,
            "KEEL_SETUP_MIGRATION_TIMEOUT",
            DEFAULT_MIGRATION_TIMEOUT,
        )?;

        let db_host = lookup("dbhost", "KEEL_SETUP_DB_HOST")
            .unwrap_or_else(|| DB_SERVICE_HOST.to_string());
        let db_port = match lookup("dbport", "KEEL_SETUP_DB_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| {
                SetupError::UserInput(format!(
                    "database port '{raw}' is not a valid port number"
                ))
            })?,
            None => DB_DEFAULT_PORT,
        };

        let certbot_email = lookup("email", "KEEL_SETUP_CERTBOT_EMAIL");

        Ok(Self {
            output_dir,
            license_api_url,
            license_timeout,
            migration_timeout,
            db_host,
            db_port,
            certbot_email,
        })
    }
}

fn parse_duration_var<F>(
    env: &F,
    name: &str,
    default: Duration,
) -> Result<Duration, SetupError>
where
    F: Fn(&str) -> Option<String>,
{
    match env(name).filter(|v| !v.trim().is_empty()) {
        Some(raw) => humantime::parse_duration(raw.trim()).map_err(|err| {
            SetupError::UserInput(format!(
                "{name}='{raw}' is not a duration (e.g. 90s, 5m): {err}"
            ))
        }),
        None => Ok(default),
    }
}
