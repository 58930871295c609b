//! Command-line surface: parameter parsing, typed commands, and prompts.

pub mod params;
pub mod prompt;

use std::net::Ipv6Addr;

use crate::{constants::DEFAULT_DOMAIN, error::SetupError};

pub use params::{Parameters, Verb, parse_parameters};
pub use prompt::{Answer, Prompter, ScriptedPrompter, TerminalPrompter};

/// TLS preference expressed by flags before any prompting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TlsRequest {
    /// `-letsencrypt y`
    pub automated_ca: bool,
    /// `-selfsigned y`
    pub self_signed: bool,
}

/// Arguments of `install`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    /// Lowercased host the deployment is reached at.
    pub domain: String,
    /// TLS flags given on the command line.
    pub tls: TlsRequest,
}

/// Arguments of `update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateRequest {
    /// `-db` present: migrate instead of re-rendering configuration.
    pub database: bool,
}

/// Host family of the operator's wrapper script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostKind {
    /// PowerShell wrapper (`-env win`).
    Windows,
    /// Shell wrapper.
    #[default]
    Unix,
}

impl HostKind {
    fn from_param(raw: Option<&str>) -> Self {
        match raw.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "win" || v == "windows" => HostKind::Windows,
            _ => HostKind::Unix,
        }
    }

    /// Commands the operator runs to update, echoed by `printenv`.
    pub fn update_hint(self) -> &'static str {
        match self {
            HostKind::Windows => {
                "'.\\keel.ps1 -updateself' and then '.\\keel.ps1 -update'"
            }
            HostKind::Unix => "'./keel.sh updateself' and then './keel.sh update'",
        }
    }
}

/// Arguments of `printenv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrintEnvRequest {
    /// Wrapper the update hint is written for.
    pub host: HostKind,
}

/// Fully typed top-level command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupCommand {
    /// `install`: validate, provision, and render everything.
    Install(InstallRequest),
    /// `update`: rebuild configuration or migrate.
    Update(UpdateRequest),
    /// `printenv`: show the installed URL.
    PrintEnvironment(PrintEnvRequest),
    /// No recognized verb.
    NoOp,
}

impl SetupCommand {
    /// Type the parsed parameters; `install` validates the domain here.
    pub fn from_parameters(params: &Parameters) -> Result<Self, SetupError> {
        let Some(verb) = params.verb else {
            return Ok(SetupCommand::NoOp);
        };

        Ok(match verb {
            Verb::Install => {
                let domain = params
                    .get("domain")
                    .map(|d| d.trim().trim_end_matches('.').to_ascii_lowercase())
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| DEFAULT_DOMAIN.to_string());
                validate_domain(&domain)?;
                SetupCommand::Install(InstallRequest {
                    domain,
                    tls: TlsRequest {
                        automated_ca: params.flag("letsencrypt"),
                        self_signed: params.flag("selfsigned"),
                    },
                })
            }
            Verb::Update => SetupCommand::Update(UpdateRequest {
                database: params.contains("db"),
            }),
            Verb::PrintEnv => SetupCommand::PrintEnvironment(PrintEnvRequest {
                host: HostKind::from_param(params.get("env")),
            }),
        })
    }
}

/// Accept DNS names and IPv4 literals; reject anything that would break the
/// rendered nginx config or URLs.
///
/// IPv6 literals are refused: the vault URL and `server_name` carry the host
/// unbracketed.
fn validate_domain(domain: &str) -> Result<(), SetupError> {
    if domain.parse::<Ipv6Addr>().is_ok() {
        return Err(SetupError::UserInput(format!(
            "'{domain}' is an IPv6 address; use a DNS name or an IPv4 address"
        )));
    }
    let valid = domain.len() <= 253
        && domain.split('.').all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        });
    if valid {
        Ok(())
    } else {
        Err(SetupError::UserInput(format!(
            "'{domain}' is not a valid domain name"
        )))
    }
}

/// Parse a yes/no answer (`y`, `yes`, `n`, `no`, case-insensitive).
pub fn parse_yes_no(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" | "1" => Some(true),
        "n" | "no" | "false" | "0" => Some(false),
        _ => None,
    }
}
