//! Value types threaded through the install and update flows.

use std::{fmt, path::PathBuf, str::FromStr};

use uuid::Uuid;

/// Where the TLS certificate served by the reverse proxy comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TlsOrigin {
    /// Generated locally, not trusted by browsers.
    SelfSigned,
    /// Placed under `ssl/<domain>/` by the operator.
    UserProvided,
    /// Issued by a public ACME authority (Let's Encrypt).
    AutomatedCa,
}

impl TlsOrigin {
    /// Label persisted in `setup.env`.
    pub fn as_str(self) -> &'static str {
        match self {
            TlsOrigin::SelfSigned => "self-signed",
            TlsOrigin::UserProvided => "user-provided",
            TlsOrigin::AutomatedCa => "automated-ca",
        }
    }
}

impl fmt::Display for TlsOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TlsOrigin {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "self-signed" => Ok(TlsOrigin::SelfSigned),
            "user-provided" => Ok(TlsOrigin::UserProvided),
            "automated-ca" => Ok(TlsOrigin::AutomatedCa),
            other => Err(format!("unknown TLS origin '{other}'")),
        }
    }
}

/// Everything the renderers need to know about where the deployment lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentTarget {
    /// Host name or IPv4 address, lowercased.
    pub domain: String,
    /// `None` means plain HTTP.
    pub tls: Option<TlsOrigin>,
    /// Root every artifact is written under.
    pub output_dir: PathBuf,
}

impl DeploymentTarget {
    /// The proxy serves HTTPS.
    pub fn use_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// `https` or `http`.
    pub fn scheme(&self) -> &'static str {
        if self.use_tls() { "https" } else { "http" }
    }

    /// Externally reachable base URL, e.g. `https://vault.example.com`.
    pub fn url(&self) -> String {
        format!("{}://{}", self.scheme(), self.domain)
    }
}

/// Opaque installation key; never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct InstallationKey(String);

impl InstallationKey {
    /// Surrounding whitespace is dropped.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    /// Raw value, only for rendering the environment file.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for InstallationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InstallationKey(<redacted>)")
    }
}

impl fmt::Display for InstallationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}

/// Identity of this installation as registered with the license authority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationIdentity {
    /// Installation id.
    pub id: Uuid,
    /// Installation key.
    pub key: InstallationKey,
}

/// Parse an operator-entered installation id (case and whitespace ignored).
pub fn parse_installation_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw.trim().to_ascii_lowercase().as_str()).ok()
}

/// Secrets generated once per install.
#[derive(Clone)]
pub struct GeneratedSecrets {
    /// Password of the database superuser.
    pub database_password: String,
    /// Password protecting the identity certificate bundle.
    pub identity_cert_password: String,
}

impl fmt::Debug for GeneratedSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedSecrets")
            .field("database_password", &"<redacted>")
            .field("identity_cert_password", &"<redacted>")
            .finish()
    }
}
