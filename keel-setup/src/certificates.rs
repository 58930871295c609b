//! TLS certificate strategy selection and material generation.
//!
//! Three origins are supported. Automated issuance goes through an
//! [`AcmeIssuer`]; when its prerequisites are missing or issuance fails the
//! provisioner falls back to a self-signed certificate instead of failing the
//! install. Callers must use [`ProvisionedCertificate::origin`], not the
//! origin they asked for.

use std::{
    net::IpAddr,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::Datelike;
use rcgen::{Certificate, CertificateParams, DistinguishedName, DnType};
use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

use crate::{
    constants::IDENTITY_CERT_SUBJECT,
    env_writer::write_atomically,
    error::{SetupError, SetupResult},
    models::TlsOrigin,
};

/// Why automated issuance is not possible right now.
#[derive(Debug, Error)]
pub enum AcmeUnavailable {
    /// The issuing binary is not installed.
    #[error("`{0}` was not found on PATH")]
    ToolMissing(String),
    /// ACME validation could not reach this host.
    #[error("{0} does not resolve to a public address")]
    NotPublic(String),
    /// The authority or the client rejected the request.
    #[error("certificate issuance failed: {0}")]
    IssuanceFailed(String),
    /// Running the client failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Client for a public ACME authority.
#[async_trait]
pub trait AcmeIssuer: Send + Sync {
    /// Check tooling and reachability before attempting issuance.
    async fn preflight(&self, domain: &str) -> Result<(), AcmeUnavailable>;

    /// Obtain a certificate into the layout of [`TlsOrigin::AutomatedCa`].
    async fn issue(
        &self,
        domain: &str,
        output_dir: &Path,
    ) -> Result<(), AcmeUnavailable>;
}

/// Issues certificates with the `certbot` CLI in standalone mode.
#[derive(Debug, Clone)]
pub struct CertbotIssuer {
    program: String,
    email: Option<String>,
}

impl CertbotIssuer {
    /// Register with `email`, or without one when `None`.
    pub fn new(email: Option<String>) -> Self {
        Self {
            program: "certbot".to_string(),
            email,
        }
    }
}

#[async_trait]
impl AcmeIssuer for CertbotIssuer {
    async fn preflight(&self, domain: &str) -> Result<(), AcmeUnavailable> {
        which::which(&self.program)
            .map_err(|_| AcmeUnavailable::ToolMissing(self.program.clone()))?;

        let resolved = match tokio::net::lookup_host((domain, 80)).await {
            Ok(addrs) => addrs.map(|a| a.ip()).collect::<Vec<_>>(),
            Err(_) => Vec::new(),
        };
        if !resolved.iter().any(|ip| is_public(*ip)) {
            return Err(AcmeUnavailable::NotPublic(domain.to_string()));
        }
        Ok(())
    }

    async fn issue(
        &self,
        domain: &str,
        output_dir: &Path,
    ) -> Result<(), AcmeUnavailable> {
        let root = output_dir.join("letsencrypt");
        let mut cmd = Command::new(&self.program);
        cmd.arg("certonly")
            .args(["--standalone", "--non-interactive", "--agree-tos"])
            .args(["--preferred-challenges", "http"])
            .arg("--config-dir")
            .arg(&root)
            .arg("--work-dir")
            .arg(root.join("work"))
            .arg("--logs-dir")
            .arg(root.join("logs"))
            .args(["-d", domain]);
        match &self.email {
            Some(email) => cmd.args(["--email", email.as_str()]),
            None => cmd.arg("--register-unsafely-without-email"),
        };

        let output = cmd.output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AcmeUnavailable::IssuanceFailed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let layout = CertificateLayout::for_origin(TlsOrigin::AutomatedCa, domain);
        if !layout.is_present(output_dir) {
            return Err(AcmeUnavailable::IssuanceFailed(format!(
                "{} reported success but {} is missing",
                self.program,
                layout.certificate.display()
            )));
        }
        Ok(())
    }
}

fn is_public(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation())
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            !(v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80)
        }
    }
}

/// File locations of a certificate, relative to the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateLayout {
    /// Leaf certificate (full chain for ACME).
    pub certificate: PathBuf,
    /// Unencrypted PEM private key.
    pub private_key: PathBuf,
    /// Issuer chain, when the origin has one.
    pub chain: Option<PathBuf>,
}

impl CertificateLayout {
    /// Where `origin` keeps the files for `domain`.
    pub fn for_origin(origin: TlsOrigin, domain: &str) -> Self {
        match origin {
            TlsOrigin::SelfSigned => {
                let dir = Path::new("ssl").join("self").join(domain);
                Self {
                    certificate: dir.join("certificate.crt"),
                    private_key: dir.join("private.key"),
                    chain: None,
                }
            }
            TlsOrigin::UserProvided => {
                let dir = Path::new("ssl").join(domain);
                Self {
                    certificate: dir.join("certificate.crt"),
                    private_key: dir.join("private.key"),
                    chain: Some(dir.join("ca.crt")),
                }
            }
            TlsOrigin::AutomatedCa => {
                let dir = Path::new("letsencrypt").join("live").join(domain);
                Self {
                    certificate: dir.join("fullchain.pem"),
                    private_key: dir.join("privkey.pem"),
                    chain: Some(dir.join("chain.pem")),
                }
            }
        }
    }

    /// Certificate and key both exist under `output_dir`.
    pub fn is_present(&self, output_dir: &Path) -> bool {
        output_dir.join(&self.certificate).is_file()
            && output_dir.join(&self.private_key).is_file()
    }

    /// Path as seen inside the proxy container (output dir mounted at `/etc`).
    pub fn container_path(relative: &Path) -> String {
        format!("/etc/{}", relative.display())
    }
}

/// Result of provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedCertificate {
    /// Origin actually served, after any downgrade.
    pub origin: TlsOrigin,
    /// Paths of the served certificate.
    pub layout: CertificateLayout,
    /// Whether the files were on disk when provisioning finished.
    pub present: bool,
}

/// Decides and produces the certificate served for a domain.
pub struct CertificateProvisioner {
    output_dir: PathBuf,
    acme: Box<dyn AcmeIssuer>,
}

impl std::fmt::Debug for CertificateProvisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateProvisioner")
            .field("output_dir", &self.output_dir)
            .finish_non_exhaustive()
    }
}

impl CertificateProvisioner {
    /// Write under `output_dir`, issuing through `acme` when asked.
    pub fn new(output_dir: impl Into<PathBuf>, acme: Box<dyn AcmeIssuer>) -> Self {
        Self {
            output_dir: output_dir.into(),
            acme,
        }
    }

    /// Produce or locate the certificate for `domain`.
    pub async fn provision(
        &self,
        domain: &str,
        requested: TlsOrigin,
    ) -> SetupResult<ProvisionedCertificate> {
        match requested {
            TlsOrigin::AutomatedCa => match self.try_automated(domain).await {
                Ok(cert) => Ok(cert),
                Err(reason) => {
                    info!(
                        %domain,
                        %reason,
                        "automated certificate unavailable; falling back to self-signed"
                    );
                    println!(
                        "Could not obtain a certificate automatically ({reason}); generating a self-signed certificate instead."
                    );
                    self.self_signed(domain)
                }
            },
            TlsOrigin::SelfSigned => self.self_signed(domain),
            TlsOrigin::UserProvided => Ok(self.user_provided(domain)),
        }
    }

    async fn try_automated(
        &self,
        domain: &str,
    ) -> Result<ProvisionedCertificate, AcmeUnavailable> {
        self.acme.preflight(domain).await?;
        self.acme.issue(domain, &self.output_dir).await?;
        let layout = CertificateLayout::for_origin(TlsOrigin::AutomatedCa, domain);
        Ok(ProvisionedCertificate {
            origin: TlsOrigin::AutomatedCa,
            present: layout.is_present(&self.output_dir),
            layout,
        })
    }

    fn self_signed(&self, domain: &str) -> SetupResult<ProvisionedCertificate> {
        println!("Generating self signed SSL certificate.");
        let layout = CertificateLayout::for_origin(TlsOrigin::SelfSigned, domain);

        let cert = rcgen::generate_simple_self_signed(vec![domain.to_string()])
            .map_err(|err| {
                SetupError::provisioning(
                    format!("cannot build self-signed certificate for {domain}"),
                    err,
                )
            })?;
        let cert_pem = cert.serialize_pem().map_err(|err| {
            SetupError::provisioning("cannot encode self-signed certificate", err)
        })?;
        let key_pem = cert.serialize_private_key_pem();

        self.write(&layout.certificate, cert_pem.as_bytes())?;
        self.write(&layout.private_key, key_pem.as_bytes())?;

        Ok(ProvisionedCertificate {
            origin: TlsOrigin::SelfSigned,
            present: true,
            layout,
        })
    }

    fn user_provided(&self, domain: &str) -> ProvisionedCertificate {
        let layout =
            CertificateLayout::for_origin(TlsOrigin::UserProvided, domain);
        let present = layout.is_present(&self.output_dir);
        if !present {
            warn!(
                certificate = %layout.certificate.display(),
                "user-provided certificate not found yet"
            );
        }
        println!(
            "Make sure 'certificate.crt' and 'private.key' are provided in {} before starting the services.",
            self.output_dir
                .join(layout.certificate.parent().unwrap_or(Path::new("ssl")))
                .display()
        );
        ProvisionedCertificate {
            origin: TlsOrigin::UserProvided,
            layout,
            present,
        }
    }

    /// Generate the identity server signing certificate.
    ///
    /// Writes `identity/identity.{crt,key}` and, when `openssl` is on `PATH`,
    /// bundles them into `identity/identity.pfx` protected by `password`.
    pub async fn identity_certificate(&self, password: &str) -> SetupResult<()> {
        println!("Generating key for IdentityServer.");

        let mut params = CertificateParams::new(Vec::<String>::new());
        let mut name = DistinguishedName::new();
        name.push(DnType::CommonName, IDENTITY_CERT_SUBJECT);
        params.distinguished_name = name;
        let now = chrono::Utc::now();
        params.not_before =
            rcgen::date_time_ymd(now.year(), now.month() as u8, now.day() as u8);
        params.not_after =
            rcgen::date_time_ymd(now.year() + 30, now.month() as u8, 1);

        let cert = Certificate::from_params(params).map_err(|err| {
            SetupError::provisioning("cannot build identity certificate", err)
        })?;
        let cert_pem = cert.serialize_pem().map_err(|err| {
            SetupError::provisioning("cannot encode identity certificate", err)
        })?;
        let key_pem = cert.serialize_private_key_pem();

        let crt = Path::new("identity").join("identity.crt");
        let key = Path::new("identity").join("identity.key");
        let pfx = Path::new("identity").join("identity.pfx");
        self.write(&crt, cert_pem.as_bytes())?;
        self.write(&key, key_pem.as_bytes())?;

        let Ok(openssl) = which::which("openssl") else {
            warn!("openssl not found; identity.pfx was not created");
            return Ok(());
        };

        let status = Command::new(openssl)
            .args(["pkcs12", "-export", "-out"])
            .arg(self.output_dir.join(&pfx))
            .arg("-inkey")
            .arg(self.output_dir.join(&key))
            .arg("-in")
            .arg(self.output_dir.join(&crt))
            .args(["-passout", "env:KEEL_IDENTITY_PFX_PASSWORD"])
            .env("KEEL_IDENTITY_PFX_PASSWORD", password)
            .status()
            .await
            .map_err(|err| {
                SetupError::provisioning("failed to run openssl", err)
            })?;
        if !status.success() {
            return Err(SetupError::provisioning(
                "openssl could not export identity.pfx",
                anyhow::anyhow!("openssl exited with {status}"),
            ));
        }
        Ok(())
    }

    fn write(&self, relative: &Path, contents: &[u8]) -> SetupResult<()> {
        let path = self.output_dir.join(relative);
        write_atomically(&path, contents)
            .map_err(|source| SetupError::Render { path, source })
    }
}
