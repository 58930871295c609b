//! Install/update state machine.
//!
//! Each command walks a fixed sequence of [`DeploymentState`]s. A failing
//! step ends the command in `Failed` without undoing earlier steps; nothing
//! is written before the license check on install passes.

use std::{fmt, path::Path};

use tracing::{debug, error, info};
use url::Url;

use crate::{
    certificates::{AcmeIssuer, CertificateLayout, CertificateProvisioner},
    cli::{
        InstallRequest, PrintEnvRequest, Prompter, SetupCommand, TlsRequest,
        UpdateRequest,
    },
    constants::{
        DB_NAMESPACE, GLOBAL_NAMESPACE, KEY_POSTGRES_PASSWORD, KEY_TLS_ORIGIN,
        KEY_VAULT_URI, MIN_SECRET_LEN, SETUP_NAMESPACE,
    },
    env_writer::{env_file_path, read_env_value},
    error::{SetupError, SetupResult},
    license::{InstallationAuthority, LicenseOutcome},
    migrate::{
        ConnectionInfo, MigrationEngine, MigrationRun, MigrationTarget,
        RunOutcome, ScriptBundle,
    },
    models::{
        DeploymentTarget, GeneratedSecrets, InstallationIdentity,
        InstallationKey, TlsOrigin, parse_installation_id,
    },
    render,
    secrets::SecretGenerator,
    settings::SetupSettings,
};

const MAX_ID_ATTEMPTS: usize = 3;

/// Step a command is in; `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentState {
    /// No command started yet.
    Idle,
    /// Prompting for and checking the installation id.
    ValidatingLicense,
    /// Choosing TLS material and writing certificates.
    ProvisioningCert,
    /// Writing the rendered configuration files.
    RenderingConfig,
    /// Applying bundled schema scripts.
    Migrating,
    /// Reading persisted settings for `printenv`; never writes.
    ReadingEnvironment,
    /// Command finished.
    Done,
    /// Command stopped at the state recorded in [`ExitOutcome::Failed`].
    Failed,
}

impl DeploymentState {
    /// `Done` or `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, DeploymentState::Done | DeploymentState::Failed)
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What a successful command accomplished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Install finished; the deployment is reached at `url`.
    Installed { url: String },
    /// Configuration re-rendered for `url`.
    ConfigRebuilt { url: String },
    /// Scripts committed by this run, in order.
    Migrated { applied: Vec<String> },
    /// Every bundled script was already journaled.
    NothingToMigrate,
    /// `printenv` showed `url`.
    EnvironmentPrinted { url: String },
    /// No verb was given.
    NoCommand,
}

/// Result of [`Orchestrator::run`].
#[derive(Debug)]
pub enum ExitOutcome {
    /// The command completed.
    Done(Completion),
    /// The command stopped.
    Failed {
        /// Last state entered before the failure.
        at: DeploymentState,
        /// What went wrong.
        cause: SetupError,
    },
}

impl ExitOutcome {
    /// Process exit status: 0 on success, 1 on failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            ExitOutcome::Done(_) => 0,
            ExitOutcome::Failed { .. } => 1,
        }
    }
}

/// Builds a migration target for the recovered connection settings.
pub type Connector =
    Box<dyn Fn(ConnectionInfo) -> Box<dyn MigrationTarget> + Send + Sync>;

/// External systems the orchestrator talks to.
pub struct Collaborators {
    /// Asks the operator during install.
    pub prompter: Box<dyn Prompter>,
    /// Validates the installation id.
    pub authority: Box<dyn InstallationAuthority>,
    /// Issues automated certificates.
    pub acme: Box<dyn AcmeIssuer>,
    /// Opens the database for `update -db`.
    pub connector: Connector,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Runs one [`SetupCommand`] at a time and records each state entered.
pub struct Orchestrator {
    settings: SetupSettings,
    prompter: Box<dyn Prompter>,
    authority: Box<dyn InstallationAuthority>,
    provisioner: CertificateProvisioner,
    connector: Connector,
    state: DeploymentState,
    trail: Vec<DeploymentState>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("settings", &self.settings)
            .field("state", &self.state)
            .field("trail", &self.trail)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Start in `Idle`.
    pub fn new(settings: SetupSettings, collaborators: Collaborators) -> Self {
        let Collaborators {
            prompter,
            authority,
            acme,
            connector,
        } = collaborators;
        let provisioner =
            CertificateProvisioner::new(settings.output_dir.clone(), acme);
        Self {
            settings,
            prompter,
            authority,
            provisioner,
            connector,
            state: DeploymentState::Idle,
            trail: vec![DeploymentState::Idle],
        }
    }

    /// Current state.
    pub fn state(&self) -> DeploymentState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn transitions(&self) -> &[DeploymentState] {
        &self.trail
    }

    /// Run `command` to a terminal state.
    pub async fn run(&mut self, command: SetupCommand) -> ExitOutcome {
        let result = match command {
            SetupCommand::Install(req) => self.install(req).await,
            SetupCommand::Update(req) => self.update(req).await,
            SetupCommand::PrintEnvironment(req) => self.print_environment(req),
            SetupCommand::NoOp => Ok(Completion::NoCommand),
        };

        match result {
            Ok(completion) => {
                self.enter(DeploymentState::Done);
                ExitOutcome::Done(completion)
            }
            Err(cause) => {
                let at = self.state;
                error!(state = %at, error = %cause, "setup failed");
                self.enter(DeploymentState::Failed);
                ExitOutcome::Failed { at, cause }
            }
        }
    }

    fn enter(&mut self, next: DeploymentState) {
        info!(from = %self.state, to = %next, "state transition");
        self.state = next;
        self.trail.push(next);
    }

    async fn install(&mut self, req: InstallRequest) -> SetupResult<Completion> {
        self.enter(DeploymentState::ValidatingLicense);
        let identity = self.prompt_identity()?;
        match self.authority.validate(&identity).await {
            LicenseOutcome::Valid => {
                info!(installation_id = %identity.id, "installation id validated");
            }
            rejected => return Err(SetupError::License(rejected)),
        }

        self.enter(DeploymentState::ProvisioningCert);
        let tls = match self.requested_tls(req.tls)? {
            Some(requested) => Some(
                self.provisioner
                    .provision(&req.domain, requested)
                    .await?
                    .origin,
            ),
            None => None,
        };
        let mut generator = SecretGenerator::from_env();
        let secrets = GeneratedSecrets {
            database_password: generator.generate(MIN_SECRET_LEN),
            identity_cert_password: generator.generate(MIN_SECRET_LEN),
        };
        self.provisioner
            .identity_certificate(&secrets.identity_cert_password)
            .await?;

        self.enter(DeploymentState::RenderingConfig);
        let target = DeploymentTarget {
            domain: req.domain,
            tls,
            output_dir: self.settings.output_dir.clone(),
        };
        render::render_install(&target, &identity, &secrets)?;

        let url = target.url();
        println!("Installation complete. Your instance will be available at {url}");
        Ok(Completion::Installed { url })
    }

    fn prompt_identity(&mut self) -> SetupResult<InstallationIdentity> {
        let mut id = None;
        for attempt in 1..=MAX_ID_ATTEMPTS {
            let raw = self.prompter.text(
                "Enter your installation id (get one at https://keel.example/host)",
            )?;
            match parse_installation_id(&raw) {
                Some(parsed) => {
                    id = Some(parsed);
                    break;
                }
                None => {
                    debug!(attempt, "malformed installation id");
                    println!("Invalid installation id.");
                }
            }
        }
        let id = id.ok_or_else(|| {
            SetupError::UserInput("Invalid installation id.".to_string())
        })?;

        let key = InstallationKey::new(
            self.prompter.secret("Enter your installation key")?,
        );
        if key.expose().is_empty() {
            return Err(SetupError::UserInput(
                "An installation key is required.".to_string(),
            ));
        }
        Ok(InstallationIdentity { id, key })
    }

    fn requested_tls(
        &mut self,
        tls: TlsRequest,
    ) -> SetupResult<Option<TlsOrigin>> {
        if tls.automated_ca {
            return Ok(Some(TlsOrigin::AutomatedCa));
        }
        if tls.self_signed {
            return Ok(Some(TlsOrigin::SelfSigned));
        }
        let has_cert = self
            .prompter
            .confirm("Do you have a SSL certificate to use?", false)?;
        Ok(has_cert.then_some(TlsOrigin::UserProvided))
    }

    async fn update(&mut self, req: UpdateRequest) -> SetupResult<Completion> {
        if req.database {
            self.enter(DeploymentState::Migrating);
            self.migrate().await
        } else {
            self.enter(DeploymentState::RenderingConfig);
            let target = self.persisted_target()?;
            render::render_rebuild(&target)?;
            let url = target.url();
            println!("Configuration rebuilt for {url}");
            Ok(Completion::ConfigRebuilt { url })
        }
    }

    async fn migrate(&mut self) -> SetupResult<Completion> {
        let out = self.settings.output_dir.clone();
        let password = require_setting(&out, DB_NAMESPACE, KEY_POSTGRES_PASSWORD)?;
        let info = ConnectionInfo::admin(
            self.settings.db_host.clone(),
            self.settings.db_port,
            password,
        );
        debug!(?info, "connecting for migration");

        let engine = MigrationEngine::new(
            ScriptBundle::bundled()?,
            self.settings.migration_timeout,
        );
        let mut target = (self.connector)(info);
        let MigrationRun {
            applied, outcome, ..
        } = engine.migrate(target.as_mut()).await;

        match outcome {
            RunOutcome::Success if applied.is_empty() => {
                println!("Database is up to date.");
                Ok(Completion::NothingToMigrate)
            }
            RunOutcome::Success => {
                println!(
                    "Migration successful. Applied {} script(s).",
                    applied.len()
                );
                Ok(Completion::Migrated { applied })
            }
            RunOutcome::Failure {
                script: Some(script),
                error,
            } => {
                if !applied.is_empty() {
                    println!(
                        "Applied before the failure: {}",
                        applied.join(", ")
                    );
                }
                Err(SetupError::MigrationHalted {
                    script,
                    applied,
                    source: error,
                })
            }
            RunOutcome::Failure {
                script: None,
                error,
            } => Err(error.into()),
        }
    }

    /// Recover the target from `global.env` without touching the network.
    fn persisted_target(&self) -> SetupResult<DeploymentTarget> {
        let out = &self.settings.output_dir;
        let raw = require_setting(out, GLOBAL_NAMESPACE, KEY_VAULT_URI)?;
        let bad_url = |message: String| SetupError::ConfigurationRead {
            path: env_file_path(out, GLOBAL_NAMESPACE),
            message,
        };
        let url = Url::parse(raw.trim()).map_err(|err| {
            bad_url(format!("{KEY_VAULT_URI}='{raw}' is not a URL: {err}"))
        })?;
        let domain = url
            .host_str()
            .ok_or_else(|| {
                bad_url(format!("{KEY_VAULT_URI}='{raw}' has no host"))
            })?
            .to_string();

        let tls = (url.scheme() == "https")
            .then(|| persisted_origin(out, &domain));
        Ok(DeploymentTarget {
            domain,
            tls,
            output_dir: out.clone(),
        })
    }

    fn print_environment(
        &mut self,
        req: PrintEnvRequest,
    ) -> SetupResult<Completion> {
        self.enter(DeploymentState::ReadingEnvironment);
        let out = &self.settings.output_dir;
        let url = require_setting(out, GLOBAL_NAMESPACE, KEY_VAULT_URI)?;
        println!();
        println!("Keel is up and running!");
        println!("===================================================");
        println!();
        println!("visit {url}");
        println!("to update, run {}", req.host.update_hint());
        println!();
        Ok(Completion::EnvironmentPrinted { url })
    }
}

/// Origin recorded at install, else inferred from the certificate files.
fn persisted_origin(out: &Path, domain: &str) -> TlsOrigin {
    let recorded = read_env_value(out, SETUP_NAMESPACE, KEY_TLS_ORIGIN)
        .unwrap_or_else(|err| {
            debug!(error = %err, "setup.env unreadable; inferring TLS origin");
            None
        })
        .and_then(|raw| raw.parse::<TlsOrigin>().ok());
    if let Some(origin) = recorded {
        return origin;
    }
    [TlsOrigin::AutomatedCa, TlsOrigin::SelfSigned]
        .into_iter()
        .find(|origin| {
            CertificateLayout::for_origin(*origin, domain).is_present(out)
        })
        .unwrap_or(TlsOrigin::UserProvided)
}

fn require_setting(
    out: &Path,
    namespace: &str,
    key: &str,
) -> SetupResult<String> {
    let path = env_file_path(out, namespace);
    let value = read_env_value(out, namespace, key).map_err(|err| {
        SetupError::ConfigurationRead {
            path: path.clone(),
            message: err.to_string(),
        }
    })?;
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| SetupError::ConfigurationRead {
            path,
            message: format!("{key} is not set; run install first"),
        })
}
