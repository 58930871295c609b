//! Deployment bootstrapper for Keel.
//!
//! This crate owns the install/update state machine, the schema migration
//! engine with its journal, TLS provisioning, license validation, and the
//! rendering of per-service configuration under the deployment's output
//! directory. The `keel-setup` binary is a thin wrapper that parses
//! parameters, installs logging, and runs the [`orchestrator::Orchestrator`].

pub mod certificates;
pub mod cli;
pub mod constants;
pub mod env_writer;
pub mod error;
pub mod license;
pub mod migrate;
pub mod models;
pub mod orchestrator;
pub mod render;
pub mod secrets;
pub mod settings;

pub use error::{SetupError, SetupResult};
pub use migrate::{
    MigrationEngine, MigrationError, MigrationRun, MigrationScript,
    RunOutcome, ScriptBundle,
};
pub use models::{
    DeploymentTarget, InstallationIdentity, InstallationKey, TlsOrigin,
};
pub use orchestrator::{
    Collaborators, Completion, DeploymentState, ExitOutcome, Orchestrator,
};
pub use settings::SetupSettings;
