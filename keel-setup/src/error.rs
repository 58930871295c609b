//! Error taxonomy of a setup command.

use std::path::PathBuf;

use thiserror::Error;

use crate::{license::LicenseOutcome, migrate::MigrationError};

/// Result of a setup step.
pub type SetupResult<T> = Result<T, SetupError>;

/// Failure of a single setup command, reported to the operator.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Malformed operator input (bad installation id, flag without value).
    #[error("{0}")]
    UserInput(String),

    /// The license authority did not confirm the installation.
    #[error("{}", license_message(.0))]
    License(LicenseOutcome),

    /// Certificate material could not be generated or written.
    #[error("certificate provisioning failed: {message}")]
    Provisioning {
        message: String,
        #[source]
        source: anyhow::Error,
    },

    /// Rendering an artifact to disk failed.
    #[error("failed to write {path}")]
    Render {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Persisted settings are missing or unusable.
    #[error("{message} (looked in {path})")]
    ConfigurationRead { path: PathBuf, message: String },

    /// Migration setup failed before any script ran.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// A script failed after the run started applying; `applied` stays
    /// committed and is skipped next time.
    #[error("{}", halted_message(.script, .applied))]
    MigrationHalted {
        /// Script that failed.
        script: String,
        /// Scripts this run committed before `script`.
        applied: Vec<String>,
        #[source]
        source: MigrationError,
    },

    /// The terminal prompt could not be shown or read.
    #[error(transparent)]
    Prompt(#[from] dialoguer::Error),
}

impl SetupError {
    /// Wrap a certificate failure with an operator-facing message.
    pub fn provisioning(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        SetupError::Provisioning {
            message: message.into(),
            source: source.into(),
        }
    }
}

fn halted_message(script: &str, applied: &[String]) -> String {
    if applied.is_empty() {
        format!("migration halted at `{script}`; nothing was applied")
    } else {
        format!(
            "migration halted at `{script}` after applying {}",
            applied.join(", ")
        )
    }
}

fn license_message(outcome: &LicenseOutcome) -> &'static str {
    match outcome {
        LicenseOutcome::Valid => "installation id is valid",
        LicenseOutcome::NotFound => "Invalid installation id.",
        LicenseOutcome::Disabled => "Installation id has been disabled.",
        LicenseOutcome::Unreachable => {
            "Unable to validate installation id. Problem contacting the Keel license server."
        }
    }
}
