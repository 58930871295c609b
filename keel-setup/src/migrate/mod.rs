//! Ordered, exactly-once application of bundled schema scripts.
//!
//! The journal table in the target database is the only record of what has
//! run. A script is applied and journaled inside one transaction, so a
//! script either commits along with its journal row or leaves no trace.

mod engine;
mod error;
pub mod postgres;
mod scripts;

use std::{collections::HashSet, time::Duration};

use async_trait::async_trait;

pub use engine::{MigrationEngine, MigrationRun, RunOutcome};
pub use error::MigrationError;
pub use postgres::{ConnectionInfo, PostgresTarget};
pub use scripts::{MigrationScript, ScriptBundle};

/// The database a [`MigrationEngine`] drives.
#[async_trait]
pub trait MigrationTarget: Send {
    /// Create the application database when it does not exist yet.
    async fn ensure_database(&mut self) -> Result<(), MigrationError>;

    /// Create the journal when missing and verify its required columns.
    async fn ensure_journal(&mut self) -> Result<(), MigrationError>;

    async fn applied_scripts(
        &mut self,
    ) -> Result<HashSet<String>, MigrationError>;

    /// Run `script` and record it in the journal as one unit.
    async fn apply(
        &mut self,
        script: &MigrationScript,
        timeout: Duration,
    ) -> Result<(), MigrationError>;
}
