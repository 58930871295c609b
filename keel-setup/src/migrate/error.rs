use std::time::Duration;

use thiserror::Error;

/// Failure of a migration run or of one script.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Two bundled scripts share a name.
    #[error("duplicate migration script name `{0}`")]
    DuplicateScript(String),

    /// The target database could not be reached.
    #[error("cannot connect to database `{database}`")]
    Connect {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    /// Checking for or creating the target database failed.
    #[error("cannot create database `{database}`")]
    CreateDatabase {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    /// Creating or inspecting the journal table failed.
    #[error("cannot create the migration journal")]
    JournalSetup(#[source] sqlx::Error),

    /// A journal table exists without the columns this tool writes.
    #[error(
        "migration journal exists but lacks column(s): {}",
        .missing.join(", ")
    )]
    IncompatibleJournal { missing: Vec<String> },

    /// Listing journaled scripts failed.
    #[error("cannot read the migration journal")]
    JournalRead(#[source] sqlx::Error),

    /// The script or its journal insert failed; the transaction rolled back.
    #[error("migration script `{script}` failed")]
    ScriptFailed {
        script: String,
        #[source]
        source: sqlx::Error,
    },

    /// Server statement timeout or client deadline; rolled back.
    #[error(
        "migration script `{script}` did not finish within {}",
        humantime::format_duration(*.after)
    )]
    Timeout { script: String, after: Duration },

    /// Another run journaled this script first.
    #[error("migration script `{script}` is already recorded in the journal")]
    AlreadyRecorded { script: String },
}
