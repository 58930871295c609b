use std::{collections::HashSet, time::Duration};

use tracing::{debug, info, warn};

use super::{MigrationError, MigrationTarget, ScriptBundle};

/// How a migration run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Every pending script committed.
    Success,
    /// The run halted.
    Failure {
        /// Failing script; `None` when setup failed before any script ran.
        script: Option<String>,
        /// Cause of the halt.
        error: MigrationError,
    },
}

/// What a single [`MigrationEngine::migrate`] call did.
#[derive(Debug)]
pub struct MigrationRun {
    /// Scripts that were not journaled when the run started, in order.
    pub pending: Vec<String>,
    /// Scripts committed by this run, in order.
    pub applied: Vec<String>,
    /// How the run ended.
    pub outcome: RunOutcome,
}

impl MigrationRun {
    /// Every pending script committed.
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Success)
    }

    /// Successful and nothing was pending.
    pub fn is_noop(&self) -> bool {
        self.is_success() && self.pending.is_empty()
    }

    fn aborted(error: MigrationError) -> Self {
        Self {
            pending: Vec::new(),
            applied: Vec::new(),
            outcome: RunOutcome::Failure {
                script: None,
                error,
            },
        }
    }
}

/// Applies a [`ScriptBundle`] to a [`MigrationTarget`].
#[derive(Debug, Clone)]
pub struct MigrationEngine {
    bundle: ScriptBundle,
    script_timeout: Duration,
}

impl MigrationEngine {
    /// `script_timeout` bounds each script separately.
    pub fn new(bundle: ScriptBundle, script_timeout: Duration) -> Self {
        Self {
            bundle,
            script_timeout,
        }
    }

    /// Scripts this engine applies.
    pub fn bundle(&self) -> &ScriptBundle {
        &self.bundle
    }

    /// Bring `target` up to the latest bundled script.
    ///
    /// Stops at the first failing script; everything committed before it
    /// stays committed and is skipped on the next run.
    pub async fn migrate(&self, target: &mut dyn MigrationTarget) -> MigrationRun {
        info!("Migrating database.");
        let applied_before = match prepare(target).await {
            Ok(applied) => applied,
            Err(error) => {
                warn!(%error, "migration setup failed");
                return MigrationRun::aborted(error);
            }
        };

        let pending = self.bundle.pending(&applied_before);
        let mut run = MigrationRun {
            pending: pending.iter().map(|s| s.name().to_string()).collect(),
            applied: Vec::with_capacity(pending.len()),
            outcome: RunOutcome::Success,
        };
        if pending.is_empty() {
            info!("no pending migration scripts");
            return run;
        }
        info!(count = pending.len(), "applying migration scripts");

        for script in pending {
            debug!(
                script = script.name(),
                checksum = script.checksum(),
                "applying script"
            );
            match target.apply(script, self.script_timeout).await {
                Ok(()) => {
                    info!(script = script.name(), "applied");
                    run.applied.push(script.name().to_string());
                }
                Err(error) => {
                    warn!(script = script.name(), %error, "migration script failed");
                    run.outcome = RunOutcome::Failure {
                        script: Some(script.name().to_string()),
                        error,
                    };
                    return run;
                }
            }
        }

        info!(applied = run.applied.len(), "Migration successful.");
        run
    }
}

async fn prepare(
    target: &mut dyn MigrationTarget,
) -> Result<HashSet<String>, MigrationError> {
    target.ensure_database().await?;
    target.ensure_journal().await?;
    target.applied_scripts().await
}
