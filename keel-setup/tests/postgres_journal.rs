//! Runs the bundled scripts against a real server.
//!
//! Requires `DATABASE_URL` pointing at a PostgreSQL instance whose user may
//! create databases. Run with `cargo test -- --ignored`.

use std::time::Duration;

use keel_setup::{
    MigrationEngine, MigrationError, MigrationScript, RunOutcome, ScriptBundle,
    migrate::{ConnectionInfo, PostgresTarget},
};
use url::Url;

fn connection(database: &str) -> ConnectionInfo {
    let raw = std::env::var("DATABASE_URL").expect("DATABASE_URL");
    let url = Url::parse(&raw).expect("DATABASE_URL is a URL");
    ConnectionInfo {
        host: url.host_str().unwrap_or("localhost").to_string(),
        port: url.port().unwrap_or(5432),
        user: url.username().to_string(),
        password: url.password().unwrap_or_default().to_string(),
        database: database.to_string(),
    }
}

fn scratch_name() -> String {
    format!("keel_setup_test_{}", uuid::Uuid::new_v4().simple())
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn bundled_scripts_apply_once() {
    let database = scratch_name();
    let engine = MigrationEngine::new(
        ScriptBundle::bundled().expect("bundle"),
        Duration::from_secs(60),
    );

    let mut target = PostgresTarget::new(connection(&database));
    let run = engine.migrate(&mut target).await;
    assert!(run.is_success(), "{:?}", run.outcome);
    assert_eq!(run.applied.len(), engine.bundle().len());

    let mut again = PostgresTarget::new(connection(&database));
    assert!(engine.migrate(&mut again).await.is_noop());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn failing_script_rolls_back_with_its_journal_row() {
    let database = scratch_name();
    let broken = MigrationEngine::new(
        ScriptBundle::new([
            MigrationScript::new("001_ok", "CREATE TABLE ok_table (id INT);"),
            MigrationScript::new(
                "002_broken",
                "CREATE TABLE half_done (id INT); SELECT * FROM missing_table;",
            ),
        ])
        .expect("bundle"),
        Duration::from_secs(60),
    );

    let mut target = PostgresTarget::new(connection(&database));
    let run = broken.migrate(&mut target).await;
    assert_eq!(run.applied, ["001_ok"]);
    assert!(matches!(
        run.outcome,
        RunOutcome::Failure {
            error: MigrationError::ScriptFailed { .. },
            ..
        }
    ));

    let fixed = MigrationEngine::new(
        ScriptBundle::new([
            MigrationScript::new("001_ok", "CREATE TABLE ok_table (id INT);"),
            MigrationScript::new("002_broken", "CREATE TABLE half_done (id INT);"),
        ])
        .expect("bundle"),
        Duration::from_secs(60),
    );
    let mut target = PostgresTarget::new(connection(&database));
    let rerun = fixed.migrate(&mut target).await;
    assert!(rerun.is_success(), "{:?}", rerun.outcome);
    assert_eq!(rerun.applied, ["002_broken"]);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn statement_timeout_is_reported_per_script() {
    let database = scratch_name();
    let engine = MigrationEngine::new(
        ScriptBundle::new([MigrationScript::new(
            "001_slow",
            "SELECT pg_sleep(5);",
        )])
        .expect("bundle"),
        Duration::from_millis(500),
    );
    let mut target = PostgresTarget::new(connection(&database));
    let run = engine.migrate(&mut target).await;
    assert!(matches!(
        run.outcome,
        RunOutcome::Failure {
            error: MigrationError::Timeout { .. },
            ..
        }
    ));
    assert!(run.applied.is_empty());
}
