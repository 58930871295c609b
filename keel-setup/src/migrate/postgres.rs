//! PostgreSQL implementation of [`MigrationTarget`].

use std::{collections::HashSet, fmt, time::Duration};

use async_trait::async_trait;
use sqlx::{
    PgConnection, PgPool,
    postgres::{PgConnectOptions, PgPoolOptions},
};
use tracing::{debug, info};

use super::{MigrationError, MigrationScript, MigrationTarget};
use crate::constants::{
    DB_ADMIN_DATABASE, DB_ADMIN_USER, DB_NAME, JOURNAL_SCHEMA, JOURNAL_TABLE,
};

const DUPLICATE_DATABASE: &str = "42P04";
const DUPLICATE_TABLE: &str = "42P07";
const UNIQUE_VIOLATION: &str = "23505";
const QUERY_CANCELED: &str = "57014";

const REQUIRED_JOURNAL_COLUMNS: &[&str] = &["script_name", "applied_at"];

/// Where and as whom to connect.
#[derive(Clone)]
pub struct ConnectionInfo {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Role to connect as.
    pub user: String,
    /// Password of `user`; never printed.
    pub password: String,
    /// Database holding the journal and the schema.
    pub database: String,
}

impl ConnectionInfo {
    /// Connect as the admin user to the application database.
    pub fn admin(
        host: impl Into<String>,
        port: u16,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: DB_ADMIN_USER.to_string(),
            password: password.into(),
            database: DB_NAME.to_string(),
        }
    }

    fn options(&self, database: &str) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(database)
            .application_name("keel-setup")
    }
}

impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

/// Live database reached through a single-connection pool.
pub struct PostgresTarget {
    info: ConnectionInfo,
    pool: Option<PgPool>,
}

impl fmt::Debug for PostgresTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostgresTarget")
            .field("info", &self.info)
            .field("connected", &self.pool.is_some())
            .finish()
    }
}

impl PostgresTarget {
    /// Nothing connects until the first operation.
    pub fn new(info: ConnectionInfo) -> Self {
        Self { info, pool: None }
    }

    async fn connect(
        &self,
        database: &str,
    ) -> Result<PgPool, MigrationError> {
        PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(self.info.options(database))
            .await
            .map_err(|source| MigrationError::Connect {
                database: database.to_string(),
                source,
            })
    }

    async fn pool(&mut self) -> Result<PgPool, MigrationError> {
        if let Some(pool) = &self.pool {
            return Ok(pool.clone());
        }
        let pool = self.connect(&self.info.database).await?;
        self.pool = Some(pool.clone());
        Ok(pool)
    }
}

fn journal_table() -> String {
    format!("{JOURNAL_SCHEMA}.{JOURNAL_TABLE}")
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned())
}

fn has_sqlstate(err: &sqlx::Error, codes: &[&str]) -> bool {
    sqlstate(err).is_some_and(|code| codes.contains(&code.as_str()))
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[async_trait]
impl MigrationTarget for PostgresTarget {
    async fn ensure_database(&mut self) -> Result<(), MigrationError> {
        let database = self.info.database.clone();
        let admin = self.connect(DB_ADMIN_DATABASE).await?;

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)",
        )
        .bind(&database)
        .fetch_one(&admin)
        .await
        .map_err(|source| MigrationError::CreateDatabase {
            database: database.clone(),
            source,
        })?;

        if !exists {
            info!(%database, "creating database");
            let create = format!("CREATE DATABASE {}", quote_ident(&database));
            match sqlx::query(&create).execute(&admin).await {
                Ok(_) => {}
                Err(err)
                    if has_sqlstate(
                        &err,
                        &[DUPLICATE_DATABASE, UNIQUE_VIOLATION],
                    ) =>
                {
                    debug!(%database, "database created concurrently");
                }
                Err(source) => {
                    admin.close().await;
                    return Err(MigrationError::CreateDatabase { database, source });
                }
            }
        }
        admin.close().await;
        Ok(())
    }

    async fn ensure_journal(&mut self) -> Result<(), MigrationError> {
        let pool = self.pool().await?;
        let create = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                script_name TEXT PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            journal_table()
        );
        match sqlx::query(&create).execute(&pool).await {
            Ok(_) => {}
            Err(err)
                if has_sqlstate(&err, &[DUPLICATE_TABLE, UNIQUE_VIOLATION]) =>
            {
                debug!("journal created concurrently");
            }
            Err(source) => return Err(MigrationError::JournalSetup(source)),
        }

        let columns: Vec<String> = sqlx::query_scalar(
            "SELECT column_name::text FROM information_schema.columns
             WHERE table_schema = $1 AND table_name = $2",
        )
        .bind(JOURNAL_SCHEMA)
        .bind(JOURNAL_TABLE)
        .fetch_all(&pool)
        .await
        .map_err(MigrationError::JournalSetup)?;

        let missing: Vec<String> = REQUIRED_JOURNAL_COLUMNS
            .iter()
            .filter(|required| !columns.iter().any(|c| c == *required))
            .map(|c| c.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(MigrationError::IncompatibleJournal { missing });
        }
        Ok(())
    }

    async fn applied_scripts(
        &mut self,
    ) -> Result<HashSet<String>, MigrationError> {
        let pool = self.pool().await?;
        let names: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT script_name FROM {}",
            journal_table()
        ))
        .fetch_all(&pool)
        .await
        .map_err(MigrationError::JournalRead)?;
        Ok(names.into_iter().collect())
    }

    async fn apply(
        &mut self,
        script: &MigrationScript,
        timeout: Duration,
    ) -> Result<(), MigrationError> {
        let pool = self.pool().await?;
        // Dropping the future on timeout drops the transaction, which rolls
        // it back when the connection returns to the pool.
        match tokio::time::timeout(timeout, apply_in_tx(&pool, script, timeout))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(MigrationError::Timeout {
                script: script.name().to_string(),
                after: timeout,
            }),
        }
    }
}

/// Run `script` and insert its journal row in one transaction.
async fn apply_in_tx(
    pool: &PgPool,
    script: &MigrationScript,
    timeout: Duration,
) -> Result<(), MigrationError> {
    let name = script.name();
    let mut tx = pool
        .begin()
        .await
        .map_err(|source| script_error(name, timeout, source))?;
    let conn: &mut PgConnection = &mut tx;

    let set_timeout = format!(
        "SET LOCAL statement_timeout = {}",
        statement_timeout_ms(timeout)
    );
    sqlx::query(&set_timeout)
        .execute(&mut *conn)
        .await
        .map_err(|source| script_error(name, timeout, source))?;

    sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(script.source()))
        .await
        .map_err(|source| script_error(name, timeout, source))?;

    let record = format!(
        "INSERT INTO {} (script_name) VALUES ($1)",
        journal_table()
    );
    sqlx::query(&record)
        .bind(name)
        .execute(&mut *conn)
        .await
        .map_err(|source| record_error(name, timeout, source))?;

    tx.commit()
        .await
        .map_err(|source| script_error(name, timeout, source))
}

/// `statement_timeout` is an `int4` of milliseconds; `0` would disable it.
fn statement_timeout_ms(timeout: Duration) -> u128 {
    timeout.as_millis().clamp(1, i32::MAX as u128)
}

/// A server-side cancel is the statement timeout firing.
fn script_error(
    script: &str,
    timeout: Duration,
    source: sqlx::Error,
) -> MigrationError {
    if has_sqlstate(&source, &[QUERY_CANCELED]) {
        MigrationError::Timeout {
            script: script.to_string(),
            after: timeout,
        }
    } else {
        MigrationError::ScriptFailed {
            script: script.to_string(),
            source,
        }
    }
}

/// A unique violation on the journal insert means another run got there
/// first.
fn record_error(
    script: &str,
    timeout: Duration,
    source: sqlx::Error,
) -> MigrationError {
    if has_sqlstate(&source, &[UNIQUE_VIOLATION]) {
        MigrationError::AlreadyRecorded {
            script: script.to_string(),
        }
    } else {
        script_error(script, timeout, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{borrow::Cow, error::Error as StdError};

    use sqlx::error::{DatabaseError, ErrorKind};

    #[derive(Debug)]
    struct ServerError(&'static str);

    impl fmt::Display for ServerError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "server error {}", self.0)
        }
    }

    impl StdError for ServerError {}

    impl DatabaseError for ServerError {
        fn message(&self) -> &str {
            "server error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.0))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(
            &mut self,
        ) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(
            self: Box<Self>,
        ) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn server_error(code: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(ServerError(code)))
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn query_canceled_maps_to_timeout() {
        let err = script_error("001", TIMEOUT, server_error(QUERY_CANCELED));
        assert!(matches!(
            err,
            MigrationError::Timeout { ref script, after }
                if script == "001" && after == TIMEOUT
        ));
    }

    #[test]
    fn other_failures_keep_their_source() {
        let err = script_error("001", TIMEOUT, server_error("42601"));
        assert!(matches!(err, MigrationError::ScriptFailed { .. }));
        let err = script_error("001", TIMEOUT, sqlx::Error::PoolTimedOut);
        assert!(matches!(err, MigrationError::ScriptFailed { .. }));
    }

    #[test]
    fn duplicate_journal_row_maps_to_already_recorded() {
        let err = record_error("002", TIMEOUT, server_error(UNIQUE_VIOLATION));
        assert!(matches!(
            err,
            MigrationError::AlreadyRecorded { ref script } if script == "002"
        ));
        let err = record_error("002", TIMEOUT, server_error(QUERY_CANCELED));
        assert!(matches!(err, MigrationError::Timeout { .. }));
        // Outside the journal insert a unique violation is a script bug.
        let err = script_error("002", TIMEOUT, server_error(UNIQUE_VIOLATION));
        assert!(matches!(err, MigrationError::ScriptFailed { .. }));
    }

    #[test]
    fn statement_timeout_fits_int4() {
        assert_eq!(statement_timeout_ms(Duration::from_secs(2)), 2000);
        assert_eq!(
            statement_timeout_ms(Duration::from_secs(30 * 24 * 3600)),
            i32::MAX as u128
        );
        assert_eq!(statement_timeout_ms(Duration::ZERO), 1);
    }

    #[test]
    fn connection_info_debug_redacts_password() {
        let info = ConnectionInfo::admin("db", 5432, "hunter2hunter2");
        let printed = format!("{info:?}");
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("vault"));
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("vault"), "\"vault\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
