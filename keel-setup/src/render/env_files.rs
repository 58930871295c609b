//! Key/value contents of the `global`, `db`, and `setup` env namespaces.

use url::Url;

use crate::{
    constants::{
        DB_ADMIN_USER, DB_DEFAULT_PORT, DB_NAME, DB_SERVICE_HOST,
        KEY_API_URI, KEY_ATTACHMENT_DIR, KEY_ATTACHMENT_URL,
        KEY_CONNECTION_STRING, KEY_IDENTITY_CERT_PASSWORD, KEY_IDENTITY_URI,
        KEY_INSTALLATION_ID, KEY_INSTALLATION_KEY, KEY_POSTGRES_PASSWORD,
        KEY_POSTGRES_USER, KEY_TLS_ORIGIN, KEY_VAULT_URI,
    },
    models::{DeploymentTarget, GeneratedSecrets, InstallationIdentity, TlsOrigin},
};

/// Attachment directory as mounted inside the api container.
pub const ATTACHMENT_DIR: &str = "/etc/keel/core/attachments";

/// Written to `setup.env` when the deployment serves plain HTTP.
pub const NO_TLS: &str = "none";

/// Settings every service container reads.
pub fn global_env(
    target: &DeploymentTarget,
    identity: &InstallationIdentity,
    secrets: &GeneratedSecrets,
) -> Vec<(String, String)> {
    let url = target.url();
    let mut kv: Vec<(String, String)> = Vec::new();
    let mut push = |key: &str, value: String| {
        kv.push((key.to_string(), value));
    };

    push(KEY_VAULT_URI, url.clone());
    push(KEY_API_URI, format!("{url}/api"));
    push(KEY_IDENTITY_URI, format!("{url}/identity"));
    push(
        KEY_CONNECTION_STRING,
        connection_string(
            DB_SERVICE_HOST,
            DB_DEFAULT_PORT,
            &secrets.database_password,
        ),
    );
    push(
        KEY_IDENTITY_CERT_PASSWORD,
        secrets.identity_cert_password.clone(),
    );
    push(KEY_INSTALLATION_ID, identity.id.to_string());
    push(KEY_INSTALLATION_KEY, identity.key.expose().to_string());
    push(KEY_ATTACHMENT_DIR, ATTACHMENT_DIR.to_string());
    push(KEY_ATTACHMENT_URL, format!("{url}/attachments"));
    kv
}

/// Credentials the database container initializes with.
pub fn db_env(secrets: &GeneratedSecrets) -> Vec<(String, String)> {
    vec![
        (KEY_POSTGRES_USER.to_string(), DB_ADMIN_USER.to_string()),
        (
            KEY_POSTGRES_PASSWORD.to_string(),
            secrets.database_password.clone(),
        ),
    ]
}

/// State read back by `update`.
pub fn setup_env(tls: Option<TlsOrigin>) -> Vec<(String, String)> {
    let origin = tls.map(TlsOrigin::as_str).unwrap_or(NO_TLS);
    vec![(KEY_TLS_ORIGIN.to_string(), origin.to_string())]
}

/// Connection string the services use to reach the application database.
pub fn connection_string(host: &str, port: u16, password: &str) -> String {
    build_postgres_url(host, port, DB_ADMIN_USER, password, DB_NAME)
        .unwrap_or_else(|| {
            format!("postgresql://{DB_ADMIN_USER}@{host}:{port}/{DB_NAME}")
        })
}

fn build_postgres_url(
    host: &str,
    port: u16,
    user: &str,
    password: &str,
    database: &str,
) -> Option<String> {
    let mut url =
        Url::parse(&format!("postgresql://{host}:{port}/{database}")).ok()?;
    url.set_username(user).ok()?;
    url.set_password(Some(password)).ok()?;
    Some(url.to_string())
}
