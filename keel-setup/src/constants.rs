//! Fixed names shared by the renderers and the readers of persisted state.

/// Default output directory when `-out` is not supplied.
pub const DEFAULT_OUTPUT_DIR: &str = "/etc/keel";

/// Default domain when `-domain` is not supplied.
pub const DEFAULT_DOMAIN: &str = "localhost";

/// Default base URL of the installation authority.
pub const DEFAULT_LICENSE_API_URL: &str = "https://api.keel.example";

/// Minimum length of every generated secret.
pub const MIN_SECRET_LEN: usize = 32;

/// Env namespace holding externally reachable URLs and service settings.
pub const GLOBAL_NAMESPACE: &str = "global";
/// Env namespace holding database container credentials.
pub const DB_NAMESPACE: &str = "db";
/// Env namespace holding setup-only state read back on update.
pub const SETUP_NAMESPACE: &str = "setup";

/// Public base URL; update recovers domain and scheme from it.
pub const KEY_VAULT_URI: &str = "globalSettings__baseServiceUri__vault";
/// Public API base URL.
pub const KEY_API_URI: &str = "globalSettings__baseServiceUri__api";
/// Public identity server base URL.
pub const KEY_IDENTITY_URI: &str = "globalSettings__baseServiceUri__identity";
/// Connection string the services use.
pub const KEY_CONNECTION_STRING: &str =
    "globalSettings__postgreSql__connectionString";
/// Password of `identity/identity.pfx`.
pub const KEY_IDENTITY_CERT_PASSWORD: &str =
    "globalSettings__identityServer__certificatePassword";
/// Validated installation id.
pub const KEY_INSTALLATION_ID: &str = "globalSettings__installation__id";
/// Installation key entered at install.
pub const KEY_INSTALLATION_KEY: &str = "globalSettings__installation__key";
/// Attachment directory inside the api container.
pub const KEY_ATTACHMENT_DIR: &str = "globalSettings__attachment__baseDirectory";
/// Public attachment base URL.
pub const KEY_ATTACHMENT_URL: &str = "globalSettings__attachment__baseUrl";

/// Superuser created by the database container.
pub const KEY_POSTGRES_USER: &str = "POSTGRES_USER";
/// Also the password migrations connect with.
pub const KEY_POSTGRES_PASSWORD: &str = "POSTGRES_PASSWORD";

/// TLS origin chosen at install, or `none`.
pub const KEY_TLS_ORIGIN: &str = "SETUP_TLS_ORIGIN";

/// Database superuser the services and migrations connect as.
pub const DB_ADMIN_USER: &str = "postgres";
/// Catalog used to create the target database.
pub const DB_ADMIN_DATABASE: &str = "postgres";
/// Target database holding the application schema and the journal.
pub const DB_NAME: &str = "vault";
/// Hostname of the database service on the compose network.
pub const DB_SERVICE_HOST: &str = "db";
/// Port of the database service.
pub const DB_DEFAULT_PORT: u16 = 5432;

/// Schema that holds the migration journal.
pub const JOURNAL_SCHEMA: &str = "public";
/// Journal table name.
pub const JOURNAL_TABLE: &str = "migration_journal";

/// Subject used for the identity server signing certificate.
pub const IDENTITY_CERT_SUBJECT: &str = "Keel IdentityServer";

/// Mobile/desktop facets trusted by the U2F app-id manifest.
pub const TRUSTED_APP_FACETS: &[&str] = &[
    "ios:bundle-id:org.keel.vault",
    "android:apk-key-hash:dUGFzUzf3lmHSLBDBIv+WaFyZMI",
];
