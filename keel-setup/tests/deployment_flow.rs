//! Install, update, and printenv driven through the public API against a
//! mocked license server and a temporary output directory.

use std::{
    collections::HashSet,
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use keel_setup::{
    Collaborators, Completion, DeploymentState, ExitOutcome, MigrationError,
    MigrationScript, Orchestrator, SetupError, SetupSettings,
    certificates::{AcmeIssuer, AcmeUnavailable},
    cli::{Answer, ScriptedPrompter, SetupCommand, parse_parameters},
    constants::{
        DB_NAMESPACE, GLOBAL_NAMESPACE, KEY_POSTGRES_PASSWORD, KEY_VAULT_URI,
    },
    env_writer::read_env_value,
    license::RemoteLicenseValidator,
    migrate::MigrationTarget,
};
use serde_json::json;
use tempfile::TempDir;
use url::Url;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path_regex},
};

const ID: &str = "6F9619FF-8B86-D011-B42D-00C04FC964FF";

struct OfflineAcme;

#[async_trait]
impl AcmeIssuer for OfflineAcme {
    async fn preflight(&self, domain: &str) -> Result<(), AcmeUnavailable> {
        Err(AcmeUnavailable::NotPublic(domain.to_string()))
    }

    async fn issue(&self, _: &str, _: &Path) -> Result<(), AcmeUnavailable> {
        Err(AcmeUnavailable::ToolMissing("certbot".into()))
    }
}

#[derive(Default)]
struct MemoryTarget {
    journal: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl MigrationTarget for MemoryTarget {
    async fn ensure_database(&mut self) -> Result<(), MigrationError> {
        Ok(())
    }

    async fn ensure_journal(&mut self) -> Result<(), MigrationError> {
        Ok(())
    }

    async fn applied_scripts(
        &mut self,
    ) -> Result<HashSet<String>, MigrationError> {
        Ok(self.journal.lock().unwrap().iter().cloned().collect())
    }

    async fn apply(
        &mut self,
        script: &MigrationScript,
        _: Duration,
    ) -> Result<(), MigrationError> {
        self.journal.lock().unwrap().push(script.name().to_string());
        Ok(())
    }
}

struct Harness {
    out: TempDir,
    server: MockServer,
    journal: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    async fn new() -> Self {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/installations/[0-9a-f-]{36}$"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "Enabled": true })),
            )
            .mount(&server)
            .await;
        Self {
            out: tempfile::tempdir().expect("tempdir"),
            server,
            journal: Arc::default(),
        }
    }

    fn out(&self) -> &Path {
        self.out.path()
    }

    fn orchestrator(&self, answers: Vec<Answer>) -> Orchestrator {
        let out = self.out().display().to_string();
        let params =
            parse_parameters(["-out", out.as_str()]).expect("params");
        let mut settings =
            SetupSettings::resolve_with(&params, |_| None).expect("settings");
        settings.license_api_url = Url::parse(&self.server.uri()).unwrap();

        let journal = self.journal.clone();
        Orchestrator::new(
            settings.clone(),
            Collaborators {
                prompter: Box::new(ScriptedPrompter::new(answers)),
                authority: Box::new(
                    RemoteLicenseValidator::new(
                        settings.license_api_url.clone(),
                        Duration::from_secs(5),
                    )
                    .expect("client"),
                ),
                acme: Box::new(OfflineAcme),
                connector: Box::new(move |_| -> Box<dyn MigrationTarget> {
                    Box::new(MemoryTarget {
                        journal: journal.clone(),
                    })
                }),
            },
        )
    }

    async fn run(&self, args: &[&str], answers: Vec<Answer>) -> ExitOutcome {
        let params = parse_parameters(args).expect("params");
        let command = SetupCommand::from_parameters(&params).expect("command");
        self.orchestrator(answers).run(command).await
    }

    fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.out().join(relative)).expect(relative)
    }
}

fn install_answers(has_cert: bool) -> Vec<Answer> {
    vec![
        Answer::Text(ID.into()),
        Answer::Text("install-key".into()),
        Answer::Confirm(has_cert),
    ]
}

#[tokio::test]
async fn plain_http_install_renders_http_urls() {
    let h = Harness::new().await;
    let outcome = h
        .run(&["install", "-domain", "Vault.Example.Test"], install_answers(false))
        .await;
    assert!(matches!(
        outcome,
        ExitOutcome::Done(Completion::Installed { ref url }) if url == "http://vault.example.test"
    ));

    let vault = read_env_value(h.out(), GLOBAL_NAMESPACE, KEY_VAULT_URI)
        .expect("read")
        .expect("vault uri");
    assert_eq!(vault, "http://vault.example.test");
    assert!(!h.read("nginx/default.conf").contains("ssl_certificate"));
    assert!(h.read("web/app-id.json").contains("http://vault.example.test"));
    assert!(!h.out().join("ssl").exists());
}

#[tokio::test]
async fn user_certificate_install_renders_https_urls() {
    let h = Harness::new().await;
    let outcome = h
        .run(&["install", "-domain", "vault.example.test"], install_answers(true))
        .await;
    assert_eq!(outcome.exit_code(), 0);

    assert!(h.read("web/settings.js").contains("https://vault.example.test/api"));
    assert!(h.read("nginx/default.conf").contains(
        "ssl_certificate /etc/ssl/vault.example.test/certificate.crt;"
    ));
}

#[tokio::test]
async fn letsencrypt_without_prerequisites_serves_self_signed() {
    let h = Harness::new().await;
    let outcome = h
        .run(
            &["install", "-domain", "vault.example.test", "-letsencrypt", "y"],
            install_answers(false),
        )
        .await;
    assert_eq!(outcome.exit_code(), 0);
    assert!(
        h.out()
            .join("ssl/self/vault.example.test/certificate.crt")
            .is_file()
    );
    assert!(!h.read("nginx/default.conf").contains("letsencrypt"));
}

#[tokio::test]
async fn unknown_installation_aborts_before_writing() {
    let h = Harness::new().await;
    h.server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&h.server)
        .await;

    let outcome = h.run(&["install"], install_answers(false)).await;
    let ExitOutcome::Failed { at, cause } = outcome else {
        panic!("expected failure");
    };
    assert_eq!(at, DeploymentState::ValidatingLicense);
    assert_eq!(cause.to_string(), "Invalid installation id.");
    assert!(!h.out().join("env").exists());
}

#[tokio::test]
async fn rebuild_keeps_secrets_and_follows_persisted_url() {
    let h = Harness::new().await;
    h.run(
        &["install", "-domain", "vault.example.test", "-selfsigned", "y"],
        install_answers(false),
    )
    .await;
    let password = read_env_value(h.out(), DB_NAMESPACE, KEY_POSTGRES_PASSWORD)
        .unwrap()
        .unwrap();
    let global_before = h.read("env/global.env");

    std::fs::write(h.out().join("nginx/default.conf"), "# clobbered\n").unwrap();
    let outcome = h.run(&["update"], vec![]).await;
    assert!(matches!(
        outcome,
        ExitOutcome::Done(Completion::ConfigRebuilt { ref url }) if url == "https://vault.example.test"
    ));

    let nginx = h.read("nginx/default.conf");
    assert!(nginx.contains("/etc/ssl/self/vault.example.test/certificate.crt"));
    assert_eq!(h.read("env/global.env"), global_before);
    assert_eq!(
        read_env_value(h.out(), DB_NAMESPACE, KEY_POSTGRES_PASSWORD)
            .unwrap()
            .unwrap(),
        password
    );
    // Update never calls the license server.
    let calls = h.server.received_requests().await.unwrap();
    assert_eq!(calls.len(), 1);
}

#[tokio::test]
async fn database_update_is_idempotent() {
    let h = Harness::new().await;
    h.run(&["install"], install_answers(false)).await;

    let first = h.run(&["update", "-db", "1"], vec![]).await;
    let ExitOutcome::Done(Completion::Migrated { applied }) = first else {
        panic!("expected migration, got {first:?}");
    };
    assert!(!applied.is_empty());
    let mut sorted = applied.clone();
    sorted.sort();
    assert_eq!(applied, sorted);

    let second = h.run(&["-update", "1", "-db", "y"], vec![]).await;
    assert!(matches!(second, ExitOutcome::Done(Completion::NothingToMigrate)));
    assert_eq!(h.journal.lock().unwrap().len(), applied.len());
}

#[tokio::test]
async fn database_update_needs_persisted_password() {
    let h = Harness::new().await;
    let outcome = h.run(&["update", "-db", "1"], vec![]).await;
    assert!(matches!(
        outcome,
        ExitOutcome::Failed {
            at: DeploymentState::Migrating,
            cause: SetupError::ConfigurationRead { .. },
        }
    ));
    assert!(h.journal.lock().unwrap().is_empty());
}

#[tokio::test]
async fn printenv_reports_the_installed_url() {
    let h = Harness::new().await;
    h.run(&["install", "-domain", "vault.example.test"], install_answers(false))
        .await;
    let outcome = h.run(&["printenv", "-env", "win"], vec![]).await;
    assert!(matches!(
        outcome,
        ExitOutcome::Done(Completion::EnvironmentPrinted { ref url }) if url == "http://vault.example.test"
    ));
}

#[tokio::test]
async fn ip_literal_install_survives_update_and_printenv() {
    let h = Harness::new().await;
    let outcome = h
        .run(&["install", "-domain", "192.0.2.10"], install_answers(false))
        .await;
    assert!(matches!(
        outcome,
        ExitOutcome::Done(Completion::Installed { ref url }) if url == "http://192.0.2.10"
    ));

    let rebuilt = h.run(&["update"], vec![]).await;
    assert!(matches!(
        rebuilt,
        ExitOutcome::Done(Completion::ConfigRebuilt { ref url }) if url == "http://192.0.2.10"
    ));
    assert!(h.read("nginx/default.conf").contains("server_name 192.0.2.10;"));

    let printed = h.run(&["printenv"], vec![]).await;
    assert_eq!(printed.exit_code(), 0);
}

#[test]
fn ipv6_literal_is_refused_before_install() {
    let params = parse_parameters(["install", "-domain", "::1"]).expect("params");
    let err = SetupCommand::from_parameters(&params).unwrap_err();
    assert!(matches!(err, SetupError::UserInput(_)));
}
