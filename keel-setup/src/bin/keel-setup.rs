//! `keel-setup` entry point.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use keel_setup::{
    Collaborators, ExitOutcome, Orchestrator, SetupError, SetupSettings,
    certificates::CertbotIssuer,
    cli::{SetupCommand, TerminalPrompter, parse_parameters},
    license::RemoteLicenseValidator,
    migrate::{MigrationTarget, PostgresTarget},
};
use tracing_subscriber::{
    EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(
    name = "keel-setup",
    version,
    about = "Keel deployment bootstrapper",
    after_help = "Examples:\n  keel-setup install -domain vault.example.com -letsencrypt y\n  keel-setup update -db 1\n  keel-setup printenv -env lin"
)]
struct Cli {
    /// Log filter, overrides RUST_LOG (e.g. `debug`, `keel_setup=trace`)
    #[arg(long, value_name = "FILTER")]
    log: Option<String>,

    /// Verb (`install`, `update`, `printenv`) followed by `-name value`
    /// parameters such as `-out`, `-domain`, `-letsencrypt`, `-db`
    #[arg(
        value_name = "ARGS",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    args: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = match cli.log.as_deref() {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("invalid --log filter '{directives}'"))?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info".into()),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let params = match parse_parameters(&cli.args) {
        Ok(params) => params,
        Err(err) => return Ok(report(err)),
    };
    let command = match SetupCommand::from_parameters(&params) {
        Ok(command) => command,
        Err(err) => return Ok(report(err)),
    };
    if command == SetupCommand::NoOp {
        println!("No top-level command detected. Exiting...");
        return Ok(ExitCode::SUCCESS);
    }

    let settings = match SetupSettings::resolve(&params) {
        Ok(settings) => settings,
        Err(err) => return Ok(report(err)),
    };
    let collaborators = production_collaborators(&settings)?;

    let mut orchestrator = Orchestrator::new(settings, collaborators);
    let outcome = orchestrator.run(command).await;
    let code = outcome.exit_code();
    if let ExitOutcome::Failed { cause, .. } = outcome {
        return Ok(report(cause));
    }
    Ok(ExitCode::from(code))
}

fn production_collaborators(settings: &SetupSettings) -> Result<Collaborators> {
    let authority = RemoteLicenseValidator::new(
        settings.license_api_url.clone(),
        settings.license_timeout,
    )
    .context("failed to build license API client")?;

    Ok(Collaborators {
        prompter: Box::new(TerminalPrompter),
        authority: Box::new(authority),
        acme: Box::new(CertbotIssuer::new(settings.certbot_email.clone())),
        connector: Box::new(|info| -> Box<dyn MigrationTarget> {
            Box::new(PostgresTarget::new(info))
        }),
    })
}

fn report(err: SetupError) -> ExitCode {
    eprintln!("Error: {:#}", anyhow::Error::new(err));
    ExitCode::FAILURE
}
