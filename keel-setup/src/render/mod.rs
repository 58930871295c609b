//! Rendering of every file the service containers read.
//!
//! Renderers are pure functions from a [`DeploymentTarget`] (plus secrets on
//! install) to file contents. This module owns writing them, always through
//! [`write_atomically`], so re-running a command replaces files whole.

pub mod app_id;
pub mod app_settings;
pub mod env_files;
pub mod nginx;

use std::path::{Path, PathBuf};

use tracing::info;

use crate::{
    constants::{DB_NAMESPACE, GLOBAL_NAMESPACE, SETUP_NAMESPACE},
    env_writer::{env_file_path, render_env, write_atomically},
    error::{SetupError, SetupResult},
    models::{DeploymentTarget, GeneratedSecrets, InstallationIdentity},
};

/// Reverse proxy configuration.
pub const NGINX_CONFIG: &str = "nginx/default.conf";
/// Browser app settings script.
pub const APP_SETTINGS: &str = "web/settings.js";
/// FIDO U2F app-id manifest.
pub const APP_ID: &str = "web/app-id.json";

/// Render everything an install produces, env files included.
pub fn render_install(
    target: &DeploymentTarget,
    identity: &InstallationIdentity,
    secrets: &GeneratedSecrets,
) -> SetupResult<Vec<PathBuf>> {
    let out = &target.output_dir;
    let mut written = render_rebuild(target)?;

    let envs = [
        (
            GLOBAL_NAMESPACE,
            env_files::global_env(target, identity, secrets),
        ),
        (DB_NAMESPACE, env_files::db_env(secrets)),
        (SETUP_NAMESPACE, env_files::setup_env(target.tls)),
    ];
    for (namespace, kv) in envs {
        let path = env_file_path(out, namespace);
        write(&path, render_env(&kv).as_bytes())?;
        written.push(path);
    }

    Ok(written)
}

/// Re-render the URL-derived files; env files and secrets stay untouched.
pub fn render_rebuild(target: &DeploymentTarget) -> SetupResult<Vec<PathBuf>> {
    let out = &target.output_dir;
    let files = [
        (NGINX_CONFIG, nginx::render(target)),
        (APP_SETTINGS, app_settings::render(target)),
        (APP_ID, app_id::render(target)),
    ];

    let mut written = Vec::with_capacity(files.len());
    for (relative, contents) in files {
        let path = out.join(relative);
        write(&path, contents.as_bytes())?;
        written.push(path);
    }
    info!(url = %target.url(), files = written.len(), "rendered configuration");
    Ok(written)
}

fn write(path: &Path, contents: &[u8]) -> SetupResult<()> {
    write_atomically(path, contents).map_err(|source| SetupError::Render {
        path: path.to_path_buf(),
        source,
    })
}
