//! Reading and writing the namespaced `*.env` files under `<out>/env/`.
//!
//! Files are plain `KEY=VALUE` lines consumed by the service containers. All
//! writes go through [`write_atomically`] so a reader never observes a half
//! written file; the last complete write wins.

use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

/// Location of the env file for `namespace` (e.g. `global` → `env/global.env`).
pub fn env_file_path(output_dir: &Path, namespace: &str) -> PathBuf {
    output_dir.join("env").join(format!("{namespace}.env"))
}

/// Render ordered key/value pairs as env file contents.
pub fn render_env(kv: &[(String, String)]) -> String {
    let mut out = String::new();
    for (key, value) in kv {
        out.push_str(key);
        out.push('=');
        out.push_str(&quote_if_needed(value));
        out.push('\n');
    }
    out
}

/// Quote values that `dotenvy` would otherwise split, expand, or truncate.
fn quote_if_needed(raw: &str) -> String {
    let needs_quotes = raw.chars().any(|c| {
        c.is_whitespace() || matches!(c, '#' | '$' | '"' | '\'' | '\\')
    });
    if !needs_quotes {
        return raw.to_string();
    }
    if !raw.contains('\'') {
        return format!("'{raw}'");
    }
    let escaped = raw
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('$', "\\$");
    format!("\"{escaped}\"")
}

/// Parse an env file into a map. A missing file yields `Ok(None)`.
pub fn read_env_map(
    path: &Path,
) -> Result<Option<HashMap<String, String>>, dotenvy::Error> {
    if !path.exists() {
        return Ok(None);
    }

    let mut map = HashMap::new();
    for entry in dotenvy::from_path_iter(path)? {
        let (key, value) = entry?;
        map.insert(key, value);
    }
    Ok(Some(map))
}

/// Read a single value from `<out>/env/<namespace>.env`.
pub fn read_env_value(
    output_dir: &Path,
    namespace: &str,
    key: &str,
) -> Result<Option<String>, dotenvy::Error> {
    let path = env_file_path(output_dir, namespace);
    Ok(read_env_map(&path)?.and_then(|mut map| map.remove(key)))
}

/// Replace `path` with `contents` via a sibling temp file and rename.
pub fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

/// Write an env namespace atomically.
pub fn write_env_atomically(
    output_dir: &Path,
    namespace: &str,
    kv: &[(String, String)],
) -> std::io::Result<PathBuf> {
    let path = env_file_path(output_dir, namespace);
    write_atomically(&path, render_env(kv).as_bytes())?;
    Ok(path)
}
