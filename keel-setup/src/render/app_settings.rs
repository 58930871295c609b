//! Browser app settings (`web/settings.js`).

use serde::Serialize;

use crate::models::DeploymentTarget;

#[derive(Debug, Serialize)]
struct AppSettings {
    urls: AppUrls,
}

#[derive(Debug, Serialize)]
struct AppUrls {
    vault: String,
    api: String,
    identity: String,
    icons: String,
}

/// Script assigning the service URLs to `window.keelSettings`.
pub fn render(target: &DeploymentTarget) -> String {
    let base = target.url();
    let settings = AppSettings {
        urls: AppUrls {
            api: format!("{base}/api"),
            identity: format!("{base}/identity"),
            icons: format!("{base}/icons"),
            vault: base,
        },
    };
    // Plain strings only; serialization cannot fail.
    let json = serde_json::to_string_pretty(&settings).unwrap_or_default();
    format!("window.keelSettings = {json};\n")
}
