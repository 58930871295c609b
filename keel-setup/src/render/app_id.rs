//! FIDO U2F app-id manifest (`web/app-id.json`).

use serde::Serialize;

use crate::{constants::TRUSTED_APP_FACETS, models::DeploymentTarget};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AppIdManifest {
    trusted_facets: Vec<TrustedFacets>,
}

#[derive(Debug, Serialize)]
struct TrustedFacets {
    version: FacetVersion,
    ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct FacetVersion {
    major: u32,
    minor: u32,
}

/// JSON whose trusted facets start with the vault URL.
pub fn render(target: &DeploymentTarget) -> String {
    let mut ids = vec![target.url()];
    ids.extend(TRUSTED_APP_FACETS.iter().map(|s| s.to_string()));
    let manifest = AppIdManifest {
        trusted_facets: vec![TrustedFacets {
            version: FacetVersion { major: 1, minor: 0 },
            ids,
        }],
    };
    let mut json = serde_json::to_string_pretty(&manifest).unwrap_or_default();
    json.push('\n');
    json
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn first_facet_is_the_vault_origin() {
        let json = render(&DeploymentTarget {
            domain: "localhost".into(),
            tls: None,
            output_dir: PathBuf::from("/etc/keel"),
        });
        let value: serde_json::Value = serde_json::from_str(&json).expect("json");
        let ids = value["trustedFacets"][0]["ids"]
            .as_array()
            .expect("ids array");
        assert_eq!(ids[0], "http://localhost");
        assert_eq!(ids.len(), 1 + TRUSTED_APP_FACETS.len());
        assert_eq!(value["trustedFacets"][0]["version"]["major"], 1);
    }
}
