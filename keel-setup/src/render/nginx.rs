//! Reverse proxy configuration (`nginx/default.conf`).

use std::fmt::Write;

use crate::{
    certificates::CertificateLayout,
    models::{DeploymentTarget, TlsOrigin},
};

/// Path prefixes proxied to service containers, in match order.
const LOCATIONS: &[(&str, &str)] = &[
    ("/", "http://web:5000/"),
    ("/api/", "http://api:5000/"),
    ("/identity/", "http://identity:5000/"),
    ("/icons/", "http://icons:5000/"),
    ("/attachments/", "http://attachments:5000/"),
];

/// Server blocks for `target`; TLS adds an HTTP to HTTPS redirect.
pub fn render(target: &DeploymentTarget) -> String {
    let mut out = String::from(
        "# Managed by keel-setup. Local edits are replaced on update.\n\n",
    );
    match target.tls {
        None => {
            server_open(&mut out, &target.domain, "listen 80 default_server;");
            locations(&mut out);
            out.push_str("}\n");
        }
        Some(origin) => {
            server_open(&mut out, &target.domain, "listen 80 default_server;");
            let _ = writeln!(
                out,
                "  return 301 https://{}$request_uri;",
                target.domain
            );
            out.push_str("}\n\n");

            server_open(&mut out, &target.domain, "listen 443 ssl http2;");
            tls_block(&mut out, origin, &target.domain);
            locations(&mut out);
            out.push_str("}\n");
        }
    }
    out
}

fn server_open(out: &mut String, domain: &str, listen: &str) {
    out.push_str("server {\n");
    let _ = writeln!(out, "  {listen}");
    let _ = writeln!(out, "  server_name {domain};");
}

fn tls_block(out: &mut String, origin: TlsOrigin, domain: &str) {
    let layout = CertificateLayout::for_origin(origin, domain);
    let _ = writeln!(
        out,
        "  ssl_certificate {};",
        CertificateLayout::container_path(&layout.certificate)
    );
    let _ = writeln!(
        out,
        "  ssl_certificate_key {};",
        CertificateLayout::container_path(&layout.private_key)
    );
    out.push_str("  ssl_session_timeout 30m;\n");
    out.push_str("  ssl_session_cache shared:SSL:20m;\n");
    out.push_str("  ssl_protocols TLSv1.2 TLSv1.3;\n");
    out.push_str("  ssl_prefer_server_ciphers off;\n");

    // OCSP stapling needs the issuer chain, which self-signed certs lack.
    if let Some(chain) = &layout.chain
        && origin == TlsOrigin::AutomatedCa
    {
        out.push_str("  ssl_stapling on;\n");
        out.push_str("  ssl_stapling_verify on;\n");
        let _ = writeln!(
            out,
            "  ssl_trusted_certificate {};",
            CertificateLayout::container_path(chain)
        );
    }
    out.push_str("  add_header Strict-Transport-Security \"max-age=15768000; includeSubDomains\" always;\n");
}

fn locations(out: &mut String) {
    for (prefix, upstream) in LOCATIONS {
        out.push('\n');
        let _ = writeln!(out, "  location {prefix} {{");
        let _ = writeln!(out, "    proxy_pass {upstream};");
        out.push_str("    proxy_set_header Host $host;\n");
        out.push_str("    proxy_set_header X-Forwarded-Proto $scheme;\n");
        out.push_str("    proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n");
        out.push_str("  }\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn target(tls: Option<TlsOrigin>) -> DeploymentTarget {
        DeploymentTarget {
            domain: "vault.example.com".into(),
            tls,
            output_dir: PathBuf::from("/etc/keel"),
        }
    }

    #[test]
    fn plain_http_has_no_tls_server() {
        let conf = render(&target(None));
        assert!(conf.contains("listen 80 default_server;"));
        assert!(!conf.contains("443"));
        assert!(!conf.contains("return 301"));
        assert!(conf.contains("location /api/ {"));
    }

    #[test]
    fn automated_ca_points_at_letsencrypt_and_staples() {
        let conf = render(&target(Some(TlsOrigin::AutomatedCa)));
        assert!(conf.contains("return 301 https://vault.example.com$request_uri;"));
        assert!(conf.contains(
            "ssl_certificate /etc/letsencrypt/live/vault.example.com/fullchain.pem;"
        ));
        assert!(conf.contains("ssl_stapling on;"));
    }

    #[test]
    fn self_signed_uses_ssl_self_paths_without_stapling() {
        let conf = render(&target(Some(TlsOrigin::SelfSigned)));
        assert!(conf.contains(
            "ssl_certificate_key /etc/ssl/self/vault.example.com/private.key;"
        ));
        assert!(!conf.contains("ssl_stapling"));
    }
}
