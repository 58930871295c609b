//! `-name value` parameter protocol used by the wrapper scripts.
//!
//! The first token that names a verb (`install`, `update`, `printenv`, bare
//! or dash-prefixed) selects the command. Remaining `-name value` pairs are
//! collected with lowercased names; bare tokens in between are ignored.

use std::collections::HashMap;

use crate::error::SetupError;

/// Top-level verb named on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// `install`
    Install,
    /// `update`
    Update,
    /// `printenv`
    PrintEnv,
}

impl Verb {
    fn parse(token: &str) -> Option<Self> {
        match token.trim_start_matches('-').to_ascii_lowercase().as_str() {
            "install" => Some(Verb::Install),
            "update" => Some(Verb::Update),
            "printenv" => Some(Verb::PrintEnv),
            _ => None,
        }
    }
}

/// Parsed parameters: the verb (if any) and named values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    /// `None` when no token named a verb.
    pub verb: Option<Verb>,
    values: HashMap<String, String>,
}

impl Parameters {
    /// Value of `-name`, matched case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// `-name` was given, whatever its value.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(&name.to_ascii_lowercase())
    }

    /// Interpret `y`/`yes`/`true`/`1` as true; absent or anything else is false.
    pub fn flag(&self, name: &str) -> bool {
        self.get(name).is_some_and(|raw| {
            matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "y" | "yes" | "true" | "1" | "on"
            )
        })
    }

    /// Set `-name`, replacing an earlier value.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.values.insert(name.to_ascii_lowercase(), value.into());
    }
}

/// Parse raw arguments (without the program name).
pub fn parse_parameters<I, S>(args: I) -> Result<Parameters, SetupError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let tokens: Vec<String> =
        args.into_iter().map(|s| s.as_ref().to_string()).collect();
    let mut params = Parameters::default();
    let mut i = 0;

    while i < tokens.len() {
        let token = tokens[i].as_str();

        if params.verb.is_none()
            && let Some(verb) = Verb::parse(token)
        {
            params.verb = Some(verb);
            // `-install 1` carries a throwaway value.
            if token.starts_with('-')
                && tokens.get(i + 1).is_some_and(|next| {
                    !next.starts_with('-') && Verb::parse(next).is_none()
                })
            {
                i += 1;
            }
            i += 1;
            continue;
        }

        let Some(name) = token.strip_prefix('-').filter(|n| !n.is_empty())
        else {
            i += 1;
            continue;
        };

        let Some(value) = tokens.get(i + 1) else {
            return Err(SetupError::UserInput(format!(
                "parameter -{name} expects a value"
            )));
        };
        params.insert(name, value.clone());
        i += 2;
    }

    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_verb_with_pairs() {
        let params = parse_parameters([
            "install",
            "-out",
            "/srv/keel",
            "-Domain",
            "Vault.Example.com",
            "-letsencrypt",
            "y",
        ])
        .expect("parse");
        assert_eq!(params.verb, Some(Verb::Install));
        assert_eq!(params.get("out"), Some("/srv/keel"));
        assert_eq!(params.get("domain"), Some("Vault.Example.com"));
        assert!(params.flag("letsencrypt"));
        assert!(!params.flag("selfsigned"));
    }

    #[test]
    fn dash_verb_consumes_its_placeholder_value() {
        let params =
            parse_parameters(["-update", "1", "-db", "1"]).expect("parse");
        assert_eq!(params.verb, Some(Verb::Update));
        assert!(params.contains("db"));
        assert!(!params.contains("1"));
    }

    #[test]
    fn stray_tokens_are_ignored() {
        let params =
            parse_parameters(["whatever", "printenv", "junk", "-env", "win"])
                .expect("parse");
        assert_eq!(params.verb, Some(Verb::PrintEnv));
        assert_eq!(params.get("env"), Some("win"));
    }

    #[test]
    fn no_verb_is_not_an_error() {
        let params = parse_parameters(["-domain", "x"]).expect("parse");
        assert_eq!(params.verb, None);
    }

    #[test]
    fn trailing_flag_without_value_is_rejected() {
        let err = parse_parameters(["install", "-out"]).unwrap_err();
        assert!(matches!(err, SetupError::UserInput(_)));
    }
}
