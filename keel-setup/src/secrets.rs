//! Random secret generation for passwords and certificate bundles.

use rand::{Rng, SeedableRng, distr::Alphanumeric, rng, rngs::StdRng};

use crate::constants::MIN_SECRET_LEN;

/// Environment variable that makes generated secrets reproducible in tests.
pub const TEST_SEED_VAR: &str = "KEEL_SETUP_TEST_SEED";

/// Source of every secret generated during one install.
///
/// Each [`generate`](Self::generate) call advances the same stream, so two
/// secrets from one generator differ even when seeded.
#[derive(Debug, Clone)]
pub struct SecretGenerator {
    rng: StdRng,
}

impl SecretGenerator {
    /// Seeded from `KEEL_SETUP_TEST_SEED` when it holds a `u64`, otherwise
    /// from the thread-local CSPRNG.
    pub fn from_env() -> Self {
        match std::env::var(TEST_SEED_VAR)
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
        {
            Some(seed) => Self::seeded(seed),
            None => Self {
                rng: StdRng::from_rng(&mut rng()),
            },
        }
    }

    /// Deterministic stream for `seed`.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Alphanumeric secret of at least [`MIN_SECRET_LEN`] chars.
    pub fn generate(&mut self, len: usize) -> String {
        let len = len.max(MIN_SECRET_LEN);
        (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_alphanumeric_and_long_enough() {
        let mut secrets = SecretGenerator::from_env();
        let secret = secrets.generate(8);
        assert_eq!(secret.len(), MIN_SECRET_LEN);
        assert!(secret.chars().all(|c| c.is_ascii_alphanumeric()));

        let longer = secrets.generate(48);
        assert_eq!(longer.len(), 48);
    }

    #[test]
    fn one_seed_yields_distinct_secrets() {
        let mut secrets = SecretGenerator::seeded(7);
        assert_ne!(secrets.generate(32), secrets.generate(32));
    }
}
