//! Fluent configuration, built the same way the teacher's `AcmeConfig`
//! is: a consuming builder with chainable setters, here covering the
//! account store layout and the auth handler's poll cadence instead of
//! the teacher's TLS-serving concerns (directory URL, ALPN protocols).

use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{DEFAULT_KEY_BITS, DEFAULT_MAX_ROUNDS, DEFAULT_MIN_SLEEP_SECS};

/// Where account state lives on disk and how the auth handler paces
/// its polling, ported from `letsencrypt.configuration.NamespaceConfig`
/// (`accounts_dir`, `account_keys_dir`, `rsa_key_size`). Challenge
/// preferences are not configured here: they are sourced per domain
/// from the `Authenticator`s themselves (spec.md §6.2 `get_chall_pref`).
#[derive(Clone, Debug)]
pub struct Config {
    pub(crate) accounts_dir: PathBuf,
    pub(crate) account_keys_dir: PathBuf,
    pub(crate) key_bits: u32,
    pub(crate) min_sleep: Duration,
    pub(crate) max_rounds: usize,
}

impl Config {
    /// Starts from the original's defaults: accounts and keys live
    /// side by side under `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Config {
            accounts_dir: base_dir.join("accounts"),
            account_keys_dir: base_dir.join("account_keys"),
            key_bits: DEFAULT_KEY_BITS,
            min_sleep: Duration::from_secs(DEFAULT_MIN_SLEEP_SECS),
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    pub fn accounts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.accounts_dir = dir.into();
        self
    }

    pub fn account_keys_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.account_keys_dir = dir.into();
        self
    }

    /// Kept as a config knob for callers supplying their own
    /// `AccountKeyGenerator`; the reference generator in
    /// `crypto::EcdsaKeyGenerator` ignores it (see DESIGN.md, "RSA vs
    /// ECDSA").
    pub fn key_bits(mut self, bits: u32) -> Self {
        self.key_bits = bits;
        self
    }

    pub fn min_sleep(mut self, min_sleep: Duration) -> Self {
        self.min_sleep = min_sleep;
        self
    }

    pub fn max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn accounts_dir_path(&self) -> &std::path::Path {
        &self.accounts_dir
    }

    pub fn account_keys_dir_path(&self) -> &std::path::Path {
        &self.account_keys_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = Config::new("/tmp/acme-core-test")
            .key_bits(4096)
            .max_rounds(5);
        assert_eq!(config.key_bits, 4096);
        assert_eq!(config.max_rounds, 5);
        assert_eq!(
            config.accounts_dir_path(),
            std::path::Path::new("/tmp/acme-core-test/accounts")
        );
    }
}
