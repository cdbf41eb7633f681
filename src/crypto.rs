//! Key and CSR generation, kept behind ports rather than called inline
//! (spec.md §1 Non-goals: "no in-process crypto implementation").
//! Reference implementations are provided so the crate is usable and
//! testable end to end, grounded in the teacher's own key-gen
//! (`Account::generate_key_pair` in `acme.rs`) and its `rcgen` usage in
//! `caches/test.rs`.

use async_trait::async_trait;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};

use crate::error::ClientError;
use crate::messages::Jwk;

/// PKCS#8-encoded private key material plus its public JWK, opaque to
/// everything except the `Network` port implementation that signs
/// requests with it.
#[derive(Clone)]
pub struct AccountKeyHandle {
    pkcs8: Vec<u8>,
    jwk: Jwk,
}

impl AccountKeyHandle {
    pub fn pkcs8_der(&self) -> &[u8] {
        &self.pkcs8
    }

    pub fn jwk(&self) -> &Jwk {
        &self.jwk
    }

    /// Rebuilds a handle from PEM-decoded PKCS#8 bytes, re-deriving the
    /// public JWK. Used when loading a persisted account key back in.
    pub fn from_pkcs8_der(pkcs8: Vec<u8>) -> Result<Self, ClientError> {
        let rng = ring::rand::SystemRandom::new();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &pkcs8, &rng)
                .map_err(|e| ClientError::KeyGen(e.to_string()))?;
        let public = key_pair.public_key().as_ref();
        let (x, y) = public[1..].split_at(32);
        Ok(AccountKeyHandle {
            jwk: Jwk::ec_p256(x, y),
            pkcs8,
        })
    }
}

impl std::fmt::Debug for AccountKeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountKeyHandle")
            .field("jwk", &self.jwk)
            .finish_non_exhaustive()
    }
}

/// Generates the key pair backing a new account registration. The
/// original picked an RSA modulus size; this crate generates ECDSA
/// P-256 instead, the only key shape `ring` can generate and the one
/// the teacher itself uses (see DESIGN.md, "RSA vs ECDSA").
#[async_trait]
pub trait AccountKeyGenerator: Send + Sync {
    async fn generate(&self) -> Result<AccountKeyHandle, ClientError>;
}

/// Reference `AccountKeyGenerator`, grounded directly on
/// `Account::generate_key_pair` in the teacher's `acme.rs`.
pub struct EcdsaKeyGenerator;

#[async_trait]
impl AccountKeyGenerator for EcdsaKeyGenerator {
    async fn generate(&self) -> Result<AccountKeyHandle, ClientError> {
        let rng = ring::rand::SystemRandom::new();
        let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
            .map_err(|e| ClientError::KeyGen(e.to_string()))?;
        let key_pair = EcdsaKeyPair::from_pkcs8(
            &ECDSA_P256_SHA256_FIXED_SIGNING,
            pkcs8.as_ref(),
            &rng,
        )
        .map_err(|e| ClientError::KeyGen(e.to_string()))?;
        // Uncompressed SEC1 point: 0x04 || X || Y, 32 bytes each for P-256.
        let public = key_pair.public_key().as_ref();
        let (x, y) = public[1..].split_at(32);
        Ok(AccountKeyHandle {
            pkcs8: pkcs8.as_ref().to_vec(),
            jwk: Jwk::ec_p256(x, y),
        })
    }
}

/// Builds the PKCS#10 CSR submitted at finalization, along with the
/// dedicated certificate key it was signed with (the original built
/// this via `crypto_util.init_save_csr`; here it is a port so the
/// auth/client layer never touches key material directly). Returns
/// `(der_csr, pkcs8_cert_key)`, grounded on the teacher's own
/// `CertificateParams::new` / `serialize_request` sequence in
/// `state.rs::order`, which likewise generates a fresh key per order
/// rather than reusing the account key.
#[async_trait]
pub trait CsrGenerator: Send + Sync {
    async fn generate(&self, domains: &[String]) -> Result<(Vec<u8>, Vec<u8>), ClientError>;
}

/// Reference `CsrGenerator` built on `rcgen`, matching the teacher's
/// own use of `rcgen` for certificate construction in `state.rs` and
/// `caches/test.rs`.
pub struct RcgenCsrGenerator;

#[async_trait]
impl CsrGenerator for RcgenCsrGenerator {
    async fn generate(&self, domains: &[String]) -> Result<(Vec<u8>, Vec<u8>), ClientError> {
        use rcgen::{CertificateParams, KeyPair as RcgenKeyPair, PKCS_ECDSA_P256_SHA256};

        let params = CertificateParams::new(domains.to_vec())
            .map_err(|e| ClientError::KeyGen(e.to_string()))?;
        let key_pair = RcgenKeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)
            .map_err(|e| ClientError::KeyGen(e.to_string()))?;
        let pkcs8 = key_pair.serialize_der();
        let csr = params
            .serialize_request(&key_pair)
            .map_err(|e| ClientError::KeyGen(e.to_string()))?;
        Ok((csr.der().to_vec(), pkcs8))
    }
}
