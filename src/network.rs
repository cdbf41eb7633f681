//! The transport seam (spec.md §1, §6.1). Everything the core needs
//! from "the ACME server" goes through this one `async_trait`, the
//! way the teacher puts `CertCache`/`AccountCache` at the boundary
//! between `AcmeState` and storage rather than hand-wiring HTTP calls
//! into the state machine itself.

use async_trait::async_trait;
use thiserror::Error;

use crate::account::Account;
use crate::messages::{AuthorizationResource, CertificateResource, ChallengeBody, RegistrationResource};

/// Transient or terminal transport/protocol failure. Retrying
/// transient failures is the implementer's responsibility (spec.md
/// §7); the core itself only retries via its own polling cadence.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("server returned malformed response: {0}")]
    Malformed(String),
    #[error("server rejected the request: {0}")]
    Protocol(#[from] crate::messages::Error),
}

/// A non-affirmative answer to a challenge response POST.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Acknowledgement;

/// Opaque response payload for a single answered challenge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChallengeResponse(pub serde_json::Value);

/// The seven operations the core drives against an ACME server
/// (spec.md §6.1). No HTTP, JWS or nonce handling lives in this
/// crate — implementers own all of that.
#[async_trait]
pub trait Network: Send + Sync {
    /// Submits a new registration for `account`, returning the account
    /// with its `regr` populated from the server's response.
    async fn register_from_account(&self, account: Account) -> Result<Account, NetworkError>;

    /// Posts agreement to the terms of service named in `regr`.
    async fn agree_to_tos(
        &self,
        regr: RegistrationResource,
    ) -> Result<RegistrationResource, NetworkError>;

    /// Requests a fresh set of challenges for `domain` at the
    /// directory's `new_authz_uri`.
    async fn request_domain_challenges(
        &self,
        domain: &str,
        new_authz_uri: &str,
    ) -> Result<AuthorizationResource, NetworkError>;

    /// Posts `response` as the answer to `challb`.
    async fn answer_challenge(
        &self,
        challb: &ChallengeBody,
        response: ChallengeResponse,
    ) -> Result<Acknowledgement, NetworkError>;

    /// Re-fetches `authzr`, returning the updated resource and the
    /// raw status code so the caller can read `Retry-After`.
    async fn poll(
        &self,
        authzr: &AuthorizationResource,
    ) -> Result<(AuthorizationResource, PollResponse), NetworkError>;

    /// Submits `csr` against the given authorizations for issuance.
    async fn request_issuance(
        &self,
        csr: &[u8],
        authzrs: &[AuthorizationResource],
    ) -> Result<CertificateResource, NetworkError>;

    /// Fetches the issuer chain named in `certr`, if any.
    async fn fetch_chain(
        &self,
        certr: &CertificateResource,
    ) -> Result<Option<Vec<u8>>, NetworkError>;
}

/// The bits of an HTTP response the polling loop needs: status and
/// an optional `Retry-After`, honored per spec.md §9 (REDESIGN FLAGS).
#[derive(Clone, Debug, Default)]
pub struct PollResponse {
    pub status: u16,
    pub retry_after: Option<std::time::Duration>,
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    //! An in-memory `Network` double for driving the auth handler and
    //! client in tests, grounded on the teacher's `TestCache` and
    //! `NoCache` (`caches/test.rs`, `caches/no.rs`): a minimal,
    //! programmable stand-in for the real port.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::messages::{Authorization, Status};

    /// Scripted per-domain poll behavior: `Fixed` returns the stored
    /// authorization status verbatim; `ValidAfter(n)` flips to `valid`
    /// once polled `n` times.
    #[derive(Clone)]
    pub enum PollScript {
        Fixed(Status),
        ValidAfter(usize),
    }

    struct DomainState {
        authz: AuthorizationResource,
        script: PollScript,
        polls: usize,
    }

    /// In-memory `Network` implementation. Construct with
    /// [`MockNetwork::new`], seed authorizations with
    /// [`MockNetwork::seed_authorization`], then hand it to an
    /// `AuthHandler`/`Client`.
    pub struct MockNetwork {
        domains: Mutex<HashMap<String, DomainState>>,
        cert_chain_uri: Option<String>,
    }

    impl MockNetwork {
        pub fn new() -> Self {
            MockNetwork {
                domains: Mutex::new(HashMap::new()),
                cert_chain_uri: None,
            }
        }

        pub fn with_cert_chain_uri(mut self, uri: impl Into<String>) -> Self {
            self.cert_chain_uri = Some(uri.into());
            self
        }

        pub fn seed_authorization(
            &self,
            domain: impl Into<String>,
            authz: Authorization,
            script: PollScript,
        ) {
            let resource = AuthorizationResource {
                body: authz,
                uri: format!("https://example.invalid/authz/{}", domain.into()),
                new_cert_uri: None,
            };
            let domain = resource
                .body
                .identifier
                .value
                .clone();
            self.domains.lock().unwrap().insert(
                domain,
                DomainState {
                    authz: resource,
                    script,
                    polls: 0,
                },
            );
        }
    }

    impl Default for MockNetwork {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl Network for MockNetwork {
        async fn register_from_account(&self, mut account: Account) -> Result<Account, NetworkError> {
            account.regr = Some(RegistrationResource {
                body: crate::messages::Registration::default(),
                uri: "https://example.invalid/reg/1".into(),
                new_authzr_uri: Some("https://example.invalid/authz/new".into()),
                terms_of_service: Some("https://example.invalid/tos".into()),
            });
            Ok(account)
        }

        async fn agree_to_tos(
            &self,
            mut regr: RegistrationResource,
        ) -> Result<RegistrationResource, NetworkError> {
            regr.body.agreement = regr.terms_of_service.clone();
            Ok(regr)
        }

        async fn request_domain_challenges(
            &self,
            domain: &str,
            _new_authz_uri: &str,
        ) -> Result<AuthorizationResource, NetworkError> {
            let domains = self.domains.lock().unwrap();
            domains
                .get(domain)
                .map(|state| state.authz.clone())
                .ok_or_else(|| NetworkError::Malformed(format!("no seeded authz for {domain}")))
        }

        async fn answer_challenge(
            &self,
            _challb: &ChallengeBody,
            _response: ChallengeResponse,
        ) -> Result<Acknowledgement, NetworkError> {
            Ok(Acknowledgement)
        }

        async fn poll(
            &self,
            authzr: &AuthorizationResource,
        ) -> Result<(AuthorizationResource, PollResponse), NetworkError> {
            let mut domains = self.domains.lock().unwrap();
            let state = domains
                .get_mut(&authzr.body.identifier.value)
                .ok_or_else(|| NetworkError::Malformed("unknown authorization".into()))?;
            state.polls += 1;
            let status = match state.script {
                PollScript::Fixed(s) => s,
                PollScript::ValidAfter(n) => {
                    if state.polls >= n {
                        Status::Valid
                    } else {
                        Status::Pending
                    }
                }
            };
            state.authz.body.status = status;
            for challb in &mut state.authz.body.challenges {
                challb.status = status;
            }
            Ok((state.authz.clone(), PollResponse { status: 200, retry_after: None }))
        }

        async fn request_issuance(
            &self,
            _csr: &[u8],
            _authzrs: &[AuthorizationResource],
        ) -> Result<CertificateResource, NetworkError> {
            Ok(CertificateResource {
                body: b"fake-der-certificate".to_vec(),
                uri: "https://example.invalid/cert/1".into(),
                cert_chain_uri: self.cert_chain_uri.clone(),
                authzrs: vec![],
            })
        }

        async fn fetch_chain(
            &self,
            certr: &CertificateResource,
        ) -> Result<Option<Vec<u8>>, NetworkError> {
            if certr.cert_chain_uri.is_some() {
                Ok(Some(b"fake-der-chain".to_vec()))
            } else {
                Ok(None)
            }
        }
    }
}
