//! Client facade (spec.md §4.5), ported from `letsencrypt.client.Client`.
//! Composes an `Account` with the `Network`/`Authenticator`/`Installer`
//! ports and an injected `Reporter`/`Prompter` pair instead of the
//! original's process-global UI registry (spec.md §9, "Global
//! UI/reporter").

use std::path::Path;

use crate::account::Account;
use crate::auth_handler::AuthHandler;
use crate::authenticator::Authenticator;
use crate::config::Config;
use crate::crypto::CsrGenerator;
use crate::error::ClientError;
use crate::installer::Installer;
use crate::messages::CertificateRequest;
use crate::network::Network;
use crate::reporter::{Priority, Prompter, Reporter};

/// PEM-encoded certificate, PEM-encoded private key, PEM-encoded chain
/// (empty string when the server offered none — spec.md §4.5, §8
/// scenario 1).
pub type CertBundle = (String, String, String);

/// Composes everything needed to register an account and obtain a
/// certificate: `account` plus the pluggable ports (spec.md §4.5).
/// `dv_auth`/`cont_auth`/`installer`/`prompter` are optional so a
/// caller that only wants to register an account, or only wants
/// read-only account inspection, doesn't need to supply all of them —
/// `obtain_certificate` and `deploy_certificate` each check the ones
/// they actually need and fail with a specific `ClientError` when
/// absent.
pub struct Client<'a> {
    pub account: Account,
    config: &'a Config,
    network: &'a dyn Network,
    dv_auth: Option<&'a dyn Authenticator>,
    cont_auth: Option<&'a dyn Authenticator>,
    installer: Option<&'a dyn Installer>,
    reporter: &'a dyn Reporter,
    prompter: Option<&'a dyn Prompter>,
    csr_gen: &'a dyn CsrGenerator,
}

impl<'a> Client<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        account: Account,
        config: &'a Config,
        network: &'a dyn Network,
        dv_auth: Option<&'a dyn Authenticator>,
        cont_auth: Option<&'a dyn Authenticator>,
        installer: Option<&'a dyn Installer>,
        reporter: &'a dyn Reporter,
        prompter: Option<&'a dyn Prompter>,
        csr_gen: &'a dyn CsrGenerator,
    ) -> Self {
        Client {
            account,
            config,
            network,
            dv_auth,
            cont_auth,
            installer,
            reporter,
            prompter,
            csr_gen,
        }
    }

    /// Posts a new registration, handles terms-of-service agreement
    /// through the injected `Prompter`, persists the account, and
    /// emits the two reporter messages the original's
    /// `register`/`_report_new_account` emit (spec.md §4.5).
    pub async fn register(&mut self) -> Result<(), ClientError> {
        let registered = self.network.register_from_account(self.account.clone()).await?;
        self.account = registered;

        if let Some(regr) = self.account.regr.clone() {
            if let Some(tos) = regr.terms_of_service.clone() {
                let already_agreed = regr.body.agreement.as_deref() == Some(tos.as_str());
                if !already_agreed {
                    let agreed = match self.prompter {
                        Some(prompter) => {
                            prompter
                                .yes_no(&format!("Do you agree to the terms at {tos}?"))
                                .await
                        }
                        None => false,
                    };
                    if !agreed {
                        return Err(ClientError::TosNotAgreed);
                    }
                    let updated = self.network.agree_to_tos(regr).await?;
                    self.account.regr = Some(updated);
                }
            }
        }

        self.account.save(
            self.config.accounts_dir_path(),
            self.config.account_keys_dir_path(),
        )?;

        self.reporter.add_message(
            "Credentials saved to your configured accounts directory.",
            Priority::Medium,
            false,
        );

        let recovery_message = match self.account.email.as_deref() {
            Some(email) => format!(
                "Your recovery token is {}. Keep it safe; it is the only way to recover account access for {email}.",
                self.account.recovery_token().unwrap_or("<none issued>")
            ),
            None => format!(
                "Your recovery token is {}. Keep it safe; it is the only way to recover account access.",
                self.account.recovery_token().unwrap_or("<none issued>")
            ),
        };
        self.reporter
            .add_message(&recovery_message, Priority::High, true);

        Ok(())
    }

    /// Drives `AuthHandler::get_authorizations` for `domains`, then
    /// issues a certificate against the resulting authorizations
    /// (spec.md §4.5). `_csr` exists only for interface parity with
    /// callers that already have a CSR in hand; per spec.md §9
    /// ("Ignored CSR parameter") it is always discarded in favor of a
    /// freshly generated CSR over `domains`, and that behavior is
    /// preserved here deliberately rather than "fixed".
    pub async fn obtain_certificate(
        &mut self,
        domains: &[String],
        best_effort: bool,
        _csr: Option<Vec<u8>>,
    ) -> Result<CertBundle, ClientError> {
        let (Some(dv_auth), Some(cont_auth)) = (self.dv_auth, self.cont_auth) else {
            return Err(ClientError::NoAuthHandler);
        };
        let regr = self.account.regr.clone().ok_or(ClientError::NotRegistered)?;
        let new_authz_uri = regr
            .new_authzr_uri
            .as_deref()
            .ok_or(ClientError::NotRegistered)?;

        let handler = AuthHandler::new(dv_auth, cont_auth, self.network, &self.account)
            .with_poll_cadence(self.config.min_sleep, self.config.max_rounds);
        let authzrs = handler
            .get_authorizations(domains, new_authz_uri, best_effort)
            .await?;

        let (csr, cert_key_pkcs8) = self.csr_gen.generate(domains).await?;

        let certr = self.network.request_issuance(&csr, &authzrs).await?;

        let chain = self.network.fetch_chain(&certr).await?;

        let cert_pem = der_to_pem("CERTIFICATE", &certr.body);
        let key_pem = pem::encode(&pem::Pem::new("PRIVATE KEY".to_string(), cert_key_pkcs8));
        let chain_pem = chain
            .map(|der| der_to_pem("CERTIFICATE", &der))
            .unwrap_or_default();

        Ok((cert_pem, key_pem, chain_pem))
    }

    /// Writes the issued bundle to disk. Distinct from
    /// `deploy_certificate` so a caller can persist a certificate
    /// without necessarily wiring it into a live server (spec.md
    /// §4.5, documented for interface completeness).
    pub fn save_certificate(
        &self,
        bundle: &CertBundle,
        key_path: &Path,
        cert_path: &Path,
        chain_path: Option<&Path>,
    ) -> Result<(), ClientError> {
        let (cert_pem, key_pem, chain_pem) = bundle;
        std::fs::write(key_path, key_pem)?;
        std::fs::write(cert_path, cert_pem)?;
        if let Some(chain_path) = chain_path {
            std::fs::write(chain_path, chain_pem)?;
        }
        Ok(())
    }

    /// Delegates to the configured `Installer`, staging the bundle for
    /// every domain before committing and reloading once; fails with
    /// `ClientError::NoInstaller` when none was supplied (spec.md
    /// §4.5).
    pub async fn deploy_certificate(
        &self,
        domains: &[String],
        key_path: &str,
        cert_path: &str,
        chain_path: Option<&str>,
    ) -> Result<(), ClientError> {
        let installer = self.installer.ok_or(ClientError::NoInstaller)?;
        for domain in domains {
            installer
                .deploy_cert(domain, cert_path, key_path, chain_path)
                .await?;
        }
        installer.save(None).await?;
        installer.restart().await?;
        Ok(())
    }

    /// Builds a `CertificateRequest` wire value from a CSR and the
    /// authorization URIs, handy for callers driving `Network`
    /// directly rather than through `obtain_certificate`.
    pub fn certificate_request(csr: Vec<u8>, authorization_uris: Vec<String>) -> CertificateRequest {
        CertificateRequest {
            csr,
            authorizations: authorization_uris,
        }
    }
}

fn der_to_pem(tag: &str, der: &[u8]) -> String {
    pem::encode(&pem::Pem::new(tag.to_string(), der.to_vec()))
}
