//! Web-server installer port (spec.md §1: "referenced only by
//! interface, not implemented here"). Kept trait-only, no default,
//! mirroring how the teacher leaves `CertCache`/`AccountCache`
//! implementation entirely to the caller via `caches::*`.

use async_trait::async_trait;

use crate::error::MisconfigurationError;

/// Applies a certificate/key/chain to whatever serves it. No
/// implementation ships in this crate; it's provided by the consumer
/// (an nginx/apache/reverse-proxy configurator, a k8s secret writer),
/// ported from `letsencrypt_nginx.configurator.NginxConfigurator`'s
/// `deploy_cert`/`save`/`restart`/`enhance`.
#[async_trait]
pub trait Installer: Send + Sync {
    /// Stages `cert_path`/`key_path`/`chain_path` for `domain`.
    async fn deploy_cert(
        &self,
        domain: &str,
        cert_path: &str,
        key_path: &str,
        chain_path: Option<&str>,
    ) -> Result<(), MisconfigurationError>;

    /// Commits whatever `deploy_cert`/`enhance` staged, optionally
    /// under a named checkpoint.
    async fn save(&self, title: Option<&str>) -> Result<(), MisconfigurationError>;

    /// Reloads/restarts the server so a saved change takes effect.
    async fn restart(&self) -> Result<(), MisconfigurationError>;

    /// Any config change the installer wants to make permanent
    /// (enabling a vhost, forcing HTTPS redirects); distinct from
    /// `deploy_cert` so the core can call it independently.
    async fn enhance(&self, domain: &str, enhancement: &str) -> Result<(), MisconfigurationError>;
}
