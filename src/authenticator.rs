//! Authenticator port (spec.md §6.2), implemented by whatever actually
//! provisions proof of control (a web server, a DNS API, a recovery
//! mailbox). Two disjoint families are required, mirroring the
//! original's split between `dv_auth` and `continuity_auth` on
//! `letsencrypt.client.Client`.

use async_trait::async_trait;

use crate::achallenges::AnnotatedChallenge;
use crate::error::AuthorizationError;
use crate::messages::ChallengeKind;
use crate::network::ChallengeResponse;

/// Common shape of both authenticator families (spec.md §6.2):
/// advertise preference order, perform a batch, then release whatever
/// `perform` provisioned.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Challenge variants this authenticator can complete for
    /// `domain`, most preferred first, no duplicates.
    fn get_chall_pref(&self, domain: &str) -> Vec<ChallengeKind>;

    /// Attempts every achall in `achalls`, returning one response per
    /// input in the same order (implementers MUST return a vector of
    /// equal length; element `None` means "not yet ready").
    async fn perform(
        &self,
        achalls: &[AnnotatedChallenge],
    ) -> Result<Vec<Option<ChallengeResponse>>, AuthorizationError>;

    /// Releases whatever `perform` provisioned for `achalls`. Must be
    /// idempotent per achall and safe to call on a subset that never
    /// reached `perform`.
    async fn cleanup(&self, achalls: &[AnnotatedChallenge]);
}

/// Proves control of a DNS identifier (DVSNI, SimpleHTTP, DNS family).
pub trait DvAuthenticator: Authenticator {}
impl<T: Authenticator> DvAuthenticator for T {}

/// Proves ongoing possession of an account (recovery family).
pub trait ContinuityAuthenticator: Authenticator {}
impl<T: Authenticator> ContinuityAuthenticator for T {}
