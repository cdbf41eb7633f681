//! Annotated challenges: a `ChallengeBody` paired with the context an
//! authenticator needs to act on it, ported from
//! `letsencrypt.achallenges` (`challb_to_achall` in `auth_handler.py`).

use std::sync::Arc;

use crate::crypto::AccountKeyHandle;
use crate::messages::ChallengeBody;

/// A challenge bound to the domain it was issued for and the account
/// key whose possession it may need to prove (e.g. to derive a key
/// authorization). `key` is `None` for challenges that don't need one.
#[derive(Clone)]
pub struct AnnotatedChallenge {
    pub challb: ChallengeBody,
    pub domain: String,
    pub key: Option<Arc<AccountKeyHandle>>,
}

impl AnnotatedChallenge {
    pub fn new(challb: ChallengeBody, domain: impl Into<String>, key: Option<Arc<AccountKeyHandle>>) -> Self {
        AnnotatedChallenge {
            challb,
            domain: domain.into(),
            key,
        }
    }
}
