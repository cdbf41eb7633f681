//! Authorization state machine (spec.md §4.4), ported from
//! `letsencrypt.auth_handler.AuthHandler`. `dv_c`/`cont_c`/the
//! domain→authzr map are all allocated fresh inside
//! [`AuthHandler::get_authorizations`] rather than held as fields, per
//! spec.md §9 ("Mutable handler state ... MUST NOT be shared across
//! concurrent invocations").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::account::Account;
use crate::achallenges::AnnotatedChallenge;
use crate::authenticator::Authenticator;
use crate::constants::{DEFAULT_MAX_ROUNDS, DEFAULT_MIN_SLEEP_SECS};
use crate::error::AuthorizationError;
use crate::messages::{AuthorizationResource, Status};
use crate::network::Network;

/// Drives challenge selection, dispatch, and polling for a batch of
/// domains against one `Network` and two `Authenticator`s.
pub struct AuthHandler<'a> {
    dv_auth: &'a dyn Authenticator,
    cont_auth: &'a dyn Authenticator,
    network: &'a dyn Network,
    account: &'a Account,
    min_sleep: Duration,
    max_rounds: usize,
}

impl<'a> AuthHandler<'a> {
    pub fn new(
        dv_auth: &'a dyn Authenticator,
        cont_auth: &'a dyn Authenticator,
        network: &'a dyn Network,
        account: &'a Account,
    ) -> Self {
        AuthHandler {
            dv_auth,
            cont_auth,
            network,
            account,
            min_sleep: Duration::from_secs(DEFAULT_MIN_SLEEP_SECS),
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }

    pub fn with_poll_cadence(mut self, min_sleep: Duration, max_rounds: usize) -> Self {
        self.min_sleep = min_sleep;
        self.max_rounds = max_rounds;
        self
    }

    /// Every authorization must reach a terminal status and actually
    /// be `valid`, or this fails with `Incomplete` — ported from
    /// `AuthHandler.verify_authzr_complete` (spec.md §4.4.2 step 4,
    /// literal scenario 3 in §8).
    pub fn verify_authzr_complete(
        valid: &[AuthorizationResource],
        requested_domains: &[String],
    ) -> Result<(), AuthorizationError> {
        if valid.len() != requested_domains.len() {
            return Err(AuthorizationError::Incomplete);
        }
        Ok(())
    }

    /// Requests, plans, dispatches, and polls an authorization for
    /// every domain in `domains` (spec.md §4.4.2). Returns only the
    /// authorizations that reached `valid`; in `best_effort` mode
    /// domains that fail or time out are silently dropped, otherwise
    /// the first such domain raises an `AuthorizationError`.
    pub async fn get_authorizations(
        &self,
        domains: &[String],
        new_authz_uri: &str,
        best_effort: bool,
    ) -> Result<Vec<AuthorizationResource>, AuthorizationError> {
        // --- Requested: fetch one authorization per domain. ---
        let mut authzr: HashMap<String, AuthorizationResource> = HashMap::new();
        for domain in domains {
            let resource = self
                .network
                .request_domain_challenges(domain, new_authz_uri)
                .await?;
            authzr.insert(domain.clone(), resource);
        }

        // --- Planned: pick a challenge set per domain, split by family. ---
        let mut dv_c: Vec<AnnotatedChallenge> = Vec::new();
        let mut cont_c: Vec<AnnotatedChallenge> = Vec::new();

        for domain in domains {
            let resource = &authzr[domain];
            // Preferences are per-domain, sourced from the two
            // authenticators (spec.md §6.2 `get_chall_pref`), continuity
            // ranked ahead of DV to match the dispatch order in §5.
            let mut preferences = self.cont_auth.get_chall_pref(domain);
            preferences.extend(self.dv_auth.get_chall_pref(domain));
            let path = crate::planner::gen_challenge_path(&resource.body, &preferences)?;
            for challb in path {
                // DV achalls carry the account key so the authenticator
                // can derive a key authorization; continuity achalls
                // never need it (ported from `challb_to_achall`).
                let key = challb
                    .kind()
                    .is_dv()
                    .then(|| Arc::new(self.account.key.clone()));
                let achall = AnnotatedChallenge::new(challb.clone(), domain.clone(), key);
                if challb.kind().is_continuity() {
                    cont_c.push(achall);
                } else {
                    dv_c.push(achall);
                }
            }
        }

        // Run the dispatch/respond/poll loop; on any error (including
        // a perform() failure) the full remaining dv_c/cont_c is
        // cleaned up before the error propagates (spec.md §4.4.2, "On
        // any exception from authenticator perform, execute full
        // cleanup").
        let valid_domains = self.drive(&mut authzr, dv_c, cont_c, best_effort).await?;

        let valid: Vec<AuthorizationResource> = valid_domains
            .into_iter()
            .map(|domain| authzr.remove(&domain).expect("domain was just polled"))
            .collect();

        if !best_effort {
            Self::verify_authzr_complete(&valid, domains)?;
        }

        Ok(valid)
    }

    /// The `while self.dv_c or self.cont_c` loop from
    /// `AuthHandler.get_authorizations`: each iteration performs every
    /// still-outstanding achall, sends responses for the ones that
    /// came back truthy, polls those until they terminalize, and
    /// leaves the rest (a falsy/`None` response — "not yet ready") in
    /// place to be retried on the next iteration (spec.md §4.4.2 step 3).
    async fn drive(
        &self,
        authzr: &mut HashMap<String, AuthorizationResource>,
        mut dv_c: Vec<AnnotatedChallenge>,
        mut cont_c: Vec<AnnotatedChallenge>,
        best_effort: bool,
    ) -> Result<Vec<String>, AuthorizationError> {
        // A `HashSet`, not a `Vec`: a domain whose authorization
        // already flipped to `valid` stays `valid` on every later
        // poll, so it can be confirmed again in a subsequent outer
        // round (e.g. once its other family's achall finally answers)
        // without that being a second, distinct completion.
        let mut valid_domains: std::collections::HashSet<String> = std::collections::HashSet::new();

        while !dv_c.is_empty() || !cont_c.is_empty() {
            // --- Dispatched: perform continuity first, then DV (§5). ---
            let cont_resp = if cont_c.is_empty() {
                Ok(Vec::new())
            } else {
                self.cont_auth.perform(&cont_c).await
            };
            let cont_resp = match cont_resp {
                Ok(resp) => resp,
                Err(err) => {
                    self.cont_auth.cleanup(&cont_c).await;
                    self.dv_auth.cleanup(&dv_c).await;
                    return Err(err);
                }
            };
            assert_eq!(
                cont_resp.len(),
                cont_c.len(),
                "continuity authenticator returned the wrong number of responses"
            );

            let dv_resp = if dv_c.is_empty() {
                Ok(Vec::new())
            } else {
                self.dv_auth.perform(&dv_c).await
            };
            let dv_resp = match dv_resp {
                Ok(resp) => resp,
                Err(err) => {
                    self.cont_auth.cleanup(&cont_c).await;
                    self.dv_auth.cleanup(&dv_c).await;
                    return Err(err);
                }
            };
            assert_eq!(
                dv_resp.len(),
                dv_c.len(),
                "DV authenticator returned the wrong number of responses"
            );

            // --- Respond: answer the ones with a response this round,
            // retry the rest next iteration. ---
            let mut active: Vec<AnnotatedChallenge> = Vec::new();
            let mut remaining_cont = Vec::new();
            for (achall, resp) in cont_c.into_iter().zip(cont_resp) {
                match resp {
                    Some(resp) => {
                        self.network.answer_challenge(&achall.challb, resp).await?;
                        active.push(achall);
                    }
                    None => remaining_cont.push(achall),
                }
            }
            let mut remaining_dv = Vec::new();
            for (achall, resp) in dv_c.into_iter().zip(dv_resp) {
                match resp {
                    Some(resp) => {
                        self.network.answer_challenge(&achall.challb, resp).await?;
                        active.push(achall);
                    }
                    None => remaining_dv.push(achall),
                }
            }

            let mut by_domain: HashMap<String, Vec<AnnotatedChallenge>> = HashMap::new();
            for achall in active {
                by_domain.entry(achall.domain.clone()).or_default().push(achall);
            }

            let poll_outcome = self.poll_challenges(authzr, &mut by_domain, best_effort).await;

            // Cleanup runs for every achall answered this round
            // regardless of how polling went (spec.md §4.4.2, cleanup
            // is unconditional on the poll outcome).
            let answered: Vec<AnnotatedChallenge> = by_domain.into_values().flatten().collect();
            let (answered_cont, answered_dv): (Vec<_>, Vec<_>) =
                answered.into_iter().partition(|a| a.challb.kind().is_continuity());
            self.cont_auth.cleanup(&answered_cont).await;
            self.dv_auth.cleanup(&answered_dv).await;

            match poll_outcome {
                Ok(newly_valid) => valid_domains.extend(newly_valid),
                Err(err) => return Err(err),
            }

            dv_c = remaining_dv;
            cont_c = remaining_cont;
        }

        Ok(valid_domains.into_iter().collect())
    }

    /// Polls each domain's still-active achalls until every one of
    /// them terminalizes or `max_rounds` elapses (spec.md §4.4.3),
    /// ported from `_poll_challenges`/`_handle_check`/`_get_chall_status`.
    async fn poll_challenges(
        &self,
        authzr: &mut HashMap<String, AuthorizationResource>,
        chall_update: &mut HashMap<String, Vec<AnnotatedChallenge>>,
        best_effort: bool,
    ) -> Result<Vec<String>, AuthorizationError> {
        let mut dom_to_check: Vec<String> = chall_update.keys().cloned().collect();
        let mut comp_domains: Vec<String> = Vec::new();

        for _round in 0..self.max_rounds {
            if dom_to_check.is_empty() {
                break;
            }

            let mut still_pending = Vec::new();
            for domain in &dom_to_check {
                let resource = &authzr[domain];
                let (updated, poll_response) = self.network.poll(resource).await?;
                let sleep_for = poll_response.retry_after.unwrap_or(self.min_sleep);

                if updated.body.status == Status::Valid {
                    authzr.insert(domain.clone(), updated);
                    comp_domains.push(domain.clone());
                    continue;
                }

                let achalls = chall_update
                    .get_mut(domain)
                    .expect("domain tracked in chall_update");
                let mut completed = Vec::new();
                let mut failed = false;
                for achall in achalls.iter() {
                    let status = updated
                        .body
                        .challenges
                        .iter()
                        .find(|c| c.kind() == achall.challb.kind())
                        .map(|c| c.status)
                        .ok_or(AuthorizationError::ChallengeNotFound)?;
                    match status {
                        Status::Valid => completed.push(achall.challb.kind()),
                        Status::Invalid => failed = true,
                        _ => {}
                    }
                }
                authzr.insert(domain.clone(), updated);

                if completed.len() == achalls.len() {
                    comp_domains.push(domain.clone());
                } else if failed {
                    if best_effort {
                        comp_domains.push(domain.clone());
                    } else {
                        return Err(AuthorizationError::Failed {
                            domain: domain.clone(),
                        });
                    }
                } else {
                    achalls.retain(|a| !completed.contains(&a.challb.kind()));
                    still_pending.push(domain.clone());
                    tokio::time::sleep(sleep_for).await;
                }
            }
            dom_to_check = still_pending;
        }

        let valid_domains = comp_domains
            .into_iter()
            .filter(|d| authzr[d].body.status == Status::Valid)
            .collect();
        Ok(valid_domains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authenticator::mock::ScriptedAuthenticator;
    use crate::crypto::EcdsaKeyGenerator;
    use crate::messages::{Authorization, Challenge, ChallengeBody, ChallengeKind, Identifier};
    use crate::network::mock::{MockNetwork, PollScript};
    use std::sync::Mutex;

    fn authz(domain: &str) -> Authorization {
        Authorization {
            identifier: Identifier::dns(domain),
            challenges: vec![
                ChallengeBody {
                    uri: format!("http://{domain}/c0"),
                    status: Status::Pending,
                    chall: Challenge::SimpleHTTP { token: "T".into() },
                    validated: None,
                    error: None,
                },
                ChallengeBody {
                    uri: format!("http://{domain}/c1"),
                    status: Status::Pending,
                    chall: Challenge::DNS { token: "U".into() },
                    validated: None,
                    error: None,
                },
                ChallengeBody {
                    uri: format!("http://{domain}/c2"),
                    status: Status::Pending,
                    chall: Challenge::RecoveryToken {},
                    validated: None,
                    error: None,
                },
            ],
            combinations: vec![vec![0, 2], vec![1, 2]],
            status: Status::Pending,
        }
    }

    async fn test_account() -> Account {
        let key = EcdsaKeyGenerator.generate().await.unwrap();
        Account::new(key, None, None)
    }

    #[tokio::test]
    async fn scenario_1_single_domain_issues_after_one_round() {
        let net = MockNetwork::new();
        net.seed_authorization("example.com", authz("example.com"), PollScript::ValidAfter(1));

        let dv = ScriptedAuthenticator {
            prefs: vec![ChallengeKind::SimpleHTTP],
            accepts: vec![ChallengeKind::SimpleHTTP],
            cleaned_up: Mutex::new(Vec::new()),
        };
        let cont = ScriptedAuthenticator {
            prefs: vec![ChallengeKind::RecoveryToken],
            accepts: vec![ChallengeKind::RecoveryToken],
            cleaned_up: Mutex::new(Vec::new()),
        };

        let account = test_account().await;
        let handler = AuthHandler::new(&dv, &cont, &net, &account);
        let result = handler
            .get_authorizations(
                &["example.com".to_string()],
                "https://example.invalid/authz/new",
                false,
            )
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].body.status, Status::Valid);
    }

    #[tokio::test]
    async fn scenario_2_best_effort_drops_failing_domain() {
        let net = MockNetwork::new();
        net.seed_authorization("a.test", authz("a.test"), PollScript::ValidAfter(1));
        net.seed_authorization("b.test", authz("b.test"), PollScript::Fixed(Status::Invalid));

        let dv = ScriptedAuthenticator {
            prefs: vec![ChallengeKind::SimpleHTTP],
            accepts: vec![ChallengeKind::SimpleHTTP],
            cleaned_up: Mutex::new(Vec::new()),
        };
        let cont = ScriptedAuthenticator {
            prefs: vec![ChallengeKind::RecoveryToken],
            accepts: vec![ChallengeKind::RecoveryToken],
            cleaned_up: Mutex::new(Vec::new()),
        };

        let account = test_account().await;
        let handler = AuthHandler::new(&dv, &cont, &net, &account);
        let result = handler
            .get_authorizations(
                &["a.test".to_string(), "b.test".to_string()],
                "https://example.invalid/authz/new",
                true,
            )
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].body.identifier.value, "a.test");
    }

    #[tokio::test]
    async fn scenario_3_max_rounds_exhausted_yields_empty_then_incomplete() {
        let net = MockNetwork::new();
        net.seed_authorization("stuck.test", authz("stuck.test"), PollScript::Fixed(Status::Pending));

        let dv = ScriptedAuthenticator {
            prefs: vec![ChallengeKind::SimpleHTTP],
            accepts: vec![ChallengeKind::SimpleHTTP],
            cleaned_up: Mutex::new(Vec::new()),
        };
        let cont = ScriptedAuthenticator {
            prefs: vec![ChallengeKind::RecoveryToken],
            accepts: vec![ChallengeKind::RecoveryToken],
            cleaned_up: Mutex::new(Vec::new()),
        };

        let account = test_account().await;
        let handler = AuthHandler::new(&dv, &cont, &net, &account)
            .with_poll_cadence(Duration::from_millis(1), 2);
        let domains = vec!["stuck.test".to_string()];
        let result = handler
            .get_authorizations(
                &domains,
                "https://example.invalid/authz/new",
                true,
            )
            .await
            .unwrap();

        assert!(result.is_empty());
        assert!(matches!(
            AuthHandler::verify_authzr_complete(&result, &domains),
            Err(AuthorizationError::Incomplete)
        ));
    }

    /// Returns `None` (not yet ready) on its first `perform()` call for
    /// a given achall, then `Some` on every call after — used to
    /// exercise the outer retry loop in `drive` (spec.md §4.4.2 step 3).
    struct FlakyAuthenticator {
        prefs: Vec<ChallengeKind>,
        accepts: Vec<ChallengeKind>,
        calls: Mutex<usize>,
    }

    #[async_trait::async_trait]
    impl Authenticator for FlakyAuthenticator {
        fn get_chall_pref(&self, _domain: &str) -> Vec<ChallengeKind> {
            self.prefs.clone()
        }

        async fn perform(
            &self,
            achalls: &[AnnotatedChallenge],
        ) -> Result<Vec<Option<crate::network::ChallengeResponse>>, AuthorizationError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            let first_call = *calls == 1;
            Ok(achalls
                .iter()
                .map(|a| {
                    if first_call {
                        None
                    } else if self.accepts.contains(&a.challb.kind()) {
                        Some(crate::network::ChallengeResponse(serde_json::json!({"ok": true})))
                    } else {
                        None
                    }
                })
                .collect())
        }

        async fn cleanup(&self, _achalls: &[AnnotatedChallenge]) {}
    }

    #[tokio::test]
    async fn retries_perform_until_authenticator_is_ready() {
        let net = MockNetwork::new();
        net.seed_authorization("example.com", authz("example.com"), PollScript::ValidAfter(1));

        let dv = FlakyAuthenticator {
            prefs: vec![ChallengeKind::SimpleHTTP],
            accepts: vec![ChallengeKind::SimpleHTTP],
            calls: Mutex::new(0),
        };
        let cont = ScriptedAuthenticator {
            prefs: vec![ChallengeKind::RecoveryToken],
            accepts: vec![ChallengeKind::RecoveryToken],
            cleaned_up: Mutex::new(Vec::new()),
        };

        let account = test_account().await;
        let handler = AuthHandler::new(&dv, &cont, &net, &account)
            .with_poll_cadence(Duration::from_millis(1), 5);
        let result = handler
            .get_authorizations(
                &["example.com".to_string()],
                "https://example.invalid/authz/new",
                false,
            )
            .await
            .unwrap();

        assert_eq!(*dv.calls.lock().unwrap(), 2);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].body.status, Status::Valid);
    }

    /// Captures whether each achall it was handed carried an account
    /// key, to check §4.4.2's "DV achalls carry the account key"
    /// threading without depending on a specific key representation.
    struct KeyCapturingAuthenticator {
        prefs: Vec<ChallengeKind>,
        accepts: Vec<ChallengeKind>,
        saw_keys: Mutex<Vec<bool>>,
    }

    #[async_trait::async_trait]
    impl Authenticator for KeyCapturingAuthenticator {
        fn get_chall_pref(&self, _domain: &str) -> Vec<ChallengeKind> {
            self.prefs.clone()
        }

        async fn perform(
            &self,
            achalls: &[AnnotatedChallenge],
        ) -> Result<Vec<Option<crate::network::ChallengeResponse>>, AuthorizationError> {
            let mut saw_keys = self.saw_keys.lock().unwrap();
            saw_keys.extend(achalls.iter().map(|a| a.key.is_some()));
            Ok(achalls
                .iter()
                .map(|a| {
                    if self.accepts.contains(&a.challb.kind()) {
                        Some(crate::network::ChallengeResponse(serde_json::json!({"ok": true})))
                    } else {
                        None
                    }
                })
                .collect())
        }

        async fn cleanup(&self, _achalls: &[AnnotatedChallenge]) {}
    }

    #[tokio::test]
    async fn dv_achalls_carry_the_account_key_and_continuity_achalls_do_not() {
        let net = MockNetwork::new();
        net.seed_authorization("example.com", authz("example.com"), PollScript::ValidAfter(1));

        let dv = KeyCapturingAuthenticator {
            prefs: vec![ChallengeKind::SimpleHTTP],
            accepts: vec![ChallengeKind::SimpleHTTP],
            saw_keys: Mutex::new(Vec::new()),
        };
        let cont = KeyCapturingAuthenticator {
            prefs: vec![ChallengeKind::RecoveryToken],
            accepts: vec![ChallengeKind::RecoveryToken],
            saw_keys: Mutex::new(Vec::new()),
        };

        let account = test_account().await;
        let handler = AuthHandler::new(&dv, &cont, &net, &account);
        handler
            .get_authorizations(
                &["example.com".to_string()],
                "https://example.invalid/authz/new",
                false,
            )
            .await
            .unwrap();

        assert_eq!(*dv.saw_keys.lock().unwrap(), vec![true]);
        assert_eq!(*cont.saw_keys.lock().unwrap(), vec![false]);
    }

    /// Always returns one fewer response than it was handed achalls,
    /// violating the `perform` ordering guarantee of spec.md §5/§6.2.
    struct MismatchedLengthAuthenticator {
        prefs: Vec<ChallengeKind>,
    }

    #[async_trait::async_trait]
    impl Authenticator for MismatchedLengthAuthenticator {
        fn get_chall_pref(&self, _domain: &str) -> Vec<ChallengeKind> {
            self.prefs.clone()
        }

        async fn perform(
            &self,
            achalls: &[AnnotatedChallenge],
        ) -> Result<Vec<Option<crate::network::ChallengeResponse>>, AuthorizationError> {
            Ok(achalls
                .iter()
                .skip(1)
                .map(|a| Some(crate::network::ChallengeResponse(serde_json::json!({ "ok": !a.domain.is_empty() }))))
                .collect())
        }

        async fn cleanup(&self, _achalls: &[AnnotatedChallenge]) {}
    }

    /// Scenario 6 (spec.md §8): "Two authenticator `perform` calls
    /// return responses with lengths equal to their inputs; violation
    /// fails the invariant assertion." — exercises the `assert_eq!` at
    /// `drive`'s response-length checks.
    #[tokio::test]
    #[should_panic(expected = "wrong number of responses")]
    async fn perform_returning_mismatched_length_response_fails_the_invariant_assertion() {
        let net = MockNetwork::new();
        net.seed_authorization("example.com", authz("example.com"), PollScript::ValidAfter(1));

        let dv = MismatchedLengthAuthenticator {
            prefs: vec![ChallengeKind::SimpleHTTP],
        };
        let cont = ScriptedAuthenticator {
            prefs: vec![ChallengeKind::RecoveryToken],
            accepts: vec![ChallengeKind::RecoveryToken],
            cleaned_up: Mutex::new(Vec::new()),
        };

        let account = test_account().await;
        let handler = AuthHandler::new(&dv, &cont, &net, &account);
        let _ = handler
            .get_authorizations(
                &["example.com".to_string()],
                "https://example.invalid/authz/new",
                false,
            )
            .await;
    }
}
