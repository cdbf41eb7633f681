//! Challenge path planning: picking which subset of a server's
//! offered challenges to attempt (spec.md §4.3, §9), ported from
//! `letsencrypt.auth_handler._find_smart_path` /
//! `_find_dumb_path` / `mutually_exclusive` / `gen_challenge_path`.

use crate::constants::EXCLUSIVE_CHALLENGE_GROUPS;
use crate::error::AuthorizationError;
use crate::messages::{Authorization, ChallengeBody, ChallengeKind};

/// True iff `a` and `b` both appear in some configured exclusive
/// group, i.e. satisfying one makes the other redundant in a way the
/// server won't accept together.
pub fn mutually_exclusive(a: ChallengeKind, b: ChallengeKind) -> bool {
    EXCLUSIVE_CHALLENGE_GROUPS
        .iter()
        .any(|group| group.contains(&a) && group.contains(&b))
}

/// Ranks each server-proposed combination by the sum of each member's
/// position in `preferences` (lower is better) and returns the
/// lowest-cost combination whose every member is in `preferences`.
/// Ties favor the first-encountered combination (spec.md §8).
fn find_smart_path<'a>(
    authz: &'a Authorization,
    preferences: &[ChallengeKind],
) -> Option<Vec<&'a ChallengeBody>> {
    // sum(ranks)+1 over 0-based ranks, i.e. n(n-1)/2+1 (spec.md §4.3).
    // Poisons any combo containing an unsupported variant without
    // ever being reachable by a combo of only-supported variants.
    let max_cost: usize = preferences.iter().enumerate().map(|(i, _)| i).sum::<usize>() + 1;
    let mut best: Option<(usize, Vec<&ChallengeBody>)> = None;

    for combo in authz.resolved_combinations() {
        let mut cost = 0usize;
        let mut supported = true;
        for challb in &combo {
            match preferences.iter().position(|&p| p == challb.kind()) {
                Some(rank) => cost += rank,
                None => {
                    supported = false;
                    break;
                }
            }
        }
        let cost = if supported { cost } else { max_cost };
        if cost >= max_cost {
            continue;
        }
        if best.as_ref().map(|(best_cost, _)| cost < *best_cost).unwrap_or(true) {
            best = Some((cost, combo));
        }
    }

    best.map(|(_, combo)| combo)
}

/// Greedily walks `preferences` in order, taking every offered
/// challenge of that variant that is not mutually exclusive with one
/// already chosen (spec.md §4.3: "append every offered challenge of
/// that variant"), not just the first. Asserts the caller passed no
/// duplicate preferences, mirroring the original's `assert` (a client
/// bug, not a recoverable condition).
fn find_dumb_path<'a>(
    authz: &'a Authorization,
    preferences: &[ChallengeKind],
) -> Vec<&'a ChallengeBody> {
    assert!(
        {
            let mut seen = std::collections::HashSet::new();
            preferences.iter().all(|p| seen.insert(*p))
        },
        "duplicate challenge preference"
    );

    let mut chosen: Vec<&ChallengeBody> = Vec::new();
    for &pref in preferences {
        for challb in authz.challenges.iter().filter(|c| c.kind() == pref) {
            if !chosen.iter().any(|c| mutually_exclusive(c.kind(), challb.kind())) {
                chosen.push(challb);
            }
        }
    }
    chosen
}

/// Picks the set of challenges to attempt for `authz`, preferring the
/// server's `combinations` (smart path) when present and supported,
/// falling back to a greedy walk over `preferences` (dumb path)
/// otherwise (spec.md §4.3, §8, `gen_challenge_path`).
pub fn gen_challenge_path<'a>(
    authz: &'a Authorization,
    preferences: &[ChallengeKind],
) -> Result<Vec<&'a ChallengeBody>, AuthorizationError> {
    if !authz.combinations.is_empty() {
        return find_smart_path(authz, preferences).ok_or(AuthorizationError::NoSupportedCombination);
    }
    let path = find_dumb_path(authz, preferences);
    if path.is_empty() {
        return Err(AuthorizationError::NoSupportedCombination);
    }
    Ok(path)
}
