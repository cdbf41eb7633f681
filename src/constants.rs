//! Configuration data rather than code, per spec.md §9
//! ("Exclusive-group constants: configuration data, not code").

use crate::messages::ChallengeKind;

/// Groups of challenge variants that are mutually exclusive with each
/// other. Two challenges conflict iff both appear in the same group.
///
/// Ported from `letsencrypt.constants.EXCLUSIVE_CHALLENGES`: DVSNI and
/// SimpleHTTP both prove control by presenting something over the
/// network on the target domain, so a CA offering a combination with
/// both is satisfied by either one alone.
pub const EXCLUSIVE_CHALLENGE_GROUPS: &[&[ChallengeKind]] =
    &[&[ChallengeKind::DVSNI, ChallengeKind::SimpleHTTP]];

/// Default poll cadence (spec.md §4.4.3).
pub const DEFAULT_MIN_SLEEP_SECS: u64 = 3;

/// Default poll round budget (spec.md §4.4.3).
pub const DEFAULT_MAX_ROUNDS: usize = 15;

/// Default account/cert key size in bits, carried over from the
/// original's `rsa_key_size` even though key generation now produces
/// ECDSA P-256 keys (see DESIGN.md) — kept as a config knob for
/// callers who supply their own `AccountKeyGenerator`.
pub const DEFAULT_KEY_BITS: u32 = 2048;
