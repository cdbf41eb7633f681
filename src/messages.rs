//! Canonical ACME wire types and their JSON mapping (spec.md §3, §4.1,
//! §6.3). Every type here is `Serialize + Deserialize`; [`JsonMessage`]
//! is a thin convenience wrapper over that, matching the
//! `to_partial_json`/`to_json`/`from_json` contract spec.md describes,
//! the way the original `acme.jose.JSONDeSerializable` base class did.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::DeserializationError;

/// `to_partial_json`/`to_json`/`from_json` over a plain
/// `Serialize + Deserialize` type. `to_partial_json` and `to_json` are
/// distinguished in the original by whether nested values are
/// recursively realized; going through `serde_json::Value` always
/// realizes everything, so both methods are equivalent here.
pub trait JsonMessage: Serialize + for<'de> Deserialize<'de> {
    fn to_partial_json(&self) -> serde_json::Value
    where
        Self: Sized,
    {
        serde_json::to_value(self).expect("acme-core message types always serialize")
    }

    fn to_json(&self) -> serde_json::Value
    where
        Self: Sized,
    {
        self.to_partial_json()
    }

    fn from_json(value: serde_json::Value) -> Result<Self, DeserializationError>
    where
        Self: Sized,
    {
        serde_json::from_value(value).map_err(DeserializationError::from)
    }
}

impl<T: Serialize + for<'de> Deserialize<'de>> JsonMessage for T {}

mod base64_bytes {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        URL_SAFE_NO_PAD
            .decode(s.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Identifier type tag. Closed: an unrecognized value is a
/// deserialization failure rather than a silently-accepted `Other`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierType {
    Dns,
}

/// `{ type: "dns", value: fqdn }` (spec.md §3). Immutable.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub typ: IdentifierType,
    pub value: String,
}

impl Identifier {
    pub fn dns(fqdn: impl Into<String>) -> Self {
        Identifier {
            typ: IdentifierType::Dns,
            value: fqdn.into(),
        }
    }
}

/// Challenge variant tag, used by the planner and by achall
/// bookkeeping. Family membership (DV vs continuity) is a match over
/// this closed enum, i.e. part of the type rather than a runtime
/// lookup (spec.md §9).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChallengeKind {
    DVSNI,
    SimpleHTTP,
    DNS,
    RecoveryToken,
    RecoveryContact,
    ProofOfPossession,
}

impl ChallengeKind {
    /// DV challenges prove control of a DNS identifier.
    pub fn is_dv(self) -> bool {
        matches!(
            self,
            ChallengeKind::DVSNI | ChallengeKind::SimpleHTTP | ChallengeKind::DNS
        )
    }

    /// Continuity challenges prove ongoing possession of an account.
    pub fn is_continuity(self) -> bool {
        !self.is_dv()
    }
}

/// A server-issued task whose completion proves control or
/// continuity (spec.md §3). Two variants are mutually exclusive iff
/// they appear together in a configured exclusive group
/// (`constants::EXCLUSIVE_CHALLENGE_GROUPS`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Challenge {
    #[serde(rename = "dvsni")]
    DVSNI { r: String, nonce: String },
    #[serde(rename = "simpleHttp")]
    SimpleHTTP { token: String },
    #[serde(rename = "dns")]
    DNS { token: String },
    #[serde(rename = "recoveryToken")]
    RecoveryToken {},
    #[serde(rename = "recoveryContact")]
    RecoveryContact {
        #[serde(skip_serializing_if = "Option::is_none", default)]
        activation_url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none", default)]
        success_url: Option<String>,
    },
    #[serde(rename = "proofOfPossession")]
    ProofOfPossession {
        alg: String,
        nonce: String,
        #[serde(default)]
        hints: serde_json::Value,
    },
}

impl Challenge {
    pub fn kind(&self) -> ChallengeKind {
        match self {
            Challenge::DVSNI { .. } => ChallengeKind::DVSNI,
            Challenge::SimpleHTTP { .. } => ChallengeKind::SimpleHTTP,
            Challenge::DNS { .. } => ChallengeKind::DNS,
            Challenge::RecoveryToken {} => ChallengeKind::RecoveryToken,
            Challenge::RecoveryContact { .. } => ChallengeKind::RecoveryContact,
            Challenge::ProofOfPossession { .. } => ChallengeKind::ProofOfPossession,
        }
    }

    /// The `token` proxied attribute for challenge variants that carry
    /// one (SimpleHTTP, DNS), mirroring `ChallengeBody.__getattr__`.
    pub fn token(&self) -> Option<&str> {
        match self {
            Challenge::SimpleHTTP { token } | Challenge::DNS { token } => Some(token),
            _ => None,
        }
    }
}

/// Shared status registry for both `Authorization.status` and
/// `ChallengeBody.status` (the original acme-spec draft used one
/// `_Constant`-backed set of `STATUS_*` values for both). Transitions
/// are monotonic: `pending` -> `processing` -> one of the terminals
/// `{valid, invalid, revoked}`, never back out of a terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Processing,
    Valid,
    Invalid,
    Revoked,
    Unknown,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Valid | Status::Invalid | Status::Revoked)
    }
}

/// `{ uri, status, chall, validated?, error? }` (spec.md §3).
/// Immutable after the server echoes it back; proxies `chall`'s
/// attributes for callers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChallengeBody {
    pub uri: String,
    pub status: Status,
    #[serde(flatten)]
    pub chall: Challenge,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub validated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<Error>,
}

impl ChallengeBody {
    pub fn kind(&self) -> ChallengeKind {
        self.chall.kind()
    }

    pub fn token(&self) -> Option<&str> {
        self.chall.token()
    }
}

/// `{ identifier, challenges, combinations, status }` (spec.md §3).
/// `combinations` is a set of index-subsets each individually
/// sufficient; when absent, any mutual-exclusion-consistent subset is
/// acceptable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Authorization {
    pub identifier: Identifier,
    pub challenges: Vec<ChallengeBody>,
    #[serde(default)]
    pub combinations: Vec<Vec<usize>>,
    #[serde(default = "default_unknown_status")]
    pub status: Status,
}

fn default_unknown_status() -> Status {
    Status::Unknown
}

impl Authorization {
    /// The combinations resolved to their actual `ChallengeBody`
    /// values, ported from `Authorization.resolved_combinations`.
    pub fn resolved_combinations(&self) -> Vec<Vec<&ChallengeBody>> {
        self.combinations
            .iter()
            .map(|combo| combo.iter().map(|&i| &self.challenges[i]).collect())
            .collect()
    }
}

/// `{ body, uri, new_cert_uri }` — owned by the auth handler, keyed
/// by domain (spec.md §3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationResource {
    pub body: Authorization,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub new_cert_uri: Option<String>,
}

/// Opaque, hash-stable public-key JSON. Building a JWK from
/// already-generated public key material is message formatting, not
/// an in-process crypto implementation, so it stays in the message
/// schema; actually signing with it happens in the (out-of-scope)
/// `Network` port implementation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Jwk(pub serde_json::Value);

impl Jwk {
    /// Builds the standard `{"kty":"EC","crv":"P-256","x":...,"y":...}`
    /// encoding from raw public key coordinates.
    pub fn ec_p256(x: &[u8], y: &[u8]) -> Self {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;
        Jwk(serde_json::json!({
            "kty": "EC",
            "crv": "P-256",
            "x": URL_SAFE_NO_PAD.encode(x),
            "y": URL_SAFE_NO_PAD.encode(y),
        }))
    }
}

impl PartialEq for Jwk {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for Jwk {}

impl std::hash::Hash for Jwk {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_string().hash(state)
    }
}

/// `{ key, contact, recovery_token, agreement }` (spec.md §3).
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Registration {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub key: Option<Jwk>,
    #[serde(default)]
    pub contact: Vec<String>,
    #[serde(
        rename = "recoveryToken",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub recovery_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub agreement: Option<String>,
}

impl Registration {
    /// Builds `contact` with `tel:` preceding `mailto:` (spec.md §3,
    /// §6.3, tested literally in §8).
    pub fn from_data(phone: Option<&str>, email: Option<&str>) -> Self {
        let mut contact = Vec::new();
        if let Some(phone) = phone {
            contact.push(format!("tel:{phone}"));
        }
        if let Some(email) = email {
            contact.push(format!("mailto:{email}"));
        }
        Registration {
            contact,
            ..Default::default()
        }
    }

    /// URIs with a `tel:` prefix, in order.
    pub fn phones(&self) -> Vec<&str> {
        self.contact
            .iter()
            .filter_map(|c| c.strip_prefix("tel:"))
            .collect()
    }

    /// URIs with a `mailto:` prefix, in order.
    pub fn emails(&self) -> Vec<&str> {
        self.contact
            .iter()
            .filter_map(|c| c.strip_prefix("mailto:"))
            .collect()
    }
}

/// `{ body, uri, new_authzr_uri, terms_of_service }` (spec.md §3).
/// Persisted in the account store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistrationResource {
    pub body: Registration,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub new_authzr_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub terms_of_service: Option<String>,
}

/// `{ csr, authorizations }` (spec.md §3). `csr` is DER, base64url on
/// the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CertificateRequest {
    #[serde(with = "base64_bytes")]
    pub csr: Vec<u8>,
    pub authorizations: Vec<String>,
}

/// `{ body, uri, cert_chain_uri, authzrs }` (spec.md §3). `body` is a
/// DER certificate, base64url on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CertificateResource {
    #[serde(with = "base64_bytes")]
    pub body: Vec<u8>,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cert_chain_uri: Option<String>,
    #[serde(default)]
    pub authzrs: Vec<String>,
}

/// `{ certificate }` with a `url(server)` helper (spec.md §4.1, §8).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Revocation {
    #[serde(with = "base64_bytes")]
    pub certificate: Vec<u8>,
}

impl Revocation {
    /// `<scheme>://<host>/acme/revoke-cert`, replacing any existing
    /// path (spec.md §4.1, §8 scenario 5).
    pub fn url(server: impl AsRef<str>) -> String {
        let server = server.as_ref();
        let without_scheme_sep = server.find("://").map(|i| i + 3).unwrap_or(0);
        let authority_end = server[without_scheme_sep..]
            .find('/')
            .map(|i| without_scheme_sep + i)
            .unwrap_or(server.len());
        format!("{}/acme/revoke-cert", &server[..authority_end])
    }
}

/// Error registry backing `Error.typ`. New members must update both
/// the wire-code table and `description()`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AcmeErrorType {
    Malformed,
    Unauthorized,
    ServerInternal,
    Tls,
    RateLimited,
    RejectedIdentifier,
    BadNonce,
    InvalidEmail,
    Dnssec,
    Connection,
}

impl AcmeErrorType {
    pub fn code(self) -> &'static str {
        match self {
            AcmeErrorType::Malformed => "malformed",
            AcmeErrorType::Unauthorized => "unauthorized",
            AcmeErrorType::ServerInternal => "serverInternal",
            AcmeErrorType::Tls => "tls",
            AcmeErrorType::RateLimited => "rateLimited",
            AcmeErrorType::RejectedIdentifier => "rejectedIdentifier",
            AcmeErrorType::BadNonce => "badNonce",
            AcmeErrorType::InvalidEmail => "invalidEmail",
            AcmeErrorType::Dnssec => "dnssec",
            AcmeErrorType::Connection => "connection",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "malformed" => AcmeErrorType::Malformed,
            "unauthorized" => AcmeErrorType::Unauthorized,
            "serverInternal" => AcmeErrorType::ServerInternal,
            "tls" => AcmeErrorType::Tls,
            "rateLimited" => AcmeErrorType::RateLimited,
            "rejectedIdentifier" => AcmeErrorType::RejectedIdentifier,
            "badNonce" => AcmeErrorType::BadNonce,
            "invalidEmail" => AcmeErrorType::InvalidEmail,
            "dnssec" => AcmeErrorType::Dnssec,
            "connection" => AcmeErrorType::Connection,
            _ => return None,
        })
    }

    pub fn description(self) -> &'static str {
        match self {
            AcmeErrorType::Malformed => "The request message was malformed",
            AcmeErrorType::Unauthorized => "The client lacks sufficient authorization",
            AcmeErrorType::ServerInternal => "The server experienced an internal error",
            AcmeErrorType::Tls => "The server received a TLS error during validation",
            AcmeErrorType::RateLimited => "There were too many requests of a given type",
            AcmeErrorType::RejectedIdentifier => {
                "The server will not issue for the identifier"
            }
            AcmeErrorType::BadNonce => "The client sent an unacceptable anti-replay nonce",
            AcmeErrorType::InvalidEmail => "The provided email for a registration was invalid",
            AcmeErrorType::Dnssec => "The server could not validate a DNSSEC signed domain",
            AcmeErrorType::Connection => {
                "The server could not connect to validation target"
            }
        }
    }
}

/// `{ typ, title?, detail? }` (spec.md §3). Wire `type` is
/// `urn:acme:error:<typ>`; any other prefix, or an unknown bare code,
/// is a deserialization failure (spec.md §4.1, §8).
#[derive(Clone, Debug, PartialEq)]
pub struct Error {
    pub typ: Option<AcmeErrorType>,
    pub title: Option<String>,
    pub detail: Option<String>,
}

impl std::hash::Hash for Error {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.typ.hash(state);
        self.title.hash(state);
        self.detail.hash(state);
    }
}

const ERROR_TYPE_PREFIX: &str = "urn:acme:error:";

impl Error {
    pub fn from_wire(
        typ: Option<String>,
        title: Option<String>,
        detail: Option<String>,
    ) -> Result<Self, DeserializationError> {
        let typ = match typ {
            None => None,
            Some(raw) => match raw.strip_prefix(ERROR_TYPE_PREFIX) {
                None => return Err(DeserializationError::MissingErrorPrefix(raw)),
                Some(code) => match AcmeErrorType::from_code(code) {
                    Some(t) => Some(t),
                    None => return Err(DeserializationError::UnknownErrorCode(code.to_string())),
                },
            },
        };
        Ok(Error { typ, title, detail })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(typ) = self.typ {
            parts.push(typ.code().to_string());
            parts.push(typ.description().to_string());
        }
        if let Some(detail) = &self.detail {
            parts.push(detail.clone());
        }
        write!(f, "{}", parts.join(" :: "))
    }
}

impl std::error::Error for Error {}

impl Serialize for Error {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(None)?;
        if let Some(typ) = self.typ {
            map.serialize_entry("type", &format!("{ERROR_TYPE_PREFIX}{}", typ.code()))?;
        }
        if let Some(title) = &self.title {
            map.serialize_entry("title", title)?;
        }
        if let Some(detail) = &self.detail {
            map.serialize_entry("detail", detail)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Error {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Wire {
            #[serde(rename = "type", default)]
            typ: Option<String>,
            #[serde(default)]
            title: Option<String>,
            #[serde(default)]
            detail: Option<String>,
        }
        let wire = Wire::deserialize(deserializer)?;
        Error::from_wire(wire.typ, wire.title, wire.detail).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_typ_prefix_round_trips() {
        let err = Error {
            typ: Some(AcmeErrorType::Malformed),
            title: Some("title".into()),
            detail: Some("foo".into()),
        };
        let json = err.to_partial_json();
        assert_eq!(json["type"], "urn:acme:error:malformed");
        let back = Error::from_json(json).unwrap();
        assert_eq!(back.typ, Some(AcmeErrorType::Malformed));
    }

    #[test]
    fn error_missing_prefix_fails() {
        let json = serde_json::json!({"type": "malformed"});
        assert!(Error::from_json(json).is_err());
    }

    #[test]
    fn error_unknown_code_fails() {
        let json = serde_json::json!({"type": "urn:acme:error:baz"});
        assert!(Error::from_json(json).is_err());
    }

    #[test]
    fn error_display_elides_null_leading_components() {
        let err = Error {
            typ: Some(AcmeErrorType::Malformed),
            title: None,
            detail: Some("foo".into()),
        };
        assert_eq!(
            err.to_string(),
            "malformed :: The request message was malformed :: foo"
        );

        let err = Error {
            typ: None,
            title: None,
            detail: Some("foo".into()),
        };
        assert_eq!(err.to_string(), "foo");
    }

    #[test]
    fn registration_from_data_orders_tel_before_mailto() {
        let reg = Registration::from_data(Some("1234"), Some("admin@foo.com"));
        assert_eq!(reg.contact, vec!["tel:1234", "mailto:admin@foo.com"]);
    }

    #[test]
    fn registration_phones_and_emails_filter_by_prefix() {
        let reg = Registration {
            contact: vec!["mailto:admin@foo.com".into(), "tel:1234".into()],
            ..Default::default()
        };
        assert_eq!(reg.phones(), vec!["1234"]);
        assert_eq!(reg.emails(), vec!["admin@foo.com"]);
    }

    #[test]
    fn challenge_body_round_trips_and_proxies_token() {
        let challb = ChallengeBody {
            uri: "http://challb".into(),
            status: Status::Valid,
            chall: Challenge::DNS {
                token: "foo".into(),
            },
            validated: None,
            error: None,
        };
        assert_eq!(challb.token(), Some("foo"));
        let json = challb.to_partial_json();
        assert_eq!(json["type"], "dns");
        let back = ChallengeBody::from_json(json).unwrap();
        assert_eq!(back, challb);
    }

    #[test]
    fn authorization_resolved_combinations() {
        let challbs = vec![
            ChallengeBody {
                uri: "http://c1".into(),
                status: Status::Valid,
                chall: Challenge::SimpleHTTP {
                    token: "a".into(),
                },
                validated: None,
                error: None,
            },
            ChallengeBody {
                uri: "http://c2".into(),
                status: Status::Valid,
                chall: Challenge::DNS { token: "b".into() },
                validated: None,
                error: None,
            },
            ChallengeBody {
                uri: "http://c3".into(),
                status: Status::Valid,
                chall: Challenge::RecoveryToken {},
                validated: None,
                error: None,
            },
        ];
        let authz = Authorization {
            identifier: Identifier::dns("example.com"),
            challenges: challbs.clone(),
            combinations: vec![vec![0, 2], vec![1, 2]],
            status: Status::Pending,
        };
        let resolved = authz.resolved_combinations();
        assert_eq!(resolved[0], vec![&challbs[0], &challbs[2]]);
        assert_eq!(resolved[1], vec![&challbs[1], &challbs[2]]);
    }

    #[test]
    fn revocation_url_replaces_path() {
        assert_eq!(
            Revocation::url("https://ca.example/acme/new-reg"),
            "https://ca.example/acme/revoke-cert"
        );
        assert_eq!(
            Revocation::url("https://ca.example"),
            "https://ca.example/acme/revoke-cert"
        );
    }

    #[test]
    fn values_are_hash_stable_across_parses() {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let err = Error {
            typ: Some(AcmeErrorType::Malformed),
            title: None,
            detail: Some("foo".into()),
        };
        let json = err.to_json();
        let parsed_once = Error::from_json(json.clone()).unwrap();
        let parsed_twice = Error::from_json(json).unwrap();

        let mut h1 = DefaultHasher::new();
        parsed_once.hash(&mut h1);
        let mut h2 = DefaultHasher::new();
        parsed_twice.hash(&mut h2);
        assert_eq!(h1.finish(), h2.finish());
    }
}
