//! Error taxonomy for the ACME core (spec.md §7).
//!
//! Each failure family gets its own `thiserror` enum, composed into a
//! single [`Error`] at the top, the way the teacher splits `AcmeError`,
//! `HttpsRequestError`, `OrderError` and `CertParseError` instead of
//! using one grab-bag type.

use thiserror::Error;

/// Malformed or unrecognized wire value. Never retried by the core.
#[derive(Error, Debug)]
pub enum DeserializationError {
    #[error("unknown enum variant for {field}: {value:?}")]
    UnknownVariant { field: &'static str, value: String },
    #[error("error type {0:?} is missing the urn:acme:error: prefix")]
    MissingErrorPrefix(String),
    #[error("error code {0:?} is not in the registered set")]
    UnknownErrorCode(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Planning, dispatch, poll-failure and completeness-check failures.
#[derive(Error, Debug)]
pub enum AuthorizationError {
    #[error("Client does not support any combination of challenges that will satisfy the CA.")]
    NoSupportedCombination,
    #[error("Incomplete authorizations")]
    Incomplete,
    #[error("Failed Authorization procedure for {domain}")]
    Failed { domain: String },
    #[error("Target challenge not found in authorization resource")]
    ChallengeNotFound,
    #[error("network error: {0}")]
    Network(#[from] crate::network::NetworkError),
}

/// Invalid email, missing installer, unsupported challenge variant, etc.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Invalid email address.")]
    InvalidEmail,
    #[error("Account for {0} does not exist")]
    AccountNotFound(String),
    #[error("Unable to obtain certificate because authenticator is not set.")]
    NoAuthHandler,
    #[error("Please register with the ACME server first.")]
    NotRegistered,
    #[error("Must agree to TOS")]
    TosNotAgreed,
    #[error("No installer available")]
    NoInstaller,
    #[error("Received unsupported challenge of type: {0}")]
    UnsupportedChallenge(String),
    #[error("key generation failed: {0}")]
    KeyGen(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("account file error: {0}")]
    Toml(String),
    #[error("authorization error: {0}")]
    Authorization(#[from] AuthorizationError),
    #[error("network error: {0}")]
    Network(#[from] crate::network::NetworkError),
    #[error("installer error: {0}")]
    Misconfiguration(#[from] MisconfigurationError),
}

/// Raised by an installer/configurator that refuses a change.
#[derive(Error, Debug)]
pub enum MisconfigurationError {
    #[error("installer refused configuration change: {0}")]
    Installer(String),
}

/// Top-level union, in case a caller wants one error type end to end.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Deserialization(#[from] DeserializationError),
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Misconfiguration(#[from] MisconfigurationError),
}
