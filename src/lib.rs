//! `acme-core`: the protocol engine at the heart of an ACME client —
//! the authorization state machine and the account/registration
//! lifecycle, with no opinion on transport, crypto backend, or
//! interactive UI.
//!
//! This crate answers one question: given a set of DNS identifiers,
//! what challenges does the CA want completed, in what combination,
//! and how do we drive that to a signed certificate? Everything that
//! actually touches the network (JWS signing, HTTP, nonce handling)
//! or provisions a challenge response (a web server, a DNS API) is a
//! trait — [`network::Network`], [`authenticator::Authenticator`],
//! [`installer::Installer`] — implemented by the caller.
//!
//! ## Layout
//!
//! - [`messages`]: the ACME wire types (`Identifier`, `Challenge`,
//!   `Authorization`, `Registration`, `Error`, ...) and their JSON
//!   mapping.
//! - [`account`]: durable account state, persisted to a small TOML
//!   file per account under a `0o700` directory.
//! - [`planner`]: picks which subset of a server's offered challenges
//!   to attempt, honoring server-proposed combinations and
//!   client-side preferences.
//! - [`auth_handler`]: the per-domain authorization state machine —
//!   request, plan, dispatch, poll, cleanup.
//! - [`client`]: the facade that composes an account, the ports, and
//!   the auth handler into `register`/`obtain_certificate`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use acme_core::account::Account;
//! use acme_core::client::Client;
//! use acme_core::config::Config;
//! use acme_core::crypto::{EcdsaKeyGenerator, RcgenCsrGenerator};
//! use acme_core::reporter::LogReporter;
//!
//! # async fn run(network: &dyn acme_core::network::Network) -> Result<(), Box<dyn std::error::Error>> {
//! simple_logger::init_with_level(log::Level::Info).unwrap();
//!
//! let config = Config::new("./acme-core-state");
//! let account = Account::from_email(
//!     Some("admin@example.com"),
//!     None,
//!     config.accounts_dir_path(),
//!     config.account_keys_dir_path(),
//!     &EcdsaKeyGenerator,
//! )
//! .await?;
//!
//! let reporter = LogReporter;
//! let csr_gen = RcgenCsrGenerator;
//! let mut client = Client::new(account, &config, network, None, None, None, &reporter, None, &csr_gen);
//! client.register().await?;
//! # Ok(())
//! # }
//! ```

pub mod account;
pub mod achallenges;
pub mod auth_handler;
pub mod authenticator;
pub mod client;
pub mod config;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod installer;
pub mod messages;
pub mod network;
pub mod planner;
pub mod reporter;

pub use account::Account;
pub use auth_handler::AuthHandler;
pub use client::Client;
pub use config::Config;
pub use error::Error;
