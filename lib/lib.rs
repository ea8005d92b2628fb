//! `ludocore` is a control plane for single-host fleets of containerized game
//! servers.
//!
//! # Overview
//!
//! ludocore orchestrates dedicated game-server instances running as
//! containers on one host and mediates player matchmaking onto that fleet:
//!
//! - Instance lifecycle: start, supervise, and stop containers, with a
//!   per-instance background poller reporting player occupancy
//! - Build pipeline: safe ingestion of uploaded server builds and recipe
//!   selection driving image rebuilds
//! - Matchmaking: capacity-aware placement with HMAC-signed, time-bounded
//!   join tokens
//! - Admission: API-key + rotating-session auth, single-use CSRF tokens, and
//!   a TLS edge router isolating the privileged API on loopback
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`client`] - Loopback client for the privileged API
//! - [`config`] - Configuration defaults
//! - [`fleet`] - Authoritative in-memory instance registry and name generator
//! - [`history`] - Append-only event log over SQLite
//! - [`matchmaking`] - Placement handlers and admission tokens
//! - [`runtime`] - Container runtime adapter, occupancy poller, and recipes
//! - [`security`] - API key, sessions, CSRF, security headers, and TLS
//! - [`server`] - Privileged REST API and the TLS edge router
//! - [`validate`] - Request validation shared by every inbound surface

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod cli;
pub mod client;
pub mod config;
pub mod fleet;
pub mod history;
pub mod matchmaking;
pub mod runtime;
pub mod security;
pub mod server;
pub mod utils;
pub mod validate;

pub use error::*;
