//! Duet is a terminal chat client for a companion backend that streams
//! replies as typed events.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns the session engine: the per-send event stream, the
//!   frame decoder, the long-lived sibling channel with automatic
//!   reconnect, and the message timeline both feed into.
//! - [`api`] defines request/response payloads and the authenticated HTTP
//!   helpers for the history and status endpoints.
//! - [`auth`] stores the bearer token (system keyring plus an in-process
//!   cache) and reads display claims out of the login JWT.
//! - [`cli`] parses arguments and runs the interactive loop that drives
//!   user input and display updates.
//!
//! The runtime entrypoint lives in the binary crate (`src/main.rs`) and
//! routes through [`crate::cli::run`].

pub mod api;
pub mod auth;
pub mod cli;
pub mod core;
pub mod utils;
