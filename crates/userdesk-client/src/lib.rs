//! HTTP client for the userdesk administration API
//!
//! [`ApiClient`] implements [`userdesk_schema::AdminBackend`] over `reqwest`,
//! so the schema store, directory and session container can run against the
//! live service unchanged.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::{ClientError, ClientResult};
