//! Command line front end for the userdesk admin API
//!
//! Parses arguments, resolves configuration and runs one command against the
//! HTTP backend through the schema-driven stores.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod app;
pub mod cli;
pub mod commands;
pub mod output;

pub use app::App;
pub use cli::Cli;
