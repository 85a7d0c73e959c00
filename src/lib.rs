//! `UpdatingLauncher` - a self-updating supervisor for a single managed process
//!
//! This crate keeps a versioned artifact up to date against a remote release
//! feed, supervises the process running that artifact across updates, and
//! exposes a small local control channel (credential check, start, status)
//! that a separate CLI client discovers through a connection descriptor file
//! written at startup.

// Deny the most critical lints that could lead to bugs or security issues
#![deny(
    unsafe_code,
    unsafe_op_in_unsafe_fn,
    unreachable_code,
    unreachable_patterns,
    unused_must_use,
    rustdoc::broken_intra_doc_links,
    rustdoc::private_intra_doc_links,
)]
// Warn on things that should be fixed but aren't necessarily bugs
#![warn(
    missing_docs,
    clippy::all,
    clippy::pedantic,
    clippy::dbg_macro,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unwrap_used,
    clippy::large_enum_variant,
    clippy::match_same_arms,
    clippy::semicolon_if_nothing_returned,
    clippy::wildcard_imports,
    future_incompatible,
    rust_2018_idioms,
)]
// Allow some pedantic lints that are too noisy or not applicable
#![allow(
    clippy::module_name_repetitions,  // Common pattern in Rust
    clippy::missing_errors_doc,        // Will add gradually
    clippy::missing_panics_doc,        // Will add gradually
)]

use std::path::PathBuf;

/// Launcher configuration loaded from `ul/config.toml`
pub mod config;
/// Control channel: wire protocol, descriptor file, server and client
pub mod control;
/// Optional introspection into the managed process
pub mod diagnostics;
/// Unified error types and result handling
pub mod errors;
/// Release feed queries and asset selection
pub mod release;
/// Lifecycle management of the managed process
pub mod supervisor;
/// Update orchestration: poll, download, atomic swap, restart
pub mod updater;

#[cfg(test)]
pub mod test_utils;

/// Name of the working directory the launcher keeps its files in, relative
/// to the directory it was started from.
pub const UL_DIRECTORY_NAME: &str = "ul";

/// File name of the launcher configuration inside the working directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// File name of the connection descriptor inside the working directory.
pub const DESCRIPTOR_FILE_NAME: &str = "connection.json";

/// Base service name; the full name is suffixed with the launcher's pid so
/// several instances on one host stay distinguishable.
pub const SERVICE_BASE_NAME: &str = "updating-launcher";

/// Resolves the launcher working directory.
///
/// Defaults to [`UL_DIRECTORY_NAME`] relative to the current directory;
/// the `UL_DIRECTORY` environment variable overrides it.
#[must_use]
pub fn ul_directory() -> PathBuf {
    std::env::var_os("UL_DIRECTORY")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(UL_DIRECTORY_NAME))
}

/// The process-unique name this launcher instance identifies itself with.
#[must_use]
pub fn service_name() -> String {
    format!("{SERVICE_BASE_NAME}#{}", std::process::id())
}
