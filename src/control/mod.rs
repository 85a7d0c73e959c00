//! Control channel: wire protocol, descriptor file, server and client
//!
//! A running launcher is remotely controllable from a short-lived CLI
//! process on the same host. The channel is deliberately plain: one TCP
//! connection, newline-delimited JSON, one request per line. Discovery and
//! authentication go through a connection descriptor file the launcher
//! writes at startup, so a co-located client needs no out-of-band setup.

/// Client-side connector issuing control operations
pub mod client;
/// Connection descriptor file published for same-host discovery
pub mod descriptor;
/// Wire protocol types shared by server and client
pub mod proto;
/// Launcher-side control endpoint
pub mod server;
