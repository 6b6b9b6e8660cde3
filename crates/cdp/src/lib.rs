//! Chrome DevTools Protocol client for driving an already-running browser.
//!
//! This crate is the remote-control half of the webmail orchestrator: given a
//! browser that was launched with `--remote-debugging-port`, it connects to
//! the WebSocket endpoint, attaches to a page target, and exposes the small
//! set of primitives the compose automation needs (navigate, wait, fill,
//! click, read).
//!
//! It deliberately knows nothing about browser processes, profiles, or
//! webmail - that lives in the `mailer` crate.

pub mod client;
pub mod page;
pub mod protocol;

pub use client::{CdpClient, CdpError};
pub use page::Page;
pub use protocol::VersionInfo;
