//! Shared primitives for the Gemini MCP bridge.
//!
//! This crate holds the pieces every other crate in the workspace depends
//! on: the error taxonomy the tool pipeline translates into caller-safe
//! messages, the secret redactor every outbound string passes through, the
//! `Notice` type queued by the HTTP client, and the configuration structs
//! loaded from the environment.

pub mod config;
pub mod error;
pub mod notice;
pub mod redactor;

pub use error::{BridgeError, ErrorHint};
pub use notice::Notice;
pub use redactor::Redactor;
