//! Tool pipeline and MCP surface for the Gemini MCP bridge (spec §4.H, §6).
//!
//! [`pipeline`] runs the shared validate/admit/reserve/auth/commit
//! machinery every tool goes through; [`tools`] holds one module per MCP
//! tool exposed by the `gemini-mcp-bridge` binary in `main.rs`.

pub mod pipeline;
pub mod tools;
