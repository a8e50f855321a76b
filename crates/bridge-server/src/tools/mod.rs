//! One module per MCP tool (spec §4.G, §6). Each module exposes a single
//! `run` function the `#[tool]` method in `main.rs` delegates to, keeping
//! the MCP-facing struct a thin translation layer over the pipeline.

pub mod count_tokens;
pub mod embed_content;
pub mod generate_content;
pub mod list_models;
pub mod stream_generate_content;
