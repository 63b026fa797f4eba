//! Stdio MCP server exposing the Bitget REST API as tools.
//!
//! The interesting parts live in [`http`] (signing, throttling, response
//! classification) and [`capability`] (runtime endpoint discovery).

pub mod capability;
pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod mcp;
pub mod server;
pub mod tools;
pub mod types;
