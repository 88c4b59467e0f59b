//! Command implementations for lsp-bridge
//!
//! Each command is implemented in its own module.

pub mod cat;
pub mod definition;
pub mod serve;
pub mod servers;
pub mod symbols;
