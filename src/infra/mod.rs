//! Infrastructure layer
//!
//! Language server plumbing: wire protocol, process lifecycle, workspace paths.

pub mod lsp;
