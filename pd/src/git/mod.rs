//! Git command builders

pub mod commands;

pub use commands::parse_default_branch;
