//! CLI subcommand implementations.

pub mod keygen;
pub mod serve;
pub mod url;
