//! Layered configuration: a TOML file overridden by `TURNSTILE__*`
//! environment variables.

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
