//! Subcommands pertaining to local configuration.

mod config;
pub use config::ConfigCmd;
