//! nginxui command-line client: settings, command execution, output, and the REPL.

pub mod commands;
pub mod config;
pub mod output;
pub mod repl;

pub use commands::connect;
pub use config::{resolve_settings_path, Settings};
