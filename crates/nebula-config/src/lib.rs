//! Configuration for the ROAM terrain tools.
//!
//! Settings persist to disk as `config.ron`, can be overridden from the
//! command line via clap, and support hot-reload detection. Every section is
//! `#[serde(default)]` so older or partial files keep loading.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{CONFIG_FILE_NAME, Config, DebugConfig, DemoConfig, TerrainConfig};
pub use error::ConfigError;
