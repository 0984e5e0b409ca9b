//! Configuration for modelmatrix.
//!
//! [`config::MatrixConfig`] holds the names the adapter gives to the
//! columns it creates. It is loaded from YAML, TOML, or JSON files with
//! [`config::load_config`]; a missing file yields the defaults.

pub mod config;

pub use config::{ConfigError, MatrixConfig, load_config, save_config};
