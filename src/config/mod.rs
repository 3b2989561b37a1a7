//! Configuration module for Server Host.
//!
//! This module handles parsing and validation of the host-wide settings:
//! where server trees live, stop and install time bounds, and the runtime
//! used to execute uploaded packages. Configurations are JSON.
//!
//! # Examples
//!
//! Loading a configuration from a file:
//!
//! ```no_run
//! use server_host::config::HostConfig;
//!
//! let config = HostConfig::from_file("host.json").unwrap();
//! println!("Servers live under {}", config.servers_root.display());
//! ```
//!
//! Adjusting the defaults programmatically:
//!
//! ```
//! use server_host::config::{validate_config, HostConfig};
//!
//! let config = HostConfig {
//!     servers_root: "/tmp/hosted".into(),
//!     stop_grace_ms: 500,
//!     ..HostConfig::default()
//! };
//! validate_config(&config).unwrap();
//! ```
mod parser;
pub mod validator;

pub use parser::{EntrypointFallback, HostConfig, RuntimeConfig};
pub use validator::validate_config;
