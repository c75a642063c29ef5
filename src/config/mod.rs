//! Configuration module for Craft Warden.
//!
//! This module handles parsing, validation, and access to the configuration
//! of a supervised server instance. Configurations are loaded from JSON or
//! YAML files, or built programmatically.
//!
//! # Examples
//!
//! Loading a configuration from a file:
//!
//! ```no_run
//! use craft_warden::config::Config;
//!
//! let config = Config::from_file("survival.json").unwrap();
//! println!("Loaded server '{}' with {} MB", config.name, config.server.memory_megabytes);
//! ```
//!
//! Creating a configuration programmatically:
//!
//! ```
//! use craft_warden::config::{Config, ServerConfiguration};
//! use craft_warden::version::ServerType;
//!
//! let mut config = Config::new("survival", "/srv/minecraft/survival", "/srv/minecraft/jar");
//! config.server = ServerConfiguration {
//!     memory_megabytes: 4096,
//!     server_type: ServerType::Release,
//!     log_retention_days: 14,
//! };
//! config.parameters.insert("server-port".to_string(), "25565".to_string());
//!
//! assert!(craft_warden::config::validate_config(&config).is_ok());
//! ```
mod parser;
pub mod validator;

pub use parser::{Config, ServerConfiguration};
pub use validator::validate_config;
