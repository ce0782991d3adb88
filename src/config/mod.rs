//! Configuration module for the srcds controller.
//!
//! This module handles parsing, validation, and access to the YAML
//! configuration of the checker and of a single runner.
//!
//! # Examples
//!
//! Loading and validating a checker configuration:
//!
//! ```no_run
//! use srcds_controller::config::{validate_config, Config};
//!
//! let config = Config::from_file("checker.yaml").unwrap();
//! validate_config(&config).unwrap();
//! println!("Loaded configuration with {} servers", config.servers.len());
//! ```
//!
//! Building a server programmatically:
//!
//! ```
//! use srcds_controller::config::{AclConfig, RconSettings, ServerSpec};
//! use std::path::PathBuf;
//!
//! let spec = ServerSpec {
//!     name: "alpha".to_string(),
//!     address: "127.0.0.1".to_string(),
//!     port: 27015,
//!     enabled: true,
//!     path: PathBuf::from("/srv/alpha"),
//!     rcon: RconSettings { password: "hunter2".to_string() },
//!     acl: Some(AclConfig { users: vec![0], groups: vec![] }),
//!     on_exit_command: Some("quit".to_string()),
//!     command: None,
//!     args: vec![],
//!     checks: vec![],
//! };
//! assert!(spec.socket_path().ends_with(".srcds_runner.sock"));
//! ```
pub mod duration;
mod parser;
pub mod validator;

pub use parser::{
    AclConfig, CachetSettings, CheckOpts, CheckSpec, CheckerSettings, Config, DockerSettings,
    Limit, RCON_PASSWORD_PLACEHOLDER, RUNNER_SOCKET_NAME, RconSettings, RunnerConfig,
    RunnerSettings, ServerSpec, Splay,
};
pub use validator::validate_config;
