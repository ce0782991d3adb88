use crate::config::duration;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the runner's command socket inside a server directory.
pub const RUNNER_SOCKET_NAME: &str = ".srcds_runner.sock";

/// Placeholder replaced by the RCON password in launch arguments.
pub const RCON_PASSWORD_PLACEHOLDER: &str = "%RCON_PASSWORD%";

/// Free-form options of a check, e.g. `timeout: 5s`.
pub type CheckOpts = HashMap<String, String>;

/// Access control list of a server's command channel.
///
/// Holds numeric OS user and group IDs. A server without an ACL block
/// denies every command channel request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclConfig {
    /// User IDs that are always allowed.
    #[serde(default)]
    pub users: Vec<u32>,
    /// Group IDs; a caller that is a member of any of them is allowed.
    #[serde(default)]
    pub groups: Vec<u32>,
}

/// RCON credentials of a server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RconSettings {
    #[serde(default)]
    pub password: String,
}

/// When a check is considered failed long enough to act, and what to do then.
///
/// A threshold of zero is disabled. With both thresholds disabled the
/// limit never fires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Limit {
    /// Number of consecutive failures that triggers the actions.
    #[serde(default)]
    pub count: u64,

    /// Time between the first and the latest failure that triggers the actions.
    #[serde(default, with = "duration")]
    pub after: Duration,

    /// Action names, run in parallel when the limit is crossed.
    #[serde(default)]
    pub actions: Vec<String>,

    /// Options consumed by actions, e.g. `cachetComponentID`.
    #[serde(default)]
    pub action_opts: HashMap<String, String>,
}

/// One configured check of a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckSpec {
    /// Name of the registered probe implementation.
    pub name: String,

    #[serde(default)]
    pub opts: CheckOpts,

    #[serde(default)]
    pub limit: Limit,
}

impl CheckSpec {
    /// Returns the check options with global defaults for the probe filled in.
    ///
    /// Per-check options win over the global ones.
    pub fn merged_opts(&self, global: &HashMap<String, CheckOpts>) -> CheckOpts {
        let mut opts = global.get(&self.name).cloned().unwrap_or_default();
        for (k, v) in &self.opts {
            opts.insert(k.clone(), v.clone());
        }
        opts
    }

    /// Probe timeout from `opts.timeout`, or `default` if unset or unparsable.
    pub fn timeout(&self, default: Duration) -> Duration {
        match self.opts.get("timeout") {
            Some(raw) => duration::parse(raw).unwrap_or_else(|e| {
                tracing::warn!(check = %self.name, error = %e, "Ignoring invalid check timeout");
                default
            }),
            None => default,
        }
    }
}

/// Identity and operating parameters of one managed game server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSpec {
    /// Unique server name.
    pub name: String,

    #[serde(default = "default_address")]
    pub address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Server directory; the runner socket lives here unless overridden.
    #[serde(default = "default_path")]
    pub path: PathBuf,

    #[serde(default)]
    pub rcon: RconSettings,

    #[serde(default)]
    pub acl: Option<AclConfig>,

    /// Console command written before the runner stops the process.
    #[serde(default)]
    pub on_exit_command: Option<String>,

    /// Launch command of the game server (runner only).
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub checks: Vec<CheckSpec>,
}

impl ServerSpec {
    /// Path of the runner command socket for this server.
    pub fn socket_path(&self) -> PathBuf {
        self.path.join(RUNNER_SOCKET_NAME)
    }

    /// Launch arguments with the RCON password placeholder substituted.
    pub fn launch_args(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.replace(RCON_PASSWORD_PLACEHOLDER, &self.rcon.password))
            .collect()
    }

    /// Returns the first `actionOpts` value for `key` across all checks.
    pub fn action_opt(&self, key: &str) -> Option<&str> {
        self.checks
            .iter()
            .find_map(|c| c.limit.action_opts.get(key).map(String::as_str))
    }
}

/// Random jitter range in seconds, `[start, end)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Splay {
    #[serde(default)]
    pub start: u64,
    #[serde(default)]
    pub end: u64,
}

/// Checker-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckerSettings {
    /// Base wait between two probes of the same check.
    #[serde(default = "default_interval", with = "duration")]
    pub interval: Duration,

    #[serde(default)]
    pub splay: Splay,

    /// Log what actions would do instead of doing it.
    #[serde(default = "default_true", rename = "dryRun", alias = "dry-run")]
    pub dry_run: bool,

    /// Delay before the event reactor restarts a dead container.
    #[serde(default = "default_restart_delay", with = "duration")]
    pub restart_delay: Duration,

    /// Enable the container event reactor.
    #[serde(default)]
    pub docker_events: bool,

    /// Console line broadcast to players before a checker-triggered restart.
    #[serde(default = "default_restart_message")]
    pub restart_message: String,

    /// Probe timeout when a check sets none.
    #[serde(default = "default_probe_timeout", with = "duration")]
    pub probe_timeout: Duration,
}

impl Default for CheckerSettings {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            splay: Splay::default(),
            dry_run: true,
            restart_delay: default_restart_delay(),
            docker_events: false,
            restart_message: default_restart_message(),
            probe_timeout: default_probe_timeout(),
        }
    }
}

/// Container runtime settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerSettings {
    /// Prefix of container names; stripped from event names before lookup.
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    #[serde(default = "default_stop_timeout", with = "duration")]
    pub stop_timeout: Duration,
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            name_prefix: default_name_prefix(),
            stop_timeout: default_stop_timeout(),
        }
    }
}

/// Cachet status page settings used by the notify action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachetSettings {
    pub url: String,
    pub token: String,

    /// Suppress a new incident if a matching one was updated within this window.
    #[serde(default = "default_cooldown", with = "duration")]
    pub cooldown: Duration,
}

/// Main configuration of the checker.
///
/// # YAML
///
/// ```yaml
/// checker:
///   interval: 60s
///   splay: { start: 0, end: 15 }
///   dryRun: false
/// docker:
///   namePrefix: "game-"
/// servers:
///   - name: alpha
///     port: 27015
///     rcon: { password: hunter2 }
///     checks:
///       - name: rcon
///         limit: { count: 3, actions: [restart] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub checker: CheckerSettings,

    #[serde(default)]
    pub docker: DockerSettings,

    #[serde(default)]
    pub cachet: Option<CachetSettings>,

    /// Default options per probe name.
    #[serde(default)]
    pub checks: HashMap<String, CheckOpts>,

    #[serde(default)]
    pub servers: Vec<ServerSpec>,
}

impl Config {
    /// Loads a configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid configuration.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        Self::parse_from_str(&content)
    }

    /// Parses a configuration from a YAML string.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse YAML config: {}", e)))
    }

    /// Looks up a server by name, ignoring case.
    pub fn server(&self, name: &str) -> Option<&ServerSpec> {
        self.servers
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }
}

/// Runner-only settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerSettings {
    /// Command socket path; defaults to the server directory socket.
    #[serde(default)]
    pub socket: Option<PathBuf>,

    /// Wait after writing the on-exit command.
    #[serde(default = "default_on_exit_grace", with = "duration")]
    pub on_exit_grace: Duration,

    /// Wait before signalling the process.
    #[serde(default = "default_term_grace", with = "duration")]
    pub term_grace: Duration,

    /// How often the configuration file is re-read.
    #[serde(default = "default_reload_interval", with = "duration")]
    pub reload_interval: Duration,

    /// Drop output lines that contain the RCON password.
    #[serde(default = "default_true")]
    pub redact_secret: bool,

    /// Output lines containing this marker go to stderr.
    #[serde(default)]
    pub diagnostic_marker: Option<String>,

    /// Console command template for password rotation; `{}` is the password.
    #[serde(default = "default_password_command")]
    pub password_command: String,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            socket: None,
            on_exit_grace: default_on_exit_grace(),
            term_grace: default_term_grace(),
            reload_interval: default_reload_interval(),
            redact_secret: true,
            diagnostic_marker: None,
            password_command: default_password_command(),
        }
    }
}

impl RunnerSettings {
    /// Renders the password rotation console command.
    pub fn password_command_for(&self, password: &str) -> String {
        self.password_command.replace("{}", password)
    }
}

/// Configuration file of one runner: a single server plus runner settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    pub server: ServerSpec,

    #[serde(default)]
    pub runner: RunnerSettings,
}

impl RunnerConfig {
    /// Loads a runner configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigParse(format!("Failed to read config file: {}", e)))?;

        Self::parse_from_str(&content)
    }

    /// Parses a runner configuration from a YAML string.
    pub fn parse_from_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse YAML config: {}", e)))
    }

    /// Effective command socket path.
    pub fn socket_path(&self) -> PathBuf {
        self.runner
            .socket
            .clone()
            .unwrap_or_else(|| self.server.socket_path())
    }
}

fn default_true() -> bool {
    true
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    27015
}

fn default_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_restart_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_restart_message() -> String {
    "say SRCDS CHECKER RESTART MARKER".to_string()
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_name_prefix() -> String {
    "game-".to_string()
}

fn default_stop_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_cooldown() -> Duration {
    Duration::from_secs(60 * 60)
}

fn default_on_exit_grace() -> Duration {
    Duration::from_secs(5)
}

fn default_term_grace() -> Duration {
    Duration::from_millis(500)
}

fn default_reload_interval() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_password_command() -> String {
    "rcon_password {}".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_checker_config() {
        let config_str = r#"
checker:
  interval: 30s
  splay: { start: 1, end: 5 }
  dryRun: false
servers:
  - name: alpha
    port: 27016
    rcon: { password: hunter2 }
    acl: { users: [0, 1000] }
    checks:
      - name: rcon
        opts: { timeout: 3s }
        limit:
          count: 3
          after: 5m
          actions: [log, restart]
          actionOpts: { cachetComponentID: "4" }
"#;

        let config = Config::parse_from_str(config_str).unwrap();

        assert_eq!(config.checker.interval, Duration::from_secs(30));
        assert_eq!(config.checker.splay, Splay { start: 1, end: 5 });
        assert!(!config.checker.dry_run);
        assert_eq!(config.servers.len(), 1);

        let alpha = config.server("ALPHA").unwrap();
        assert_eq!(alpha.port, 27016);
        assert!(alpha.enabled);
        assert_eq!(alpha.acl.as_ref().unwrap().users, vec![0, 1000]);

        let check = &alpha.checks[0];
        assert_eq!(check.limit.count, 3);
        assert_eq!(check.limit.after, Duration::from_secs(300));
        assert_eq!(check.limit.actions, vec!["log", "restart"]);
        assert_eq!(check.timeout(Duration::from_secs(10)), Duration::from_secs(3));
        assert_eq!(alpha.action_opt("cachetComponentID"), Some("4"));
    }

    #[test]
    fn test_defaults() {
        let config = Config::parse_from_str("servers: []").unwrap();
        assert!(config.checker.dry_run);
        assert_eq!(config.checker.interval, Duration::from_secs(60));
        assert_eq!(config.docker.name_prefix, "game-");
        assert!(config.cachet.is_none());
    }

    #[test]
    fn test_launch_args_substitute_password() {
        let runner = RunnerConfig::parse_from_str(
            r#"
server:
  name: alpha
  path: /srv/alpha
  rcon: { password: s3cret }
  command: ./srcds_run
  args: ["-port", "27015", "+rcon_password", "%RCON_PASSWORD%"]
"#,
        )
        .unwrap();

        assert_eq!(
            runner.server.launch_args(),
            vec!["-port", "27015", "+rcon_password", "s3cret"]
        );
        assert_eq!(
            runner.socket_path(),
            PathBuf::from("/srv/alpha/.srcds_runner.sock")
        );
        assert_eq!(runner.runner.on_exit_grace, Duration::from_secs(5));
        assert_eq!(runner.runner.term_grace, Duration::from_millis(500));
        assert_eq!(runner.runner.password_command_for("new"), "rcon_password new");
    }

    #[test]
    fn test_merged_opts_prefer_check_values() {
        let mut global = HashMap::new();
        global.insert(
            "rcon".to_string(),
            CheckOpts::from([
                ("timeout".to_string(), "10s".to_string()),
                ("password".to_string(), "global".to_string()),
            ]),
        );
        let check = CheckSpec {
            name: "rcon".to_string(),
            opts: CheckOpts::from([("timeout".to_string(), "2s".to_string())]),
            limit: Limit::default(),
        };

        let merged = check.merged_opts(&global);
        assert_eq!(merged["timeout"], "2s");
        assert_eq!(merged["password"], "global");
    }
}
