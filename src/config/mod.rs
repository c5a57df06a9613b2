//! Configuration management for jobshuttle.
//!
//! The host registry and per-host job environments are loaded once per
//! process and validated up front, so a malformed entry fails at load time
//! rather than halfway through a transfer.
//!
//! # Configuration Directory
//!
//! The configuration directory defaults to:
//! - Linux: `~/.config/jobshuttle/`
//! - macOS: `~/Library/Application Support/jobshuttle/`
//! - Windows: `C:\Users\<User>\AppData\Roaming\jobshuttle\`
//!
//! It can be overridden with `JOBSHUTTLE_CONFIG_DIR`.
//!
//! ```text
//! jobshuttle/
//! ├── hosts.yml
//! └── hosts/
//!     └── <host>/
//!         ├── packages.yml
//!         ├── queue_data.txt
//!         ├── submit_mpi.sh
//!         └── submit_nompi.sh
//! ```
//!
//! # Example `hosts.yml`
//!
//! ```yaml
//! hosts:
//!   localhost:
//!     machine_type: local
//!     root: "/home/alice/work"
//!   cluster:
//!     machine_type: remote
//!     address: "login.cluster.example.org"
//!     username: "alice"
//!     ssh_key: "~/.ssh/id_ed25519"
//!     root: "/scratch/alice/work"
//!     queuing: true
//!     computation: true
//!     submit_command: "qsub"
//!     status_command: "qstat"
//!     delete_command: "qdel"
//!     job_number_index: 0
//! defaults:
//!   bandwidth_limit: 30000
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable overriding the configuration directory.
pub const CONFIG_DIR_ENV: &str = "JOBSHUTTLE_CONFIG_DIR";

/// Name of the host registry file inside the configuration directory.
pub const HOSTS_FILE: &str = "hosts.yml";

const DEFAULT_SSH_PORT: u16 = 22;
const DEFAULT_RETRY_ATTEMPTS: u32 = 10;
/// Long enough to ride out a multi-hour network outage across ten attempts.
const DEFAULT_RETRY_INTERVAL_SECS: u64 = 3600;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_BANDWIDTH_LIMIT: u32 = 30000;
const DEFAULT_STAT_INTERVAL_SECS: u64 = 60;
const DEFAULT_STAT_ATTEMPTS: u32 = 10;
const DEFAULT_RECORD_FILE: &str = "jobshuttle.json";
const DEFAULT_SCRIPT_FILE: &str = "submit.sh";

/// Whether an endpoint lives on the orchestrating machine or behind SSH.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineType {
    Local,
    Remote,
}

impl std::fmt::Display for MachineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MachineType::Local => write!(f, "local"),
            MachineType::Remote => write!(f, "remote"),
        }
    }
}

/// Connection and scheduler facts for one named endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRecord {
    /// Registry key; filled in from the map key at load time
    #[serde(skip)]
    pub name: String,

    pub machine_type: MachineType,

    /// Hostname or IP address (remote hosts only)
    #[serde(default)]
    pub address: Option<String>,

    #[serde(default = "default_ssh_port")]
    pub port: u16,

    #[serde(default)]
    pub username: Option<String>,

    /// Path to the SSH private key, `~` is expanded
    #[serde(default)]
    pub ssh_key: Option<String>,

    /// Root directory that paths are translated against
    pub root: PathBuf,

    /// Jobs go through a batch scheduler
    #[serde(default)]
    pub queuing: bool,

    /// Host may be used as a computation server
    #[serde(default)]
    pub computation: bool,

    #[serde(default)]
    pub submit_command: Option<String>,

    #[serde(default)]
    pub status_command: Option<String>,

    #[serde(default)]
    pub delete_command: Option<String>,

    /// Whitespace token of the submit output holding the job number
    #[serde(default)]
    pub job_number_index: Option<usize>,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    #[serde(default = "default_retry_interval_secs")]
    pub retry_interval_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

/// Settings applied when not overridden on the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultSettings {
    /// rsync bandwidth cap in KB/s
    #[serde(default = "default_bandwidth_limit")]
    pub bandwidth_limit: u32,

    #[serde(default = "default_stat_interval_secs")]
    pub stat_interval_secs: u64,

    #[serde(default = "default_stat_attempts")]
    pub stat_attempts: u32,

    #[serde(default)]
    pub safe_mode: bool,

    #[serde(default = "default_record_file")]
    pub record_file: String,

    #[serde(default = "default_script_file")]
    pub script_file: String,
}

impl Default for DefaultSettings {
    fn default() -> Self {
        Self {
            bandwidth_limit: DEFAULT_BANDWIDTH_LIMIT,
            stat_interval_secs: DEFAULT_STAT_INTERVAL_SECS,
            stat_attempts: DEFAULT_STAT_ATTEMPTS,
            safe_mode: false,
            record_file: DEFAULT_RECORD_FILE.to_string(),
            script_file: DEFAULT_SCRIPT_FILE.to_string(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub hosts: HashMap<String, HostRecord>,

    #[serde(default)]
    pub defaults: DefaultSettings,

    /// Directory the configuration was loaded from
    #[serde(skip)]
    pub dir: PathBuf,
}

fn default_ssh_port() -> u16 {
    DEFAULT_SSH_PORT
}

fn default_retry_attempts() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}

fn default_retry_interval_secs() -> u64 {
    DEFAULT_RETRY_INTERVAL_SECS
}

fn default_connect_timeout_secs() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

fn default_bandwidth_limit() -> u32 {
    DEFAULT_BANDWIDTH_LIMIT
}

fn default_stat_interval_secs() -> u64 {
    DEFAULT_STAT_INTERVAL_SECS
}

fn default_stat_attempts() -> u32 {
    DEFAULT_STAT_ATTEMPTS
}

fn default_record_file() -> String {
    DEFAULT_RECORD_FILE.to_string()
}

fn default_script_file() -> String {
    DEFAULT_SCRIPT_FILE.to_string()
}

impl Config {
    /// Returns the configuration directory for the current platform,
    /// honouring `JOBSHUTTLE_CONFIG_DIR`.
    pub fn default_dir() -> Option<PathBuf> {
        if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
            return Some(PathBuf::from(dir));
        }
        dirs::config_dir().map(|p| p.join("jobshuttle"))
    }

    /// Loads configuration from the default location.
    pub fn load() -> Result<Self> {
        match Self::default_dir() {
            Some(dir) => Self::load_from(&dir),
            None => Err(Error::Configuration(
                "Could not determine config directory\n\n\
                 Suggestions:\n\
                 • Check HOME environment variable is set\n\
                 • Set JOBSHUTTLE_CONFIG_DIR explicitly"
                    .to_string(),
            )),
        }
    }

    /// Loads and validates `hosts.yml` from the given configuration directory.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let path = dir.join(HOSTS_FILE);
        let contents = fs::read_to_string(&path).map_err(|e| {
            Error::Configuration(format!(
                "Failed to read host registry: {}\n\n\
                 File path: {}\n\n\
                 Suggestions:\n\
                 • Create the file following the example in the documentation\n\
                 • Point JOBSHUTTLE_CONFIG_DIR at an existing configuration",
                e,
                path.display()
            ))
        })?;

        let mut config = Self::parse(&contents).map_err(|e| match e {
            Error::Configuration(msg) => {
                Error::Configuration(format!("{}\n\nFile path: {}", msg, path.display()))
            }
            other => other,
        })?;
        config.dir = dir.to_path_buf();
        Ok(config)
    }

    /// Parses and validates a host registry document.
    pub fn parse(contents: &str) -> Result<Self> {
        let mut config: Config = serde_yaml::from_str(contents).map_err(|e| {
            Error::Configuration(format!(
                "Failed to parse host registry: {}\n\n\
                 Suggestions:\n\
                 • Check YAML syntax\n\
                 • machine_type must be 'local' or 'remote'",
                e
            ))
        })?;

        for (name, host) in config.hosts.iter_mut() {
            host.name = name.clone();
            host.validate()?;
        }
        if config.defaults.stat_attempts == 0 {
            return Err(Error::Configuration(
                "defaults.stat_attempts must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }

    /// Looks up a host by name.
    pub fn host(&self, name: &str) -> Result<&HostRecord> {
        self.hosts.get(name).ok_or_else(|| {
            let mut known: Vec<&String> = self.hosts.keys().collect();
            known.sort();
            Error::Configuration(format!(
                "Host '{}' is not defined in {}. Known hosts: {:?}",
                name,
                self.dir.join(HOSTS_FILE).display(),
                known
            ))
        })
    }

    /// Lists all configured host names, sorted.
    pub fn host_names(&self) -> Vec<&String> {
        let mut names: Vec<&String> = self.hosts.keys().collect();
        names.sort();
        names
    }

    /// Directory holding the job environment (packages, queue table,
    /// templates) for one host.
    pub fn host_env_dir(&self, host: &str) -> PathBuf {
        self.dir.join("hosts").join(host)
    }
}

impl HostRecord {
    /// Creates a local host record rooted at `root`.
    pub fn local(name: &str, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            machine_type: MachineType::Local,
            address: None,
            port: DEFAULT_SSH_PORT,
            username: None,
            ssh_key: None,
            root: root.into(),
            queuing: false,
            computation: false,
            submit_command: None,
            status_command: None,
            delete_command: None,
            job_number_index: None,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_interval_secs: DEFAULT_RETRY_INTERVAL_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }

    /// Creates a remote host record reachable as `username@address`.
    pub fn remote(name: &str, address: &str, username: &str, root: impl Into<PathBuf>) -> Self {
        Self {
            machine_type: MachineType::Remote,
            address: Some(address.to_string()),
            username: Some(username.to_string()),
            ..Self::local(name, root)
        }
    }

    /// Builder method marking the host as a batch-scheduled computation server.
    pub fn with_scheduler(
        mut self,
        submit: &str,
        status: &str,
        delete: &str,
        job_number_index: usize,
    ) -> Self {
        self.queuing = true;
        self.computation = true;
        self.submit_command = Some(submit.to_string());
        self.status_command = Some(status.to_string());
        self.delete_command = Some(delete.to_string());
        self.job_number_index = Some(job_number_index);
        self
    }

    /// Builder method for a computation server without a scheduler.
    pub fn with_direct_execution(mut self, command: &str) -> Self {
        self.queuing = false;
        self.computation = true;
        self.submit_command = Some(command.to_string());
        self
    }

    pub fn with_retry(mut self, attempts: u32, interval_secs: u64) -> Self {
        self.retry_attempts = attempts;
        self.retry_interval_secs = interval_secs;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_ssh_key(mut self, key_path: &str) -> Self {
        self.ssh_key = Some(key_path.to_string());
        self
    }

    pub fn is_local(&self) -> bool {
        self.machine_type == MachineType::Local
    }

    pub fn is_remote(&self) -> bool {
        self.machine_type == MachineType::Remote
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    /// Remote address, empty for local hosts.
    pub fn address(&self) -> &str {
        self.address.as_deref().unwrap_or("")
    }

    /// Login name, falling back to `$USER` for local hosts.
    pub fn username(&self) -> String {
        match &self.username {
            Some(user) => user.clone(),
            None => std::env::var("USER").unwrap_or_default(),
        }
    }

    /// Returns the SSH connection string (user@host).
    pub fn connection_string(&self) -> String {
        format!("{}@{}", self.username(), self.address())
    }

    /// Expands the SSH key path, replacing ~ with the home directory.
    pub fn expanded_ssh_key(&self) -> Option<PathBuf> {
        self.ssh_key.as_deref().map(expand_home)
    }

    /// Scheduler command, or a configuration error naming the missing field.
    pub fn command(&self, field: &str) -> Result<&str> {
        let value = match field {
            "submit_command" => &self.submit_command,
            "status_command" => &self.status_command,
            "delete_command" => &self.delete_command,
            _ => &None,
        };
        value.as_deref().ok_or_else(|| {
            Error::Configuration(format!("{} is not defined for host '{}'", field, self.name))
        })
    }

    fn validate(&self) -> Result<()> {
        if !self.root.is_absolute() {
            return Err(Error::Configuration(format!(
                "Host '{}': root '{}' must be an absolute path",
                self.name,
                self.root.display()
            )));
        }
        if self.is_remote() {
            if self.address.as_deref().map_or(true, str::is_empty) {
                return Err(Error::Configuration(format!(
                    "Host '{}': remote hosts need an address",
                    self.name
                )));
            }
            if self.username.as_deref().map_or(true, str::is_empty) {
                return Err(Error::Configuration(format!(
                    "Host '{}': remote hosts need a username",
                    self.name
                )));
            }
        }
        if self.computation {
            self.command("submit_command")?;
        }
        if self.queuing {
            for field in ["submit_command", "status_command", "delete_command"] {
                self.command(field)?;
            }
            if self.job_number_index.is_none() {
                return Err(Error::Configuration(format!(
                    "Host '{}': queuing hosts need job_number_index",
                    self.name
                )));
            }
        }
        if self.retry_attempts == 0 {
            return Err(Error::Configuration(format!(
                "Host '{}': retry_attempts must be at least 1",
                self.name
            )));
        }
        Ok(())
    }
}

/// Expands a leading `~/` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
hosts:
  localhost:
    machine_type: local
    root: "/home/u/proj"
  cluster:
    machine_type: remote
    address: "login.example.org"
    username: "u"
    port: 2222
    root: "/scratch/u/proj"
    queuing: true
    computation: true
    submit_command: "qsub"
    status_command: "qstat"
    delete_command: "qdel"
    job_number_index: 2
defaults:
  bandwidth_limit: 500
"#;

    #[test]
    fn test_parse_sample() {
        let config = Config::parse(SAMPLE).unwrap();
        let cluster = config.host("cluster").unwrap();
        assert_eq!(cluster.name, "cluster");
        assert_eq!(cluster.port, 2222);
        assert_eq!(cluster.job_number_index, Some(2));
        assert_eq!(cluster.retry_attempts, 10);
        assert_eq!(cluster.retry_interval_secs, 3600);
        assert_eq!(config.defaults.bandwidth_limit, 500);
        assert_eq!(config.defaults.stat_interval_secs, 60);
        assert_eq!(config.defaults.record_file, "jobshuttle.json");
        assert!(config.host("localhost").unwrap().is_local());
    }

    #[test]
    fn test_unknown_host_is_configuration_error() {
        let config = Config::parse(SAMPLE).unwrap();
        let err = config.host("nowhere").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("nowhere"));
    }

    #[test]
    fn test_bad_machine_type_rejected() {
        let doc = "hosts:\n  a:\n    machine_type: cloud\n    root: /x\n";
        assert!(matches!(Config::parse(doc), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_relative_root_rejected() {
        let doc = "hosts:\n  a:\n    machine_type: local\n    root: relative/dir\n";
        let err = Config::parse(doc).unwrap_err();
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn test_queuing_host_needs_commands() {
        let doc = "hosts:\n  a:\n    machine_type: local\n    root: /x\n    queuing: true\n    submit_command: qsub\n";
        let err = Config::parse(doc).unwrap_err();
        assert!(err.to_string().contains("status_command"));
    }

    #[test]
    fn test_computation_host_needs_submit_command() {
        let doc = "hosts:\n  ws:\n    machine_type: remote\n    address: ws.example.org\n    username: alice\n    root: /work/alice\n    computation: true\n";
        let err = Config::parse(doc).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.to_string().contains("submit_command"));
        assert!(err.to_string().contains("'ws'"));
    }

    #[test]
    fn test_remote_host_needs_address() {
        let doc = "hosts:\n  a:\n    machine_type: remote\n    username: u\n    root: /x\n";
        let err = Config::parse(doc).unwrap_err();
        assert!(err.to_string().contains("address"));
    }

    #[test]
    fn test_load_from_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config::parse(SAMPLE).unwrap();
        fs::write(dir.path().join(HOSTS_FILE), SAMPLE).unwrap();

        let loaded = Config::load_from(dir.path()).unwrap();
        assert_eq!(loaded.host("cluster").unwrap(), config.host("cluster").unwrap());
        assert_eq!(loaded.dir, dir.path());
        assert_eq!(
            loaded.host_env_dir("cluster"),
            dir.path().join("hosts").join("cluster")
        );
    }

    #[test]
    fn test_builders() {
        let host = HostRecord::remote("c", "h.example.org", "bob", "/scratch/bob")
            .with_scheduler("sbatch", "squeue", "scancel", 3)
            .with_port(2200)
            .with_ssh_key("~/.ssh/id_rsa")
            .with_retry(2, 0);
        assert!(host.queuing && host.computation);
        assert_eq!(host.connection_string(), "bob@h.example.org");
        assert_eq!(host.command("delete_command").unwrap(), "scancel");
        assert_eq!(host.retry_interval(), Duration::from_secs(0));
        assert!(host.validate().is_ok());
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/key"), PathBuf::from("/abs/key"));
        let expanded = expand_home("~/.ssh/id_rsa");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join(".ssh/id_rsa"));
        }
    }
}
