//! CLI command for inspecting jobshuttle configuration.

use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

use jobshuttle::config::{Config, HOSTS_FILE};

#[derive(Args)]
#[command(about = "Inspect jobshuttle configuration")]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the configuration directory
    Path,

    /// Show the loaded host registry
    Show,

    /// List all configured hosts
    ListHosts,
}

impl ConfigCommand {
    pub fn execute(&self, config_dir: Option<&Path>) -> Result<()> {
        match &self.action {
            ConfigAction::Path => self.show_path(config_dir),
            ConfigAction::Show => self.show_config(config_dir),
            ConfigAction::ListHosts => self.list_hosts(config_dir),
        }
    }

    fn resolve_dir(config_dir: Option<&Path>) -> Option<PathBuf> {
        config_dir.map(Path::to_path_buf).or_else(Config::default_dir)
    }

    fn load(config_dir: Option<&Path>) -> Result<Config> {
        Ok(match config_dir {
            Some(dir) => Config::load_from(dir)?,
            None => Config::load()?,
        })
    }

    fn show_path(&self, config_dir: Option<&Path>) -> Result<()> {
        match Self::resolve_dir(config_dir) {
            Some(dir) => {
                let hosts = dir.join(HOSTS_FILE);
                println!("Configuration directory: {}", dir.display());
                if hosts.exists() {
                    println!("Status: {} exists", HOSTS_FILE);
                } else {
                    println!("Status: {} does not exist", HOSTS_FILE);
                }
            }
            None => {
                println!("Could not determine configuration directory");
            }
        }

        Ok(())
    }

    fn show_config(&self, config_dir: Option<&Path>) -> Result<()> {
        let config = Self::load(config_dir)?;
        let yaml = serde_yaml::to_string(&config)?;
        println!("{}", yaml);

        Ok(())
    }

    fn list_hosts(&self, config_dir: Option<&Path>) -> Result<()> {
        let config = Self::load(config_dir)?;

        if config.hosts.is_empty() {
            println!("No hosts configured.");
            return Ok(());
        }

        println!("Configured hosts:");
        println!();

        for name in config.host_names() {
            let host = config.host(name)?;
            let mut flags = Vec::new();
            if host.queuing {
                flags.push("queuing");
            }
            if host.computation {
                flags.push("computation");
            }
            let location = if host.is_remote() {
                format!("{}:{}", host.connection_string(), host.port)
            } else {
                "local".to_string()
            };
            println!(
                "  {} - {} root={} [{}]",
                name,
                location,
                host.root.display(),
                flags.join(", ")
            );
        }

        Ok(())
    }
}
