//! Plumbing shared by the subcommands.

use anyhow::{Context as _, Result};
use clap::Args;
use std::path::{Path, PathBuf};

use jobshuttle::config::{Config, DefaultSettings};
use jobshuttle::job::{Job, JobStore, PollSettings};
use jobshuttle::remote::RemoteHost;
use jobshuttle::transfer::{DataTransfer, SyncOptions, TransferEngine};

/// Loaded configuration plus the global flags.
pub struct Context {
    pub config: Config,
    pub safe_mode: bool,
}

impl Context {
    pub fn load(config_dir: Option<&Path>, safe: bool) -> Result<Self> {
        let config = match config_dir {
            Some(dir) => Config::load_from(dir)?,
            None => Config::load()?,
        };
        let safe_mode = safe || config.defaults.safe_mode;
        Ok(Self { config, safe_mode })
    }

    pub fn host(&self, name: &str) -> Result<RemoteHost> {
        Ok(RemoteHost::new(self.config.host(name)?.clone()))
    }

    pub fn data_transfer(&self, local: &str, client: &str, server: &str) -> Result<DataTransfer> {
        Ok(DataTransfer::new(
            self.host(local)?,
            self.host(client)?,
            self.host(server)?,
            TransferEngine::new(self.safe_mode),
        ))
    }

    pub fn store(&self, dir: &Path) -> JobStore {
        JobStore::new(dir, &self.config.defaults.record_file)
    }

    pub fn poll(&self) -> PollSettings {
        PollSettings::from(&self.config.defaults)
    }

    /// Loads the job recorded in `dir`, reconnecting to its hosts.
    pub fn load_job(&self, dir: &Path) -> Result<Job> {
        let store = self.store(dir);
        let record = store
            .load()
            .with_context(|| format!("no job found in {}", dir.display()))?;
        let transfer = self.data_transfer(&record.local, &record.client, &record.server)?;
        Ok(Job::load(store, transfer)?.with_poll(self.poll()))
    }
}

pub fn current_dir() -> Result<PathBuf> {
    std::env::current_dir().context("failed to read the current directory")
}

/// The three endpoints of a transfer.
#[derive(Args, Debug, Clone)]
pub struct HostArgs {
    /// Machine this command runs on
    #[arg(long, default_value = "localhost")]
    pub local: String,

    /// Machine holding the client copy (typically local)
    #[arg(long, default_value = "localhost")]
    pub client: String,

    /// Machine holding the server copy
    #[arg(long)]
    pub server: String,
}

/// rsync filters and flags.
#[derive(Args, Debug, Clone, Default)]
pub struct SyncArgs {
    /// Only transfer matching paths (repeatable)
    #[arg(long = "include", value_name = "PATTERN")]
    pub include: Vec<String>,

    /// Skip matching paths (repeatable)
    #[arg(long = "exclude", value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Show what would be transferred
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Delete files on the destination that are absent from the source
    #[arg(long)]
    pub delete: bool,

    /// Bandwidth cap in KB/s
    #[arg(long, value_name = "KBPS")]
    pub bwlimit: Option<u32>,
}

impl SyncArgs {
    pub fn options(&self, defaults: &DefaultSettings) -> SyncOptions {
        SyncOptions {
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            dry_run: self.dry_run,
            mirror_delete: self.delete,
            bandwidth_limit: self.bwlimit.unwrap_or(defaults.bandwidth_limit),
        }
    }
}
