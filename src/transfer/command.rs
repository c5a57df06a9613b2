//! Command lines for the external sync and copy tools.

use std::path::Path;

use crate::error::{Error, Result};
use crate::remote::{shell_quote, RemoteHost};

/// Filters and flags for a mirroring sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub dry_run: bool,
    /// Delete destination files that are absent from the source
    pub mirror_delete: bool,
    /// Bandwidth cap in KB/s
    pub bandwidth_limit: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: Vec::new(),
            dry_run: false,
            mirror_delete: false,
            bandwidth_limit: 30000,
        }
    }
}

impl SyncOptions {
    pub fn with_bandwidth_limit(mut self, limit: u32) -> Self {
        self.bandwidth_limit = limit;
        self
    }

    pub fn with_include(mut self, patterns: &[&str]) -> Self {
        self.include
            .extend(patterns.iter().map(|p| p.to_string()));
        self
    }

    pub fn with_exclude(mut self, patterns: &[&str]) -> Self {
        self.exclude
            .extend(patterns.iter().map(|p| p.to_string()));
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_mirror_delete(mut self, mirror_delete: bool) -> Self {
        self.mirror_delete = mirror_delete;
        self
    }

    /// True when any option that a direct remote copy cannot honour is set.
    pub fn has_sync_only_options(&self) -> bool {
        !self.include.is_empty() || !self.exclude.is_empty() || self.dry_run || self.mirror_delete
    }
}

/// `path` as seen from the orchestrating machine: plain for local hosts,
/// `user@address:path` for remote ones.
fn endpoint(host: &RemoteHost, path: &str) -> String {
    if host.is_remote() {
        format!("{}:{}", host.record().connection_string(), path)
    } else {
        path.to_string()
    }
}

fn ssh_transport(host: &RemoteHost) -> String {
    let mut ssh = format!("ssh -p {}", host.record().port);
    if let Some(key) = host.record().expanded_ssh_key() {
        ssh.push_str(&format!(" -i {}", shell_quote(&key.to_string_lossy())));
    }
    ssh
}

/// Builds the rsync invocation for a transfer between one local and one
/// remote endpoint.
pub fn rsync_command(
    from: &RemoteHost,
    from_path: &Path,
    to: &RemoteHost,
    to_path: &Path,
    is_dir: bool,
    options: &SyncOptions,
) -> String {
    let mut args: Vec<String> = vec![
        "rsync".to_string(),
        "--bwlimit".to_string(),
        options.bandwidth_limit.to_string(),
        "-avz".to_string(),
    ];

    let remote = if from.is_remote() { from } else { to };
    if remote.is_remote() {
        args.push("-e".to_string());
        args.push(shell_quote(&ssh_transport(remote)));
    }

    if options.dry_run {
        args.push("-n".to_string());
    }
    for include in &options.include {
        args.push(format!("--include={}", shell_quote(include)));
        args.push(format!("--include={}", shell_quote(&format!("{}/*", include))));
    }
    if !options.include.is_empty() && options.exclude.is_empty() {
        args.push(format!("--exclude={}", shell_quote("*")));
    }
    for exclude in &options.exclude {
        args.push(format!("--exclude={}", shell_quote(exclude)));
    }
    if options.mirror_delete {
        args.push("--delete".to_string());
    }

    let mut source = from_path.to_string_lossy().to_string();
    if is_dir && !source.ends_with('/') {
        source.push('/');
    }
    args.push(shell_quote(&endpoint(from, &source)));
    args.push(shell_quote(&endpoint(to, &to_path.to_string_lossy())));

    args.join(" ")
}

/// Builds a third-party `scp -3` copy between two remote endpoints.
///
/// Directory copies take the contents of `from_path` into an existing
/// `to_path`. Both hosts must listen on the same SSH port because scp applies
/// one port to both legs.
pub fn remote_copy_command(
    from: &RemoteHost,
    from_path: &Path,
    to: &RemoteHost,
    to_path: &Path,
    is_dir: bool,
) -> Result<String> {
    if from.record().port != to.record().port {
        return Err(Error::Unsupported(format!(
            "remote-remote copy between {} (port {}) and {} (port {}) needs a common SSH port",
            from.name(),
            from.record().port,
            to.name(),
            to.record().port
        )));
    }

    let mut args = vec!["scp".to_string(), "-3".to_string(), "-r".to_string()];
    if from.record().port != 22 {
        args.push("-P".to_string());
        args.push(from.record().port.to_string());
    }
    let mut keys: Vec<String> = [from, to]
        .iter()
        .filter_map(|h| h.record().expanded_ssh_key())
        .map(|k| k.to_string_lossy().to_string())
        .collect();
    keys.dedup();
    for key in keys {
        args.push("-i".to_string());
        args.push(shell_quote(&key));
    }

    let source = if is_dir {
        format!("{}/*", from_path.to_string_lossy().trim_end_matches('/'))
    } else {
        from_path.to_string_lossy().to_string()
    };
    args.push(shell_quote(&endpoint(from, &source)));
    args.push(shell_quote(&endpoint(to, &to_path.to_string_lossy())));

    Ok(args.join(" "))
}
