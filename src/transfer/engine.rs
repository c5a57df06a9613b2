//! Locality-aware transfer of one file or directory between two hosts.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use log::{debug, error, info, warn};

use crate::config::MachineType;
use crate::error::{Error, Result};
use crate::remote::{ExecutionResult, LocalShell, RemoteHost, Shell};
use crate::transfer::command::{remote_copy_command, rsync_command, SyncOptions};

/// One transfer request.
#[derive(Debug, Clone)]
pub struct TransferSpec<'a> {
    pub from: &'a RemoteHost,
    pub from_path: PathBuf,
    pub to: &'a RemoteHost,
    pub to_path: PathBuf,
    pub is_dir: bool,
    pub options: SyncOptions,
}

impl<'a> TransferSpec<'a> {
    pub fn file(
        from: &'a RemoteHost,
        from_path: impl Into<PathBuf>,
        to: &'a RemoteHost,
        to_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            from,
            from_path: from_path.into(),
            to,
            to_path: to_path.into(),
            is_dir: false,
            options: SyncOptions::default(),
        }
    }

    pub fn dir(
        from: &'a RemoteHost,
        from_path: impl Into<PathBuf>,
        to: &'a RemoteHost,
        to_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            is_dir: true,
            ..Self::file(from, from_path, to, to_path)
        }
    }

    pub fn with_options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }
}

/// Moves data between hosts, choosing rsync or a third-party scp by where the
/// two endpoints live. Tools run on the orchestrating machine.
#[derive(Clone)]
pub struct TransferEngine {
    shell: Arc<dyn Shell>,
    safe_mode: bool,
}

impl Default for TransferEngine {
    fn default() -> Self {
        Self::new(false)
    }
}

impl TransferEngine {
    pub fn new(safe_mode: bool) -> Self {
        Self {
            shell: Arc::new(LocalShell),
            safe_mode,
        }
    }

    /// Uses `shell` to launch the sync and copy tools.
    pub fn with_shell(shell: Arc<dyn Shell>, safe_mode: bool) -> Self {
        Self { shell, safe_mode }
    }

    pub fn safe_mode(&self) -> bool {
        self.safe_mode
    }

    pub fn transfer(&self, spec: &TransferSpec<'_>) -> Result<()> {
        for path in [&spec.from_path, &spec.to_path] {
            if !path.is_absolute() {
                return Err(Error::Precondition(format!(
                    "transfer path '{}' must be absolute",
                    path.display()
                )));
            }
        }

        if self.safe_mode {
            let present = if spec.is_dir {
                spec.from.is_dir(&spec.from_path)?
            } else {
                spec.from.is_file(&spec.from_path)?
            };
            if !present {
                return Err(Error::Precondition(format!(
                    "{} {} is not found on {}",
                    if spec.is_dir { "directory" } else { "file" },
                    spec.from_path.display(),
                    spec.from.name()
                )));
            }
        }

        self.ensure_parent(spec.to, &spec.to_path)?;

        match (spec.from.record().machine_type, spec.to.record().machine_type) {
            (MachineType::Local, MachineType::Local) => {
                debug!("No data transfer is needed between two local endpoints.");
                Ok(())
            }
            (MachineType::Local, MachineType::Remote) => {
                info!(
                    "Transfer data from local machine ({}) to remote machine ({}) using rsync.",
                    spec.from.name(),
                    spec.to.name()
                );
                let command = self.rsync(spec);
                let result = self.launch(&command)?;
                check_exit("rsync", &result)
            }
            (MachineType::Remote, MachineType::Local) => {
                info!(
                    "Transfer data from remote machine ({}) to local machine ({}) using rsync.",
                    spec.from.name(),
                    spec.to.name()
                );
                let command = self.rsync(spec);
                let result = self.launch(&command)?;
                if !result.is_success() {
                    warn!("rsync exited with {}: {}", result.exit_code, result.stderr.trim());
                }
                if spec.options.dry_run {
                    return Ok(());
                }
                self.confirm_pull(spec, &command)
            }
            (MachineType::Remote, MachineType::Remote) => self.copy_between_remotes(spec),
        }
    }

    fn rsync(&self, spec: &TransferSpec<'_>) -> String {
        info!("From:: {}", spec.from_path.display());
        info!("To:: {}", spec.to_path.display());
        let command = rsync_command(
            spec.from,
            &spec.from_path,
            spec.to,
            &spec.to_path,
            spec.is_dir,
            &spec.options,
        );
        info!("rsync_command = {}", command);
        command
    }

    /// Creates the destination's parent directory and checks that it exists.
    fn ensure_parent(&self, host: &RemoteHost, path: &Path) -> Result<()> {
        let parent = path.parent().unwrap_or(path);
        debug!("makedir {} on {}", parent.display(), host.name());
        host.make_dir(parent)?;
        if !host.is_dir(parent)? {
            return Err(Error::Precondition(format!(
                "{} could not be created on {}",
                parent.display(),
                host.name()
            )));
        }
        Ok(())
    }

    fn launch(&self, command: &str) -> Result<ExecutionResult> {
        let result = self.shell.exec(command)?;
        if !result.stdout.trim().is_empty() {
            info!("==Start:: output of the transfer command==");
            for line in result.stdout.lines() {
                info!("{}", line);
            }
            info!("==End:: output of the transfer command==");
        }
        Ok(result)
    }

    /// Pulls from a remote are re-run until the destination shows up, up to
    /// the source host's retry budget. Giving up only warns.
    fn confirm_pull(&self, spec: &TransferSpec<'_>, command: &str) -> Result<()> {
        let record = spec.from.record();
        for attempt in 1..=record.retry_attempts {
            debug!("exist trial {}/{}", attempt, record.retry_attempts);
            if spec.to.exists(&spec.to_path)? {
                return Ok(());
            }
            error!("{} is not found after the pull", spec.to_path.display());
            info!("Waiting for {} sec...", record.retry_interval_secs);
            thread::sleep(record.retry_interval());
            let result = self.launch(command)?;
            if !result.is_success() {
                warn!("rsync exited with {}: {}", result.exit_code, result.stderr.trim());
            }
        }
        if spec.to.exists(&spec.to_path)? {
            return Ok(());
        }
        warn!(
            "{} still missing after {} re-runs of the pull",
            spec.to_path.display(),
            record.retry_attempts
        );
        Ok(())
    }

    fn copy_between_remotes(&self, spec: &TransferSpec<'_>) -> Result<()> {
        info!(
            "Transfer data from remote machine ({}) to remote machine ({}) using scp.",
            spec.from.name(),
            spec.to.name()
        );
        info!("From {}", spec.from_path.display());
        info!("To {}", spec.to_path.display());
        if spec.options.has_sync_only_options() {
            warn!(
                "dry-run, include, exclude, and delete options are ignored for a remote-remote transfer"
            );
        }

        if spec.is_dir {
            spec.to.make_dir(&spec.to_path)?;
        }
        let command = remote_copy_command(
            spec.from,
            &spec.from_path,
            spec.to,
            &spec.to_path,
            spec.is_dir,
        )?;
        info!("scp_command = {}", command);
        let result = self.launch(&command)?;
        check_exit("scp", &result)
    }
}

fn check_exit(tool: &str, result: &ExecutionResult) -> Result<()> {
    if result.is_success() {
        Ok(())
    } else {
        Err(Error::TransientIo(format!(
            "{} exited with {}: {}",
            tool,
            result.exit_code,
            result.stderr.trim()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostRecord;
    use crate::remote::mock::ScriptedShell;

    struct Fixture {
        tools: ScriptedShell,
        local_shell: ScriptedShell,
        remote_shell: ScriptedShell,
        local: RemoteHost,
        cluster: RemoteHost,
    }

    fn fixture() -> Fixture {
        let tools = ScriptedShell::new();
        let local_shell = ScriptedShell::new();
        let remote_shell = ScriptedShell::new();
        local_shell.respond_always("test -", ExecutionResult::ok("0\n"));
        remote_shell.respond_always("test -", ExecutionResult::ok("0\n"));
        let local = RemoteHost::with_shell(
            HostRecord::local("localhost", "/home/u/proj").with_retry(3, 0),
            Arc::new(local_shell.clone()),
        );
        let cluster = RemoteHost::with_shell(
            HostRecord::remote("cluster", "login.example.org", "u", "/scratch/u/proj")
                .with_retry(3, 0),
            Arc::new(remote_shell.clone()),
        );
        Fixture {
            tools,
            local_shell,
            remote_shell,
            local,
            cluster,
        }
    }

    fn engine(f: &Fixture, safe_mode: bool) -> TransferEngine {
        TransferEngine::with_shell(Arc::new(f.tools.clone()), safe_mode)
    }

    #[test]
    fn test_local_to_local_only_creates_parent() {
        let f = fixture();
        let spec = TransferSpec::dir(&f.local, "/home/u/a", &f.local, "/home/u/b/c");
        engine(&f, false).transfer(&spec).unwrap();

        assert!(f.tools.commands().is_empty());
        assert_eq!(f.local_shell.count("mkdir -p /home/u/b"), 1);
        assert_eq!(f.local_shell.count("test -d /home/u/b"), 1);
    }

    #[test]
    fn test_relative_paths_rejected() {
        let f = fixture();
        let spec = TransferSpec::file(&f.local, "rel", &f.cluster, "/scratch/u/x");
        let err = engine(&f, false).transfer(&spec).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
        assert!(f.remote_shell.commands().is_empty());
    }

    #[test]
    fn test_push_runs_rsync() {
        let f = fixture();
        let spec = TransferSpec::dir(&f.local, "/home/u/proj/run1", &f.cluster, "/scratch/u/proj/run1");
        engine(&f, false).transfer(&spec).unwrap();

        let commands = f.tools.commands();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].starts_with("rsync "));
        assert_eq!(f.remote_shell.count("mkdir -p /scratch/u/proj"), 1);
    }

    #[test]
    fn test_push_failure_is_reported() {
        let f = fixture();
        f.tools.respond("rsync", ExecutionResult::failed("rsync: connection unexpectedly closed"));
        let spec = TransferSpec::file(&f.local, "/home/u/proj/a", &f.cluster, "/scratch/u/proj/a");
        let err = engine(&f, false).transfer(&spec).unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_safe_mode_requires_source() {
        let f = fixture();
        f.local_shell.respond("test -f /home/u/proj/missing", ExecutionResult::ok("1\n"));
        let spec = TransferSpec::file(&f.local, "/home/u/proj/missing", &f.cluster, "/scratch/u/proj/missing");
        let err = engine(&f, true).transfer(&spec).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
        assert!(f.tools.commands().is_empty());
    }

    #[test]
    fn test_missing_destination_parent_is_fatal() {
        let f = fixture();
        f.remote_shell.respond("test -d /scratch/u/proj", ExecutionResult::ok("1\n"));
        let spec = TransferSpec::file(&f.local, "/home/u/proj/a", &f.cluster, "/scratch/u/proj/a");
        let err = engine(&f, false).transfer(&spec).unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
        assert!(f.tools.commands().is_empty());
    }

    #[test]
    fn test_pull_reruns_until_destination_exists() {
        let f = fixture();
        f.local_shell.respond("test -e /home/u/proj/out.o", ExecutionResult::ok("1\n"));
        f.local_shell.respond("test -e /home/u/proj/out.o", ExecutionResult::ok("1\n"));
        let spec = TransferSpec::file(&f.cluster, "/scratch/u/proj/out.o", &f.local, "/home/u/proj/out.o");
        engine(&f, false).transfer(&spec).unwrap();

        assert_eq!(f.tools.count("rsync"), 3);
    }

    #[test]
    fn test_pull_gives_up_with_warning() {
        let f = fixture();
        f.local_shell.respond_always("test -e", ExecutionResult::ok("1\n"));
        let spec = TransferSpec::file(&f.cluster, "/scratch/u/proj/out.o", &f.local, "/home/u/proj/out.o");
        engine(&f, false).transfer(&spec).unwrap();

        // initial pull plus one re-run per retry attempt
        assert_eq!(f.tools.count("rsync"), 4);
        assert_eq!(f.local_shell.count("test -e"), 4);
    }

    #[test]
    fn test_pull_landing_on_last_rerun_is_confirmed() {
        let f = fixture();
        for _ in 0..3 {
            f.local_shell.respond("test -e /home/u/proj/out.o", ExecutionResult::ok("1\n"));
        }
        let spec = TransferSpec::file(&f.cluster, "/scratch/u/proj/out.o", &f.local, "/home/u/proj/out.o");
        engine(&f, false).transfer(&spec).unwrap();

        assert_eq!(f.tools.count("rsync"), 4);
        assert_eq!(f.local_shell.count("test -e /home/u/proj/out.o"), 4);
    }

    #[test]
    fn test_dry_run_pull_skips_confirmation() {
        let f = fixture();
        f.local_shell.respond_always("test -e", ExecutionResult::ok("1\n"));
        let spec = TransferSpec::dir(&f.cluster, "/scratch/u/proj/run1", &f.local, "/home/u/proj/run1")
            .with_options(SyncOptions::default().with_dry_run(true));
        engine(&f, false).transfer(&spec).unwrap();

        assert_eq!(f.tools.count("rsync"), 1);
        assert_eq!(f.local_shell.count("test -e"), 0);
    }

    #[test]
    fn test_remote_to_remote_directory() {
        let f = fixture();
        let other_shell = ScriptedShell::new();
        other_shell.respond_always("test -", ExecutionResult::ok("0\n"));
        let other = RemoteHost::with_shell(
            HostRecord::remote("other", "b.example.org", "v", "/work/v").with_retry(1, 0),
            Arc::new(other_shell.clone()),
        );
        let spec = TransferSpec::dir(&f.cluster, "/scratch/u/proj/run1", &other, "/work/v/run1")
            .with_options(SyncOptions::default().with_include(&["*.dat"]));
        engine(&f, false).transfer(&spec).unwrap();

        assert_eq!(other_shell.count("mkdir -p /work/v/run1"), 1);
        let commands = f.tools.commands();
        assert_eq!(commands.len(), 1);
        assert!(commands[0].starts_with("scp -3 -r"));
        assert!(!commands[0].contains("include"));
    }
}
