//! Batch job lifecycle: prepare, script, submit, poll, fetch and delete.
//!
//! ```text
//! unsubmitted --submit--> running --check--> finished
//!                            |
//!                            +--delete--> deleted
//! ```
//!
//! The record is saved after every transition so a later, independent
//! invocation can pick the job up from its working directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};

use crate::config::{Config, DefaultSettings};
use crate::error::{Error, Result};
use crate::job::package::PackageCatalog;
use crate::job::record::{JobRecord, JobStore, RunState};
use crate::job::resources::{ResourceProfile, ResourceTable};
use crate::job::script::{self, ScriptSettings};
use crate::remote::{shell_quote, RemoteHost};
use crate::transfer::{DataTransfer, SyncOptions};

pub const PACKAGES_FILE: &str = "packages.yml";
pub const RESOURCES_FILE: &str = "queue_data.txt";

/// How often and how long to poll an empty scheduler listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub attempts: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            attempts: 10,
        }
    }
}

impl From<&DefaultSettings> for PollSettings {
    fn from(defaults: &DefaultSettings) -> Self {
        Self {
            interval: Duration::from_secs(defaults.stat_interval_secs),
            attempts: defaults.stat_attempts.max(1),
        }
    }
}

/// Everything needed to prepare a new job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub package: String,
    pub version: Option<String>,
    pub binary: Option<String>,
    pub cores: u32,
    pub threads: u32,
    pub queue: Option<String>,
    pub script: ScriptSettings,
    pub script_file: String,
}

impl JobRequest {
    pub fn new(package: &str, cores: u32, threads: u32) -> Self {
        Self {
            package: package.to_string(),
            version: None,
            binary: None,
            cores,
            threads,
            queue: None,
            script: ScriptSettings::default(),
            script_file: "submit.sh".to_string(),
        }
    }
}

/// Job environment files of one computation host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEnvironment {
    dir: PathBuf,
}

impl HostEnvironment {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn for_host(config: &Config, host: &str) -> Self {
        Self::new(config.host_env_dir(host))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn packages(&self) -> Result<PackageCatalog> {
        PackageCatalog::load(&self.dir.join(PACKAGES_FILE))
    }

    pub fn resources(&self) -> Result<ResourceTable> {
        ResourceTable::load(&self.dir.join(RESOURCES_FILE))
    }

    pub fn template(&self, settings: &ScriptSettings) -> Result<String> {
        let path = self.dir.join(settings.template_name());
        fs::read_to_string(&path).map_err(|e| {
            Error::Configuration(format!(
                "Failed to read script template {}: {}",
                path.display(),
                e
            ))
        })
    }
}

/// Counts listing lines that belong to `username` in `queue`: the user name
/// appears, and later on the line `queue` stands as a token preceded by
/// whitespace and followed by whitespace or the end of the line.
pub fn count_queued_jobs(listing: &str, username: &str, queue: &str) -> usize {
    listing
        .lines()
        .filter(|line| {
            let Some(start) = line.find(username) else {
                return false;
            };
            let rest = &line[start + username.len()..];
            rest.match_indices(queue).any(|(i, _)| {
                let before = rest[..i].chars().next_back();
                let after = rest[i + queue.len()..].chars().next();
                matches!(before, Some(c) if c.is_whitespace())
                    && after.map_or(true, char::is_whitespace)
            })
        })
        .count()
}

/// One batch job and the hosts it runs between.
pub struct Job {
    record: JobRecord,
    store: JobStore,
    transfer: DataTransfer,
    poll: PollSettings,
}

impl Job {
    /// Resolves package and resources for a new, not yet persisted job.
    pub fn prepare(
        request: &JobRequest,
        env: &HostEnvironment,
        transfer: DataTransfer,
        store: JobStore,
    ) -> Result<Self> {
        let server = transfer.server();
        if !server.record().computation {
            return Err(Error::Configuration(format!(
                "{} is not a computation server",
                server.name()
            )));
        }
        info!("package = {}", request.package);
        info!("cores = {}, threads = {}", request.cores, request.threads);

        let package = env.packages()?.select(
            &request.package,
            request.version.as_deref(),
            request.binary.as_deref(),
        )?;
        let queuing = server.record().queuing;
        let record = JobRecord::new(
            transfer.local().name(),
            transfer.client().name(),
            server.name(),
            package,
            ResourceProfile::unscheduled(request.cores, request.threads),
            request.script.clone(),
            &request.script_file,
        );
        let mut job = Self {
            record,
            store,
            transfer,
            poll: PollSettings::default(),
        };
        if queuing {
            job.prepare_resources(
                &env.resources()?,
                request.cores,
                request.threads,
                request.queue.as_deref(),
            )?;
        }
        Ok(job)
    }

    /// Picks up a job persisted by an earlier invocation.
    pub fn load(store: JobStore, transfer: DataTransfer) -> Result<Self> {
        let record = store.load()?;
        if record.server != transfer.server().name() {
            return Err(Error::Configuration(format!(
                "job record in {} belongs to server '{}', not '{}'",
                store.dir().display(),
                record.server,
                transfer.server().name()
            )));
        }
        Ok(Self {
            record,
            store,
            transfer,
            poll: PollSettings::default(),
        })
    }

    pub fn with_poll(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    pub fn record(&self) -> &JobRecord {
        &self.record
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    fn server(&self) -> &RemoteHost {
        self.transfer.server()
    }

    fn save(&mut self) -> Result<()> {
        self.store.save(&mut self.record)
    }

    /// Fills the resource profile from the single matching table row.
    pub fn prepare_resources(
        &mut self,
        table: &ResourceTable,
        cores: u32,
        threads: u32,
        queue: Option<&str>,
    ) -> Result<&ResourceProfile> {
        self.record.resources = table.resolve(cores, threads, queue)?;
        Ok(&self.record.resources)
    }

    /// Renders `template` into the job directory and saves the record next
    /// to it.
    pub fn generate_script(&mut self, template: &str) -> Result<PathBuf> {
        let text = script::render(
            template,
            &self.record.resources,
            &self.record.package,
            &self.record.script,
        );
        let path = self.store.dir().join(&self.record.script_file);
        fs::write(&path, text)?;
        info!("{} has been generated.", path.display());
        self.save()?;
        Ok(path)
    }

    /// True while the user has fewer jobs in the queue than it accepts.
    pub fn has_capacity(&self) -> Result<bool> {
        let server = self.server();
        if !server.record().queuing {
            return Ok(true);
        }
        let resources = &self.record.resources;
        let queue = resources.queue.as_deref().ok_or_else(|| {
            Error::Configuration("job has no queue; resources were not prepared".to_string())
        })?;
        let limit = resources.max_job_submit.ok_or_else(|| {
            Error::Configuration(format!("queue {} has no MAX_JOB_SUBMIT", queue))
        })?;

        let listing = server.job_listing()?;
        let count = count_queued_jobs(&listing, &server.record().username(), queue);
        info!("{} jobs are queued in {} on {}", count, queue, server.name());
        if (count as u64) < u64::from(limit) {
            info!("{} < max_job_submit: {}", count, limit);
            Ok(true)
        } else {
            info!("{} >= max_job_submit: {}", count, limit);
            Ok(false)
        }
    }

    /// Pushes the job's objects and submits it. Returns false, without
    /// touching anything, when the queue is full.
    pub fn submit(&mut self, cwd: &Path, objects: &[PathBuf], options: &SyncOptions) -> Result<bool> {
        let submit_command = self.server().record().command("submit_command")?.to_string();
        if !self.has_capacity()? {
            info!("The current number of jobs exceeds the maximum.");
            return Ok(false);
        }
        self.transfer.check_roots()?;
        if options.dry_run {
            info!("This is a dry-run");
            return Ok(true);
        }

        let translator = self.transfer.translator();
        let server_dir = if translator.both_local() {
            cwd.to_path_buf()
        } else {
            let dir = translator.translate(cwd)?;
            debug!("client_dir = {}", dir.client.display());
            debug!("server_dir = {}", dir.server.display());
            self.transfer.put_objects(cwd, objects, options)?;
            debug!("data transfer is ok");
            dir.server
        };

        let server = self.transfer.server();
        let command = format!("{} {}", submit_command, shell_quote(&self.record.script_file));
        let result = server.run(&command, Some(&server_dir))?;

        if server.record().queuing {
            let index = server.record().job_number_index.unwrap_or(0);
            let job_number = result
                .stdout
                .split_whitespace()
                .nth(index)
                .ok_or_else(|| {
                    Error::Configuration(format!(
                        "submit output {:?} has no token at job_number_index {}",
                        result.stdout.trim(),
                        index
                    ))
                })?
                .to_string();
            info!("Job {} submitted to {}", job_number, server.name());
            self.record.job_number = Some(job_number);
            self.record.run_state = RunState::Running;
        } else {
            info!("Job ran on {}", server.name());
            self.record.job_number = None;
            self.record.run_state = RunState::Finished;
        }
        self.record.job_dir = Some(server_dir);
        self.record.submitted_at = Some(Utc::now());
        info!("Job submission is successful.");
        self.save()?;
        Ok(true)
    }

    fn poll_listing(&self) -> Result<String> {
        let server = self.server();
        for attempt in 1..=self.poll.attempts {
            let listing = server.job_listing()?;
            if !listing.trim().is_empty() {
                return Ok(listing);
            }
            warn!(
                "[{}] job listing is empty (attempt {}/{})",
                server.name(),
                attempt,
                self.poll.attempts
            );
            if attempt < self.poll.attempts {
                info!("Retrying after {}s", self.poll.interval.as_secs());
                thread::sleep(self.poll.interval);
            }
        }
        Err(Error::TransientIo(format!(
            "job listing on {} stayed empty after {} attempts",
            server.name(),
            self.poll.attempts
        )))
    }

    /// Asks the scheduler whether the job is still listed. Returns true
    /// while it is running.
    pub fn check_status(&mut self) -> Result<bool> {
        let queuing = self.server().record().queuing;
        let running = if queuing {
            let job_number = self.record.job_number.clone().ok_or_else(|| {
                Error::Precondition("job has no job number; it was never submitted".to_string())
            })?;
            let listing = self.poll_listing()?;
            let listed = listing.lines().any(|line| line.contains(job_number.as_str()));
            if listed {
                info!("job {} is running.", job_number);
            } else {
                info!("job {} has finished.", job_number);
            }
            listed
        } else {
            false
        };

        self.record.checked_at = Some(Utc::now());
        if self.record.run_state != RunState::Deleted {
            self.record.run_state = if running {
                RunState::Running
            } else {
                RunState::Finished
            };
        }
        self.save()?;
        Ok(running)
    }

    /// Pulls results from the server back to the client.
    pub fn fetch(&mut self, cwd: &Path, objects: &[PathBuf], options: &SyncOptions) -> Result<()> {
        self.transfer.check_roots()?;
        if options.dry_run {
            info!("This is a dry-run");
            return Ok(());
        }
        if !self.transfer.translator().both_local() {
            self.transfer.get_objects(cwd, objects, options)?;
        }
        self.record.fetched_at = Some(Utc::now());
        self.save()
    }

    /// Removes the job from the scheduler.
    pub fn delete(&mut self) -> Result<()> {
        let job_number = self.record.job_number.clone().ok_or_else(|| {
            Error::Precondition("job has no job number; nothing to delete".to_string())
        })?;
        self.server().delete_job(&job_number)?;
        self.record.run_state = RunState::Deleted;
        self.record.status = "failed".to_string();
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
Job id            Name             User              Time Use S Queue
----------------  ---------------- ----------------  -------- - -----
4242.pbs          h2               alice             00:01:02 R small
4243.pbs          h2               alice             0        Q small
4244.pbs          big              alice             0        Q large
4245.pbs          h2               bob               0        Q small
4246.pbs          smallish         alice             0        Q smallq
";

    #[test]
    fn test_count_queued_jobs() {
        assert_eq!(count_queued_jobs(LISTING, "alice", "small"), 2);
        assert_eq!(count_queued_jobs(LISTING, "alice", "large"), 1);
        assert_eq!(count_queued_jobs(LISTING, "bob", "small"), 1);
        assert_eq!(count_queued_jobs(LISTING, "carol", "small"), 0);
    }

    #[test]
    fn test_queue_is_a_whole_token() {
        assert_eq!(count_queued_jobs("1 alice small", "alice", "small"), 1);
        assert_eq!(count_queued_jobs("1 alice smallq", "alice", "small"), 0);
        assert_eq!(count_queued_jobs("1 alice xsmall 0", "alice", "small"), 0);
    }

    #[test]
    fn test_queue_must_come_after_user() {
        assert_eq!(count_queued_jobs("1 small alice x\n", "alice", "small"), 0);
    }

    #[test]
    fn test_poll_settings_from_defaults() {
        let defaults = DefaultSettings {
            stat_interval_secs: 5,
            stat_attempts: 3,
            ..DefaultSettings::default()
        };
        let poll = PollSettings::from(&defaults);
        assert_eq!(poll.interval, Duration::from_secs(5));
        assert_eq!(poll.attempts, 3);
    }
}
