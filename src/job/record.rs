//! Durable job record.
//!
//! One JSON document per job working directory. Every write goes to a
//! temporary file in the same directory that is then renamed over the
//! record, so readers never see a half-written file.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::job::package::PackageSelection;
use crate::job::resources::ResourceProfile;
use crate::job::script::ScriptSettings;

/// Newest record layout this build reads and writes.
pub const RECORD_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Unsubmitted,
    Running,
    Finished,
    Deleted,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Unsubmitted => "unsubmitted",
            RunState::Running => "running",
            RunState::Finished => "finished",
            RunState::Deleted => "deleted",
        };
        write!(f, "{}", s)
    }
}

fn default_format_version() -> u32 {
    RECORD_FORMAT_VERSION
}

fn default_status() -> String {
    "unknown".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    /// Bumped on every save
    #[serde(default)]
    pub revision: u64,
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: String,

    pub local: String,
    pub client: String,
    pub server: String,

    pub package: PackageSelection,
    pub resources: ResourceProfile,
    pub script: ScriptSettings,
    /// Script file name inside the job directory
    pub script_file: String,

    #[serde(default)]
    pub job_number: Option<String>,
    #[serde(default)]
    pub run_state: RunState,
    /// Free-text tag, e.g. `failed`
    #[serde(default = "default_status")]
    pub status: String,
    /// Working directory on the server
    #[serde(default)]
    pub job_dir: Option<PathBuf>,

    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub checked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fetched_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    pub fn new(
        local: &str,
        client: &str,
        server: &str,
        package: PackageSelection,
        resources: ResourceProfile,
        script: ScriptSettings,
        script_file: &str,
    ) -> Self {
        let created_by = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            format_version: RECORD_FORMAT_VERSION,
            revision: 0,
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            created_by,
            local: local.to_string(),
            client: client.to_string(),
            server: server.to_string(),
            package,
            resources,
            script,
            script_file: script_file.to_string(),
            job_number: None,
            run_state: RunState::Unsubmitted,
            status: default_status(),
            job_dir: None,
            submitted_at: None,
            checked_at: None,
            fetched_at: None,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Record(format!("failed to encode job record: {}", e)))
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let record: JobRecord = serde_json::from_str(contents)
            .map_err(|e| Error::Record(format!("failed to decode job record: {}", e)))?;
        if record.format_version > RECORD_FORMAT_VERSION {
            return Err(Error::Record(format!(
                "job record format {} is newer than supported format {}",
                record.format_version, RECORD_FORMAT_VERSION
            )));
        }
        Ok(record)
    }
}

/// Location of one job record on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStore {
    dir: PathBuf,
    file_name: String,
}

impl JobStore {
    pub fn new(dir: impl Into<PathBuf>, file_name: &str) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.file_name)
    }

    pub fn exists(&self) -> bool {
        self.path().is_file()
    }

    pub fn load(&self) -> Result<JobRecord> {
        Self::read(&self.path())
    }

    pub fn read(path: &Path) -> Result<JobRecord> {
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Record(format!("failed to read job record {}: {}", path.display(), e))
        })?;
        JobRecord::from_json(&contents)
            .map_err(|e| Error::Record(format!("{} ({})", e, path.display())))
    }

    /// Writes `record`, bumping its revision.
    ///
    /// A record that was loaded from disk (revision > 0) is only written if
    /// nobody saved a newer revision in the meantime.
    pub fn save(&self, record: &mut JobRecord) -> Result<()> {
        let path = self.path();
        if record.revision > 0 && path.is_file() {
            let on_disk = Self::read(&path)?;
            if on_disk.revision != record.revision {
                return Err(Error::Precondition(format!(
                    "job record {} was modified concurrently (revision {} on disk, {} in memory)",
                    path.display(),
                    on_disk.revision,
                    record.revision
                )));
            }
        }

        record.revision += 1;
        let json = match record.to_json() {
            Ok(json) => json,
            Err(e) => {
                record.revision -= 1;
                return Err(e);
            }
        };

        let written = (|| -> Result<()> {
            let mut file = NamedTempFile::new_in(&self.dir)?;
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")?;
            file.as_file().sync_all()?;
            file.persist(&path).map_err(|e| Error::Io(e.error))?;
            Ok(())
        })();
        if let Err(e) = written {
            record.revision -= 1;
            return Err(e);
        }
        debug!("saved job record {} (revision {})", path.display(), record.revision);
        Ok(())
    }
}
