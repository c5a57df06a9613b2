//! Discovery of persisted job records below a directory.

use std::path::{Path, PathBuf};

use log::warn;
use walkdir::WalkDir;

use crate::job::record::{JobRecord, JobStore, RunState};

/// A job record and the directory it was found in.
#[derive(Debug, Clone)]
pub struct JobEntry {
    pub dir: PathBuf,
    pub record: JobRecord,
}

#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    entries: Vec<JobEntry>,
}

impl JobRegistry {
    /// Walks `root` and loads every file named `record_file`. Records that
    /// cannot be read are skipped with a warning.
    pub fn discover(root: &Path, record_file: &str) -> Self {
        let mut entries = Vec::new();
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("failed to walk {}: {}", root.display(), err);
                    continue;
                }
            };
            if !entry.file_type().is_file() || entry.file_name().to_str() != Some(record_file) {
                continue;
            }
            match JobStore::read(entry.path()) {
                Ok(record) => entries.push(JobEntry {
                    dir: entry
                        .path()
                        .parent()
                        .map(Path::to_path_buf)
                        .unwrap_or_default(),
                    record,
                }),
                Err(err) => warn!("skipping {}: {}", entry.path().display(), err),
            }
        }
        entries.sort_by(|a, b| a.dir.cmp(&b.dir));
        Self { entries }
    }

    pub fn entries(&self) -> &[JobEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Entries currently in `state`.
    pub fn in_state(&self, state: RunState) -> impl Iterator<Item = &JobEntry> {
        self.entries
            .iter()
            .filter(move |e| e.record.run_state == state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::package::PackageSelection;
    use crate::job::resources::ResourceProfile;
    use crate::job::script::ScriptSettings;
    use std::fs;
    use tempfile::TempDir;

    fn save(dir: &Path, state: RunState) {
        fs::create_dir_all(dir).unwrap();
        let mut record = JobRecord::new(
            "localhost",
            "localhost",
            "cluster",
            PackageSelection::default(),
            ResourceProfile::unscheduled(1, 1),
            ScriptSettings::default(),
            "submit.sh",
        );
        record.run_state = state;
        JobStore::new(dir, "jobshuttle.json").save(&mut record).unwrap();
    }

    #[test]
    fn test_discover_sorted_and_skips_garbage() {
        let root = TempDir::new().unwrap();
        save(&root.path().join("b/run2"), RunState::Running);
        save(&root.path().join("a"), RunState::Finished);
        fs::create_dir_all(root.path().join("c")).unwrap();
        fs::write(root.path().join("c/jobshuttle.json"), "not json").unwrap();
        fs::write(root.path().join("a/other.json"), "{}").unwrap();

        let registry = JobRegistry::discover(root.path(), "jobshuttle.json");
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.entries()[0].dir, root.path().join("a"));
        assert_eq!(registry.entries()[1].dir, root.path().join("b/run2"));
        assert_eq!(registry.in_state(RunState::Running).count(), 1);
    }

    #[test]
    fn test_missing_root_is_empty() {
        let registry = JobRegistry::discover(Path::new("/definitely/not/here/jobshuttle"), "jobshuttle.json");
        assert!(registry.is_empty());
    }
}
