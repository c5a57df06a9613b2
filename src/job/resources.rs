//! Per-host resource lookup table (`queue_data.txt`).
//!
//! A whitespace separated table whose first line names the columns:
//!
//! ```text
//! QUEUE  CORES OMP NODES CPNS MPI_PER_NODE MAX_JOB_RUN MAX_JOB_SUBMIT MAX_TIME
//! small  4     2   1     4    2            10          20             24:00:00
//! ```
//!
//! Column order is free. Blank lines and lines starting with `#` are ignored.

use std::fs;
use std::path::Path;

use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const COLUMNS: [&str; 9] = [
    "QUEUE",
    "CORES",
    "OMP",
    "NODES",
    "CPNS",
    "MPI_PER_NODE",
    "MAX_JOB_RUN",
    "MAX_JOB_SUBMIT",
    "MAX_TIME",
];

/// One row of the lookup table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRow {
    pub queue: String,
    pub cores: u32,
    pub threads: u32,
    pub nodes: u32,
    pub cores_per_node: u32,
    pub mpi_per_node: u32,
    pub max_job_run: u32,
    pub max_job_submit: u32,
    pub max_time: String,
}

/// Resources a job was prepared with. Scheduler-derived fields stay empty on
/// hosts without a batch queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProfile {
    pub cores: u32,
    pub threads: u32,
    #[serde(default)]
    pub queue: Option<String>,
    #[serde(default)]
    pub nodes: Option<u32>,
    #[serde(default)]
    pub cores_per_node: Option<u32>,
    #[serde(default)]
    pub mpi_per_node: Option<u32>,
    #[serde(default)]
    pub max_job_run: Option<u32>,
    #[serde(default)]
    pub max_job_submit: Option<u32>,
    #[serde(default)]
    pub max_time: Option<String>,
}

impl ResourceProfile {
    /// Profile for a host that runs jobs directly.
    pub fn unscheduled(cores: u32, threads: u32) -> Self {
        Self {
            cores,
            threads,
            ..Self::default()
        }
    }

    fn from_row(row: &ResourceRow) -> Self {
        Self {
            cores: row.cores,
            threads: row.threads,
            queue: Some(row.queue.clone()),
            nodes: Some(row.nodes),
            cores_per_node: Some(row.cores_per_node),
            mpi_per_node: Some(row.mpi_per_node),
            max_job_run: Some(row.max_job_run),
            max_job_submit: Some(row.max_job_submit),
            max_time: Some(row.max_time.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceTable {
    rows: Vec<ResourceRow>,
}

impl ResourceTable {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!(
                "Failed to read resource table {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::parse(&contents).map_err(|e| match e {
            Error::Configuration(msg) => {
                Error::Configuration(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let mut lines = contents
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'));

        let header: Vec<&str> = match lines.next() {
            Some((_, line)) => line.split_whitespace().collect(),
            None => {
                return Err(Error::Configuration(
                    "resource table is empty".to_string(),
                ))
            }
        };
        let mut index = [0usize; 9];
        for (slot, column) in index.iter_mut().zip(COLUMNS) {
            *slot = header.iter().position(|h| *h == column).ok_or_else(|| {
                Error::Configuration(format!("resource table has no {} column", column))
            })?;
        }

        let mut rows = Vec::new();
        for (number, line) in lines {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != header.len() {
                return Err(Error::Configuration(format!(
                    "resource table line {} has {} fields, expected {}",
                    number,
                    fields.len(),
                    header.len()
                )));
            }
            let int = |column: usize| -> Result<u32> {
                let value = fields[index[column]];
                value.parse().map_err(|_| {
                    Error::Configuration(format!(
                        "resource table line {}: {} '{}' is not a number",
                        number, COLUMNS[column], value
                    ))
                })
            };
            rows.push(ResourceRow {
                queue: fields[index[0]].to_string(),
                cores: int(1)?,
                threads: int(2)?,
                nodes: int(3)?,
                cores_per_node: int(4)?,
                mpi_per_node: int(5)?,
                max_job_run: int(6)?,
                max_job_submit: int(7)?,
                max_time: fields[index[8]].to_string(),
            });
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[ResourceRow] {
        &self.rows
    }

    /// Finds the single row for `(cores, threads)`, narrowed to `queue` when
    /// one is given.
    pub fn resolve(&self, cores: u32, threads: u32, queue: Option<&str>) -> Result<ResourceProfile> {
        let matches: Vec<&ResourceRow> = self
            .rows
            .iter()
            .filter(|r| r.cores == cores && r.threads == threads)
            .filter(|r| queue.map_or(true, |q| r.queue == q))
            .collect();

        let wanted = match queue {
            Some(q) => format!("cores={}, threads={}, queue={}", cores, threads, q),
            None => format!("cores={}, threads={}", cores, threads),
        };
        match matches.as_slice() {
            [row] => {
                debug!("resource row for {}: {:?}", wanted, row);
                Ok(ResourceProfile::from_row(row))
            }
            [] => {
                error!("No corresponding line exists for {}", wanted);
                Err(Error::Configuration(format!(
                    "no resource table row matches {}",
                    wanted
                )))
            }
            many => {
                error!("{} lines match {}", many.len(), wanted);
                Err(Error::Configuration(format!(
                    "{} resource table rows match {}; give a queue to disambiguate",
                    many.len(),
                    wanted
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
# queue table for the test cluster
QUEUE CORES OMP NODES CPNS MPI_PER_NODE MAX_JOB_RUN MAX_JOB_SUBMIT MAX_TIME
small 4     2   1     4    2            10          20             24:00:00
large 64    1   2     32   32           2           4              72:00:00
debug 64    1   1     64   64           1           1              00:30:00
";

    #[test]
    fn test_parse_rows() {
        let table = ResourceTable::parse(TABLE).unwrap();
        assert_eq!(table.rows().len(), 3);
        assert_eq!(table.rows()[1].queue, "large");
        assert_eq!(table.rows()[1].cores_per_node, 32);
        assert_eq!(table.rows()[2].max_time, "00:30:00");
    }

    #[test]
    fn test_column_order_is_free() {
        let table = ResourceTable::parse(
            "CORES QUEUE OMP NODES CPNS MPI_PER_NODE MAX_JOB_RUN MAX_JOB_SUBMIT MAX_TIME\n\
             8 q 1 1 8 8 1 2 1:00:00\n",
        )
        .unwrap();
        assert_eq!(table.rows()[0].queue, "q");
        assert_eq!(table.rows()[0].cores, 8);
    }

    #[test]
    fn test_single_match() {
        let table = ResourceTable::parse(TABLE).unwrap();
        let profile = table.resolve(4, 2, None).unwrap();
        assert_eq!(profile.queue.as_deref(), Some("small"));
        assert_eq!(profile.nodes, Some(1));
        assert_eq!(profile.cores_per_node, Some(4));
        assert_eq!(profile.mpi_per_node, Some(2));
        assert_eq!(profile.max_job_submit, Some(20));
        assert_eq!(profile.max_time.as_deref(), Some("24:00:00"));
    }

    #[test]
    fn test_no_match_is_configuration_error() {
        let table = ResourceTable::parse(TABLE).unwrap();
        assert!(matches!(
            table.resolve(4, 4, None),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            table.resolve(4, 2, Some("large")),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_ambiguous_match_needs_queue() {
        let table = ResourceTable::parse(TABLE).unwrap();
        let err = table.resolve(64, 1, None).unwrap_err();
        assert!(err.to_string().contains("2 resource table rows"));

        let profile = table.resolve(64, 1, Some("debug")).unwrap();
        assert_eq!(profile.nodes, Some(1));
        assert_eq!(profile.max_job_submit, Some(1));
    }

    #[test]
    fn test_malformed_rows() {
        assert!(ResourceTable::parse("").is_err());
        assert!(ResourceTable::parse("QUEUE CORES\nq 1\n").is_err());
        let bad_number = "QUEUE CORES OMP NODES CPNS MPI_PER_NODE MAX_JOB_RUN MAX_JOB_SUBMIT MAX_TIME\n\
                          q four 1 1 1 1 1 1 1:00\n";
        let err = ResourceTable::parse(bad_number).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
