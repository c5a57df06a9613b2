//! Catalog of installed packages on a computation host (`packages.yml`).
//!
//! ```yaml
//! turborvb:
//!   versions:
//!     - name: "1.0.0"
//!       path: "/opt/turborvb/1.0.0/bin"
//!     - name: "0.9.0"
//!       path: "/opt/turborvb/0.9.0/bin"
//!   binaries:
//!     - turborvb-mpi.x
//!     - turborvb-serial.x
//! ```
//!
//! The first version and the first binary are the defaults.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageVersion {
    pub name: String,
    /// Directory holding the binaries; binaries are on `PATH` when unset
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageEntry {
    pub versions: Vec<PackageVersion>,
    pub binaries: Vec<String>,
}

/// A fully resolved package, version and binary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSelection {
    pub package: String,
    pub version: String,
    pub binary: String,
    #[serde(default)]
    pub binary_root: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageCatalog {
    packages: HashMap<String, PackageEntry>,
}

impl PackageCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!(
                "Failed to read package catalog {}: {}",
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
        let packages: HashMap<String, PackageEntry> = serde_yaml::from_str(contents)
            .map_err(|e| Error::Configuration(format!("Failed to parse package catalog: {}", e)))?;
        for (name, entry) in &packages {
            if entry.versions.is_empty() || entry.binaries.is_empty() {
                return Err(Error::Configuration(format!(
                    "package '{}' needs at least one version and one binary",
                    name
                )));
            }
        }
        Ok(Self { packages })
    }

    pub fn package_names(&self) -> Vec<&String> {
        let mut names: Vec<&String> = self.packages.keys().collect();
        names.sort();
        names
    }

    /// Resolves `package`, falling back to its default version and binary.
    pub fn select(
        &self,
        package: &str,
        version: Option<&str>,
        binary: Option<&str>,
    ) -> Result<PackageSelection> {
        let entry = self.packages.get(package).ok_or_else(|| {
            Error::Configuration(format!(
                "package '{}' is not in the catalog. Known packages: {:?}",
                package,
                self.package_names()
            ))
        })?;

        let version = match version {
            Some(wanted) => entry
                .versions
                .iter()
                .find(|v| v.name == wanted)
                .ok_or_else(|| {
                    Error::Configuration(format!(
                        "version '{}' of package '{}' is not in the catalog",
                        wanted, package
                    ))
                })?,
            None => {
                // parse() guarantees at least one version
                let default = &entry.versions[0];
                warn!("version is not specified; using default {}", default.name);
                default
            }
        };

        let binary = match binary {
            Some(wanted) if entry.binaries.iter().any(|b| b == wanted) => wanted.to_string(),
            Some(wanted) => {
                return Err(Error::Configuration(format!(
                    "binary '{}' is not provided by package '{}': {:?}",
                    wanted, package, entry.binaries
                )))
            }
            None => {
                let default = entry.binaries[0].clone();
                warn!("binary is not specified; using default {}", default);
                default
            }
        };

        Ok(PackageSelection {
            package: package.to_string(),
            version: version.name.clone(),
            binary,
            binary_root: version.path.clone(),
        })
    }
}
