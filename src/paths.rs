//! Translation of paths between the local, client and server roots.
//!
//! Every endpoint keeps its copy of a project under its own root directory.
//! A path below the local root maps to the same relative path below the
//! client and server roots.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::remote::RemoteHost;

/// A path expressed under the client and the server roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedPath {
    pub client: PathBuf,
    pub server: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PathTranslator {
    local_root: PathBuf,
    client_root: PathBuf,
    server_root: PathBuf,
    /// Client and server are both local: paths outside the local root pass
    /// through unchanged instead of being rejected.
    both_local: bool,
}

impl PathTranslator {
    pub fn new(
        local_root: impl Into<PathBuf>,
        client_root: impl Into<PathBuf>,
        server_root: impl Into<PathBuf>,
        both_local: bool,
    ) -> Self {
        Self {
            local_root: normalize(&local_root.into()),
            client_root: normalize(&client_root.into()),
            server_root: normalize(&server_root.into()),
            both_local,
        }
    }

    pub fn from_hosts(local: &RemoteHost, client: &RemoteHost, server: &RemoteHost) -> Self {
        Self::new(
            local.root(),
            client.root(),
            server.root(),
            client.is_local() && server.is_local(),
        )
    }

    pub fn both_local(&self) -> bool {
        self.both_local
    }

    /// Maps an absolute path under the local root onto the client and server
    /// roots.
    pub fn translate(&self, path: &Path) -> Result<TranslatedPath> {
        let path = absolute(path)?;
        match path.strip_prefix(&self.local_root) {
            Ok(relative) => Ok(TranslatedPath {
                client: join_relative(&self.client_root, relative),
                server: join_relative(&self.server_root, relative),
            }),
            Err(_) if self.both_local => Ok(TranslatedPath {
                client: path.clone(),
                server: path,
            }),
            Err(_) => Err(Error::Precondition(format!(
                "{} is not under the local root {}",
                path.display(),
                self.local_root.display()
            ))),
        }
    }

    /// Resolves `object` against `cwd` and translates the result.
    pub fn translate_object(&self, cwd: &Path, object: &Path) -> Result<TranslatedPath> {
        self.translate(&absolute(cwd)?.join(object))
    }

    /// Maps a path under the server root back under the client root.
    pub fn server_to_client(&self, server_path: &Path) -> Result<PathBuf> {
        let path = absolute(server_path)?;
        match path.strip_prefix(&self.server_root) {
            Ok(relative) => Ok(join_relative(&self.client_root, relative)),
            Err(_) if self.both_local => Ok(path),
            Err(_) => Err(Error::Precondition(format!(
                "{} is not under the server root {}",
                path.display(),
                self.server_root.display()
            ))),
        }
    }
}

fn join_relative(root: &Path, relative: &Path) -> PathBuf {
    if relative.as_os_str().is_empty() {
        root.to_path_buf()
    } else {
        root.join(relative)
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if !path.is_absolute() {
        return Err(Error::Precondition(format!(
            "path '{}' must be absolute",
            path.display()
        )));
    }
    Ok(normalize(path))
}

/// Lexically removes `.` and resolves `..` components.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
