//! Put and get of working-directory objects between the client and server.

use std::path::{Path, PathBuf};

use log::{debug, error, info};

use crate::error::{Error, Result};
use crate::paths::{normalize, PathTranslator};
use crate::remote::RemoteHost;
use crate::transfer::command::SyncOptions;
use crate::transfer::engine::{TransferEngine, TransferSpec};

/// Moves objects below the current directory between the client and server
/// copies of a project.
#[derive(Clone)]
pub struct DataTransfer {
    local: RemoteHost,
    client: RemoteHost,
    server: RemoteHost,
    engine: TransferEngine,
    translator: PathTranslator,
}

impl DataTransfer {
    pub fn new(
        local: RemoteHost,
        client: RemoteHost,
        server: RemoteHost,
        engine: TransferEngine,
    ) -> Self {
        let translator = PathTranslator::from_hosts(&local, &client, &server);
        Self {
            local,
            client,
            server,
            engine,
            translator,
        }
    }

    pub fn translator(&self) -> &PathTranslator {
        &self.translator
    }

    pub fn local(&self) -> &RemoteHost {
        &self.local
    }

    pub fn client(&self) -> &RemoteHost {
        &self.client
    }

    pub fn server(&self) -> &RemoteHost {
        &self.server
    }

    pub fn safe_mode(&self) -> bool {
        self.engine.safe_mode()
    }

    /// Client and server must answer before any data moves.
    pub fn check_alive(&self) -> Result<()> {
        for host in [&self.client, &self.server] {
            if !host.is_alive() {
                error!("{} is not alive.", host.name());
                return Err(Error::TransientIo(format!(
                    "{} ({}) did not answer the liveness probe",
                    host.name(),
                    host.record().address()
                )));
            }
        }
        Ok(())
    }

    /// In safe mode every root must exist on its own host.
    pub fn check_roots(&self) -> Result<()> {
        if !self.safe_mode() {
            return Ok(());
        }
        for host in [&self.local, &self.client, &self.server] {
            if !host.is_dir(host.root())? {
                error!("{} is not found on {}.", host.root().display(), host.name());
                return Err(Error::Precondition(format!(
                    "root directory {} is not found on {}",
                    host.root().display(),
                    host.name()
                )));
            }
        }
        Ok(())
    }

    /// Pushes `objects` (relative to `cwd`) from the client to the server.
    /// An empty list pushes the whole of `cwd`.
    pub fn put_objects(&self, cwd: &Path, objects: &[PathBuf], options: &SyncOptions) -> Result<()> {
        self.check_alive()?;
        self.check_roots()?;

        if objects.is_empty() {
            info!("All the files and dirs in the current directory will be rsynced.");
            let dir = self.translator.translate(cwd)?;
            debug!("client_dir = {}", dir.client.display());
            debug!("server_dir = {}", dir.server.display());
            let spec = TransferSpec::dir(&self.client, dir.client, &self.server, dir.server)
                .with_options(options.clone());
            return self.engine.transfer(&spec);
        }

        info!("The listed files and dirs will be rsynced to the corresponding server dir.");
        for object in objects {
            let mapped = self.translator.translate_object(cwd, object)?;
            let spec = if self.client.is_file(&mapped.client)? {
                TransferSpec::file(&self.client, mapped.client, &self.server, mapped.server)
            } else {
                TransferSpec::dir(&self.client, mapped.client, &self.server, mapped.server)
            };
            self.engine.transfer(&spec.with_options(options.clone()))?;
        }
        Ok(())
    }

    /// Pulls `objects` (relative to `cwd`) from the server back to the
    /// client. An empty list pulls the whole of `cwd`.
    pub fn get_objects(&self, cwd: &Path, objects: &[PathBuf], options: &SyncOptions) -> Result<()> {
        self.check_alive()?;
        self.check_roots()?;

        info!("client_dir_root = {}", self.client.root().display());
        info!("server_dir_root = {}", self.server.root().display());
        let dir = self.translator.translate(cwd)?;

        if objects.is_empty() {
            info!("All the files and dirs in the corresponding server dir will be rsynced.");
            let spec = TransferSpec::dir(&self.server, dir.server, &self.client, dir.client)
                .with_options(options.clone());
            return self.engine.transfer(&spec);
        }

        info!("The listed files and dirs will be rsynced from the corresponding server dir.");
        for object in objects {
            let from = normalize(&dir.server.join(object));
            if !self.server.exists(&from)? {
                error!("{} does not exist on {}", from.display(), self.server.name());
                return Err(Error::Precondition(format!(
                    "{} does not exist on {}",
                    from.display(),
                    self.server.name()
                )));
            }
            let to = self.translator.server_to_client(&from)?;
            let spec = if self.server.is_file(&from)? {
                TransferSpec::file(&self.server, from, &self.client, to)
            } else {
                TransferSpec::dir(&self.server, from, &self.client, to)
            };
            self.engine.transfer(&spec.with_options(options.clone()))?;
        }
        Ok(())
    }
}
