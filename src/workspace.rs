// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
// SPDX-License-Identifier: MPL-2.0

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context};

use crate::Result;

/// Name of the file capturing the standard error of the program
pub const ERROR_LOG: &str = "err";

/// Directory owned by the judging pass in progress
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Use `root` as workspace, creating it if needed
    pub fn new<P: Into<PathBuf>>(root: P) -> Result<Workspace> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create workspace {}", root.display()))?;
        let root = fs::canonicalize(&root)
            .with_context(|| format!("Failed to resolve workspace {}", root.display()))?;
        Ok(Workspace { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `name` inside the workspace. Absolute names are kept as they are.
    pub fn path<P: AsRef<Path>>(&self, name: P) -> PathBuf {
        self.root.join(name)
    }

    /// Base name of the files of one pass over `job_id`. The timestamp keeps repeated runs
    /// of the same job apart from leftovers of a crashed pass.
    pub fn artifact_name(job_id: u64) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        format!("{}{}", job_id, timestamp)
    }

    /// Claim `name` as a transient file, removed when the guard is dropped
    pub fn transient<P: AsRef<Path>>(&self, name: P) -> TransientFile {
        TransientFile {
            path: self.path(name),
        }
    }

    /// Claim a file named by a job. Only plain relative names are accepted, so the file
    /// stays inside the workspace and cannot shadow the error log.
    pub fn job_file<P: AsRef<Path>>(&self, name: P) -> Result<TransientFile> {
        let name = name.as_ref();
        let plain = name
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !plain || name.as_os_str().is_empty() {
            bail!("{} is not a file name inside the workspace", name.display());
        }
        if name == Path::new(ERROR_LOG) {
            bail!("{} is reserved for the error log", ERROR_LOG);
        }
        Ok(self.transient(name))
    }
}

/// A file of the workspace that must not outlive the judging pass
#[derive(Debug)]
pub struct TransientFile {
    path: PathBuf,
}

impl TransientFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Content of the file, empty if it was never created
    pub fn read_lossy(&self) -> Result<String> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
        }
    }
}

impl Drop for TransientFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => trace!("Removed {}", self.path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Cannot remove {}: {}", self.path.display(), e),
        }
    }
}
