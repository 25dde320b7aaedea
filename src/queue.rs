// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
// SPDX-License-Identifier: MPL-2.0

//! Where jobs come from and where their results go

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::result::{ResourceUsage, TerminationCause};
use crate::verdict::Verdict;
use crate::Result;

/// One submission to judge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,

    /// C source code
    pub source: String,

    /// Cpu time limit in milliseconds
    #[serde(default)]
    pub time_limit: Option<u64>,

    /// Memory limit in bytes
    #[serde(default)]
    pub memory_limit: Option<u64>,

    /// File fed to the standard input, relative to the workspace
    #[serde(default)]
    pub input: Option<PathBuf>,

    /// File capturing the standard output, relative to the workspace
    #[serde(default)]
    pub output: Option<PathBuf>,
}

impl Job {
    pub fn new<S: Into<String>>(id: u64, source: S) -> Job {
        Job {
            id,
            source: source.into(),
            time_limit: None,
            memory_limit: None,
            input: None,
            output: None,
        }
    }
}

/// Final result of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeReport {
    pub job_id: u64,

    pub verdict: Verdict,

    /// Captured standard output, or the diagnostics when no output file was requested
    pub detail: String,

    /// Compiler or program standard error, or the internal error
    pub diagnostic: String,

    /// Termination cause behind the verdict, when the program was run
    #[serde(default)]
    pub cause: Option<TerminationCause>,

    #[serde(default)]
    pub usage: Option<ResourceUsage>,
}

/// The external queue of jobs
pub trait JobQueue {
    /// Take the next pending job, moving it out of the pending state
    fn claim_next_pending(&mut self) -> Result<Option<Job>>;

    /// Record the final result of a job and mark it done. Repeating the call with the same
    /// report leaves the queue unchanged.
    fn report(&mut self, report: &JudgeReport) -> Result<()>;
}

/// Queue living in memory
#[derive(Debug, Default)]
pub struct MemoryQueue {
    pending: VecDeque<Job>,
    running: BTreeSet<u64>,
    done: BTreeMap<u64, JudgeReport>,
}

impl MemoryQueue {
    pub fn new() -> MemoryQueue {
        MemoryQueue::default()
    }

    /// Add a pending job
    pub fn push(&mut self, job: Job) -> &mut Self {
        self.pending.push_back(job);
        self
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Jobs claimed and not reported yet
    pub fn running(&self) -> impl Iterator<Item = u64> + '_ {
        self.running.iter().copied()
    }

    pub fn report_of(&self, job_id: u64) -> Option<&JudgeReport> {
        self.done.get(&job_id)
    }

    pub fn reports(&self) -> impl Iterator<Item = &JudgeReport> {
        self.done.values()
    }
}

impl JobQueue for MemoryQueue {
    fn claim_next_pending(&mut self) -> Result<Option<Job>> {
        let job = self.pending.pop_front();
        if let Some(job) = &job {
            self.running.insert(job.id);
        }
        Ok(job)
    }

    fn report(&mut self, report: &JudgeReport) -> Result<()> {
        self.running.remove(&report.job_id);
        self.done.insert(report.job_id, report.clone());
        Ok(())
    }
}

/// Durable queue kept in a spool directory: `pending/`, `running/` and `done/` hold one
/// JSON file per job, named after its id. Moving between them is a rename, so claiming a
/// job is atomic.
#[derive(Debug, Clone)]
pub struct SpoolQueue {
    root: PathBuf,
}

const PENDING: &str = "pending";
const RUNNING: &str = "running";
const DONE: &str = "done";

impl SpoolQueue {
    /// Open the spool at `root`, creating its directories
    pub fn open<P: Into<PathBuf>>(root: P) -> Result<SpoolQueue> {
        let root = root.into();
        for dir in &[PENDING, RUNNING, DONE] {
            let path = root.join(dir);
            fs::create_dir_all(&path)
                .with_context(|| format!("Failed to create spool directory {}", path.display()))?;
        }
        Ok(SpoolQueue { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Add a pending job
    pub fn submit(&self, job: &Job) -> Result<()> {
        let content = serde_json::to_string_pretty(job)?;
        write_atomic(&self.entry(PENDING, job.id), content.as_bytes())
    }

    /// Recorded report of a job, if it is done
    pub fn report_of(&self, job_id: u64) -> Result<Option<JudgeReport>> {
        let path = self.entry(DONE, job_id);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(
                serde_json::from_str(&content)
                    .with_context(|| format!("Invalid report {}", path.display()))?,
            )),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    fn entry(&self, state: &str, job_id: u64) -> PathBuf {
        self.root.join(state).join(format!("{}.json", job_id))
    }

    /// An id greater than every job ever submitted to this spool
    pub fn next_id(&self) -> Result<u64> {
        let mut next = 1;
        for state in &[PENDING, RUNNING, DONE] {
            if let Some(last) = self.ids(state)?.last() {
                next = next.max(last + 1);
            }
        }
        Ok(next)
    }

    /// Ids of the jobs in `state`, in increasing order
    fn ids(&self, state: &str) -> Result<Vec<u64>> {
        let dir = self.root.join(state);
        let mut ids = Vec::new();
        for entry in fs::read_dir(&dir).with_context(|| format!("Failed to list {}", dir.display()))? {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                if let Some(id) = path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .and_then(|stem| stem.parse::<u64>().ok())
                {
                    ids.push(id);
                }
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

impl JobQueue for SpoolQueue {
    fn claim_next_pending(&mut self) -> Result<Option<Job>> {
        for id in self.ids(PENDING)? {
            let pending = self.entry(PENDING, id);
            let running = self.entry(RUNNING, id);
            match fs::rename(&pending, &running) {
                Ok(()) => {
                    let content = fs::read_to_string(&running)
                        .with_context(|| format!("Failed to read {}", running.display()))?;
                    let job = serde_json::from_str(&content)
                        .with_context(|| format!("Invalid job {}", running.display()))?;
                    return Ok(Some(job));
                }
                // claimed by someone else in the meantime
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to claim {}", pending.display()))
                }
            }
        }
        Ok(None)
    }

    fn report(&mut self, report: &JudgeReport) -> Result<()> {
        let content = serde_json::to_string_pretty(report)?;
        write_atomic(&self.entry(DONE, report.job_id), content.as_bytes())?;

        let running = self.entry(RUNNING, report.job_id);
        match fs::remove_file(&running) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", running.display())),
        }
    }
}

/// Replace `path` with `content`, never leaving a partial file behind
fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create a temporary file in {}", dir.display()))?;
    file.write_all(content)?;
    file.as_file().sync_all()?;
    file.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
