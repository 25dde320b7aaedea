// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
// SPDX-License-Identifier: MPL-2.0

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Cpu time limit of a job that declares none, in milliseconds
pub const DEFAULT_TIME_LIMIT: u64 = 1000;

/// Memory limit of a job that declares none, in bytes
pub const DEFAULT_MEMORY_LIMIT: u64 = 128 * 1024 * 1024;

/// Wall clock backstop, in milliseconds
pub const WALL_TIME_LIMIT: u64 = 30_000;

/// Maximum number of bytes a program may write
pub const DISK_LIMIT: u64 = 10 * 1024 * 1024;

/// Resource ceilings of one sandboxed execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceQuota {
    /// Wall clock limit in milliseconds
    pub wall_time: u64,

    /// Cpu time limit in milliseconds
    pub cpu_time: u64,

    /// Memory limit in bytes
    pub memory: u64,

    /// Output limit in bytes
    pub disk: u64,
}

impl ResourceQuota {
    /// Quota for the declared limits, falling back to the defaults when a limit is missing
    /// or zero. The wall clock and disk ceilings are fixed.
    pub fn new(time_limit: Option<u64>, memory_limit: Option<u64>) -> ResourceQuota {
        ResourceQuota {
            wall_time: WALL_TIME_LIMIT,
            cpu_time: time_limit.filter(|&t| t > 0).unwrap_or(DEFAULT_TIME_LIMIT),
            memory: memory_limit.filter(|&m| m > 0).unwrap_or(DEFAULT_MEMORY_LIMIT),
            disk: DISK_LIMIT,
        }
    }

    pub fn wall_time_limit(&self) -> Duration {
        Duration::from_millis(self.wall_time)
    }
}

impl Default for ResourceQuota {
    fn default() -> Self {
        ResourceQuota::new(None, None)
    }
}

/// Where the standard input of the program comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputSource {
    /// An endless stream of zero bytes that never reaches end of file
    Zero,

    /// Read from this file
    File(PathBuf),
}

/// Where the standard output of the program goes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputSink {
    /// Throw the bytes away. They still count toward the disk quota.
    Discard,

    /// Write to this file
    File(PathBuf),
}

/// struct that represents the configuration parameters
/// of a sandbox
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfiguration {
    /// Absolute path of the executable
    pub executable: PathBuf,

    /// Arguments to pass to the executable
    pub args: Vec<String>,

    /// Environment to pass to the sandbox
    pub env: Vec<(String, String)>,

    /// Working directory
    pub working_directory: PathBuf,

    /// Standard input of the process
    pub stdin: InputSource,

    /// Standard output of the process
    pub stdout: OutputSink,

    /// Redirect stderr to this file, discarded if missing
    pub stderr: Option<PathBuf>,

    /// Resource limits
    pub quota: ResourceQuota,
}

impl Default for SandboxConfiguration {
    fn default() -> Self {
        SandboxConfiguration {
            executable: PathBuf::from("/bin/true"),
            args: vec![],
            env: vec![],
            working_directory: PathBuf::from("/"),
            stdin: InputSource::Zero,
            stdout: OutputSink::Discard,
            stderr: None,
            quota: ResourceQuota::default(),
        }
    }
}

impl SandboxConfiguration {
    /// Build the sandbox configuration
    pub fn build(&self) -> SandboxConfiguration {
        self.clone()
    }

    /// Set the resource quota
    pub fn quota(&mut self, quota: ResourceQuota) -> &mut Self {
        self.quota = quota;
        self
    }

    /// Set the cpu time limit, in milliseconds
    pub fn time_limit(&mut self, time_limit: u64) -> &mut Self {
        self.quota.cpu_time = time_limit;
        self
    }

    /// Set the wall clock limit, in milliseconds
    pub fn wall_time_limit(&mut self, wall_time_limit: u64) -> &mut Self {
        self.quota.wall_time = wall_time_limit;
        self
    }

    /// Set the memory limit, in **bytes**
    pub fn memory_limit(&mut self, memory_limit: u64) -> &mut Self {
        self.quota.memory = memory_limit;
        self
    }

    /// Set the standard input file path
    pub fn stdin<P: Into<PathBuf>>(&mut self, stdin: P) -> &mut Self {
        self.stdin = InputSource::File(stdin.into());
        self
    }

    /// Set the standard output file path
    pub fn stdout<P: Into<PathBuf>>(&mut self, stdout: P) -> &mut Self {
        self.stdout = OutputSink::File(stdout.into());
        self
    }

    /// Set the standard error file path
    pub fn stderr<P: Into<PathBuf>>(&mut self, stderr: P) -> &mut Self {
        self.stderr = Some(stderr.into());
        self
    }

    /// Set the executable file path
    pub fn executable<P: Into<PathBuf>>(&mut self, executable: P) -> &mut Self {
        self.executable = executable.into();
        self
    }

    /// Set the working directory
    pub fn working_directory<P: Into<PathBuf>>(&mut self, working_directory: P) -> &mut Self {
        self.working_directory = working_directory.into();
        self
    }

    /// Add an argument to the program
    pub fn arg<S: Into<String>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    /// Add an argument to the environment
    pub fn env<S: Into<String>, T: Into<String>>(&mut self, variable: S, value: T) -> &mut Self {
        self.env.push((variable.into(), value.into()));
        self
    }
}

/// Settings of the judge service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfiguration {
    /// Directory holding the transient files of the job being judged
    pub workspace: PathBuf,

    /// Pause between two polls of an empty queue, in milliseconds
    pub poll_interval_ms: u64,

    /// C compiler executable, looked up in `PATH` if relative
    pub compiler: PathBuf,
}

impl Default for JudgeConfiguration {
    fn default() -> Self {
        JudgeConfiguration {
            workspace: PathBuf::from("./tmp"),
            poll_interval_ms: 1000,
            compiler: PathBuf::from("gcc"),
        }
    }
}

impl JudgeConfiguration {
    /// Load the configuration from a JSON file. Missing fields take their default.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<JudgeConfiguration> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid configuration {}", path.display()))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
