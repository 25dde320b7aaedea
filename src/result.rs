// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
// SPDX-License-Identifier: MPL-2.0

use serde::{Deserialize, Serialize};

/// Struct that contains the information about resource usage of the process
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Peak memory usage in bytes
    pub memory_usage: u64,

    /// User + system cpu time in milliseconds
    pub cpu_time: u64,

    /// Wall time in milliseconds
    pub wall_time: u64,

    /// Bytes written by the process
    pub output_bytes: u64,
}

/// Exit status of a sandbox process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitStatus {
    /// Process terminated with an exit code
    ExitCode(i32),

    /// Process was killed with a signal
    Signal(i32),
}

impl ExitStatus {
    /// True if the process executed correctly (return with exit status 0)
    pub fn is_success(self) -> bool {
        self == ExitStatus::ExitCode(0)
    }
}

/// Why a sandboxed execution ended. Exactly one holds for every finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerminationCause {
    /// Not finished yet, never part of a returned result
    Pending,

    /// Exit code 0 within every quota
    NormalExit,

    /// Killed for invoking a denied syscall
    RestrictedFunction,

    MemoryLimitExceeded,

    /// Wrote more than the disk quota
    OutputLimitExceeded,

    /// Cpu quota, or the wall clock backstop
    TimeLimitExceeded,

    /// Killed by a signal
    RuntimeError,

    /// Non zero exit code
    AbnormalTermination,

    /// Tracer failure or unexpected state
    InternalError,

    /// Breakpoint or trap outside a syscall
    Breakpoint,
}

impl TerminationCause {
    /// Two letter label used in logs and reports
    pub fn short_name(self) -> &'static str {
        match self {
            TerminationCause::Pending => "PD",
            TerminationCause::NormalExit => "OK",
            TerminationCause::RestrictedFunction => "RF",
            TerminationCause::MemoryLimitExceeded => "ML",
            TerminationCause::OutputLimitExceeded => "OL",
            TerminationCause::TimeLimitExceeded => "TL",
            TerminationCause::RuntimeError => "RT",
            TerminationCause::AbnormalTermination => "AT",
            TerminationCause::InternalError => "IE",
            TerminationCause::Breakpoint => "BP",
        }
    }

    /// Every cause, in label order
    pub fn all() -> [TerminationCause; 10] {
        [
            TerminationCause::Pending,
            TerminationCause::NormalExit,
            TerminationCause::RestrictedFunction,
            TerminationCause::MemoryLimitExceeded,
            TerminationCause::OutputLimitExceeded,
            TerminationCause::TimeLimitExceeded,
            TerminationCause::RuntimeError,
            TerminationCause::AbnormalTermination,
            TerminationCause::InternalError,
            TerminationCause::Breakpoint,
        ]
    }
}

/// Raw observation of one sandboxed execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    /// How the process terminated
    pub cause: TerminationCause,

    /// Exit status, when the process was started and reaped
    pub status: Option<ExitStatus>,

    /// Information about the resource usage of the process
    pub resource_usage: ResourceUsage,

    /// The offending syscall number, only for `RestrictedFunction`
    pub syscall: Option<u64>,

    /// What went wrong, only for `InternalError`
    pub message: Option<String>,
}

impl ProbeResult {
    /// A result for a run that could not be carried out
    pub fn internal_error<S: Into<String>>(message: S) -> ProbeResult {
        ProbeResult {
            cause: TerminationCause::InternalError,
            status: None,
            resource_usage: ResourceUsage::default(),
            syscall: None,
            message: Some(message.into()),
        }
    }
}
