// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
// SPDX-License-Identifier: MPL-2.0

//! # ojbox
//!
//! An online judge for C submissions
//!
//! ### What does it do
//! ojbox takes pending jobs from a queue and for each one:
//! - compiles the source with a fixed, statically linked toolchain invocation
//! - runs the program under ptrace, killing it on the first syscall outside a small
//!   allow-list and when it exceeds its cpu, memory, output or wall time quota
//! - classifies the outcome as one of `AC`, `CE`, `TLE`, `MLE`, `OLE`, `IE` and reports it

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

use std::sync::Arc;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(target_os = "linux")]
pub type SandboxImplementation = linux::LinuxSandbox;

#[cfg(not(target_os = "linux"))]
compile_error!("Sandbox not supported on your operating system");

pub mod compiler;
pub mod configuration;
pub mod error;
pub mod pipeline;
pub mod queue;
pub mod result;
pub mod syscall_filter;
pub mod verdict;
pub mod workspace;

mod util;

#[cfg(test)]
mod tests;

pub use util::shutdown_requested;

use configuration::SandboxConfiguration;
use result::ProbeResult;
use syscall_filter::SyscallPolicy;

/// Convenience result type
pub type Result<T> = anyhow::Result<T>;

pub trait Sandbox {
    /// Execute the sandbox, enforcing `policy` on every syscall of the program
    fn run(config: SandboxConfiguration, policy: Arc<SyscallPolicy>) -> Result<Self>
    where
        Self: Sized;

    /// Wait the process to terminate, giving back the execution result
    fn wait(self) -> Result<ProbeResult>;

    /// Return true if the sandbox implementation is secure
    fn is_secure() -> bool;
}

/// Run a program in the sandbox `S` and wait for it. Never fails: a sandbox that cannot
/// start or follow the program yields an internal error result.
pub fn execute<S: Sandbox>(config: SandboxConfiguration, policy: Arc<SyscallPolicy>) -> ProbeResult {
    match S::run(config, policy).and_then(S::wait) {
        Ok(probe) if probe.cause == result::TerminationCause::Pending => {
            error!("Sandbox returned before the program terminated");
            ProbeResult::internal_error("program still pending after the sandbox returned")
        }
        Ok(probe) => probe,
        Err(e) => {
            error!("Sandbox failure: {:?}", e);
            ProbeResult::internal_error(format!("{:#}", e))
        }
    }
}

/// Refuse a sandbox `S` that cannot isolate the program on this machine
pub fn ensure_secure<S: Sandbox>() -> std::result::Result<(), error::JudgeError> {
    if S::is_secure() {
        Ok(())
    } else {
        Err(error::JudgeError::UnsupportedPlatform {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        })
    }
}
