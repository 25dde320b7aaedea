// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
// SPDX-License-Identifier: MPL-2.0

//! Default-deny system call policy.
//!
//! A policy is an immutable table indexed by syscall number, built once for an architecture
//! and shared read-only with every sandbox run. Anything not explicitly allowed is a
//! *restricted function* and kills the traced process.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::JudgeError;

/// Number of entries of a policy table. Syscall numbers at or above this are always denied.
pub const TABLE_SIZE: usize = 1024;

/// CPU architecture of the traced program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Architecture {
    /// 32 bit x86 (i686)
    X86,

    /// 64 bit x86
    X86_64,
}

impl Architecture {
    /// Architecture this judge is running on, if it is supported.
    pub fn host() -> Result<Architecture, JudgeError> {
        let unsupported = || JudgeError::UnsupportedPlatform {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        };
        if std::env::consts::OS != "linux" {
            return Err(unsupported());
        }
        match std::env::consts::ARCH {
            "x86" => Ok(Architecture::X86),
            "x86_64" => Ok(Architecture::X86_64),
            _ => Err(unsupported()),
        }
    }

    /// True if the architecture has a second, legacy syscall entry path next to the native
    /// one (`int 0x80` on x86_64).
    pub fn has_compat_path(self) -> bool {
        self == Architecture::X86_64
    }

    /// Syscalls a statically linked C program needs: memory management, basic I/O, exit
    /// and the few calls issued by the C runtime start-up.
    pub fn safe_syscalls(self) -> &'static [u64] {
        match self {
            Architecture::X86 => x86::SAFE,
            Architecture::X86_64 => x86_64::SAFE,
        }
    }

    /// Syscalls that can grow the address space.
    pub fn memory_syscalls(self) -> &'static [u64] {
        match self {
            Architecture::X86 => x86::MEMORY,
            Architecture::X86_64 => x86_64::MEMORY,
        }
    }

    /// Syscalls whose positive return value is a count of written bytes.
    pub fn write_syscalls(self) -> &'static [u64] {
        match self {
            Architecture::X86 => x86::WRITE,
            Architecture::X86_64 => x86_64::WRITE,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Architecture::X86 => write!(f, "i686"),
            Architecture::X86_64 => write!(f, "x86_64"),
        }
    }
}

/// Syscall numbers of i686
mod x86 {
    pub const SAFE: &[u64] = &[
        0,   // restart_syscall
        1,   // exit
        3,   // read
        4,   // write
        19,  // lseek
        45,  // brk
        54,  // ioctl
        85,  // readlink
        90,  // mmap
        91,  // munmap
        122, // uname
        125, // mprotect
        140, // _llseek
        146, // writev
        163, // mremap
        192, // mmap2
        197, // fstat64
        224, // gettid
        243, // set_thread_area
        252, // exit_group
        258, // set_tid_address
        265, // clock_gettime
        300, // fstatat64
        311, // set_robust_list
        340, // prlimit64
        355, // getrandom
        383, // statx
        386, // rseq
        403, // clock_gettime64
    ];
    pub const MEMORY: &[u64] = &[45, 90, 163, 192];
    pub const WRITE: &[u64] = &[4, 146, 181];
}

/// Syscall numbers of x86_64
mod x86_64 {
    pub const SAFE: &[u64] = &[
        0,   // read
        1,   // write
        5,   // fstat
        8,   // lseek
        9,   // mmap
        10,  // mprotect
        11,  // munmap
        12,  // brk
        16,  // ioctl
        20,  // writev
        25,  // mremap
        60,  // exit
        63,  // uname
        89,  // readlink
        158, // arch_prctl
        218, // set_tid_address
        219, // restart_syscall
        228, // clock_gettime
        231, // exit_group
        262, // newfstatat
        267, // readlinkat
        273, // set_robust_list
        302, // prlimit64
        318, // getrandom
        334, // rseq
    ];
    pub const MEMORY: &[u64] = &[9, 12, 25];
    pub const WRITE: &[u64] = &[1, 18, 20];
}

/// How the syscall was entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallingPath {
    /// The architecture's native syscall instruction
    Native,

    /// The legacy 32 bit entry (`int 0x80`/`sysenter`, or a process in compat mode)
    Compat,
}

/// Why a syscall was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenyReason {
    /// The number is not in the allow-set
    RestrictedFunction,

    /// The syscall came through the compat entry path
    CompatPath,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::RestrictedFunction => write!(f, "restricted function"),
            DenyReason::CompatPath => write!(f, "restricted function (compat syscall entry)"),
        }
    }
}

/// Outcome of a policy lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// Let the syscall run unmodified
    Allow,

    /// Kill the process
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }
}

/// Immutable default-deny syscall table for one architecture
#[derive(Clone)]
pub struct SyscallPolicy {
    architecture: Architecture,
    table: [bool; TABLE_SIZE],
}

impl SyscallPolicy {
    /// Build the policy with the curated allow-set of `architecture`
    pub fn new(architecture: Architecture) -> SyscallPolicy {
        SyscallPolicy::with_allowed(architecture, architecture.safe_syscalls())
    }

    /// Build the policy for the host architecture
    pub fn for_host() -> Result<SyscallPolicy, JudgeError> {
        Ok(SyscallPolicy::new(Architecture::host()?))
    }

    /// Build a policy allowing exactly `allowed`. Numbers outside the table are ignored.
    pub fn with_allowed(architecture: Architecture, allowed: &[u64]) -> SyscallPolicy {
        let mut table = [false; TABLE_SIZE];
        for &syscall in allowed {
            if let Some(entry) = table.get_mut(syscall as usize) {
                *entry = true;
            }
        }
        SyscallPolicy {
            architecture,
            table,
        }
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    /// Decide about `syscall` entered through `path`
    pub fn decide(&self, syscall: u64, path: CallingPath) -> Decision {
        if path == CallingPath::Compat && self.architecture.has_compat_path() {
            return Decision::Deny(DenyReason::CompatPath);
        }
        let allowed = usize::try_from(syscall)
            .ok()
            .and_then(|index| self.table.get(index))
            .copied()
            .unwrap_or(false);
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny(DenyReason::RestrictedFunction)
        }
    }

    /// Syscall numbers allowed by this policy
    pub fn allowed(&self) -> impl Iterator<Item = u64> + '_ {
        self.table
            .iter()
            .enumerate()
            .filter(|(_, allowed)| **allowed)
            .map(|(syscall, _)| syscall as u64)
    }
}

impl fmt::Debug for SyscallPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyscallPolicy")
            .field("architecture", &self.architecture)
            .field("allowed", &self.allowed().collect::<Vec<_>>())
            .finish()
    }
}
