// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
// SPDX-License-Identifier: MPL-2.0

//! Decoding of the tracee registers at a syscall stop

use anyhow::Context;
use nix::sys::ptrace;
use nix::unistd::Pid;

use crate::syscall_filter::CallingPath;
use crate::Result;

/// What the tracer knows about the syscall the tracee is stopped in
#[derive(Debug, Clone, Copy)]
pub struct SyscallRegisters {
    /// Syscall number
    pub number: u64,

    /// Return value, meaningful only at the exit stop
    pub ret: i64,

    /// Entry path of the syscall
    pub path: CallingPath,
}

#[cfg(target_arch = "x86_64")]
pub fn read(pid: Pid) -> Result<SyscallRegisters> {
    /// Code segment selector of 32 bit user mode
    const USER32_CS: u64 = 0x23;
    /// `0f 05` read as a little endian word
    const SYSCALL_INSN: u16 = 0x050f;

    let regs = ptrace::getregs(pid).context("ptrace::getregs")?;

    // The instruction before rip is the one that entered the kernel, both at entry and at
    // exit. If it cannot be read the call is treated as compat.
    let path = if regs.cs == USER32_CS {
        CallingPath::Compat
    } else {
        match ptrace::read(pid, (regs.rip - 2) as ptrace::AddressType) {
            Ok(word) if (word & 0xffff) as u16 == SYSCALL_INSN => CallingPath::Native,
            _ => CallingPath::Compat,
        }
    };

    Ok(SyscallRegisters {
        number: regs.orig_rax,
        ret: regs.rax as i64,
        path,
    })
}

#[cfg(target_arch = "x86")]
pub fn read(pid: Pid) -> Result<SyscallRegisters> {
    let regs = ptrace::getregs(pid).context("ptrace::getregs")?;

    Ok(SyscallRegisters {
        number: regs.orig_eax as u32 as u64,
        ret: regs.eax as i64,
        path: CallingPath::Native,
    })
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
compile_error!("Syscall tracing is only implemented for x86 and x86_64");
