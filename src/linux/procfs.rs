// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
// SPDX-License-Identifier: MPL-2.0

//! Sampling of a live process through `/proc`

use std::fs;

use anyhow::{anyhow, Context};
use nix::unistd::Pid;

use crate::Result;

lazy_static! {
    static ref CLOCK_TICKS: u64 = match unsafe { libc::sysconf(libc::_SC_CLK_TCK) } {
        ticks if ticks > 0 => ticks as u64,
        _ => 100,
    };
}

/// Cpu time used so far, in milliseconds
pub fn cpu_time(pid: Pid) -> Result<u64> {
    let stat = fs::read_to_string(format!("/proc/{}/stat", pid))
        .with_context(|| format!("Failed to read /proc/{}/stat", pid))?;
    parse_cpu_ticks(&stat).map(|ticks| ticks * 1000 / *CLOCK_TICKS)
}

/// Peak virtual memory size, in bytes
pub fn peak_memory(pid: Pid) -> Result<u64> {
    let status = fs::read_to_string(format!("/proc/{}/status", pid))
        .with_context(|| format!("Failed to read /proc/{}/status", pid))?;
    parse_vm_peak(&status)
}

/// utime + stime from the content of `/proc/<pid>/stat`
pub(crate) fn parse_cpu_ticks(stat: &str) -> Result<u64> {
    // the command name may contain spaces and parenthesis, fields restart after the last ')'
    let rest = stat
        .rfind(')')
        .map(|end| &stat[end + 1..])
        .ok_or_else(|| anyhow!("Malformed stat line"))?;
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // state is field 3, utime and stime are fields 14 and 15
    let field = |index: usize| -> Result<u64> {
        fields
            .get(index - 3)
            .ok_or_else(|| anyhow!("Missing field {} in stat line", index))?
            .parse::<u64>()
            .with_context(|| format!("Invalid field {} in stat line", index))
    };
    Ok(field(14)? + field(15)?)
}

/// VmPeak from the content of `/proc/<pid>/status`
pub(crate) fn parse_vm_peak(status: &str) -> Result<u64> {
    let line = status
        .lines()
        .find(|line| line.starts_with("VmPeak:"))
        .ok_or_else(|| anyhow!("No VmPeak in status"))?;
    let kilobytes = line["VmPeak:".len()..]
        .trim()
        .trim_end_matches("kB")
        .trim()
        .parse::<u64>()
        .context("Invalid VmPeak")?;
    Ok(kilobytes * 1024)
}
