// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
// SPDX-License-Identifier: MPL-2.0

use std::io;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Arc, Once};

use anyhow::Context;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

use crate::configuration::ResourceQuota;
use crate::Result;

lazy_static! {
    /// PID of the traced process, will be used to kill it when SIGTERM or SIGINT is received.
    static ref CHILD_PID: Arc<AtomicI32> = Arc::new(AtomicI32::new(-1));

    /// Set once SIGTERM or SIGINT is received
    static ref SHUTDOWN: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
}

static INSTALL_HANDLERS: Once = Once::new();

/// Handler of the SIGINT and SIGTERM signals. If the child PID is available a SIGKILL will be
/// sent to that process.
fn sigterm_handler() {
    SHUTDOWN.store(true, Ordering::SeqCst);
    let child_pid = CHILD_PID.load(Ordering::SeqCst);
    if child_pid > 0 {
        let _ = kill(Pid::from_raw(child_pid), Signal::SIGKILL);
    }
}

/// Register the SIGTERM and SIGINT handlers, once per process
pub fn install_signal_handlers() -> Result<()> {
    let mut result = Ok(());
    INSTALL_HANDLERS.call_once(|| {
        result = unsafe { signal_hook::register(signal_hook::SIGTERM, sigterm_handler) }
            .and_then(|_| unsafe { signal_hook::register(signal_hook::SIGINT, sigterm_handler) })
            .map(|_| ())
            .context("Failed to register signal handlers");
    });
    result
}

/// Track the traced process, -1 when there is none
pub fn set_child_pid(pid: Option<Pid>) {
    CHILD_PID.store(pid.map_or(-1, Pid::as_raw), Ordering::SeqCst);
}

/// True after SIGTERM or SIGINT
pub fn shutdown_requested() -> bool {
    SHUTDOWN.load(Ordering::SeqCst)
}

#[cfg(target_env = "gnu")]
type Resource = libc::__rlimit_resource_t;

#[cfg(not(target_env = "gnu"))]
type Resource = libc::c_int;

/// Setup the kernel side limits. Runs in the child between fork and exec, so it must not
/// allocate.
pub fn setup_resource_limits(quota: &ResourceQuota) -> io::Result<()> {
    let (soft, hard) = cpu_limit_seconds(quota.cpu_time);
    set_resource_limit(libc::RLIMIT_CPU, soft, hard)?;

    set_resource_limit(libc::RLIMIT_FSIZE, quota.disk, quota.disk)?;

    // No core dumps
    set_resource_limit(libc::RLIMIT_CORE, 0, 0)
}

/// Soft and hard `RLIMIT_CPU` for a cpu quota in milliseconds: SIGXCPU one second past the
/// quota, SIGKILL one second later. Saturates at `RLIM_INFINITY`.
pub fn cpu_limit_seconds(cpu_time: u64) -> (u64, u64) {
    let seconds = cpu_time / 1000 + u64::from(cpu_time % 1000 != 0);
    let infinity = libc::RLIM_INFINITY as u64;
    let soft = seconds.saturating_add(1).min(infinity);
    let hard = soft.saturating_add(1).min(infinity);
    (soft, hard)
}

/// Utility function to set a resource limit
fn set_resource_limit(resource: Resource, soft: u64, hard: u64) -> io::Result<()> {
    let r_limit = libc::rlimit {
        rlim_cur: soft as libc::rlim_t,
        rlim_max: hard as libc::rlim_t,
    };

    if unsafe { libc::setrlimit(resource, &r_limit) } < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Resource usage reported by the kernel when a child is reaped
#[derive(Debug, Clone, Copy, Default)]
pub struct ChildUsage {
    /// User + system time in milliseconds
    pub cpu_time: u64,

    /// Maximum resident set size in bytes
    pub max_rss: u64,
}

/// Wait for the next state change of a child, returning the status and its resource usage
pub fn wait(pid: Pid) -> Result<(WaitStatus, ChildUsage)> {
    let mut status = 0;
    let mut rusage: libc::rusage = unsafe { std::mem::zeroed() };

    loop {
        if unsafe { libc::wait4(pid.as_raw(), &mut status, libc::__WALL, &mut rusage) }
            == pid.as_raw()
        {
            break;
        }
        let error = io::Error::last_os_error();
        if error.kind() != io::ErrorKind::Interrupted {
            return Err(error).context("Error waiting for child");
        }
    }

    let status =
        WaitStatus::from_raw(pid, status).context("Child changed to an unknown status")?;

    let usage = ChildUsage {
        cpu_time: timeval_millis(&rusage.ru_utime) + timeval_millis(&rusage.ru_stime),
        max_rss: rusage.ru_maxrss as u64 * 1024,
    };

    Ok((status, usage))
}

fn timeval_millis(time: &libc::timeval) -> u64 {
    time.tv_sec as u64 * 1000 + time.tv_usec as u64 / 1000
}
