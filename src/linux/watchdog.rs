// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
// SPDX-License-Identifier: MPL-2.0

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use super::procfs;
use crate::configuration::ResourceQuota;
use crate::result::TerminationCause;
use crate::Result;

/// Sampling period of the watchdog
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Records why the tracee is being killed. The first cause wins.
pub struct KillSwitch {
    pid: Pid,
    cause: Mutex<Option<TerminationCause>>,
    finished: AtomicBool,
}

impl KillSwitch {
    pub fn new(pid: Pid) -> KillSwitch {
        KillSwitch {
            pid,
            cause: Mutex::new(None),
            finished: AtomicBool::new(false),
        }
    }

    /// Kill the tracee for `cause`. Returns false if it was already killed for another cause.
    pub fn trigger(&self, cause: TerminationCause) -> bool {
        let mut current = match self.cause.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if current.is_some() || self.is_finished() {
            return false;
        }
        *current = Some(cause);
        info!("Killing {} ({})", self.pid, cause.short_name());
        if let Err(e) = kill(self.pid, Signal::SIGKILL) {
            error!("Cannot kill {}: {:?}", self.pid, e);
        }
        true
    }

    pub fn cause(&self) -> Option<TerminationCause> {
        match self.cause.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// The tracee has been reaped, nothing must be killed anymore
    pub fn finish(&self) {
        let _guard = self.cause.lock();
        self.finished.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Start a thread that kills the tracee when it exceeds the cpu, memory or wall time quota
pub fn start(
    switch: Arc<KillSwitch>,
    quota: ResourceQuota,
    start_time: Instant,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("Quota watchdog".into())
        .spawn(move || {
            while !switch.is_finished() {
                if start_time.elapsed() > quota.wall_time_limit() {
                    switch.trigger(TerminationCause::TimeLimitExceeded);
                    return;
                }
                // the process may vanish between two samples, errors are not interesting
                if let Ok(cpu_time) = procfs::cpu_time(switch.pid) {
                    if cpu_time > quota.cpu_time {
                        switch.trigger(TerminationCause::TimeLimitExceeded);
                        return;
                    }
                }
                if let Ok(memory) = procfs::peak_memory(switch.pid) {
                    if memory > quota.memory {
                        switch.trigger(TerminationCause::MemoryLimitExceeded);
                        return;
                    }
                }
                thread::sleep(POLL_INTERVAL);
            }
        })?;
    Ok(handle)
}
