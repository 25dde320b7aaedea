// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
// SPDX-License-Identifier: MPL-2.0

//! This module contains the ptrace sandbox for Linux

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::{anyhow, bail, ensure, Context};
use nix::errno::Errno;
use nix::sys::ptrace;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;

use crate::configuration::{InputSource, OutputSink, ResourceQuota, SandboxConfiguration};
use crate::result::{ExitStatus, ProbeResult, ResourceUsage, TerminationCause};
use crate::syscall_filter::{Architecture, Decision, SyscallPolicy};
use crate::util::{self, install_signal_handlers, set_child_pid, setup_resource_limits, ChildUsage};
use crate::{Result, Sandbox};

mod procfs;
mod registers;
mod watchdog;

#[cfg(test)]
pub(crate) use procfs::{parse_cpu_ticks, parse_vm_peak};

use watchdog::KillSwitch;

pub struct LinuxSandbox {
    child_thread: JoinHandle<Result<ProbeResult>>,
}

impl Sandbox for LinuxSandbox {
    fn run(config: SandboxConfiguration, policy: Arc<SyscallPolicy>) -> Result<Self> {
        trace!("Run LinuxSandbox with config {:?}", config);

        // Register a signal handler that kills the child
        install_signal_handlers()?;

        // The thread that spawns the child is its tracer, every ptrace call happens there
        let handle = thread::Builder::new()
            .name("Sandbox watcher".into())
            .spawn(move || watcher(&config, &policy))?;

        Ok(LinuxSandbox {
            child_thread: handle,
        })
    }

    fn wait(self) -> Result<ProbeResult> {
        self.child_thread
            .join()
            .map_err(|_| anyhow!("Sandbox watcher panicked"))?
    }

    fn is_secure() -> bool {
        true
    }
}

fn watcher(config: &SandboxConfiguration, policy: &SyscallPolicy) -> Result<ProbeResult> {
    ensure!(
        Architecture::host().ok() == Some(policy.architecture()),
        "Policy for {} cannot trace programs on this host",
        policy.architecture()
    );

    let child = spawn_traced(config)?;
    let pid = Pid::from_raw(child.id() as libc::pid_t);
    trace!("Traced child started, PID = {}", pid);

    // Store the PID of the child process for letting the signal handler kill the child
    set_child_pid(Some(pid));
    let result = trace(pid, config, policy);
    if result.is_err() {
        reap(pid);
    }
    set_child_pid(None);
    result
}

/// Spawn the program stopped at its first instruction, with the tracer attached
fn spawn_traced(config: &SandboxConfiguration) -> Result<std::process::Child> {
    let mut command = Command::new(&config.executable);

    command
        .env_clear()
        .envs(config.env.clone())
        .args(&config.args)
        .current_dir(&config.working_directory);

    let stdin = match &config.stdin {
        InputSource::Zero => open_device("/dev/zero", false)?,
        InputSource::File(path) => File::open(path)
            .with_context(|| format!("Failed to open stdin {}", path.display()))?,
    };
    let stdout = match &config.stdout {
        OutputSink::Discard => open_device("/dev/null", true)?,
        OutputSink::File(path) => File::create(path)
            .with_context(|| format!("Failed to create stdout {}", path.display()))?,
    };
    let stderr = match &config.stderr {
        None => open_device("/dev/null", true)?,
        Some(path) => File::create(path)
            .with_context(|| format!("Failed to create stderr {}", path.display()))?,
    };
    command
        .stdin(Stdio::from(stdin))
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr));

    let quota = config.quota;
    unsafe {
        command.pre_exec(move || {
            // When parent dies, I want to die too
            if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL) < 0 {
                return Err(io::Error::last_os_error());
            }
            setup_resource_limits(&quota)?;
            // exec will stop with SIGTRAP until the tracer resumes it
            ptrace::traceme()?;
            Ok(())
        });
    }

    command
        .spawn()
        .with_context(|| format!("Failed to spawn {}", config.executable.display()))
}

fn open_device(path: &str, write: bool) -> Result<File> {
    OpenOptions::new()
        .read(!write)
        .write(write)
        .open(Path::new(path))
        .with_context(|| format!("Failed to open {}", path))
}

/// Follow the child from its post-exec trap to its termination
fn trace(pid: Pid, config: &SandboxConfiguration, policy: &SyscallPolicy) -> Result<ProbeResult> {
    match util::wait(pid)?.0 {
        WaitStatus::Stopped(_, Signal::SIGTRAP) => {}
        WaitStatus::Exited(_, code) => bail!("Program exited with {} before being traced", code),
        status => bail!("Unexpected first stop of the program: {:?}", status),
    }

    ptrace::setoptions(
        pid,
        ptrace::Options::PTRACE_O_TRACESYSGOOD
            | ptrace::Options::PTRACE_O_TRACEEXIT
            | ptrace::Options::PTRACE_O_EXITKILL,
    )
    .context("ptrace::setoptions")?;

    let quota = config.quota;
    let start_time = Instant::now();
    let switch = Arc::new(KillSwitch::new(pid));
    let watchdog = watchdog::start(switch.clone(), quota, start_time)?;

    let mut tracer = Tracer {
        pid,
        policy,
        quota,
        switch: &switch,
        in_syscall: false,
        output_bytes: 0,
        peak_memory: 0,
        syscall: None,
    };
    let outcome = tracer.run();

    switch.finish();
    if watchdog.join().is_err() {
        warn!("Quota watchdog of {} panicked", pid);
    }
    let (status, usage) = outcome?;

    let resource_usage = ResourceUsage {
        memory_usage: tracer.peak_memory.max(usage.max_rss),
        cpu_time: usage.cpu_time,
        wall_time: start_time.elapsed().as_millis() as u64,
        output_bytes: tracer.output_bytes,
    };
    let cause = switch
        .cause()
        .unwrap_or_else(|| exit_cause(status, &resource_usage, &quota));
    debug!(
        "Program {} terminated: {:?} {} {:?}",
        pid,
        status,
        cause.short_name(),
        resource_usage
    );

    Ok(ProbeResult {
        cause,
        status: Some(status),
        resource_usage,
        syscall: if cause == TerminationCause::RestrictedFunction {
            tracer.syscall
        } else {
            None
        },
        message: None,
    })
}

/// Cause of a termination nobody forced. Sampling is periodic, so the final usage is
/// checked against the quota once more.
fn exit_cause(status: ExitStatus, usage: &ResourceUsage, quota: &ResourceQuota) -> TerminationCause {
    if usage.cpu_time > quota.cpu_time {
        TerminationCause::TimeLimitExceeded
    } else if usage.memory_usage > quota.memory {
        TerminationCause::MemoryLimitExceeded
    } else {
        match status {
            status if status.is_success() => TerminationCause::NormalExit,
            ExitStatus::ExitCode(_) => TerminationCause::AbnormalTermination,
            ExitStatus::Signal(_) => TerminationCause::RuntimeError,
        }
    }
}

/// Kill the child and collect it, after the tracer gave up on it
fn reap(pid: Pid) {
    if let Err(e) = kill(pid, Signal::SIGKILL) {
        warn!("Cannot kill {}: {:?}", pid, e);
    }
    loop {
        match util::wait(pid) {
            Ok((WaitStatus::Exited(..), _)) | Ok((WaitStatus::Signaled(..), _)) | Err(_) => break,
            Ok(_) => {
                let _ = ptrace::cont(pid, None);
            }
        }
    }
}

struct Tracer<'a> {
    pid: Pid,
    policy: &'a SyscallPolicy,
    quota: ResourceQuota,
    switch: &'a KillSwitch,
    /// True between a syscall-entry stop and its exit stop
    in_syscall: bool,
    output_bytes: u64,
    peak_memory: u64,
    /// Denied syscall number
    syscall: Option<u64>,
}

impl Tracer<'_> {
    fn run(&mut self) -> Result<(ExitStatus, ChildUsage)> {
        self.resume(None)?;
        loop {
            let (status, usage) = util::wait(self.pid)?;
            match status {
                WaitStatus::Exited(_, code) => return Ok((ExitStatus::ExitCode(code), usage)),
                WaitStatus::Signaled(_, signal, _) => {
                    return Ok((ExitStatus::Signal(signal as i32), usage))
                }
                WaitStatus::PtraceSyscall(_) => self.on_syscall()?,
                WaitStatus::PtraceEvent(_, _, event) => {
                    if event == ptrace::Event::PTRACE_EVENT_EXIT as i32 {
                        self.sample_memory();
                    }
                    self.resume(None)?;
                }
                WaitStatus::Stopped(_, signal) => self.on_signal(signal)?,
                status => {
                    trace!("Ignoring status {:?} of {}", status, self.pid);
                    self.resume(None)?;
                }
            }
        }
    }

    fn on_syscall(&mut self) -> Result<()> {
        self.in_syscall = !self.in_syscall;
        let regs = registers::read(self.pid)?;

        if let Decision::Deny(reason) = self.policy.decide(regs.number, regs.path) {
            info!(
                "Denied syscall {} ({:?}) of {}: {}",
                regs.number, regs.path, self.pid, reason
            );
            if self.switch.trigger(TerminationCause::RestrictedFunction) {
                self.syscall = Some(regs.number);
            }
            // left stopped, SIGKILL ends it before the syscall runs
            return Ok(());
        }

        if !self.in_syscall {
            let architecture = self.policy.architecture();
            if regs.ret > 0 && architecture.write_syscalls().contains(&regs.number) {
                self.output_bytes += regs.ret as u64;
                if self.output_bytes > self.quota.disk {
                    self.switch.trigger(TerminationCause::OutputLimitExceeded);
                    return Ok(());
                }
            }
            if architecture.memory_syscalls().contains(&regs.number) {
                self.sample_memory();
                if self.peak_memory > self.quota.memory {
                    self.switch.trigger(TerminationCause::MemoryLimitExceeded);
                    return Ok(());
                }
            }
        }

        self.resume(None)
    }

    fn on_signal(&mut self, signal: Signal) -> Result<()> {
        match signal {
            Signal::SIGXCPU => {
                self.switch.trigger(TerminationCause::TimeLimitExceeded);
                Ok(())
            }
            Signal::SIGXFSZ => {
                self.switch.trigger(TerminationCause::OutputLimitExceeded);
                Ok(())
            }
            Signal::SIGTRAP => {
                self.switch.trigger(TerminationCause::Breakpoint);
                Ok(())
            }
            // job control would park the program until the wall clock runs out
            Signal::SIGSTOP | Signal::SIGTSTP | Signal::SIGTTIN | Signal::SIGTTOU => {
                self.resume(None)
            }
            signal => {
                debug!("Delivering {:?} to {}", signal, self.pid);
                self.resume(Some(signal))
            }
        }
    }

    fn sample_memory(&mut self) {
        if let Ok(memory) = procfs::peak_memory(self.pid) {
            self.peak_memory = self.peak_memory.max(memory);
        }
    }

    /// Continue until the next syscall stop. The child may already be dead.
    fn resume(&self, signal: Option<Signal>) -> Result<()> {
        match ptrace::syscall(self.pid, signal) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(e).context("ptrace::syscall"),
        }
    }
}
