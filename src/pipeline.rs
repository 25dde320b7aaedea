// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
// SPDX-License-Identifier: MPL-2.0

//! The judging loop: claim a job, compile it, run it, classify and report

use std::fs;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;

use crate::compiler::{CompileOutcome, Compiler};
use crate::configuration::{ResourceQuota, SandboxConfiguration};
use crate::error::JudgeError;
use crate::queue::{Job, JobQueue, JudgeReport};
use crate::result::ProbeResult;
use crate::syscall_filter::SyscallPolicy;
use crate::util::install_signal_handlers;
use crate::verdict::{classify, Outcome, Verdict};
use crate::workspace::{TransientFile, Workspace, ERROR_LOG};
use crate::{execute, shutdown_requested, Result, Sandbox, SandboxImplementation};

/// Stage of one judging pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Compiling,
    CompileFailed,
    Compiled,
    Running,
    Classified,
    Reported,
}

impl JobState {
    /// Legal transitions. Every path ends in `Reported`, failures included.
    pub fn can_advance_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Pending, Compiling)
                | (Compiling, CompileFailed)
                | (Compiling, Compiled)
                | (Compiling, Classified)
                | (CompileFailed, Classified)
                | (Compiled, Running)
                | (Running, Classified)
                | (Classified, Reported)
        )
    }
}

struct JudgePass {
    job_id: u64,
    state: JobState,
}

impl JudgePass {
    fn new(job_id: u64) -> JudgePass {
        JudgePass {
            job_id,
            state: JobState::Pending,
        }
    }

    fn advance(&mut self, next: JobState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        trace!("Job {}: {:?} -> {:?}", self.job_id, self.state, next);
        self.state = next;
    }
}

/// Judges the jobs of a queue one at a time
pub struct JudgePipeline<Q, C, S = SandboxImplementation> {
    queue: Q,
    compiler: C,
    policy: Arc<SyscallPolicy>,
    workspace: Workspace,
    poll_interval: Duration,
    sandbox: PhantomData<S>,
}

impl<Q: JobQueue, C: Compiler, S: Sandbox> JudgePipeline<Q, C, S> {
    pub fn new(queue: Q, compiler: C, policy: SyscallPolicy, workspace: Workspace) -> Self {
        JudgePipeline {
            queue,
            compiler,
            policy: Arc::new(policy),
            workspace,
            poll_interval: Duration::from_secs(1),
            sandbox: PhantomData,
        }
    }

    /// Set the pause after finding the queue empty
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn into_queue(self) -> Q {
        self.queue
    }

    /// Poll the queue until SIGTERM or SIGINT. Only queue failures stop it early.
    pub fn run(&mut self) -> Result<()> {
        install_signal_handlers()?;
        info!("Start polling...");
        while !shutdown_requested() {
            if !self.poll_once()? {
                thread::sleep(self.poll_interval);
            }
        }
        info!("Shutdown requested, stop polling");
        Ok(())
    }

    /// Judge the next pending job, if any. Returns whether a job was found.
    pub fn poll_once(&mut self) -> Result<bool> {
        match self.queue.claim_next_pending().map_err(queue_error)? {
            Some(job) => {
                info!("Found new job {}", job.id);
                self.judge(&job)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Judge `job` and report its result
    pub fn judge(&mut self, job: &Job) -> Result<JudgeReport> {
        let mut pass = JudgePass::new(job.id);
        let report = self.evaluate(job, &mut pass);
        self.queue.report(&report).map_err(queue_error)?;
        pass.advance(JobState::Reported);
        info!("Job {} judged {}", job.id, report.verdict);
        Ok(report)
    }

    fn evaluate(&self, job: &Job, pass: &mut JudgePass) -> JudgeReport {
        let name = Workspace::artifact_name(job.id);
        let artifact = self.workspace.transient(&name);

        pass.advance(JobState::Compiling);
        match self.compile(job, &name, &artifact) {
            Ok(CompileOutcome::Failure(diagnostic)) => {
                pass.advance(JobState::CompileFailed);
                debug!("\tCompile result {} {}", Verdict::CompileError, diagnostic);
                let verdict = classify(Outcome::CompileFailed);
                pass.advance(JobState::Classified);
                JudgeReport {
                    job_id: job.id,
                    verdict,
                    detail: diagnostic.clone(),
                    diagnostic,
                    cause: None,
                    usage: None,
                }
            }
            Ok(CompileOutcome::Success(executable)) => {
                pass.advance(JobState::Compiled);
                debug!("\tCompile result OK {}", executable.display());
                pass.advance(JobState::Running);
                let (probe, detail, diagnostic) = self.run_program(job, &executable);
                debug!(
                    "\tRun result {} {:?} {}",
                    probe.cause.short_name(),
                    probe.resource_usage,
                    diagnostic
                );
                let verdict = classify(Outcome::Ran(&probe));
                pass.advance(JobState::Classified);
                JudgeReport {
                    job_id: job.id,
                    verdict,
                    detail,
                    diagnostic,
                    cause: Some(probe.cause),
                    usage: Some(probe.resource_usage),
                }
            }
            Err(e) => {
                error!("Cannot compile job {}: {:?}", job.id, e);
                let probe = ProbeResult::internal_error(format!("{:#}", e));
                let verdict = classify(Outcome::Ran(&probe));
                pass.advance(JobState::Classified);
                let message = probe.message.unwrap_or_default();
                JudgeReport {
                    job_id: job.id,
                    verdict,
                    detail: message.clone(),
                    diagnostic: message,
                    cause: Some(probe.cause),
                    usage: None,
                }
            }
        }
    }

    /// Write the source next to the artifact and compile it. The source never outlives
    /// this call.
    fn compile(&self, job: &Job, name: &str, artifact: &TransientFile) -> Result<CompileOutcome> {
        let source = self.workspace.transient(format!("{}.c", name));
        fs::write(source.path(), &job.source)
            .with_context(|| format!("Failed to write {}", source.path().display()))?;
        self.compiler.compile(source.path(), artifact.path())
    }

    /// Run the artifact, returning the probe, the detail text and the diagnostic text. The
    /// error log and the output capture are removed on return.
    fn run_program(&self, job: &Job, executable: &Path) -> (ProbeResult, String, String) {
        let output = match &job.output {
            Some(name) => match self.workspace.job_file(name) {
                Ok(output) => Some(output),
                Err(e) => {
                    error!("Rejecting the output of job {}: {:?}", job.id, e);
                    let message = format!("{:#}", e);
                    return (ProbeResult::internal_error(message.clone()), String::new(), message);
                }
            },
            None => None,
        };
        let quota = ResourceQuota::new(job.time_limit, job.memory_limit);
        let err_log = self.workspace.transient(ERROR_LOG);

        let mut config = SandboxConfiguration::default();
        config
            .executable(executable)
            .working_directory(self.workspace.root())
            .quota(quota)
            .stderr(err_log.path());
        if let Some(input) = &job.input {
            config.stdin(self.workspace.path(input));
        }
        if let Some(output) = &output {
            config.stdout(output.path());
        }

        let mut probe = execute::<S>(config.build(), self.policy.clone());

        let captured = err_log.read_lossy().and_then(|stderr| {
            let detail = match &output {
                Some(output) => output.read_lossy()?,
                None => stderr.clone(),
            };
            Ok((detail, stderr))
        });
        let (detail, mut diagnostic) = match captured {
            Ok(captured) => captured,
            Err(e) => {
                error!("Cannot collect the output of job {}: {:?}", job.id, e);
                probe = ProbeResult {
                    resource_usage: probe.resource_usage,
                    ..ProbeResult::internal_error(format!("{:#}", e))
                };
                (String::new(), String::new())
            }
        };
        if let Some(message) = &probe.message {
            if !diagnostic.is_empty() {
                diagnostic.push('\n');
            }
            diagnostic.push_str(message);
        }
        (probe, detail, diagnostic)
    }
}

fn queue_error(e: anyhow::Error) -> anyhow::Error {
    JudgeError::Queue(format!("{:#}", e)).into()
}
