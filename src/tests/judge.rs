// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
// SPDX-License-Identifier: MPL-2.0

use std::fs;

use tempfile::TempDir;

use super::util::sandbox_available;
use crate::compiler::Gcc;
use crate::pipeline::JudgePipeline;
use crate::queue::{Job, JudgeReport, MemoryQueue};
use crate::syscall_filter::SyscallPolicy;
use crate::verdict::Verdict;
use crate::workspace::Workspace;

/// Judge `job` with gcc and the real sandbox, checking the workspace is left clean
fn judge(job: Job) -> JudgeReport {
    let temp = TempDir::new().unwrap();
    let workspace = Workspace::new(temp.path()).unwrap();
    let compiler = Gcc::locate("gcc").unwrap();
    let mut pipeline: JudgePipeline<_, _> = JudgePipeline::new(
        MemoryQueue::new(),
        compiler,
        SyscallPolicy::for_host().unwrap(),
        workspace,
    );

    let report = pipeline.judge(&job).unwrap();
    eprintln!("Report = {:?}", report);

    assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    report
}

#[test]
fn test_hello_world_accepted() {
    if !sandbox_available() {
        return;
    }
    let mut job = Job::new(1, r#"#include <stdio.h>
int main() { printf("hello\n"); return 0; }
"#);
    job.output = Some("out.txt".into());

    let report = judge(job);

    assert_eq!(report.verdict, Verdict::Accepted);
    assert_eq!(report.detail, "hello\n");
    assert_eq!(report.diagnostic, "");
}

#[test]
fn test_syntax_error_compile_error() {
    if Gcc::locate("gcc").is_err() {
        return;
    }
    let report = judge(Job::new(2, "int main() { return 0 }\n"));

    assert_eq!(report.verdict, Verdict::CompileError);
    assert!(!report.diagnostic.is_empty());
    assert_eq!(report.detail, report.diagnostic);
    assert_eq!(report.usage, None);
}

#[test]
fn test_infinite_loop_time_limit() {
    if !sandbox_available() {
        return;
    }
    let mut job = Job::new(3, "int main() { volatile int i = 0; while (1) i++; return 0; }\n");
    job.time_limit = Some(1000);

    assert_eq!(judge(job).verdict, Verdict::TimeLimitExceeded);
}

#[test]
fn test_big_allocation_memory_limit() {
    if !sandbox_available() {
        return;
    }
    let mut job = Job::new(
        4,
        r#"#include <stdlib.h>
int main() { int s = 256 * 1024 * 1024; volatile char *m = malloc(s); for (int i = 0; i < s; i++) m[i] = i; return 0; }
"#,
    );
    job.memory_limit = Some(128 * 1024 * 1024);

    assert_eq!(judge(job).verdict, Verdict::MemoryLimitExceeded);
}

#[test]
fn test_socket_internal_error() {
    if !sandbox_available() {
        return;
    }
    let job = Job::new(
        5,
        r#"#include <sys/socket.h>
int main() { return socket(AF_INET, SOCK_STREAM, 0) < 0; }
"#,
    );

    let report = judge(job);

    assert_eq!(report.verdict, Verdict::InternalError);
    assert_eq!(
        report.cause,
        Some(crate::result::TerminationCause::RestrictedFunction)
    );
}

#[test]
fn test_input_file() {
    if !sandbox_available() {
        return;
    }
    let input = TempDir::new().unwrap();
    let input_path = input.path().join("in.txt");
    fs::write(&input_path, "3 4\n").unwrap();

    let mut job = Job::new(
        6,
        r#"#include <stdio.h>
int main() { int a, b; scanf("%d %d", &a, &b); printf("%d\n", a * b); return 0; }
"#,
    );
    job.input = Some(input_path);
    job.output = Some("out.txt".into());

    let report = judge(job);

    assert_eq!(report.verdict, Verdict::Accepted);
    assert_eq!(report.detail, "12\n");
}
