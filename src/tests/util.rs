// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
// SPDX-License-Identifier: MPL-2.0

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::compiler::{CompileOutcome, Compiler, Gcc};
use crate::configuration::SandboxConfiguration;
use crate::result::{ProbeResult, TerminationCause};
use crate::syscall_filter::SyscallPolicy;
use crate::{execute, SandboxImplementation};

#[derive(Debug)]
pub struct ExecutionResult {
    pub result: ProbeResult,
    pub stdout: String,
    pub stderr: String,
}

lazy_static! {
    static ref SANDBOX_AVAILABLE: bool = probe_sandbox();
}

/// Compile `program` statically in `dir`. None if gcc or a static libc is missing, or the
/// program does not compile.
pub fn compile(program: &str, dir: &Path) -> Option<PathBuf> {
    let gcc = Gcc::locate("gcc").ok()?;
    let source = dir.join("program.c");
    fs::write(&source, program).unwrap();
    match gcc.compile(&source, &dir.join("program")).unwrap() {
        CompileOutcome::Success(executable) => Some(executable),
        CompileOutcome::Failure(stderr) => {
            eprintln!("Compiler stderr: {}", stderr);
            None
        }
    }
}

/// Run an empty program once: static gcc and ptrace must both work for the end to end tests.
fn probe_sandbox() -> bool {
    let temp = TempDir::new().unwrap();
    let executable = match compile("int main() { return 0; }", temp.path()) {
        Some(executable) => executable,
        None => {
            eprintln!("Static gcc not available, skipping sandbox tests");
            return false;
        }
    };
    let mut config = SandboxConfiguration::default();
    config
        .executable(executable)
        .working_directory(temp.path());
    let result = execute::<SandboxImplementation>(config.build(), host_policy());
    if result.cause != TerminationCause::NormalExit {
        eprintln!("Sandbox not usable here ({:?}), skipping sandbox tests", result);
        return false;
    }
    true
}

pub fn sandbox_available() -> bool {
    *SANDBOX_AVAILABLE
}

pub fn host_policy() -> Arc<SyscallPolicy> {
    Arc::new(SyscallPolicy::for_host().unwrap())
}

/// Compile and run `program`. Stdin is fed from `stdin` when given, otherwise it is left as
/// configured. None when the sandbox cannot run on this machine.
pub fn exec(
    program: &str,
    config: &mut SandboxConfiguration,
    stdin: Option<&str>,
) -> Option<ExecutionResult> {
    if !sandbox_available() {
        return None;
    }
    let temp = TempDir::new().unwrap();
    let executable = compile(program, temp.path()).expect("Compilation error");

    config
        .working_directory(temp.path())
        .executable(executable)
        .stdout(temp.path().join("stdout.txt"))
        .stderr(temp.path().join("stderr.txt"));
    if let Some(stdin) = stdin {
        let path = temp.path().join("stdin.txt");
        fs::write(&path, stdin).unwrap();
        config.stdin(path);
    }
    let config = config.build();

    let result = execute::<SandboxImplementation>(config, host_policy());

    let execution_result = ExecutionResult {
        result,
        stdout: fs::read_to_string(temp.path().join("stdout.txt")).unwrap_or_default(),
        stderr: fs::read_to_string(temp.path().join("stderr.txt")).unwrap_or_default(),
    };
    eprintln!("Result = {:?}", execution_result);
    Some(execution_result)
}
