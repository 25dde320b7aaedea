// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
// SPDX-License-Identifier: MPL-2.0

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::Context;

use crate::error::JudgeError;
use crate::Result;

/// Flags of every compilation: optimized, statically linked so no dynamic loader runs in
/// the sandbox, warnings on, C99, libm.
pub const GCC_FLAGS: &[&str] = &["-O2", "--static", "-Wall", "-lm", "-std=c99"];

/// Result of compiling one source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    /// The artifact is ready at this path
    Success(PathBuf),

    /// The compiler rejected the source, with its diagnostics
    Failure(String),
}

pub trait Compiler {
    /// Compile `source` into `artifact`. An `Err` means the compiler itself could not run.
    fn compile(&self, source: &Path, artifact: &Path) -> Result<CompileOutcome>;
}

/// The GNU C compiler
#[derive(Debug, Clone)]
pub struct Gcc {
    path: PathBuf,
}

impl Gcc {
    pub fn new<P: Into<PathBuf>>(path: P) -> Gcc {
        Gcc { path: path.into() }
    }

    /// Resolve `name` in `PATH`
    pub fn locate<P: AsRef<Path>>(name: P) -> std::result::Result<Gcc, JudgeError> {
        let name = name.as_ref();
        which::which(name)
            .map(Gcc::new)
            .map_err(|_| JudgeError::CompilerMissing(name.display().to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Compiler for Gcc {
    fn compile(&self, source: &Path, artifact: &Path) -> Result<CompileOutcome> {
        let output = Command::new(&self.path)
            .arg(source)
            .args(GCC_FLAGS)
            .arg("-o")
            .arg(artifact)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("Failed to run {}", self.path.display()))?;

        if output.status.success() {
            Ok(CompileOutcome::Success(artifact.to_owned()))
        } else {
            Ok(CompileOutcome::Failure(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ))
        }
    }
}
