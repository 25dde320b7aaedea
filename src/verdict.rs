// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
// SPDX-License-Identifier: MPL-2.0

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::result::{ProbeResult, TerminationCause};

/// Final classification of a submission. These codes are the only values ever reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    #[serde(rename = "AC")]
    Accepted,

    #[serde(rename = "CE")]
    CompileError,

    #[serde(rename = "TLE")]
    TimeLimitExceeded,

    #[serde(rename = "MLE")]
    MemoryLimitExceeded,

    #[serde(rename = "OLE")]
    OutputLimitExceeded,

    #[serde(rename = "IE")]
    InternalError,
}

impl Verdict {
    pub fn code(self) -> &'static str {
        match self {
            Verdict::Accepted => "AC",
            Verdict::CompileError => "CE",
            Verdict::TimeLimitExceeded => "TLE",
            Verdict::MemoryLimitExceeded => "MLE",
            Verdict::OutputLimitExceeded => "OLE",
            Verdict::InternalError => "IE",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Verdict {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "AC" => Verdict::Accepted,
            "CE" => Verdict::CompileError,
            "TLE" => Verdict::TimeLimitExceeded,
            "MLE" => Verdict::MemoryLimitExceeded,
            "OLE" => Verdict::OutputLimitExceeded,
            "IE" => Verdict::InternalError,
            _ => bail!("Unknown verdict code {:?}", s),
        })
    }
}

/// What the pipeline observed for a job, as input for the classification
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    /// The compiler rejected the source, nothing was run
    CompileFailed,

    /// The artifact was run (or the attempt failed internally)
    Ran(&'a ProbeResult),
}

/// Map an outcome to its verdict. Total and deterministic.
///
/// Restricted syscalls and every abnormal termination collapse into `IE`: the reported
/// verdict only says the run is not acceptable, the cause stays in the probe.
pub fn classify(outcome: Outcome<'_>) -> Verdict {
    match outcome {
        Outcome::CompileFailed => Verdict::CompileError,
        Outcome::Ran(probe) => classify_cause(probe.cause),
    }
}

/// Verdict of a run that terminated with `cause`
pub fn classify_cause(cause: TerminationCause) -> Verdict {
    match cause {
        TerminationCause::NormalExit => Verdict::Accepted,
        TerminationCause::MemoryLimitExceeded => Verdict::MemoryLimitExceeded,
        TerminationCause::OutputLimitExceeded => Verdict::OutputLimitExceeded,
        TerminationCause::TimeLimitExceeded => Verdict::TimeLimitExceeded,
        TerminationCause::RestrictedFunction
        | TerminationCause::RuntimeError
        | TerminationCause::AbnormalTermination
        | TerminationCause::Breakpoint
        | TerminationCause::InternalError
        | TerminationCause::Pending => Verdict::InternalError,
    }
}
