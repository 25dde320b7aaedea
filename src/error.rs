// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
// SPDX-License-Identifier: MPL-2.0

use thiserror::Error;

/// Errors that stop the judge instead of becoming a verdict
#[derive(Debug, Error)]
pub enum JudgeError {
    /// The judge refuses to run on a platform it cannot sandbox
    #[error("unsupported platform {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("compiler `{0}` not found")]
    CompilerMissing(String),

    /// The job queue cannot be read or written
    #[error("job queue error: {0}")]
    Queue(String),
}

impl JudgeError {
    /// Startup-time configuration problems, as opposed to runtime queue failures
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            JudgeError::UnsupportedPlatform { .. } | JudgeError::CompilerMissing(_)
        )
    }
}
