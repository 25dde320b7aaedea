// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
// SPDX-License-Identifier: MPL-2.0

use super::util::*;
use crate::configuration::SandboxConfiguration;
use crate::result::TerminationCause;

#[test]
fn test_socket_is_restricted() {
    let program = r#"
       #include <stdio.h>
       #include <sys/socket.h>
       int main() { int fd = socket(AF_INET, SOCK_STREAM, 0); printf("%d", fd); return 0; }
    "#;

    let mut config = SandboxConfiguration::default();

    let Some(result) = exec(program, &mut config, Some("")) else { return };

    assert_eq!(result.result.cause, TerminationCause::RestrictedFunction);
    assert_eq!(result.stdout, "");
    #[cfg(target_arch = "x86_64")]
    assert_eq!(result.result.syscall, Some(41));
}

#[test]
fn test_fork_is_restricted() {
    let program = r#"
       #define _POSIX_C_SOURCE 200809L
       #include <stdio.h>
       #include <unistd.h>
       int main() { pid_t pid = fork(); printf("%d", pid); return 0; }
    "#;

    let mut config = SandboxConfiguration::default();

    let Some(result) = exec(program, &mut config, Some("")) else { return };

    assert_eq!(result.result.cause, TerminationCause::RestrictedFunction);
    assert_eq!(result.stdout, "");
}

#[test]
fn test_open_is_restricted() {
    let program = r#"
       #include <stdio.h>
       int main() { FILE *f = fopen("/etc/passwd", "r"); printf("%p", (void *) f); return 0; }
    "#;

    let mut config = SandboxConfiguration::default();

    let Some(result) = exec(program, &mut config, Some("")) else { return };

    assert_eq!(result.result.cause, TerminationCause::RestrictedFunction);
}

#[cfg(target_arch = "x86_64")]
#[test]
fn test_compat_entry_is_restricted() {
    // write(1, msg, 6) through the legacy int 0x80 entry
    let program = r#"
       int main() {
           static const char msg[] = "compat";
           long ret;
           __asm__ volatile ("int $0x80" : "=a"(ret) : "a"(4), "b"(1), "c"(msg), "d"(6) : "memory");
           return 0;
       }
    "#;

    let mut config = SandboxConfiguration::default();

    let Some(result) = exec(program, &mut config, Some("")) else { return };

    assert_eq!(result.result.cause, TerminationCause::RestrictedFunction);
    assert_eq!(result.stdout, "");
}
