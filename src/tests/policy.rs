// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
// SPDX-License-Identifier: MPL-2.0

use crate::syscall_filter::*;

const SOCKET_X86_64: u64 = 41;
const SOCKETCALL_X86: u64 = 102;

#[test]
fn test_default_deny() {
    for &architecture in &[Architecture::X86, Architecture::X86_64] {
        let policy = SyscallPolicy::new(architecture);
        let allowed: Vec<u64> = policy.allowed().collect();
        let mut expected = architecture.safe_syscalls().to_vec();
        expected.sort_unstable();
        expected.dedup();
        assert_eq!(allowed, expected);

        for syscall in 0..TABLE_SIZE as u64 {
            let decision = policy.decide(syscall, CallingPath::Native);
            assert_eq!(
                decision.is_allowed(),
                architecture.safe_syscalls().contains(&syscall),
                "syscall {} on {}",
                syscall,
                architecture
            );
        }
    }
}

#[test]
fn test_io_and_exit_allowed() {
    let policy = SyscallPolicy::new(Architecture::X86_64);
    // read, write, brk, exit_group
    for &syscall in &[0, 1, 12, 231] {
        assert_eq!(policy.decide(syscall, CallingPath::Native), Decision::Allow);
    }

    let policy = SyscallPolicy::new(Architecture::X86);
    // read, write, brk, exit_group
    for &syscall in &[3, 4, 45, 252] {
        assert_eq!(policy.decide(syscall, CallingPath::Native), Decision::Allow);
    }
}

#[test]
fn test_network_denied() {
    assert_eq!(
        SyscallPolicy::new(Architecture::X86_64).decide(SOCKET_X86_64, CallingPath::Native),
        Decision::Deny(DenyReason::RestrictedFunction)
    );
    assert_eq!(
        SyscallPolicy::new(Architecture::X86).decide(SOCKETCALL_X86, CallingPath::Native),
        Decision::Deny(DenyReason::RestrictedFunction)
    );
}

#[test]
fn test_out_of_table_denied() {
    let policy = SyscallPolicy::with_allowed(Architecture::X86_64, &[1, 5000]);
    assert!(policy.decide(1, CallingPath::Native).is_allowed());
    assert!(!policy.decide(5000, CallingPath::Native).is_allowed());
    assert!(!policy.decide(TABLE_SIZE as u64, CallingPath::Native).is_allowed());
    assert!(!policy.decide(u64::MAX, CallingPath::Native).is_allowed());
}

#[test]
fn test_compat_path_denied() {
    let policy = SyscallPolicy::new(Architecture::X86_64);
    // write is allowed natively, never through the compat entry
    assert_eq!(
        policy.decide(1, CallingPath::Compat),
        Decision::Deny(DenyReason::CompatPath)
    );
    assert_eq!(
        policy.decide(4, CallingPath::Compat),
        Decision::Deny(DenyReason::CompatPath)
    );
}

#[test]
fn test_single_path_architecture() {
    assert!(!Architecture::X86.has_compat_path());
    assert!(Architecture::X86_64.has_compat_path());

    let policy = SyscallPolicy::new(Architecture::X86);
    assert!(policy.decide(4, CallingPath::Compat).is_allowed());
}

#[test]
fn test_memory_syscalls_are_allowed() {
    for &architecture in &[Architecture::X86, Architecture::X86_64] {
        let policy = SyscallPolicy::new(architecture);
        for &syscall in architecture.memory_syscalls() {
            assert!(policy.decide(syscall, CallingPath::Native).is_allowed());
        }
    }
}

#[test]
fn test_host_architecture() {
    let host = Architecture::host();
    if cfg!(all(target_os = "linux", target_arch = "x86_64")) {
        assert_eq!(host.unwrap(), Architecture::X86_64);
        assert_eq!(SyscallPolicy::for_host().unwrap().architecture(), Architecture::X86_64);
    } else if cfg!(all(target_os = "linux", target_arch = "x86")) {
        assert_eq!(host.unwrap(), Architecture::X86);
    } else {
        assert!(host.unwrap_err().is_configuration());
    }
}

#[test]
fn test_deny_reason_message() {
    assert_eq!(DenyReason::RestrictedFunction.to_string(), "restricted function");
    assert!(DenyReason::CompatPath.to_string().starts_with("restricted function"));
}
