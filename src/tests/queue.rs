// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
// SPDX-License-Identifier: MPL-2.0

use std::fs;

use tempfile::TempDir;

use crate::queue::*;
use crate::result::{ResourceUsage, TerminationCause};
use crate::verdict::Verdict;

fn report(job_id: u64, verdict: Verdict) -> JudgeReport {
    JudgeReport {
        job_id,
        verdict,
        detail: "42\n".into(),
        diagnostic: String::new(),
        cause: Some(TerminationCause::NormalExit),
        usage: Some(ResourceUsage {
            memory_usage: 1 << 20,
            cpu_time: 3,
            wall_time: 5,
            output_bytes: 3,
        }),
    }
}

#[test]
fn test_memory_queue_fifo() {
    let mut queue = MemoryQueue::new();
    queue.push(Job::new(7, "a")).push(Job::new(3, "b"));

    assert_eq!(queue.claim_next_pending().unwrap().unwrap().id, 7);
    assert_eq!(queue.pending(), 1);
    assert_eq!(queue.running().collect::<Vec<_>>(), vec![7]);

    queue.report(&report(7, Verdict::Accepted)).unwrap();
    assert_eq!(queue.running().count(), 0);
    assert_eq!(queue.report_of(7).unwrap().verdict, Verdict::Accepted);

    assert_eq!(queue.claim_next_pending().unwrap().unwrap().id, 3);
    assert!(queue.claim_next_pending().unwrap().is_none());
}

#[test]
fn test_memory_queue_report_idempotent() {
    let mut queue = MemoryQueue::new();
    queue.push(Job::new(1, "a"));
    queue.claim_next_pending().unwrap();

    queue.report(&report(1, Verdict::TimeLimitExceeded)).unwrap();
    queue.report(&report(1, Verdict::TimeLimitExceeded)).unwrap();

    assert_eq!(queue.reports().count(), 1);
    assert_eq!(queue.report_of(1), Some(&report(1, Verdict::TimeLimitExceeded)));
}

#[test]
fn test_spool_claims_in_id_order() {
    let temp = TempDir::new().unwrap();
    let mut queue = SpoolQueue::open(temp.path()).unwrap();
    queue.submit(&Job::new(10, "ten")).unwrap();
    queue.submit(&Job::new(2, "two")).unwrap();

    let job = queue.claim_next_pending().unwrap().unwrap();
    assert_eq!(job, Job::new(2, "two"));
    assert!(!temp.path().join("pending/2.json").exists());
    assert!(temp.path().join("running/2.json").exists());

    assert_eq!(queue.claim_next_pending().unwrap().unwrap().id, 10);
    assert!(queue.claim_next_pending().unwrap().is_none());
}

#[test]
fn test_spool_job_fields() {
    let temp = TempDir::new().unwrap();
    let mut queue = SpoolQueue::open(temp.path()).unwrap();
    let mut job = Job::new(5, "int main() { return 0; }");
    job.time_limit = Some(2000);
    job.memory_limit = Some(1 << 26);
    job.input = Some("in.txt".into());
    job.output = Some("out.txt".into());
    queue.submit(&job).unwrap();

    assert_eq!(queue.claim_next_pending().unwrap(), Some(job));
}

#[test]
fn test_spool_minimal_job_file() {
    let temp = TempDir::new().unwrap();
    let mut queue = SpoolQueue::open(temp.path()).unwrap();
    fs::write(
        temp.path().join("pending/9.json"),
        r#"{ "id": 9, "source": "int main() {}" }"#,
    )
    .unwrap();
    fs::write(temp.path().join("pending/notes.txt"), "ignored").unwrap();

    let job = queue.claim_next_pending().unwrap().unwrap();
    assert_eq!(job, Job::new(9, "int main() {}"));
    assert!(queue.claim_next_pending().unwrap().is_none());
}

#[test]
fn test_spool_report() {
    let temp = TempDir::new().unwrap();
    let mut queue = SpoolQueue::open(temp.path()).unwrap();
    queue.submit(&Job::new(4, "x")).unwrap();
    queue.claim_next_pending().unwrap();
    assert_eq!(queue.report_of(4).unwrap(), None);

    let expected = report(4, Verdict::MemoryLimitExceeded);
    queue.report(&expected).unwrap();
    assert!(!temp.path().join("running/4.json").exists());
    assert_eq!(queue.report_of(4).unwrap(), Some(expected.clone()));

    // a second identical report changes nothing
    queue.report(&expected).unwrap();
    assert_eq!(queue.report_of(4).unwrap(), Some(expected));
    assert_eq!(fs::read_dir(temp.path().join("done")).unwrap().count(), 1);
}

#[test]
fn test_spool_report_wire_format() {
    let temp = TempDir::new().unwrap();
    let mut queue = SpoolQueue::open(temp.path()).unwrap();
    queue.report(&report(8, Verdict::OutputLimitExceeded)).unwrap();

    let content = fs::read_to_string(temp.path().join("done/8.json")).unwrap();
    let value: serde_json::Value = serde_json::from_str(&content).unwrap();
    assert_eq!(value["verdict"], "OLE");
    assert_eq!(value["job_id"], 8);
}

#[test]
fn test_spool_next_id() {
    let temp = TempDir::new().unwrap();
    let mut queue = SpoolQueue::open(temp.path()).unwrap();
    assert_eq!(queue.next_id().unwrap(), 1);

    queue.submit(&Job::new(3, "x")).unwrap();
    queue.submit(&Job::new(6, "x")).unwrap();
    queue.claim_next_pending().unwrap();
    queue.claim_next_pending().unwrap();
    queue.report(&report(6, Verdict::Accepted)).unwrap();
    assert_eq!(queue.next_id().unwrap(), 7);
}

#[test]
fn test_spool_malformed_job() {
    let temp = TempDir::new().unwrap();
    let mut queue = SpoolQueue::open(temp.path()).unwrap();
    fs::write(temp.path().join("pending/1.json"), "not json").unwrap();

    assert!(queue.claim_next_pending().is_err());
}
