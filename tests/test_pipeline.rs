// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 argus contributors
//
// Every wait here targets one specific process group with waitpid(-pgid),
// never waitpid(-1): tests run concurrently in one process and a blanket
// wait would steal another test's children.

use std::time::{Duration, Instant};

use argus::pipeline::{signal_group, spawn_pipeline, split_stages, split_words, SpawnError};

/// The parent joins each stage to the group before forking the next, so
/// the group exists once spawn returns; this guards the assertion anyway.
fn await_group(pgid: libc::pid_t) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while unsafe { libc::kill(-pgid, 0) } != 0 {
        assert!(Instant::now() < deadline, "group {pgid} never appeared");
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Reap every member of the group, returning how many there were.
fn wait_group(pgid: libc::pid_t) -> usize {
    let mut reaped = 0;
    loop {
        let pid = unsafe { libc::waitpid(-pgid, std::ptr::null_mut(), 0) };
        if pid == -1 {
            break;
        }
        reaped += 1;
    }
    reaped
}

#[test]
fn tokenizes_stages_and_words() {
    let stages: Vec<&str> = split_stages("cat /etc/hosts |  grep local | wc -l").collect();
    assert_eq!(stages.len(), 3);
    let words: Vec<&str> = split_words(stages[1]).collect();
    assert_eq!(words, vec!["grep", "local"]);
    let words: Vec<&str> = split_words("  spaced\tout  ").collect();
    assert_eq!(words, vec!["spaced", "out"]);
}

#[test]
fn rejects_malformed_command_lines() {
    assert!(matches!(spawn_pipeline(""), Err(SpawnError::EmptyCommand)));
    assert!(matches!(
        spawn_pipeline("   "),
        Err(SpawnError::EmptyCommand)
    ));
    assert!(matches!(
        spawn_pipeline("sleep 1 | | sleep 1"),
        Err(SpawnError::EmptyStage(1))
    ));
    assert!(matches!(
        spawn_pipeline("echo a\0b"),
        Err(SpawnError::Nul)
    ));
}

#[test]
fn single_stage_runs_in_its_own_group() {
    let group = spawn_pipeline("sleep 30").unwrap();
    let pgid = group.id();
    await_group(pgid);

    group.terminate().unwrap();
    assert_eq!(wait_group(pgid), 1);
    // The group is gone once its only member is reaped.
    assert_eq!(unsafe { libc::kill(-pgid, 0) }, -1);
    group.detach();
}

#[test]
fn terminate_reaches_every_stage_of_a_pipeline() {
    let group = spawn_pipeline("sleep 30 | sleep 30").unwrap();
    let pgid = group.id();
    await_group(pgid);

    signal_group(pgid, libc::SIGTERM).unwrap();
    assert_eq!(wait_group(pgid), 2);
    let pgid = group.detach();
    assert_eq!(unsafe { libc::kill(-pgid, 0) }, -1);
}

#[test]
fn every_stage_of_a_longer_pipeline_joins_one_group() {
    // Later stages must land in the first stage's group, not the test
    // process's; one targeted wait accounts for all of them.
    let group = spawn_pipeline("sleep 30 | sleep 30 | sleep 30").unwrap();
    let pgid = group.id();
    await_group(pgid);

    group.terminate().unwrap();
    assert_eq!(wait_group(pgid), 3);
    group.detach();
}

#[test]
fn dropping_an_armed_group_terminates_it() {
    let group = spawn_pipeline("sleep 30").unwrap();
    let pgid = group.id();
    await_group(pgid);

    drop(group);
    assert_eq!(wait_group(pgid), 1);
}

#[test]
fn detached_groups_outlive_the_handle() {
    let group = spawn_pipeline("sleep 30").unwrap();
    let pgid = group.detach();
    await_group(pgid);

    // Still alive after the handle is gone.
    assert_eq!(unsafe { libc::kill(-pgid, 0) }, 0);
    signal_group(pgid, libc::SIGTERM).unwrap();
    assert_eq!(wait_group(pgid), 1);
}

#[test]
fn exec_failure_is_reported_with_the_stage_index() {
    match spawn_pipeline("this-command-does-not-exist-anywhere") {
        Err(SpawnError::Exec { stage: 0, source }) => {
            assert_eq!(source.raw_os_error(), Some(libc::ENOENT));
        }
        other => panic!("expected an exec failure, got {other:?}"),
    }
}

#[test]
fn exec_failure_in_a_later_stage_kills_the_earlier_ones() {
    match spawn_pipeline("sleep 30 | this-command-does-not-exist-anywhere") {
        Err(SpawnError::Exec { stage: 1, source }) => {
            assert_eq!(source.raw_os_error(), Some(libc::ENOENT));
        }
        other => panic!("expected an exec failure, got {other:?}"),
    }
}
