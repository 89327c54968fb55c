//! Integration tests for the launch path
//!
//! The launch runs against the recording process fake: no privilege is
//! actually dropped and exec is only recorded.

use staunch::config::settings::{Argv0Mode, IdentityMode};
use staunch::exec::launch::{LaunchEngine, LaunchOptions};
use staunch::link::codec;
use staunch::link::store::LinkStore;
use staunch::testing::{FailAt, MemoryAttributes, ProcessCall, RecordingIdentity, RecordingProcess};
use staunch::{GroupId, LinkRecord, StaunchError};
use std::ffi::OsString;
use std::path::PathBuf;

fn link_with(record: &LinkRecord) -> (tempfile::TempDir, PathBuf, MemoryAttributes) {
    let dir = tempfile::tempdir().unwrap();
    let link = dir.path().join("app");
    std::os::unix::fs::symlink("/usr/bin/stauncher", &link).unwrap();
    let attributes = MemoryAttributes::default();
    attributes.insert(&link, &codec::encode(record, 8192).unwrap());
    (dir, link, attributes)
}

fn engine(
    attributes: MemoryAttributes,
    process: RecordingProcess,
    identity: RecordingIdentity,
    options: LaunchOptions,
) -> LaunchEngine<MemoryAttributes, RecordingProcess, RecordingIdentity> {
    LaunchEngine::new(LinkStore::new(attributes, 8192), process, identity, options)
}

fn sample() -> LinkRecord {
    LinkRecord::new(
        "org.example.viewer",
        "/usr/bin/viewer",
        [GroupId::new(44).unwrap(), GroupId::new(29).unwrap()],
    )
    .unwrap()
}

#[test]
fn test_sequence_order_reaches_exec_last() {
    let (_dir, link, attributes) = link_with(&sample());
    let options = LaunchOptions {
        argv0: Argv0Mode::BaseName,
        ..LaunchOptions::default()
    };
    let engine = engine(
        attributes,
        RecordingProcess::new().with_groups(&[1000]).with_last_cap(2),
        RecordingIdentity::default(),
        options,
    );

    let argv = vec![OsString::from("app"), OsString::from("file.pdf")];
    let err = engine.launch(&link, argv, Vec::new()).unwrap_err();
    assert!(matches!(err, StaunchError::Exec { .. }));

    let calls = engine.process().calls();
    assert_eq!(calls[0], ProcessCall::ReadGroups);
    assert_eq!(calls[1], ProcessCall::SetGroups(vec![1000, 29, 44]));
    assert_eq!(calls[2], ProcessCall::SetUmask(0o777));
    assert_eq!(
        &calls[3..6],
        &[
            ProcessCall::DropBounding(0),
            ProcessCall::DropBounding(1),
            ProcessCall::DropBounding(2)
        ]
    );
    assert_eq!(calls[6], ProcessCall::ZeroCapabilities);
    assert_eq!(
        calls[7],
        ProcessCall::Execute {
            path: "/usr/bin/viewer".to_string(),
            argv: vec!["viewer".to_string(), "file.pdf".to_string()],
            envp: Vec::new(),
        }
    );
    assert_eq!(calls.len(), 8);
}

#[test]
fn test_identity_refusal_is_fatal() {
    let (_dir, link, attributes) = link_with(&sample());
    let engine = engine(
        attributes,
        RecordingProcess::new(),
        RecordingIdentity::refusing_with(13),
        LaunchOptions::default(),
    );

    let err = engine
        .launch(&link, vec![OsString::from("app")], Vec::new())
        .unwrap_err();
    match err {
        StaunchError::Identity { identity, code } => {
            assert_eq!(identity, "org.example.viewer");
            assert_eq!(code, 13);
        }
        other => panic!("expected identity failure, got {other:?}"),
    }
    assert!(!engine.process().executed());
    assert!(!engine
        .process()
        .calls()
        .iter()
        .any(|c| matches!(c, ProcessCall::DropBounding(_))));
}

#[test]
fn test_every_failing_step_prevents_exec() {
    let steps = [
        FailAt::ReadGroups,
        FailAt::SetGroups,
        FailAt::DropBounding(0),
        FailAt::DropBounding(3),
        FailAt::ZeroCapabilities,
    ];
    for step in steps {
        let (_dir, link, attributes) = link_with(&sample());
        let engine = engine(
            attributes,
            RecordingProcess::new().with_last_cap(3).failing_at(step),
            RecordingIdentity::default(),
            LaunchOptions {
                identity_mode: IdentityMode::Collaborator,
                ..LaunchOptions::default()
            },
        );

        assert!(engine
            .launch(&link, vec![OsString::from("app")], Vec::new())
            .is_err());
        assert!(!engine.process().executed(), "exec reached after {step:?}");
    }
}

#[test]
fn test_malformed_record_aborts_without_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let link = dir.path().join("app");
    std::os::unix::fs::symlink("/usr/bin/stauncher", &link).unwrap();
    let attributes = MemoryAttributes::default();
    attributes.insert(&link, b"staunch-2.0\0/usr/bin/true\0");

    let engine = engine(
        attributes,
        RecordingProcess::new(),
        RecordingIdentity::default(),
        LaunchOptions::default(),
    );
    let err = engine
        .launch(&link, vec![OsString::from("app")], Vec::new())
        .unwrap_err();
    assert!(matches!(err, StaunchError::Format(_)));
    assert!(engine.process().calls().is_empty());
}
