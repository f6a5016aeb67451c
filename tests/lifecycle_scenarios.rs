//! End-to-end seed scenarios (design §8) driven through the dispatcher
//! against a real temporary backing root.

mod common;

use std::path::Path;
use std::sync::Arc;

use common::{dispatcher_with, RecordingDriver};
use tempfile::TempDir;
use tokio::fs;

#[tokio::test]
async fn mkdir_type_dir_is_plain_and_listed_by_readdir() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir(tmp.path().join("nf-types")).await.unwrap();
    let d = dispatcher_with(&tmp, Arc::new(RecordingDriver::default()));

    d.mkdir(Path::new("/nf-types/firewall"), 0o755).await.unwrap();

    let entries = d.readdir(Path::new("/nf-types")).await.unwrap();
    assert!(entries.contains(&"firewall".to_owned()));
}

#[tokio::test]
async fn mkdir_instance_dir_lays_down_full_skeleton_with_no_driver_calls() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("nf-types/firewall")).await.unwrap();
    let driver = Arc::new(RecordingDriver::default());
    let d = dispatcher_with(&tmp, driver.clone());

    d.mkdir(Path::new("/nf-types/firewall/fw-a"), 0o755).await.unwrap();

    assert!(tmp.path().join("nf-types/firewall/fw-a/config/boot.conf").exists());
    assert!(tmp.path().join("nf-types/firewall/fw-a/stats/pkt_drops").exists());
    assert!(driver.calls.lock().unwrap().is_empty());
}

async fn seed_instance(tmp: &TempDir, d: &nfio::dispatcher::Dispatcher) {
    fs::create_dir_all(tmp.path().join("nf-types/firewall")).await.unwrap();
    d.mkdir(Path::new("/nf-types/firewall/fw-a"), 0o755).await.unwrap();
    d.write(Path::new("/nf-types/firewall/fw-a/machine/ip"), b"10.0.0.7\n", 0).await.unwrap();
    d.write(Path::new("/nf-types/firewall/fw-a/machine/vm.image"), b"fw-img\n", 0).await.unwrap();
}

#[tokio::test]
async fn activate_success_drives_deploy_then_start() {
    let tmp = TempDir::new().unwrap();
    let driver = Arc::new(RecordingDriver::default());
    let d = dispatcher_with(&tmp, driver.clone());
    seed_instance(&tmp, &d).await;

    let n = d.write(Path::new("/nf-types/firewall/fw-a/action"), b"activate\n", 0).await.unwrap();
    assert_eq!(n, 9);

    let calls = driver.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].starts_with("deploy(10.0.0.7,"));
    assert!(calls[0].contains("-fw-a,fw-img)"));
    assert!(calls[1].starts_with("start(10.0.0.7,"));
}

#[tokio::test]
async fn activate_failed_start_triggers_destroy_and_surfaces_eio() {
    let tmp = TempDir::new().unwrap();
    let driver = Arc::new(RecordingDriver { start_fails: true, ..Default::default() });
    let d = dispatcher_with(&tmp, driver.clone());
    seed_instance(&tmp, &d).await;

    let err = d
        .write(Path::new("/nf-types/firewall/fw-a/action"), b"activate\n", 0)
        .await
        .unwrap_err();

    assert_eq!(err.to_errno(), libc::EIO);
    let calls = driver.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 3);
    assert!(calls[2].starts_with("destroy("));
}

#[tokio::test]
async fn activate_failed_start_still_mirrors_attempted_keyword_into_action() {
    let tmp = TempDir::new().unwrap();
    let driver = Arc::new(RecordingDriver { start_fails: true, ..Default::default() });
    let d = dispatcher_with(&tmp, driver.clone());
    seed_instance(&tmp, &d).await;

    d.write(Path::new("/nf-types/firewall/fw-a/action"), b"activate\n", 0).await.unwrap_err();

    let mirrored = fs::read(tmp.path().join("nf-types/firewall/fw-a/action")).await.unwrap();
    assert_eq!(mirrored, b"activate\n");
}

#[tokio::test]
async fn activate_failed_start_and_destroy_surfaces_inconsistent_state() {
    let tmp = TempDir::new().unwrap();
    let driver =
        Arc::new(RecordingDriver { start_fails: true, destroy_fails: true, ..Default::default() });
    let d = dispatcher_with(&tmp, driver.clone());
    seed_instance(&tmp, &d).await;

    let err = d
        .write(Path::new("/nf-types/firewall/fw-a/action"), b"activate\n", 0)
        .await
        .unwrap_err();

    assert_eq!(err.code(), 712);
    assert_eq!(err.to_errno(), libc::EIO);
}

#[tokio::test]
async fn cat_status_returns_driver_status_then_eof() {
    let tmp = TempDir::new().unwrap();
    let d = dispatcher_with(&tmp, Arc::new(RecordingDriver::default()));
    seed_instance(&tmp, &d).await;

    let first = d.read(Path::new("/nf-types/firewall/fw-a/status"), 1000, 0).await.unwrap();
    assert_eq!(first, b"Running");

    let second = d
        .read(Path::new("/nf-types/firewall/fw-a/status"), 1000, first.len() as u64)
        .await
        .unwrap();
    assert!(second.is_empty());
}
