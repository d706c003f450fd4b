//! Integration tests for instance lifecycle against an in-memory container runtime.

mod common;

use std::collections::HashSet;
use std::time::Duration;

use common::TestContext;
use rootbox::{
    ContainerRuntime, CreateOptions, ExecutionMode, InstanceStatus, OsChoice, RootboxError,
};

fn named(name: &str) -> CreateOptions {
    CreateOptions {
        name: Some(name.to_string()),
        ..Default::default()
    }
}

// ============================================================================
// CREATE
// ============================================================================

#[tokio::test]
async fn create_db1_on_debian() {
    let ctx = TestContext::new().await;

    let info = ctx
        .runtime
        .create(CreateOptions {
            name: Some("db1".into()),
            os: Some("debian".into()),
            ram: Some("1GB".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    let d = &info.descriptor;
    assert_eq!(d.id.as_str(), "db1");
    assert_eq!(d.display_name, "db1");
    assert_eq!(d.os_choice, OsChoice::Debian);
    assert_eq!(d.resources.ram_limit, "1GB");
    assert_eq!(d.status(), InstanceStatus::Running);
    assert!((2222..3222).contains(&d.endpoints.ssh_port));
    assert!((8080..9080).contains(&d.endpoints.web_port));
    assert!(d.last_started_at.is_some());
    assert!(info.live);
    assert_eq!(info.mode, ExecutionMode::Container);
    assert!(ctx.engine.is_running("vps-db1"));

    let dir = info.storage_dir;
    for file in [
        "config.json",
        "Dockerfile",
        "docker-compose.yml",
        "start.sh",
        "manage.sh",
        "connect.sh",
    ] {
        assert!(dir.join(file).exists(), "missing {file}");
    }
}

#[tokio::test]
async fn create_assigns_unique_ids_and_ports() {
    let ctx = TestContext::new().await;

    let mut ids = HashSet::new();
    let mut ports = HashSet::new();
    for _ in 0..6 {
        let info = ctx.runtime.create(CreateOptions::default()).await.unwrap();
        let d = info.descriptor;
        assert!(d.id.as_str().starts_with("vps-"));
        assert!(ids.insert(d.id.to_string()));
        assert!(ports.insert(d.endpoints.ssh_port));
        assert!(ports.insert(d.endpoints.web_port));
    }

    assert_eq!(ctx.runtime.list().await.unwrap().len(), 6);
}

#[tokio::test]
async fn create_duplicate_name_fails_and_keeps_original() {
    let ctx = TestContext::new().await;
    ctx.runtime.create(named("db1")).await.unwrap();
    let before = ctx.runtime.info("db1").await.unwrap();

    let err = ctx.runtime.create(named("db1")).await.unwrap_err();
    assert!(matches!(err, RootboxError::Allocation(_)));

    let after = ctx.runtime.info("db1").await.unwrap();
    assert_eq!(before, after);
    assert_eq!(ctx.runtime.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn create_with_unknown_os_uses_ubuntu() {
    let ctx = TestContext::new().await;
    let info = ctx
        .runtime
        .create(CreateOptions {
            name: Some("web".into()),
            os: Some("plan9".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(info.descriptor.os_choice, OsChoice::Ubuntu);
}

#[tokio::test]
async fn create_generates_credentials() {
    let ctx = TestContext::new().await;
    let info = ctx.runtime.create(named("web")).await.unwrap();

    let creds = &info.descriptor.credentials;
    assert_eq!(creds.username, "root");
    assert!(creds.password.len() >= 12);
    assert!(!creds.key_material.public_key.is_empty());
}

// ============================================================================
// STATUS AND LIST
// ============================================================================

#[tokio::test]
async fn status_of_missing_instance_is_not_found() {
    let ctx = TestContext::new().await;
    ctx.runtime.create(named("db1")).await.unwrap();

    let err = ctx.runtime.status("missing").await.unwrap_err();
    assert!(matches!(err, RootboxError::NotFound(_)));
    assert_eq!(ctx.runtime.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn status_notices_container_that_died() {
    let ctx = TestContext::new().await;
    ctx.runtime.create(named("db1")).await.unwrap();

    // Container goes away behind the manager's back.
    let layout = ctx.runtime.layout().instance_layout("db1");
    ctx.engine.compose_down(layout.root()).await.unwrap();

    let info = ctx.runtime.status("db1").await.unwrap();
    assert!(!info.live);
    assert_eq!(info.status(), InstanceStatus::Stopped);
    assert_eq!(
        ctx.runtime.info("db1").await.unwrap().status(),
        InstanceStatus::Stopped
    );
}

#[tokio::test]
async fn list_is_ordered_by_creation() {
    let ctx = TestContext::new().await;
    for name in ["zeta", "alpha", "mid"] {
        ctx.runtime.create(named(name)).await.unwrap();
    }

    let ids: Vec<String> = ctx
        .runtime
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|info| info.id().to_string())
        .collect();
    assert_eq!(ids, vec!["zeta", "alpha", "mid"]);
}

// ============================================================================
// START / STOP / RESTART
// ============================================================================

#[tokio::test]
async fn stop_is_idempotent() {
    let ctx = TestContext::new().await;
    ctx.runtime.create(named("db1")).await.unwrap();

    assert_eq!(ctx.runtime.stop("db1").await.unwrap(), InstanceStatus::Stopped);
    assert!(!ctx.engine.is_running("vps-db1"));

    assert_eq!(ctx.runtime.stop("db1").await.unwrap(), InstanceStatus::Stopped);
    assert_eq!(
        ctx.runtime.status("db1").await.unwrap().status(),
        InstanceStatus::Stopped
    );
}

#[tokio::test]
async fn stop_then_start_keeps_ports_and_advances_start_time() {
    let ctx = TestContext::new().await;
    let created = ctx.runtime.create(named("db1")).await.unwrap().descriptor;

    ctx.runtime.stop("db1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let started = ctx.runtime.start("db1").await.unwrap();

    assert!(started.live);
    assert_eq!(started.status(), InstanceStatus::Running);
    assert_eq!(started.descriptor.endpoints, created.endpoints);
    assert!(started.descriptor.last_started_at > created.last_started_at);
    assert_eq!(started.descriptor.created_at, created.created_at);
}

#[tokio::test]
async fn start_of_running_instance_is_noop() {
    let ctx = TestContext::new().await;
    let created = ctx.runtime.create(named("db1")).await.unwrap().descriptor;

    let info = ctx.runtime.start("db1").await.unwrap();
    assert!(info.live);
    assert_eq!(info.descriptor.last_started_at, created.last_started_at);

    let ups = ctx
        .engine
        .calls()
        .into_iter()
        .filter(|c| c == "up vps-db1")
        .count();
    assert_eq!(ups, 1);
}

#[tokio::test]
async fn restart_running_instance() {
    let ctx = TestContext::new().await;
    ctx.runtime.create(named("db1")).await.unwrap();

    let info = ctx.runtime.restart("db1").await.unwrap();
    assert!(info.live);
    assert_eq!(info.status(), InstanceStatus::Running);
    assert!(ctx.engine.calls().contains(&"restart vps-db1".to_string()));
}

#[tokio::test]
async fn restart_stopped_instance_starts_it() {
    let ctx = TestContext::new().await;
    ctx.runtime.create(named("db1")).await.unwrap();
    ctx.runtime.stop("db1").await.unwrap();

    let info = ctx.runtime.restart("db1").await.unwrap();
    assert!(info.live);
    assert!(ctx.engine.is_running("vps-db1"));
}

#[tokio::test]
async fn control_of_missing_instance_is_not_found() {
    let ctx = TestContext::new().await;

    assert!(matches!(ctx.runtime.start("ghost").await, Err(RootboxError::NotFound(_))));
    assert!(matches!(ctx.runtime.stop("ghost").await, Err(RootboxError::NotFound(_))));
    assert!(matches!(ctx.runtime.restart("ghost").await, Err(RootboxError::NotFound(_))));
    assert!(matches!(ctx.runtime.remove("ghost", true).await, Err(RootboxError::NotFound(_))));
}

// ============================================================================
// EXEC, CONNECT, BACKUP
// ============================================================================

#[tokio::test]
async fn exec_runs_inside_container() {
    let ctx = TestContext::new().await;
    ctx.runtime.create(named("db1")).await.unwrap();

    let out = ctx
        .runtime
        .exec("db1", &["uname".to_string(), "-a".to_string()])
        .await
        .unwrap();
    assert!(out.success());
    assert_eq!(out.stdout, "uname -a");
}

#[tokio::test]
async fn exec_on_stopped_instance_is_invalid_state() {
    let ctx = TestContext::new().await;
    ctx.runtime.create(named("db1")).await.unwrap();
    ctx.runtime.stop("db1").await.unwrap();

    let err = ctx
        .runtime
        .exec("db1", &["true".to_string()])
        .await
        .unwrap_err();
    assert!(matches!(err, RootboxError::InvalidState(_)));
}

#[tokio::test]
async fn update_runs_package_upgrade() {
    let ctx = TestContext::new().await;
    ctx.runtime
        .create(CreateOptions {
            name: Some("edge".into()),
            os: Some("alpine".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    let out = ctx.runtime.update("edge").await.unwrap();
    assert!(out.stdout.starts_with("sh -c "));
    assert!(out.stdout.contains("apk"));
}

#[tokio::test]
async fn connect_targets_instance_ssh_port() {
    let ctx = TestContext::new().await;
    let created = ctx.runtime.create(named("db1")).await.unwrap().descriptor;

    assert_eq!(ctx.runtime.connect("db1").await.unwrap(), 0);

    let targets = ctx.ssh.targets.lock().unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].port, created.endpoints.ssh_port);
    assert_eq!(targets[0].username, created.credentials.username);
    assert_eq!(targets[0].host, "127.0.0.1");
}

#[tokio::test]
async fn ssh_target_does_not_hold_home_directory() {
    let ctx = TestContext::new().await;
    let created = ctx.runtime.create(named("db1")).await.unwrap().descriptor;

    let target = ctx.runtime.ssh_target("db1").await.unwrap();
    assert_eq!(target.port, created.endpoints.ssh_port);
    assert_eq!(target.username, created.credentials.username);
    assert_eq!(target.password, created.credentials.password);
    assert!(ctx.ssh.targets.lock().unwrap().is_empty());

    // With the target in hand, another manager can take over the home.
    let engine = ctx.engine.clone();
    let ctx = ctx.reopen(engine).await;
    assert!(ctx.runtime.status("db1").await.unwrap().live);
}

#[tokio::test]
async fn connect_to_stopped_instance_is_invalid_state() {
    let ctx = TestContext::new().await;
    ctx.runtime.create(named("db1")).await.unwrap();
    ctx.runtime.stop("db1").await.unwrap();

    let err = ctx.runtime.connect("db1").await.unwrap_err();
    assert!(matches!(err, RootboxError::InvalidState(_)));
    assert!(ctx.ssh.targets.lock().unwrap().is_empty());
}

#[tokio::test]
async fn backup_exports_container() {
    let ctx = TestContext::new().await;
    ctx.runtime.create(named("db1")).await.unwrap();

    let path = ctx.runtime.backup("db1").await.unwrap();
    assert!(path.exists());
    assert!(path.to_string_lossy().ends_with(".tar"));
    assert!(path.parent().unwrap().ends_with("backups"));
    assert!(ctx.runtime.status("db1").await.unwrap().live);
}

// ============================================================================
// REMOVE
// ============================================================================

#[tokio::test]
async fn remove_running_instance_requires_force() {
    let ctx = TestContext::new().await;
    let info = ctx.runtime.create(named("db1")).await.unwrap();

    let err = ctx.runtime.remove("db1", false).await.unwrap_err();
    assert!(matches!(err, RootboxError::InvalidState(_)));
    assert!(info.storage_dir.exists());

    ctx.runtime.remove("db1", true).await.unwrap();
    assert!(!info.storage_dir.exists());
    assert!(!ctx.engine.is_running("vps-db1"));
    assert!(matches!(ctx.runtime.status("db1").await, Err(RootboxError::NotFound(_))));
}

#[tokio::test]
async fn removed_name_can_be_reused() {
    let ctx = TestContext::new().await;
    ctx.runtime.create(named("db1")).await.unwrap();
    ctx.runtime.stop("db1").await.unwrap();
    ctx.runtime.remove("db1", false).await.unwrap();

    let info = ctx.runtime.create(named("db1")).await.unwrap();
    assert_eq!(info.id().as_str(), "db1");
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[tokio::test]
async fn concurrent_creates_get_distinct_ports() {
    let ctx = TestContext::new().await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let runtime = ctx.runtime.clone();
        handles.push(tokio::spawn(async move {
            runtime.create(named(&format!("node{i}"))).await
        }));
    }

    let mut ports = HashSet::new();
    for handle in handles {
        let info = handle.await.unwrap().unwrap();
        assert!(ports.insert(info.descriptor.endpoints.ssh_port));
        assert!(ports.insert(info.descriptor.endpoints.web_port));
    }
    assert_eq!(ports.len(), 16);
}

#[tokio::test]
async fn concurrent_creates_of_same_name_admit_one() {
    let ctx = TestContext::new().await;

    let a = {
        let runtime = ctx.runtime.clone();
        tokio::spawn(async move { runtime.create(named("same")).await })
    };
    let b = {
        let runtime = ctx.runtime.clone();
        tokio::spawn(async move { runtime.create(named("same")).await })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(RootboxError::Allocation(_)))));
}

// ============================================================================
// UNKNOWN LIVENESS
// ============================================================================

#[tokio::test]
async fn status_keeps_last_known_state_when_listing_times_out() {
    let ctx = TestContext::new().await;
    ctx.runtime.create(named("db1")).await.unwrap();
    ctx.engine.time_out_listings();

    let info = ctx.runtime.status("db1").await.unwrap();
    assert!(info.live);
    assert_eq!(info.status(), InstanceStatus::Running);

    let listed = ctx.runtime.list().await.unwrap();
    assert_eq!(listed[0].status(), InstanceStatus::Running);
    assert_eq!(
        ctx.runtime.info("db1").await.unwrap().status(),
        InstanceStatus::Running
    );
}

#[tokio::test]
async fn control_fails_closed_when_listing_times_out() {
    let ctx = TestContext::new().await;
    let info = ctx.runtime.create(named("db1")).await.unwrap();
    ctx.engine.time_out_listings();

    let err = ctx.runtime.stop("db1").await.unwrap_err();
    assert!(matches!(err, RootboxError::ExecutionTimeout { .. }));
    assert!(!ctx.engine.calls().iter().any(|c| c == "down vps-db1"));

    let err = ctx.runtime.remove("db1", false).await.unwrap_err();
    assert!(matches!(err, RootboxError::ExecutionTimeout { .. }));
    assert!(info.storage_dir.exists());

    assert!(ctx.runtime.start("db1").await.is_err());
    assert!(ctx.runtime.restart("db1").await.is_err());
    assert!(ctx.runtime.ssh_target("db1").await.is_err());

    assert!(ctx.engine.is_running("vps-db1"));
    assert_eq!(
        ctx.runtime.info("db1").await.unwrap().status(),
        InstanceStatus::Running
    );
}
