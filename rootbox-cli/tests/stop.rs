use predicates::prelude::*;

mod common;

#[test]
fn test_stop_running() {
    let mut ctx = common::rootbox();
    let name = "stop-running";
    ctx.create(name);

    ctx.cmd
        .args(["stop", name])
        .assert()
        .success()
        .stdout(predicate::str::contains(name));

    ctx.new_cmd()
        .args(["status", name])
        .assert()
        .success()
        .stdout(predicate::str::contains("STOPPED"));
}

#[test]
fn test_stop_stopped_idempotency() {
    let mut ctx = common::rootbox();
    let name = "stop-idempotent";
    ctx.create(name);

    ctx.cmd.args(["stop", name]).assert().success();
    ctx.new_cmd().args(["stop", name]).assert().success();
}

#[test]
fn test_stop_multiple() {
    let mut ctx = common::rootbox();
    let first = "stop-multi-1";
    let second = "stop-multi-2";
    ctx.create(first);
    ctx.create(second);

    ctx.cmd
        .args(["stop", first, second])
        .assert()
        .success()
        .stdout(predicate::str::contains(first))
        .stdout(predicate::str::contains(second));
}

#[test]
fn test_stop_unknown() {
    let mut ctx = common::rootbox();
    ctx.cmd
        .args(["stop", "non-existent-instance"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}
