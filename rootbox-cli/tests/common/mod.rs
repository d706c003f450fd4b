#![allow(dead_code)]

use assert_cmd::Command;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

/// Each test gets its own home, so tests never contend for the runtime lock.
/// The container runtime is disabled and every instance runs in degraded mode.
pub struct TestContext {
    pub cmd: Command,
    pub home: TempDir,
}

impl TestContext {
    /// A fresh command sharing this context's home directory.
    pub fn new_cmd(&self) -> Command {
        command_for(self.home.path())
    }

    /// Create an instance and return its id.
    pub fn create(&self, name: &str) -> String {
        let output = self
            .new_cmd()
            .args(["create", "--name", name])
            .output()
            .expect("Failed to run create");
        assert!(
            output.status.success(),
            "create failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        // Degraded instances are real local processes.
        let _ = self.new_cmd().args(["rm", "--force", "--all"]).ok();
    }
}

fn command_for(home: &Path) -> Command {
    let bin_path = env!("CARGO_BIN_EXE_rootbox");
    let mut cmd = Command::new(bin_path);
    cmd.timeout(Duration::from_secs(60));
    cmd.env("ROOTBOX_ENGINE", "none");
    cmd.env_remove("RUST_LOG");
    cmd.arg("--home").arg(home);
    cmd
}

pub fn rootbox() -> TestContext {
    let home = TempDir::new().expect("Failed to create temp home");
    TestContext {
        cmd: command_for(home.path()),
        home,
    }
}
