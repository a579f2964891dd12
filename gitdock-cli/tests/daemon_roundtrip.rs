#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use gitdock_core::settings;
use gitdock_core::store;
use gitdock_core::types::RepositoryRecord;
use tempfile::TempDir;

fn gitdock_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_gitdock"))
}

fn gitdock(home: &Path) -> Command {
    let mut cmd = Command::new(gitdock_bin());
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env("GITDOCK_REPOS_PATH", home.join("repos"));
    cmd
}

struct DaemonProcess {
    child: Child,
    home: PathBuf,
}

impl DaemonProcess {
    fn start(home: &Path) -> Self {
        let child = gitdock(home)
            .args(["daemon", "start"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn daemon");
        Self {
            child,
            home: home.to_path_buf(),
        }
    }

    fn stop(&mut self) {
        let _ = gitdock(&self.home).args(["daemon", "stop"]).status();

        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            sleep(Duration::from_millis(50));
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

fn daemon_status(home: &Path) -> serde_json::Value {
    let output = gitdock(home)
        .args(["daemon", "status"])
        .output()
        .expect("run daemon status");
    serde_json::from_slice(&output.stdout).unwrap_or(serde_json::Value::Null)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(100));
    }
    false
}

#[test]
fn daemon_serves_status_and_sync_then_stops() {
    let home = TempDir::new().expect("home");
    settings::set_setting_at(home.path(), settings::RUNTIME_LIVE, "false").unwrap();
    settings::set_setting_at(home.path(), settings::DOCKER_PATH, "/nonexistent/docker").unwrap();
    settings::set_setting_at(home.path(), settings::GIT_PATH, "false").unwrap();
    store::add_repository_at(
        home.path(),
        RepositoryRecord::new("demo-api", "https://example.com/o/demo-api.git", "main"),
    )
    .unwrap();

    assert_eq!(daemon_status(home.path())["running"], serde_json::json!(false));

    let mut daemon = DaemonProcess::start(home.path());
    assert!(
        wait_until(Duration::from_secs(10), || daemon_status(home.path())["running"]
            == serde_json::json!(true)),
        "daemon did not come up"
    );
    let status = daemon_status(home.path());
    assert_eq!(status["repositories"][0]["name"], serde_json::json!("demo-api"));

    // git is `false`, so the pull fails and the daemon reports the failed phase.
    let output = gitdock(home.path())
        .args(["sync", "demo-api", "--daemon"])
        .output()
        .expect("sync via daemon");
    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("pull_failed"), "stdout: {stdout}");

    daemon.stop();
    assert!(wait_until(Duration::from_secs(3), || !home
        .path()
        .join(".gitdock/run/daemon.sock")
        .exists()));
}
