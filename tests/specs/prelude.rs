//! Shared helpers for router specs
//!
//! Specs run the real `ust-router` binary in a temp directory and talk to it
//! over its unix socket, either with raw protocol frames or through
//! `ust-client`.

use std::io::{BufRead, BufReader};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::time::{Duration, Instant};

use ust_core::message;

/// Upper bound for polling in specs
pub const SPEC_WAIT_MAX_MS: u64 = 5000;

pub const USERNAME: &str = "test";
pub const PASSWORD: &str = "1234";

/// Poll `check` every 10ms until it holds or `timeout_ms` elapses
pub fn wait_for(timeout_ms: u64, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    loop {
        if check() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn router_bin() -> PathBuf {
    assert_cmd::cargo::cargo_bin("ust-router")
}

/// A temp directory holding a router config, socket and dump directory
pub struct Project {
    dir: tempfile::TempDir,
}

impl Project {
    /// Project with a config for a unix-socket router using the category layout
    pub fn empty() -> Self {
        Self::with_config("")
    }

    /// Project whose config has `extra` appended
    pub fn with_config(extra: &str) -> Self {
        let project = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        let config = format!(
            "address = \"unix:{}\"\nusername = \"{USERNAME}\"\npassword = \"{PASSWORD}\"\ndump_dir = \"{}\"\nlog_path = \"{}\"\n{extra}",
            project.socket().display(),
            project.dump_dir().display(),
            project.log_path().display(),
        );
        project.file("router.toml", &config);
        project
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn socket(&self) -> PathBuf {
        self.path().join("router.sock")
    }

    pub fn dump_dir(&self) -> PathBuf {
        self.path().join("dump")
    }

    pub fn log_path(&self) -> PathBuf {
        self.path().join("router.log")
    }

    pub fn config_path(&self) -> PathBuf {
        self.path().join("router.toml")
    }

    pub fn file(&self, relative: &str, contents: &str) {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    /// Contents of a sink file, empty when it does not exist yet
    pub fn dump(&self, relative: &str) -> String {
        std::fs::read_to_string(self.dump_dir().join(relative)).unwrap_or_default()
    }

    /// `ust-router` invocation using this project's config
    pub fn router(&self) -> CliBuilder {
        let mut cmd = Command::new(router_bin());
        cmd.current_dir(self.path())
            .arg("--config")
            .arg(self.config_path())
            .env_remove("UST_ROUTER_PASSWORD")
            .env_remove("UST_ROUTER_ADDRESS");
        CliBuilder { cmd }
    }

    /// Start the router and wait until it reports READY
    pub fn start_router(&self) -> RouterProcess {
        let mut child = Command::new(router_bin())
            .arg("--config")
            .arg(self.config_path())
            .env_remove("UST_ROUTER_PASSWORD")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();
        let stdout = child.stdout.take().unwrap();
        let mut line = String::new();
        BufReader::new(stdout).read_line(&mut line).unwrap();
        assert_eq!(line.trim(), "READY", "router log:\n{}", self.log());
        RouterProcess { child }
    }

    pub fn log(&self) -> String {
        std::fs::read_to_string(self.log_path()).unwrap_or_default()
    }

    /// Authenticated and initialized raw protocol session
    pub fn session(&self, node_name: &str) -> Session {
        let mut session = Session {
            stream: UnixStream::connect(self.socket()).unwrap(),
        };
        session
            .stream
            .set_read_timeout(Some(Duration::from_millis(SPEC_WAIT_MAX_MS)))
            .unwrap();
        assert_eq!(session.recv(), ["version", "1"]);
        message::write_scalar(&mut session.stream, USERNAME.as_bytes()).unwrap();
        message::write_scalar(&mut session.stream, PASSWORD.as_bytes()).unwrap();
        assert_eq!(session.recv(), ["status", "ok"]);
        session.send(&["init", node_name]);
        assert_eq!(session.recv(), ["status", "ok"]);
        session
    }

    pub fn client(&self) -> ust_client::ClientCore {
        ust_client::ClientCore::new(
            ust_core::Address::Unix(self.socket()),
            USERNAME,
            PASSWORD,
            "localhost",
        )
    }
}

/// A running `ust-router` child process; killed on drop
pub struct RouterProcess {
    child: Child,
}

impl RouterProcess {
    /// Wait for the process to exit on its own
    pub fn wait_exit(&mut self, timeout_ms: u64) -> bool {
        wait_for(timeout_ms, || matches!(self.child.try_wait(), Ok(Some(_))))
    }
}

impl Drop for RouterProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub struct Session {
    stream: UnixStream,
}

impl Session {
    pub fn send(&mut self, fields: &[&str]) {
        message::write_array(&mut self.stream, fields).unwrap();
    }

    pub fn recv(&mut self) -> Vec<String> {
        message::read_array(&mut self.stream).unwrap().unwrap()
    }

    /// Whether the router has closed this connection
    pub fn is_closed(&mut self) -> bool {
        matches!(message::read_array(&mut self.stream), Ok(None) | Err(_))
    }

    /// Open a transaction in group `foobar` and return its id
    pub fn open(&mut self, id: &str, category: &str, crash_protect: bool) -> String {
        self.open_with(id, "", category, crash_protect, None)
    }

    pub fn open_with(
        &mut self,
        id: &str,
        node_name: &str,
        category: &str,
        crash_protect: bool,
        filter: Option<&str>,
    ) -> String {
        let crash_protect = if crash_protect { "true" } else { "false" };
        let mut command = vec![
            "openTransaction",
            id,
            "foobar",
            node_name,
            category,
            "rs",
            "-",
            crash_protect,
            "true",
        ];
        command.extend(filter);
        self.send(&command);
        let reply = self.recv();
        assert_eq!(reply[..2], ["status", "ok"], "{reply:?}");
        reply[2].clone()
    }

    pub fn log(&mut self, id: &str, text: &str) {
        self.send(&["log", id, "rs"]);
        message::write_scalar(&mut self.stream, text.as_bytes()).unwrap();
    }

    pub fn close(&mut self, id: &str) {
        self.send(&["closeTransaction", id, "rs", "true"]);
        assert_eq!(self.recv(), ["status", "ok"]);
    }

    pub fn flush(&mut self) {
        self.send(&["flush"]);
        assert_eq!(self.recv(), ["status", "ok"]);
    }

    /// Parsed reply of the `status` command
    pub fn status(&mut self) -> serde_json::Value {
        self.send(&["status"]);
        let reply = self.recv();
        assert_eq!(reply[..2], ["status", "ok"]);
        serde_json::from_str(&reply[2]).unwrap()
    }

    /// Number of transactions resident in the router
    pub fn resident(&mut self) -> usize {
        self.status()["transactions"]
            .as_array()
            .map_or(0, |transactions| transactions.len())
    }
}

pub struct CliBuilder {
    cmd: Command,
}

impl CliBuilder {
    pub fn args(mut self, args: &[&str]) -> Self {
        self.cmd.args(args);
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.cmd.env(key, value);
        self
    }

    pub fn passes(mut self) -> RunAssert {
        let output = self.cmd.output().unwrap();
        assert!(
            output.status.success(),
            "expected success, got {:?}\nstderr: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        );
        RunAssert { output }
    }

    pub fn fails(mut self) -> RunAssert {
        let output = self.cmd.output().unwrap();
        assert!(
            !output.status.success(),
            "expected failure\nstdout: {}",
            String::from_utf8_lossy(&output.stdout)
        );
        RunAssert { output }
    }
}

pub struct RunAssert {
    output: Output,
}

impl RunAssert {
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.output.stdout).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.output.stderr).into_owned()
    }

    pub fn stdout_has(self, expected: &str) -> Self {
        let stdout = self.stdout();
        assert!(stdout.contains(expected), "stdout missing {expected:?}:\n{stdout}");
        self
    }

    pub fn stdout_lacks(self, unexpected: &str) -> Self {
        let stdout = self.stdout();
        assert!(!stdout.contains(unexpected), "stdout has {unexpected:?}:\n{stdout}");
        self
    }

    pub fn stderr_has(self, expected: &str) -> Self {
        let stderr = self.stderr();
        assert!(stderr.contains(expected), "stderr missing {expected:?}:\n{stderr}");
        self
    }
}

/// Sequence numbers and payloads of sink lines, without their timestamps
pub fn events(dump: &str) -> Vec<String> {
    dump.lines()
        .map(|line| line.split_once(' ').map_or(line, |(_, rest)| rest).to_string())
        .collect()
}
