//! Router CLI specs
//!
//! Verify config resolution and startup failures of the binary.

use crate::prelude::*;

#[test]
fn print_config_shows_resolved_settings() {
    let temp = Project::empty();

    let stdout = temp.router().args(&["--print-config"]).passes().stdout();
    let config: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(
        config["address"],
        format!("unix:{}", temp.socket().display()).as_str()
    );
    assert_eq!(config["username"], USERNAME);
    assert_eq!(config["sink_layout"], "category");
}

#[test]
fn print_config_never_shows_password() {
    let temp = Project::empty();

    let stdout = temp
        .router()
        .args(&["--print-config"])
        .passes()
        .stdout_lacks("password")
        .stdout();
    let config: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(config.get("password").is_none());
}

#[test]
fn flags_override_config_file() {
    let temp = Project::empty();

    temp.router()
        .args(&["--print-config", "--address", "tcp://127.0.0.1:7000", "--username", "ops"])
        .passes()
        .stdout_has("\"tcp://127.0.0.1:7000\"")
        .stdout_has("\"ops\"");
}

#[test]
fn environment_overrides_config_file() {
    let temp = Project::empty();

    temp.router()
        .env("UST_ROUTER_SINK_LAYOUT", "grouped")
        .args(&["--print-config"])
        .passes()
        .stdout_has("\"grouped\"");
}

#[test]
fn missing_password_fails_startup() {
    let temp = Project::empty();
    temp.file(
        "router.toml",
        &format!("address = \"unix:{}\"\n", temp.socket().display()),
    );

    temp.router().fails().stderr_has("UST_ROUTER_PASSWORD");
    assert!(!temp.socket().exists());
}

#[test]
fn unknown_config_key_is_rejected() {
    let temp = Project::with_config("colour = \"blue\"\n");

    temp.router().args(&["--print-config"]).fails().stderr_has("colour");
}

#[test]
fn second_router_on_same_socket_fails() {
    let temp = Project::empty();
    let _router = temp.start_router();

    temp.router().fails();
    assert!(temp.socket().exists());
}

#[test]
fn startup_marker_is_written_to_log() {
    let temp = Project::empty();
    let _router = temp.start_router();

    assert!(temp.log().starts_with("--- ust-router: starting (pid: "));
}
