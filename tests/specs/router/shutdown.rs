//! Shutdown specs
//!
//! Verify what happens to open transactions when the router stops.

use crate::prelude::*;

#[test]
fn shutdown_writes_crash_protected_transactions() {
    let temp = Project::empty();
    let mut router = temp.start_router();

    let mut client = temp.session("localhost");
    let id = client.open("", "requests", true);
    client.log(&id, "still open");
    client.flush();

    let mut admin = temp.session("localhost");
    admin.send(&["shutdown"]);
    assert_eq!(admin.recv(), ["status", "ok"]);

    assert!(router.wait_exit(SPEC_WAIT_MAX_MS));
    assert!(client.is_closed());
    similar_asserts::assert_eq!(
        temp.dump("requests"),
        "rs 0 ATTACH\nrs 1 still open\n".to_string()
    );
}

#[test]
fn shutdown_discards_unprotected_transactions() {
    let temp = Project::empty();
    let mut router = temp.start_router();

    let mut client = temp.session("localhost");
    let id = client.open("", "requests", false);
    client.log(&id, "still open");
    client.flush();

    let mut admin = temp.session("localhost");
    admin.send(&["shutdown"]);
    assert_eq!(admin.recv(), ["status", "ok"]);

    assert!(router.wait_exit(SPEC_WAIT_MAX_MS));
    assert_eq!(temp.dump("requests"), "");
}

#[test]
fn shutdown_removes_socket_and_pid_files() {
    let temp = Project::empty();
    let mut router = temp.start_router();
    assert!(temp.socket().exists());

    let mut admin = temp.session("localhost");
    admin.send(&["shutdown", "false"]);
    assert_eq!(admin.recv(), ["status", "ok"]);

    assert!(router.wait_exit(SPEC_WAIT_MAX_MS));
    assert!(!temp.socket().exists());
    assert!(!temp.path().join("router.sock.pid").exists());
    assert!(temp.log().contains("router shutdown complete"));
}

#[test]
fn router_restarts_after_shutdown() {
    let temp = Project::empty();
    let mut router = temp.start_router();
    let mut admin = temp.session("localhost");
    admin.send(&["shutdown"]);
    admin.recv();
    assert!(router.wait_exit(SPEC_WAIT_MAX_MS));

    let _router = temp.start_router();
    let mut session = temp.session("localhost");
    assert_eq!(session.resident(), 0);
}
