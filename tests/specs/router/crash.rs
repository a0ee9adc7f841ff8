//! Disconnect specs
//!
//! A connection that goes away without closing its transactions counts as a
//! crash of that participant.

use crate::prelude::*;

#[test]
fn disconnect_writes_crash_protected_transaction() {
    let temp = Project::empty();
    let _router = temp.start_router();

    let mut crashing = temp.session("localhost");
    let id = crashing.open("", "requests", true);
    crashing.log(&id, "before crash");
    crashing.flush();
    drop(crashing);

    let mut observer = temp.session("localhost");
    assert!(wait_for(SPEC_WAIT_MAX_MS, || observer.resident() == 0));
    observer.flush();
    assert_eq!(
        events(&temp.dump("requests")),
        ["0 ATTACH", "1 before crash", "2 DETACH"]
    );
}

#[test]
fn disconnect_discards_unprotected_transaction() {
    let temp = Project::empty();
    let _router = temp.start_router();

    let mut crashing = temp.session("localhost");
    let id = crashing.open("", "requests", false);
    crashing.log(&id, "before crash");
    crashing.flush();
    drop(crashing);

    let mut observer = temp.session("localhost");
    assert!(wait_for(SPEC_WAIT_MAX_MS, || observer.resident() == 0));
    observer.flush();
    assert_eq!(temp.dump("requests"), "");
}

#[test]
fn disconnect_only_releases_own_reference() {
    let temp = Project::empty();
    let _router = temp.start_router();

    let mut owner = temp.session("localhost");
    let id = owner.open("", "requests", true);
    let mut joiner = temp.session("localhost");
    joiner.open(&id, "requests", true);
    joiner.log(&id, "from joiner");
    joiner.flush();
    drop(joiner);

    assert!(wait_for(SPEC_WAIT_MAX_MS, || {
        owner.status()["transactions"][0]["refcount"] == 1
    }));
    owner.flush();
    assert_eq!(temp.dump("requests"), "");

    owner.close(&id);
    owner.flush();
    assert_eq!(
        events(&temp.dump("requests")),
        ["0 ATTACH", "1 ATTACH", "2 from joiner", "3 DETACH", "4 DETACH"]
    );
}

#[test]
fn malformed_command_is_answered_and_disconnected() {
    let temp = Project::empty();
    let _router = temp.start_router();

    let mut bad = temp.session("localhost");
    let id = bad.open("", "requests", true);
    bad.send(&["log", id.as_str()]);
    let reply = bad.recv();
    assert_eq!(reply[0], "error");
    assert!(bad.is_closed());

    // The broken connection's transaction was crash-committed
    let mut good = temp.session("localhost");
    assert!(wait_for(SPEC_WAIT_MAX_MS, || good.resident() == 0));
    good.flush();
    assert_eq!(events(&temp.dump("requests")), ["0 ATTACH", "1 DETACH"]);
}
