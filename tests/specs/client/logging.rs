//! Client logging specs
//!
//! Verify ust-client against a running router binary.

use ust_client::{ClientCore, TransactionOptions};

use crate::prelude::*;

#[test]
fn client_transaction_is_written_after_drop() {
    let temp = Project::empty();
    let _router = temp.start_router();
    let core = temp.client();

    let mut txn = core.new_transaction("foobar", TransactionOptions::default());
    assert!(!txn.is_null());
    txn.message("hello");
    txn.flush_to_disk_after_close(true);
    drop(txn);

    assert_eq!(
        events(&temp.dump("requests")),
        ["0 ATTACH", "1 hello", "2 DETACH"]
    );
}

#[test]
fn client_without_router_is_silent() {
    let temp = Project::empty();
    let core = temp.client();

    let mut txn = core.new_transaction("foobar", TransactionOptions::default());
    assert!(txn.is_null());
    txn.message("dropped");
    assert!(!core.flush());

    // Still backing off after the router comes up
    let _router = temp.start_router();
    assert!(core.new_transaction("foobar", TransactionOptions::default()).is_null());
}

#[test]
fn client_survives_router_crash() {
    let temp = Project::empty();
    let core = temp.client();
    {
        let _router = temp.start_router();
        drop(core.new_transaction("foobar", TransactionOptions::default()));
    }

    // The pooled connection is dead; the open fails quietly
    assert!(core.new_transaction("foobar", TransactionOptions::default()).is_null());
}

#[test]
fn continue_from_second_process_shares_transaction() {
    let temp = Project::empty();
    let _router = temp.start_router();
    let web = temp.client();
    let worker = temp.client();

    let mut request = web.new_transaction("foobar", TransactionOptions::default());
    let mut job = worker.continue_transaction(request.txn_id(), "foobar", "requests");
    assert_eq!(job.txn_id(), request.txn_id());
    job.message("from worker");
    drop(job);
    request.message("from web");
    request.flush_to_disk_after_close(true);
    drop(request);

    assert_eq!(
        events(&temp.dump("requests")),
        ["0 ATTACH", "1 ATTACH", "2 from worker", "3 DETACH", "4 from web", "5 DETACH"]
    );
}

#[test]
fn null_core_does_nothing() {
    let core = ClientCore::null();
    assert!(core.new_transaction("foobar", TransactionOptions::default()).is_null());
}
