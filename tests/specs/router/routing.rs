//! Routing specs
//!
//! Verify where committed transactions land and which ones are kept.

use crate::prelude::*;

#[test]
fn closed_transaction_reaches_category_file_on_flush() {
    let temp = Project::empty();
    let _router = temp.start_router();

    let mut session = temp.session("localhost");
    let id = session.open("", "requests", true);
    session.log(&id, "hello world");
    session.close(&id);
    assert_eq!(temp.dump("requests"), "");

    session.flush();
    similar_asserts::assert_eq!(
        temp.dump("requests"),
        "rs 0 ATTACH\nrs 1 hello world\nrs 2 DETACH\n".to_string()
    );
}

#[test]
fn categories_are_written_to_separate_files() {
    let temp = Project::empty();
    let _router = temp.start_router();

    let mut session = temp.session("localhost");
    let request = session.open("", "requests", true);
    let process = session.open("", "processes", true);
    session.log(&request, "request line");
    session.log(&process, "process line");
    session.close(&request);
    session.close(&process);
    session.flush();

    assert!(temp.dump("requests").contains(" request line\n"));
    assert!(!temp.dump("requests").contains("process line"));
    assert!(temp.dump("processes").contains(" process line\n"));
}

#[test]
fn grouped_layout_uses_init_node_when_node_name_is_empty() {
    let temp = Project::with_config("sink_layout = \"grouped\"\n");
    let _router = temp.start_router();

    let mut session = temp.session("web1");
    let fallback = session.open_with("", "", "requests", true, None);
    let explicit = session.open_with("", "web2", "requests", true, None);
    session.close(&fallback);
    session.close(&explicit);
    session.flush();

    assert_eq!(events(&temp.dump("foobar/web1/requests")), ["0 ATTACH", "1 DETACH"]);
    assert_eq!(events(&temp.dump("foobar/web2/requests")), ["0 ATTACH", "1 DETACH"]);
}

#[test]
fn records_of_interleaved_transactions_stay_contiguous() {
    let temp = Project::empty();
    let _router = temp.start_router();

    let mut first = temp.session("localhost");
    let mut second = temp.session("localhost");
    let a = first.open("", "requests", true);
    let b = second.open("", "requests", true);
    first.log(&a, "a1");
    second.log(&b, "b1");
    first.log(&a, "a2");
    second.log(&b, "b2");
    second.close(&b);
    first.close(&a);
    first.flush();

    assert_eq!(
        events(&temp.dump("requests")),
        [
            "0 ATTACH", "1 b1", "2 b2", "3 DETACH", "0 ATTACH", "1 a1", "2 a2", "3 DETACH",
        ]
    );
}

#[test]
fn filter_keeps_only_matching_transactions() {
    let temp = Project::empty();
    let _router = temp.start_router();
    let filter = "uri == \"/foo\"\u{1}status != \"500\"";

    let mut session = temp.session("localhost");
    let kept = session.open_with("", "", "requests", true, Some(filter));
    session.log(&kept, "URI: /foo");
    session.log(&kept, "STATUS: 200");
    let failed = session.open_with("", "", "requests", true, Some(filter));
    session.log(&failed, "URI: /foo");
    session.log(&failed, "STATUS: 500");
    let unset = session.open_with("", "", "requests", true, Some(filter));
    session.log(&unset, "URI: /foo");
    for id in [&kept, &failed, &unset] {
        session.close(id);
    }
    session.flush();

    assert_eq!(
        events(&temp.dump("requests")),
        ["0 ATTACH", "1 URI: /foo", "2 STATUS: 200", "3 DETACH"]
    );
}

#[test]
fn sink_file_survives_router_restart() {
    let temp = Project::empty();
    {
        let _router = temp.start_router();
        let mut session = temp.session("localhost");
        let id = session.open("", "requests", true);
        session.close(&id);
        session.flush();
    }

    let _router = temp.start_router();
    let mut session = temp.session("localhost");
    let id = session.open("", "requests", true);
    session.log(&id, "second run");
    session.close(&id);
    session.flush();

    assert_eq!(
        events(&temp.dump("requests")),
        ["0 ATTACH", "1 DETACH", "0 ATTACH", "1 second run", "2 DETACH"]
    );
}
