mod common;

use common::{comment, doc, store_with, ScriptedGateway};
use schooldocsd::realtime::{ChangeEvent, ChangeKind, ChangeListener, ChangeTable, Handled};
use serde_json::json;
use tokio::sync::mpsc;

fn event(table: ChangeTable, kind: ChangeKind, group: Option<&str>) -> ChangeEvent {
    ChangeEvent {
        table,
        kind,
        school_group_id: group.map(str::to_string),
        new_row: None,
    }
}

#[tokio::test]
async fn events_from_another_group_are_ignored() {
    let gateway = ScriptedGateway::new();
    let store = store_with(&gateway);
    let listener = ChangeListener::new(store.clone(), "group-1");

    let handled = listener
        .handle(&event(ChangeTable::Documents, ChangeKind::Insert, Some("group-2")))
        .await
        .expect("handled");
    assert_eq!(handled, Handled::Ignored);
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn any_change_in_scope_triggers_a_full_reload() {
    let gateway = ScriptedGateway::new();
    let store = store_with(&gateway);
    store.set_documents(vec![doc("stale", 0, false)]);
    *gateway.documents.borrow_mut() = vec![doc("d1", 1, false)];
    let listener = ChangeListener::new(store.clone(), "group-1");

    let handled = listener
        .handle(&event(ChangeTable::Reactions, ChangeKind::Delete, None))
        .await
        .expect("handled");
    assert_eq!(
        handled,
        Handled::Reloaded {
            documents: 1,
            comments_of: None
        }
    );
    assert_eq!(store.documents()[0].id, "d1");
    assert_eq!(gateway.calls(), vec!["fetch_documents:group-1"]);
}

#[tokio::test]
async fn comment_insert_also_reloads_that_comment_list() {
    let gateway = ScriptedGateway::new();
    let store = store_with(&gateway);
    *gateway.documents.borrow_mut() = vec![doc("d1", 1, false)];
    gateway
        .comments
        .borrow_mut()
        .insert("d1".into(), vec![comment("c1", "d1", None, 2)]);
    let listener = ChangeListener::new(store.clone(), "group-1");

    let mut insert = event(ChangeTable::Comments, ChangeKind::Insert, Some("group-1"));
    insert.new_row = Some(json!({ "id": "c1", "document_id": "d1", "body": "hi" }));
    let handled = listener.handle(&insert).await.expect("handled");

    assert_eq!(
        handled,
        Handled::Reloaded {
            documents: 1,
            comments_of: Some("d1".into())
        }
    );
    assert_eq!(store.comments("d1").len(), 1);
    assert_eq!(
        gateway.calls(),
        vec!["fetch_documents:group-1", "fetch_comments:d1"]
    );
}

#[tokio::test]
async fn listener_runs_until_senders_are_dropped() {
    let gateway = ScriptedGateway::new();
    let store = store_with(&gateway);
    *gateway.documents.borrow_mut() = vec![doc("d1", 1, false)];
    let listener = ChangeListener::new(store.clone(), "group-1");

    let (tx, rx) = mpsc::unbounded_channel();
    tx.send(event(ChangeTable::Documents, ChangeKind::Update, Some("group-1")))
        .expect("send");
    tx.send(event(ChangeTable::Views, ChangeKind::Insert, Some("group-9")))
        .expect("send");
    drop(tx);

    let mut seen = Vec::new();
    listener
        .run(rx, |ev, outcome| {
            seen.push((ev.table, outcome.clone().expect("handled")));
        })
        .await;

    assert_eq!(seen.len(), 2);
    assert!(matches!(seen[0].1, Handled::Reloaded { documents: 1, .. }));
    assert_eq!(seen[1], (ChangeTable::Views, Handled::Ignored));
    assert_eq!(store.documents().len(), 1);
}

#[test]
fn change_events_parse_from_wire_json() {
    let ev: ChangeEvent = serde_json::from_value(json!({
        "table": "comments",
        "kind": "insert",
        "schoolGroupId": "group-1",
        "newRow": { "documentId": "d7" }
    }))
    .expect("parse");
    assert_eq!(ev.inserted_comment_document(), Some("d7"));

    let update: ChangeEvent = serde_json::from_value(json!({
        "table": "comments",
        "kind": "update",
        "newRow": { "documentId": "d7" }
    }))
    .expect("parse");
    assert_eq!(update.inserted_comment_document(), None);
}
