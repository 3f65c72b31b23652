mod common;

use common::{comment, doc, rejected, store_with, ScriptedGateway};
use schooldocsd::model::{CounterField, DocumentCategory, NewDocument, Visibility};
use std::collections::BTreeSet;
use std::path::PathBuf;

fn order(store: &schooldocsd::DocumentStore) -> Vec<String> {
    store.documents().into_iter().map(|d| d.id).collect()
}

#[tokio::test]
async fn reload_replaces_documents_for_the_scope() {
    let gateway = ScriptedGateway::new();
    let store = store_with(&gateway);
    store.set_documents(vec![doc("stale", 0, false)]);

    let mut other_group = doc("elsewhere", 5, false);
    other_group.school_group_id = "group-2".into();
    *gateway.documents.borrow_mut() = vec![doc("d2", 2, true), doc("d1", 1, false), other_group];

    let count = store.reload("group-1").await.expect("reloaded");
    assert_eq!(count, 2);
    assert_eq!(order(&store), vec!["d2", "d1"]);
}

#[tokio::test]
async fn view_and_download_counters_only_grow() {
    let gateway = ScriptedGateway::new();
    let store = store_with(&gateway);
    store.set_documents(vec![doc("d1", 0, false)]);

    assert_eq!(store.increment_views("d1"), Some(1));
    assert_eq!(store.increment_views("d1"), Some(2));
    assert_eq!(store.increment_downloads("d1"), Some(1));
    assert_eq!(store.increment_views("missing"), None);

    let counters = store.document("d1").expect("document").counters;
    assert_eq!(counters.views, 2);
    assert_eq!(counters.downloads, 1);
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn counter_write_failure_is_not_rolled_back() {
    let gateway = ScriptedGateway::new();
    let store = store_with(&gateway);
    store.set_documents(vec![doc("d1", 0, false)]);

    store.increment_views("d1");
    store.increment_views("d1");
    gateway.fail_next("update_counter", rejected());
    store
        .persist_counter("d1", CounterField::Views)
        .expect("document known")
        .await
        .expect_err("rejected");

    assert_eq!(store.document("d1").expect("document").counters.views, 2);
    assert_eq!(gateway.calls(), vec!["update_counter:d1/views_count=2"]);
    assert!(store.persist_counter("missing", CounterField::Views).is_none());
}

#[tokio::test]
async fn pinning_moves_document_forward_and_failure_restores_order() {
    let gateway = ScriptedGateway::new();
    let store = store_with(&gateway);
    store.set_documents(vec![doc("p", 0, true), doc("new", 9, false), doc("old", 1, false)]);
    let before = store.snapshot();

    gateway.fail_next("set_document_flag", rejected());
    let pending = store.set_pinned("old", true).expect("applied");
    assert_eq!(order(&store), vec!["old", "p", "new"]);
    assert!(store.document("old").expect("document").pinned);

    pending.await.expect_err("rejected");
    assert_eq!(store.snapshot(), before);

    store
        .set_pinned("old", true)
        .expect("applied")
        .await
        .expect("confirmed");
    assert_eq!(order(&store), vec!["old", "p", "new"]);
    assert_eq!(
        gateway.calls().last().map(String::as_str),
        Some("set_document_flag:old/is_pinned=true")
    );
}

#[tokio::test]
async fn archiving_sets_flag_in_place() {
    let gateway = ScriptedGateway::new();
    let store = store_with(&gateway);
    store.set_documents(vec![doc("d1", 1, false), doc("d2", 0, false)]);

    store
        .set_archived("d2", true)
        .expect("applied")
        .await
        .expect("confirmed");
    assert!(store.document("d2").expect("document").archived);
    assert_eq!(order(&store), vec!["d1", "d2"]);
    assert!(store.set_archived("missing", true).is_none());
}

#[tokio::test]
async fn delete_document_failure_restores_document_and_comments() {
    let gateway = ScriptedGateway::new();
    let store = store_with(&gateway);
    store.set_documents(vec![doc("d1", 2, false), doc("d2", 1, false), doc("d3", 0, false)]);
    gateway
        .comments
        .borrow_mut()
        .insert("d2".into(), vec![comment("c1", "d2", None, 3)]);
    store.load_comments("d2").await.expect("loaded");
    let before = store.snapshot();

    gateway.fail_next("delete_document", rejected());
    let pending = store.delete_document("d2").expect("applied");
    assert_eq!(order(&store), vec!["d1", "d3"]);
    assert!(store.comments("d2").is_empty());

    pending.await.expect_err("rejected");
    assert_eq!(store.snapshot(), before);

    store
        .delete_document("d2")
        .expect("applied")
        .await
        .expect("confirmed");
    assert_eq!(order(&store), vec!["d1", "d3"]);
}

#[tokio::test]
async fn upload_inserts_after_pinned_and_before_older_documents() {
    let gateway = ScriptedGateway::new();
    let store = store_with(&gateway);
    store.set_documents(vec![doc("pinned", 0, true), doc("older", 1, false)]);

    let new_doc = NewDocument {
        school_group_id: "group-1".into(),
        title: "Calendrier des examens".into(),
        description: None,
        category: DocumentCategory::Exam,
        tags: BTreeSet::new(),
        visibility: Visibility::School {
            school_id: "school-9".into(),
        },
        pinned: false,
        uploaded_by: "proviseur-1".into(),
        file_name: "calendrier.pdf".into(),
        mime_type: "application/pdf".into(),
    };
    let stored = store
        .upload_document(&new_doc, PathBuf::from("/dev/null"))
        .await
        .expect("uploaded");

    assert_eq!(order(&store), vec!["pinned".to_string(), stored.id.clone(), "older".to_string()]);
    assert_eq!(stored.visibility.school_id(), Some("school-9"));
}

#[tokio::test]
async fn upload_failure_leaves_list_alone() {
    let gateway = ScriptedGateway::new();
    let store = store_with(&gateway);
    store.set_documents(vec![doc("d1", 0, false)]);
    gateway.fail_next("upload_document", rejected());

    let new_doc = NewDocument {
        school_group_id: "group-1".into(),
        title: "Note".into(),
        description: None,
        category: DocumentCategory::Other,
        tags: BTreeSet::new(),
        visibility: Visibility::Private,
        pinned: false,
        uploaded_by: "u1".into(),
        file_name: "note.txt".into(),
        mime_type: "text/plain".into(),
    };
    let err = store
        .upload_document(&new_doc, PathBuf::from("/dev/null"))
        .await
        .expect_err("rejected");
    assert_eq!(err.operation(), "upload_document");
    assert_eq!(order(&store), vec!["d1"]);
}

#[tokio::test]
async fn upload_to_another_group_stays_out_of_the_view() {
    let gateway = ScriptedGateway::new();
    let store = store_with(&gateway);
    *gateway.documents.borrow_mut() = vec![doc("d1", 0, false)];
    store.reload("group-1").await.expect("reloaded");

    let new_doc = NewDocument {
        school_group_id: "group-2".into(),
        title: "Autre groupe".into(),
        description: None,
        category: DocumentCategory::Administrative,
        tags: BTreeSet::new(),
        visibility: Visibility::Group,
        pinned: false,
        uploaded_by: "u1".into(),
        file_name: "autre.pdf".into(),
        mime_type: "application/pdf".into(),
    };
    let stored = store
        .upload_document(&new_doc, PathBuf::from("/dev/null"))
        .await
        .expect("uploaded");

    assert_eq!(stored.school_group_id, "group-2");
    assert_eq!(order(&store), vec!["d1"]);
    assert_eq!(store.snapshot().scope.as_deref(), Some("group-1"));
}

#[tokio::test]
async fn known_viewer_gets_a_view_row_after_the_total() {
    let gateway = ScriptedGateway::new();
    let store = store_with(&gateway);
    store.set_documents(vec![doc("d1", 0, false)]);

    store.increment_views("d1");
    store
        .persist_view("d1", Some("u1"))
        .expect("document known")
        .await
        .expect("written");
    store.increment_views("d1");
    store
        .persist_view("d1", None)
        .expect("document known")
        .await
        .expect("written");

    assert_eq!(
        gateway.calls(),
        vec![
            "update_counter:d1/views_count=1",
            "record_view:d1/u1",
            "update_counter:d1/views_count=2",
        ]
    );
}

#[tokio::test]
async fn failed_total_skips_the_view_row_and_keeps_the_count() {
    let gateway = ScriptedGateway::new();
    let store = store_with(&gateway);
    store.set_documents(vec![doc("d1", 0, false)]);

    store.increment_views("d1");
    gateway.fail_next("update_counter", rejected());
    let err = store
        .persist_view("d1", Some("u1"))
        .expect("document known")
        .await
        .expect_err("rejected");

    assert_eq!(err.operation(), "persist_counter");
    assert_eq!(gateway.calls(), vec!["update_counter:d1/views_count=1"]);
    assert_eq!(store.document("d1").expect("document").counters.views, 1);
}
