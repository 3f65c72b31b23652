use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{require_store, str_param, track};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_comments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let document_id = match str_param(req, "documentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(store) = state.store.as_ref() else {
        return ok(&req.id, json!({ "comments": [] }));
    };
    ok(&req.id, json!({ "comments": store.comments(document_id) }))
}

async fn handle_comments_load(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match require_store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let document_id = match str_param(req, "documentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match store.load_comments(document_id).await {
        Ok(comments) => ok(&req.id, json!({ "comments": comments })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn handle_comments_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match require_store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let document_id = match str_param(req, "documentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let user_id = match str_param(req, "userId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let body = match req.params.get("body").and_then(|v| v.as_str()) {
        Some(v) if !v.trim().is_empty() => v,
        Some(_) => return err(&req.id, "bad_params", "body must not be empty", None),
        None => return err(&req.id, "bad_params", "missing body", None),
    };
    let user_name = req
        .params
        .get("userName")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    let parent_id = req.params.get("parentId").and_then(|v| v.as_str());

    let Some(pending) = store.add_comment(document_id, body, user_id, user_name, parent_id) else {
        return ok(&req.id, json!({ "applied": false }));
    };
    // The provisional record is the newest entry of the cached list.
    let provisional = store.comments(document_id).last().cloned();
    let comments_count = store.document(document_id).map(|d| d.counters.comments);
    let mutation_id = track(state, &req.method, pending);

    ok(
        &req.id,
        json!({
            "applied": true,
            "mutationId": mutation_id,
            "comment": provisional,
            "commentsCount": comments_count,
        }),
    )
}

fn handle_comments_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match require_store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let document_id = match str_param(req, "documentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let comment_id = match str_param(req, "commentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let Some(pending) = store.delete_comment(document_id, comment_id) else {
        return ok(&req.id, json!({ "applied": false }));
    };
    let comments_count = store.document(document_id).map(|d| d.counters.comments);
    let mutation_id = track(state, &req.method, pending);

    ok(
        &req.id,
        json!({
            "applied": true,
            "mutationId": mutation_id,
            "commentsCount": comments_count,
        }),
    )
}

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "comments.list" => Some(handle_comments_list(state, req)),
        "comments.load" => Some(handle_comments_load(state, req).await),
        "comments.add" => Some(handle_comments_add(state, req)),
        "comments.delete" => Some(handle_comments_delete(state, req)),
        _ => None,
    }
}
