use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{
    bool_param, require_scope, require_store, str_param, track_with, OnFailure,
};
use crate::ipc::types::{AppState, Request};
use crate::model::{CounterField, NewDocument};
use crate::optimistic::Pending;
use serde_json::json;
use std::path::PathBuf;

fn handle_documents_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(store) = state.store.as_ref() else {
        return ok(&req.id, json!({ "documents": [] }));
    };
    ok(&req.id, json!({ "documents": store.documents() }))
}

async fn handle_documents_reload(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match require_store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let scope = match require_scope(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match store.reload(&scope).await {
        Ok(count) => ok(
            &req.id,
            json!({ "documentCount": count, "documents": store.documents() }),
        ),
        Err(e) => store_err(&req.id, &e),
    }
}

async fn handle_documents_upload(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match require_store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let source = match str_param(req, "sourcePath") {
        Ok(v) => PathBuf::from(v),
        Err(resp) => return resp,
    };
    if !source.is_file() {
        return err(
            &req.id,
            "bad_params",
            format!("sourcePath is not a file: {}", source.to_string_lossy()),
            None,
        );
    }

    // Missing group and file name fall back to the active scope and the
    // source file's name.
    let mut params = req.params.clone();
    if params.get("schoolGroupId").is_none() {
        if let Some(scope) = state.scope.as_ref() {
            params["schoolGroupId"] = json!(scope);
        }
    }
    if params.get("fileName").is_none() {
        if let Some(name) = source.file_name().and_then(|s| s.to_str()) {
            params["fileName"] = json!(name);
        }
    }
    let document: NewDocument = match serde_json::from_value(params) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };

    match store.upload_document(&document, source).await {
        Ok(stored) => ok(&req.id, json!({ "document": stored })),
        Err(e) => store_err(&req.id, &e),
    }
}

fn respond_tracked(
    state: &mut AppState,
    req: &Request,
    pending: Option<Pending<()>>,
    on_failure: OnFailure,
    extra: impl FnOnce(&mut serde_json::Value),
) -> serde_json::Value {
    let mut result = match pending {
        Some(p) => json!({
            "applied": true,
            "mutationId": track_with(state, &req.method, p, on_failure),
        }),
        None => json!({ "applied": false }),
    };
    extra(&mut result);
    ok(&req.id, result)
}

fn handle_documents_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match require_store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let document_id = match str_param(req, "documentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let pending = store.delete_document(document_id);
    respond_tracked(state, req, pending, OnFailure::RolledBack, |_| {})
}

fn handle_documents_set_flag(state: &mut AppState, req: &Request, pinned: bool) -> serde_json::Value {
    let store = match require_store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let document_id = match str_param(req, "documentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let key = if pinned { "pinned" } else { "archived" };
    let value = match bool_param(req, key) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let pending = if pinned {
        store.set_pinned(document_id, value)
    } else {
        store.set_archived(document_id, value)
    };
    let document = store.document(document_id);
    respond_tracked(state, req, pending, OnFailure::RolledBack, |result| {
        result["document"] = json!(document);
    })
}

/// View and download counters: bump locally, write the new value in the
/// background, never roll back.
fn handle_documents_counter(
    state: &mut AppState,
    req: &Request,
    field: CounterField,
) -> serde_json::Value {
    let store = match require_store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let document_id = match str_param(req, "documentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let value = match field {
        CounterField::Downloads => store.increment_downloads(document_id),
        _ => store.increment_views(document_id),
    };
    let Some(value) = value else {
        return ok(&req.id, json!({ "applied": false }));
    };
    let pending = match field {
        CounterField::Views => {
            let viewer = req.params.get("userId").and_then(|v| v.as_str());
            store.persist_view(document_id, viewer)
        }
        _ => store.persist_counter(document_id, field),
    };

    let object_path = match (field, state.gateway.as_ref(), store.document(document_id)) {
        (CounterField::Downloads, Some(gateway), Some(doc)) => Some(
            gateway
                .object_path(&doc.file.storage_path)
                .to_string_lossy()
                .to_string(),
        ),
        _ => None,
    };
    respond_tracked(state, req, pending, OnFailure::Kept, |result| {
        result["value"] = json!(value);
        if let Some(path) = object_path {
            result["objectPath"] = json!(path);
        }
    })
}

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "documents.list" => Some(handle_documents_list(state, req)),
        "documents.reload" => Some(handle_documents_reload(state, req).await),
        "documents.upload" => Some(handle_documents_upload(state, req).await),
        "documents.delete" => Some(handle_documents_delete(state, req)),
        "documents.setPinned" => Some(handle_documents_set_flag(state, req, true)),
        "documents.setArchived" => Some(handle_documents_set_flag(state, req, false)),
        "documents.view" => Some(handle_documents_counter(state, req, CounterField::Views)),
        "documents.download" => Some(handle_documents_counter(
            state,
            req,
            CounterField::Downloads,
        )),
        _ => None,
    }
}
