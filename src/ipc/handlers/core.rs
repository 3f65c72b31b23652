use crate::config::GATEWAY_TIMEOUT_SETTING;
use crate::db;
use crate::gateway::sqlite::SqliteGateway;
use crate::gateway::GatewayRef;
use crate::ipc::error::{err, ok, store_err};
use crate::ipc::helpers::{require_store, str_param};
use crate::ipc::types::{AppState, Request};
use crate::realtime::ChangeListener;
use crate::store::DocumentStore;
use serde_json::json;
use std::path::PathBuf;
use std::rc::Rc;
use tokio::sync::mpsc;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "schoolGroupId": state.scope,
            "pendingMutations": state.pending_mutations(),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let p = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = p else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    let conn = match db::open_db(&path) {
        Ok(conn) => conn,
        Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
    };

    if let Some(ms) = req.params.get("gatewayTimeoutMs") {
        if ms.as_u64().filter(|v| *v > 0).is_none() {
            return err(
                &req.id,
                "bad_params",
                "gatewayTimeoutMs must be a positive integer",
                None,
            );
        }
        if let Err(e) = db::settings_set_json(&conn, GATEWAY_TIMEOUT_SETTING, ms) {
            return err(&req.id, "db_update_failed", e.to_string(), None);
        }
    }
    let stored_timeout = match db::settings_get_json(&conn, GATEWAY_TIMEOUT_SETTING) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let settings = state.config.store_settings(stored_timeout.as_ref());

    let gateway = Rc::new(SqliteGateway::new(conn, path.clone()));
    let gateway_ref: GatewayRef = gateway.clone();
    state.workspace = Some(path.clone());
    state.gateway = Some(gateway);
    state.store = Some(DocumentStore::new(gateway_ref, settings));
    state.scope = None;
    state.realtime = None;
    state.listener = None;
    tracing::info!(workspace = %path.display(), "workspace selected");

    ok(
        &req.id,
        json!({
            "workspacePath": path.to_string_lossy(),
            "gatewayTimeoutMs": settings.gateway_timeout.as_millis() as u64,
        }),
    )
}

async fn handle_scope_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match require_store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let school_group_id = match str_param(req, "schoolGroupId") {
        Ok(v) => v.to_string(),
        Err(resp) => return resp,
    };

    let count = match store.reload(&school_group_id).await {
        Ok(n) => n,
        Err(e) => return store_err(&req.id, &e),
    };

    // Replacing the sender ends the previous listener.
    let (tx, rx) = mpsc::unbounded_channel();
    let listener = ChangeListener::new(store.clone(), school_group_id.clone());
    let outbox = state.outbox.clone();
    let handle = tokio::task::spawn_local(listener.run(rx, move |event, outcome| {
        let line = match outcome {
            Ok(handled) => json!({
                "event": "documents.reloaded",
                "table": event.table,
                "kind": event.kind,
                "handled": handled,
            }),
            Err(e) => json!({
                "event": "documents.reloadFailed",
                "table": event.table,
                "kind": event.kind,
                "error": { "code": e.code(), "message": e.to_string() },
            }),
        };
        let _ = outbox.send(line);
    }));
    state.realtime = Some(tx);
    state.listener = Some(handle);
    state.scope = Some(school_group_id.clone());

    ok(
        &req.id,
        json!({
            "schoolGroupId": school_group_id,
            "documentCount": count,
            "documents": store.documents(),
        }),
    )
}

fn handle_state_snapshot(state: &mut AppState, req: &Request) -> serde_json::Value {
    let store = match require_store(state, req) {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    match serde_json::to_value(store.snapshot()) {
        Ok(v) => ok(&req.id, v),
        Err(e) => err(&req.id, "encode_failed", e.to_string(), None),
    }
}

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        "scope.select" => Some(handle_scope_select(state, req).await),
        "state.snapshot" => Some(handle_state_snapshot(state, req)),
        _ => None,
    }
}
