use crate::ipc::error::ok;
use crate::ipc::helpers::{parsed_param, require_store, str_param, track};
use crate::ipc::types::{AppState, Request};
use crate::model::ReactionKind;
use serde_json::json;

fn handle_reactions_toggle(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let kind: ReactionKind = match parsed_param(req, "kind") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let Some(pending) = store.toggle_reaction(document_id, kind, user_id) else {
        return ok(&req.id, json!({ "applied": false }));
    };
    let reactions = store
        .document(document_id)
        .map(|d| d.reactions)
        .unwrap_or_default();
    let mutation_id = track(state, &req.method, pending);

    ok(
        &req.id,
        json!({
            "applied": true,
            "mutationId": mutation_id,
            "reactions": reactions,
        }),
    )
}

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "reactions.toggle" => Some(handle_reactions_toggle(state, req)),
        _ => None,
    }
}
