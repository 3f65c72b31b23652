use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::realtime::ChangeEvent;
use serde_json::json;

fn handle_realtime_push(state: &mut AppState, req: &Request) -> serde_json::Value {
    let event: ChangeEvent = match serde_json::from_value(req.params.clone()) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "bad_params", e.to_string(), None),
    };
    let Some(tx) = state.realtime.as_ref() else {
        return err(&req.id, "no_scope", "select a school group first", None);
    };
    if tx.send(event).is_err() {
        return err(&req.id, "listener_stopped", "change listener is not running", None);
    }
    ok(&req.id, json!({ "queued": true }))
}

pub async fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "realtime.push" => Some(handle_realtime_push(state, req)),
        _ => None,
    }
}
