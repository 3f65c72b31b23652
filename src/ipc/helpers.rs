use serde::Serialize;
use serde_json::json;

use crate::ipc::error::err;
use crate::ipc::types::{AppState, Request};
use crate::optimistic::Pending;
use crate::store::DocumentStore;

pub fn str_param<'a>(req: &'a Request, key: &str) -> Result<&'a str, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {key}"), None))
}

pub fn bool_param(req: &Request, key: &str) -> Result<bool, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_bool())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {key}"), None))
}

pub fn parsed_param<T: std::str::FromStr<Err = String>>(
    req: &Request,
    key: &str,
) -> Result<T, serde_json::Value> {
    str_param(req, key)?
        .parse()
        .map_err(|e: String| err(&req.id, "bad_params", e, Some(json!({ "param": key }))))
}

pub fn require_store(state: &AppState, req: &Request) -> Result<DocumentStore, serde_json::Value> {
    state
        .store
        .clone()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn require_scope(state: &AppState, req: &Request) -> Result<String, serde_json::Value> {
    state
        .scope
        .clone()
        .ok_or_else(|| err(&req.id, "no_scope", "select a school group first", None))
}

/// What a failed settlement did to local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnFailure {
    /// The optimistic change was reverted.
    RolledBack,
    /// The local change stays; only the write was lost.
    Kept,
}

impl OnFailure {
    fn outcome(self) -> &'static str {
        match self {
            OnFailure::RolledBack => "rolledBack",
            OnFailure::Kept => "failed",
        }
    }
}

/// Settles a pending mutation in the background and reports the outcome as
/// a `mutation.settled` event. Returns the mutation id.
pub fn track<T: Serialize + 'static>(
    state: &mut AppState,
    method: &str,
    pending: Pending<T>,
) -> String {
    track_with(state, method, pending, OnFailure::RolledBack)
}

pub fn track_with<T: Serialize + 'static>(
    state: &mut AppState,
    method: &str,
    pending: Pending<T>,
    on_failure: OnFailure,
) -> String {
    let mutation_id = state.next_mutation_id();
    let outbox = state.outbox.clone();
    let method = method.to_string();
    let id = mutation_id.clone();

    state.inflight.spawn_local(async move {
        let event = match pending.await {
            Ok(value) => json!({
                "event": "mutation.settled",
                "mutationId": id,
                "method": method,
                "outcome": "confirmed",
                "result": serde_json::to_value(&value).unwrap_or(serde_json::Value::Null),
            }),
            Err(e) => json!({
                "event": "mutation.settled",
                "mutationId": id,
                "method": method,
                "outcome": on_failure.outcome(),
                "error": { "code": e.code(), "message": e.to_string() },
            }),
        };
        let _ = outbox.send(event);
    });

    mutation_id
}
