use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::err;

pub async fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    state.reap_settled();

    if let Some(resp) = handlers::core::try_handle(state, &req).await {
        return resp;
    }
    if let Some(resp) = handlers::documents::try_handle(state, &req).await {
        return resp;
    }
    if let Some(resp) = handlers::reactions::try_handle(state, &req).await {
        return resp;
    }
    if let Some(resp) = handlers::comments::try_handle(state, &req).await {
        return resp;
    }
    if let Some(resp) = handlers::realtime::try_handle(state, &req).await {
        return resp;
    }

    err(
        &req.id,
        "not_implemented",
        format!("unknown method: {}", req.method),
        None,
    )
}
