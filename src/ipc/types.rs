use std::path::PathBuf;
use std::rc::Rc;

use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

use crate::config::DaemonConfig;
use crate::gateway::sqlite::SqliteGateway;
use crate::realtime::ChangeEvent;
use crate::store::DocumentStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Lines headed for stdout: responses and background events.
pub type Outbox = mpsc::UnboundedSender<serde_json::Value>;

pub struct AppState {
    pub config: DaemonConfig,
    pub workspace: Option<PathBuf>,
    pub gateway: Option<Rc<SqliteGateway>>,
    pub store: Option<DocumentStore>,
    pub scope: Option<String>,
    pub realtime: Option<mpsc::UnboundedSender<ChangeEvent>>,
    pub listener: Option<JoinHandle<()>>,
    pub outbox: Outbox,
    /// Mutations that have not settled yet.
    pub inflight: JoinSet<()>,
    next_mutation: u64,
}

impl AppState {
    pub fn new(config: DaemonConfig, outbox: Outbox) -> Self {
        Self {
            config,
            workspace: None,
            gateway: None,
            store: None,
            scope: None,
            realtime: None,
            listener: None,
            outbox,
            inflight: JoinSet::new(),
            next_mutation: 0,
        }
    }

    pub fn next_mutation_id(&mut self) -> String {
        self.next_mutation += 1;
        format!("m{}", self.next_mutation)
    }

    /// Frees the tasks of mutations that have already settled.
    pub fn reap_settled(&mut self) {
        while let Some(joined) = self.inflight.try_join_next() {
            if let Err(e) = joined {
                tracing::error!(error = %e, "mutation task failed");
            }
        }
    }

    pub fn pending_mutations(&mut self) -> usize {
        self.reap_settled();
        self.inflight.len()
    }

    /// Stops the listener and waits for every pending mutation to settle.
    pub async fn drain(&mut self) {
        self.realtime = None;
        if let Some(listener) = self.listener.take() {
            if let Err(e) = listener.await {
                tracing::error!(error = %e, "change listener failed");
            }
        }
        while let Some(joined) = self.inflight.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "mutation task failed");
            }
        }
    }
}
