//! Push notifications of remote changes.
//!
//! The listener never merges a payload into the store. Any change in scope
//! triggers a full reload, plus a comment-list reload for comment inserts.

use crate::error::StoreError;
use crate::store::DocumentStore;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTable {
    Documents,
    Reactions,
    Comments,
    Views,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    pub table: ChangeTable,
    pub kind: ChangeKind,
    /// Rows of child tables do not always carry the group.
    #[serde(default)]
    pub school_group_id: Option<String>,
    #[serde(default)]
    pub new_row: Option<serde_json::Value>,
}

impl ChangeEvent {
    /// Document whose comment list must be refetched, if any.
    pub fn inserted_comment_document(&self) -> Option<&str> {
        if self.table != ChangeTable::Comments || self.kind != ChangeKind::Insert {
            return None;
        }
        let row = self.new_row.as_ref()?;
        row.get("documentId")
            .or_else(|| row.get("document_id"))
            .and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Handled {
    Ignored,
    #[serde(rename_all = "camelCase")]
    Reloaded {
        documents: usize,
        comments_of: Option<String>,
    },
}

pub struct ChangeListener {
    store: DocumentStore,
    scope: String,
}

impl ChangeListener {
    pub fn new(store: DocumentStore, scope: impl Into<String>) -> Self {
        Self {
            store,
            scope: scope.into(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn accepts(&self, event: &ChangeEvent) -> bool {
        event
            .school_group_id
            .as_deref()
            .map_or(true, |group| group == self.scope)
    }

    pub async fn handle(&self, event: &ChangeEvent) -> Result<Handled, StoreError> {
        if !self.accepts(event) {
            return Ok(Handled::Ignored);
        }

        let documents = self.store.reload(&self.scope).await?;
        let comments_of = match event.inserted_comment_document() {
            Some(document_id) => {
                self.store.load_comments(document_id).await?;
                Some(document_id.to_string())
            }
            None => None,
        };
        Ok(Handled::Reloaded {
            documents,
            comments_of,
        })
    }

    /// Handles events until every sender is dropped.
    pub async fn run<F>(self, mut events: mpsc::UnboundedReceiver<ChangeEvent>, mut on_handled: F)
    where
        F: FnMut(&ChangeEvent, &Result<Handled, StoreError>),
    {
        tracing::debug!(scope = %self.scope, "change listener started");
        while let Some(event) = events.recv().await {
            let outcome = self.handle(&event).await;
            if let Err(e) = &outcome {
                tracing::warn!(table = ?event.table, kind = ?event.kind, error = %e, "reload after change failed");
            }
            on_handled(&event, &outcome);
        }
        tracing::debug!(scope = %self.scope, "change listener stopped");
    }
}
