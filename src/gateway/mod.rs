//! Persistence boundary for the document store.
//!
//! The store never talks to storage directly. It calls a [`Gateway`], which
//! either confirms a write (returning the authoritative record) or rejects it.

pub mod sqlite;

use crate::model::{
    Comment, CounterField, Document, DocumentFlag, NewComment, NewDocument, Reaction,
    ReactionKind,
};
use async_trait::async_trait;
use std::path::Path;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::NotFound(_) => "not_found",
            GatewayError::Rejected(_) => "gateway_rejected",
            GatewayError::Storage(_) => "gateway_failed",
            GatewayError::Unavailable(_) => "gateway_unavailable",
        }
    }
}

impl From<rusqlite::Error> for GatewayError {
    fn from(e: rusqlite::Error) -> Self {
        GatewayError::Storage(e.to_string())
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Remote persistence used by [`crate::store::DocumentStore`].
///
/// Everything runs on one thread, so implementations are not required to be
/// `Send`.
#[async_trait(?Send)]
pub trait Gateway {
    async fn insert_reaction(
        &self,
        document_id: &str,
        user_id: &str,
        kind: ReactionKind,
    ) -> GatewayResult<Reaction>;

    async fn delete_reaction(
        &self,
        document_id: &str,
        user_id: &str,
        kind: ReactionKind,
    ) -> GatewayResult<()>;

    async fn insert_comment(&self, comment: &NewComment) -> GatewayResult<Comment>;

    async fn delete_comment(&self, comment_id: &str) -> GatewayResult<()>;

    /// Oldest first.
    async fn fetch_comments(&self, document_id: &str) -> GatewayResult<Vec<Comment>>;

    /// Pinned first, then newest first. Archived documents are left out.
    async fn fetch_documents(&self, school_group_id: &str) -> GatewayResult<Vec<Document>>;

    async fn update_counter(
        &self,
        document_id: &str,
        field: CounterField,
        value: u64,
    ) -> GatewayResult<()>;

    async fn upload_document(
        &self,
        document: &NewDocument,
        source: &Path,
    ) -> GatewayResult<Document>;

    /// Appends a per-user view row. The running total is written separately
    /// through `update_counter`.
    async fn record_view(&self, document_id: &str, user_id: &str) -> GatewayResult<()>;

    /// Removes the stored object and the row.
    async fn delete_document(&self, document_id: &str) -> GatewayResult<()>;

    async fn set_document_flag(
        &self,
        document_id: &str,
        flag: DocumentFlag,
        value: bool,
    ) -> GatewayResult<()>;
}

pub type GatewayRef = Rc<dyn Gateway>;
