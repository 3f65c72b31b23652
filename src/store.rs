//! Optimistic in-memory store for the documents and comments of one view.
//!
//! The store is the only writer of its collections. Reads hand out clones.
//! Mutations that reach the gateway return a [`Pending`] future: the local
//! change is already visible when the method returns, and the future settles
//! it (confirm or roll back). A `None` return means the mutation was skipped
//! because its target is not in the store.

use crate::error::StoreError;
use crate::gateway::GatewayRef;
use crate::model::{
    Comment, CommentAuthor, CounterField, Document, DocumentFlag, NewComment, NewDocument,
    Reaction, ReactionKind,
};
use crate::optimistic::{bounded, Optimistic, Pending};
use chrono::Utc;
use serde::Serialize;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSettings {
    pub gateway_timeout: Duration,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreState {
    /// School group of the last reload.
    #[serde(rename = "schoolGroupId", skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub documents: Vec<Document>,
    /// Cached comment lists keyed by document id, oldest first.
    pub comments: HashMap<String, Vec<Comment>>,
}

impl StoreState {
    pub fn document(&self, document_id: &str) -> Option<&Document> {
        self.documents.iter().find(|d| d.id == document_id)
    }

    pub fn document_mut(&mut self, document_id: &str) -> Option<&mut Document> {
        self.documents.iter_mut().find(|d| d.id == document_id)
    }

    fn position(&self, document_id: &str) -> Option<usize> {
        self.documents.iter().position(|d| d.id == document_id)
    }

    fn restore_order(&mut self, order: &[String]) {
        let rank: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        self.documents
            .sort_by_key(|d| rank.get(d.id.as_str()).copied().unwrap_or(usize::MAX));
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReactionToggle {
    Added { reaction: Reaction },
    Removed,
}

struct ReactionPlan {
    document_id: String,
    previous: Vec<Reaction>,
    /// `None` when the toggle removes an existing reaction.
    provisional: Option<Reaction>,
}

struct RemovedComments {
    document_id: String,
    /// Removed entries with their original indices, ascending.
    entries: Vec<(usize, Comment)>,
    comments_count: u64,
}

struct ProvisionalComment {
    comment: Comment,
    comments_count: u64,
    /// Whether the document's comment list was cached before the add.
    cached: bool,
}

struct RemovedDocument {
    index: usize,
    document: Document,
    comments: Option<Vec<Comment>>,
}

struct FlagChange {
    document_id: String,
    flag: DocumentFlag,
    previous: bool,
    order: Vec<String>,
}

#[derive(Clone)]
pub struct DocumentStore {
    state: Rc<RefCell<StoreState>>,
    gateway: GatewayRef,
    settings: StoreSettings,
}

impl DocumentStore {
    pub fn new(gateway: GatewayRef, settings: StoreSettings) -> Self {
        Self {
            state: Rc::new(RefCell::new(StoreState::default())),
            gateway,
            settings,
        }
    }

    pub fn settings(&self) -> StoreSettings {
        self.settings
    }

    pub fn documents(&self) -> Vec<Document> {
        self.state.borrow().documents.clone()
    }

    pub fn document(&self, document_id: &str) -> Option<Document> {
        self.state.borrow().document(document_id).cloned()
    }

    pub fn comments(&self, document_id: &str) -> Vec<Comment> {
        self.state
            .borrow()
            .comments
            .get(document_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Deep copy of everything the store holds.
    pub fn snapshot(&self) -> StoreState {
        self.state.borrow().clone()
    }

    pub fn set_documents(&self, documents: Vec<Document>) {
        self.state.borrow_mut().documents = documents;
    }

    pub async fn reload(&self, school_group_id: &str) -> Result<usize, StoreError> {
        let documents = bounded(
            "reload",
            self.settings.gateway_timeout,
            self.gateway.fetch_documents(school_group_id),
        )
        .await?;
        let count = documents.len();
        {
            let mut state = self.state.borrow_mut();
            state.scope = Some(school_group_id.to_string());
            state.documents = documents;
        }
        tracing::debug!(school_group_id, count, "documents reloaded");
        Ok(count)
    }

    pub async fn load_comments(&self, document_id: &str) -> Result<Vec<Comment>, StoreError> {
        let comments = bounded(
            "load_comments",
            self.settings.gateway_timeout,
            self.gateway.fetch_comments(document_id),
        )
        .await?;
        self.state
            .borrow_mut()
            .comments
            .insert(document_id.to_string(), comments.clone());
        Ok(comments)
    }

    pub fn toggle_reaction(
        &self,
        document_id: &str,
        kind: ReactionKind,
        user_id: &str,
    ) -> Option<Pending<ReactionToggle>> {
        let gateway = Rc::clone(&self.gateway);
        let user = user_id.to_string();

        Optimistic {
            operation: "toggle_reaction",
            snapshot: |state: &StoreState| -> Option<ReactionPlan> {
                let doc = state.document(document_id)?;
                let exists = doc.reactions.iter().any(|r| r.matches(user_id, kind));
                Some(ReactionPlan {
                    document_id: doc.id.clone(),
                    previous: doc.reactions.clone(),
                    provisional: (!exists)
                        .then(|| Reaction::provisional(document_id, user_id, kind)),
                })
            },
            apply: |state: &mut StoreState, plan: &ReactionPlan| {
                if let Some(doc) = state.document_mut(&plan.document_id) {
                    match &plan.provisional {
                        Some(reaction) => doc.reactions.push(reaction.clone()),
                        None => doc.reactions.retain(|r| !r.matches(user_id, kind)),
                    }
                }
            },
            remote: move |plan: &ReactionPlan| {
                let document_id = plan.document_id.clone();
                let adding = plan.provisional.is_some();
                async move {
                    if adding {
                        gateway
                            .insert_reaction(&document_id, &user, kind)
                            .await
                            .map(Some)
                    } else {
                        gateway
                            .delete_reaction(&document_id, &user, kind)
                            .await
                            .map(|()| None)
                    }
                }
            },
            confirm: |state: &mut StoreState, plan: &ReactionPlan, stored: Option<Reaction>| {
                match (stored, &plan.provisional) {
                    (Some(stored), Some(provisional)) => {
                        if let Some(slot) = state
                            .document_mut(&plan.document_id)
                            .and_then(|doc| doc.reactions.iter_mut().find(|r| r.id == provisional.id))
                        {
                            *slot = stored.clone();
                        }
                        ReactionToggle::Added { reaction: stored }
                    }
                    _ => ReactionToggle::Removed,
                }
            },
            revert: |state: &mut StoreState, plan: ReactionPlan| {
                if let Some(doc) = state.document_mut(&plan.document_id) {
                    doc.reactions = plan.previous;
                }
            },
        }
        .run(&self.state, self.settings.gateway_timeout)
    }

    pub fn increment_views(&self, document_id: &str) -> Option<u64> {
        self.increment(document_id, CounterField::Views)
    }

    pub fn increment_downloads(&self, document_id: &str) -> Option<u64> {
        self.increment(document_id, CounterField::Downloads)
    }

    fn increment(&self, document_id: &str, field: CounterField) -> Option<u64> {
        let mut state = self.state.borrow_mut();
        let doc = state.document_mut(document_id)?;
        Some(doc.counters.increment(field))
    }

    /// Writes the current local value of a counter. Failures are not rolled
    /// back; the next reload brings the authoritative value.
    pub fn persist_counter(&self, document_id: &str, field: CounterField) -> Option<Pending<()>> {
        let value = self.state.borrow().document(document_id)?.counters.get(field);
        let gateway = Rc::clone(&self.gateway);
        let document_id = document_id.to_string();
        let timeout = self.settings.gateway_timeout;
        Some(Box::pin(async move {
            bounded(
                "persist_counter",
                timeout,
                gateway.update_counter(&document_id, field, value),
            )
            .await
        }))
    }

    /// Like [`Self::persist_counter`] for views, also recording who viewed
    /// when the viewer is known.
    pub fn persist_view(&self, document_id: &str, user_id: Option<&str>) -> Option<Pending<()>> {
        let counter = self.persist_counter(document_id, CounterField::Views)?;
        let Some(user_id) = user_id else {
            return Some(counter);
        };
        let gateway = Rc::clone(&self.gateway);
        let document_id = document_id.to_string();
        let user_id = user_id.to_string();
        let timeout = self.settings.gateway_timeout;
        Some(Box::pin(async move {
            counter.await?;
            bounded(
                "record_view",
                timeout,
                gateway.record_view(&document_id, &user_id),
            )
            .await
        }))
    }

    /// Adds a comment under a temporary id, replaced by the stored record once
    /// the gateway confirms. Skipped when the document is unknown, the body is
    /// blank, or `reply_to` is not a cached comment of the same document.
    pub fn add_comment(
        &self,
        document_id: &str,
        body: &str,
        user_id: &str,
        user_name: &str,
        reply_to: Option<&str>,
    ) -> Option<Pending<Comment>> {
        let gateway = Rc::clone(&self.gateway);

        Optimistic {
            operation: "add_comment",
            snapshot: |state: &StoreState| -> Option<ProvisionalComment> {
                let doc = state.document(document_id)?;
                let body = body.trim();
                if body.is_empty() {
                    return None;
                }
                if let Some(parent_id) = reply_to {
                    let cached = state.comments.get(document_id)?;
                    if !cached.iter().any(|c| c.id == parent_id) {
                        return None;
                    }
                }
                let now = Utc::now();
                Some(ProvisionalComment {
                    comment: Comment {
                        id: crate::model::temp_id(),
                        document_id: doc.id.clone(),
                        user_id: user_id.to_string(),
                        parent_id: reply_to.map(str::to_string),
                        body: body.to_string(),
                        created_at: now,
                        updated_at: now,
                        author: Some(CommentAuthor::from_display_name(user_name)),
                    },
                    comments_count: doc.counters.comments,
                    cached: state.comments.contains_key(document_id),
                })
            },
            apply: |state: &mut StoreState, pending: &ProvisionalComment| {
                let provisional = &pending.comment;
                state
                    .comments
                    .entry(provisional.document_id.clone())
                    .or_default()
                    .push(provisional.clone());
                if let Some(doc) = state.document_mut(&provisional.document_id) {
                    doc.counters.increment(CounterField::Comments);
                }
            },
            remote: move |pending: &ProvisionalComment| {
                let provisional = &pending.comment;
                let new_comment = NewComment {
                    document_id: provisional.document_id.clone(),
                    user_id: provisional.user_id.clone(),
                    parent_id: provisional.parent_id.clone(),
                    body: provisional.body.clone(),
                };
                async move { gateway.insert_comment(&new_comment).await }
            },
            confirm: |state: &mut StoreState, pending: &ProvisionalComment, stored: Comment| {
                let provisional = &pending.comment;
                if let Some(slot) = state
                    .comments
                    .get_mut(&provisional.document_id)
                    .and_then(|list| list.iter_mut().find(|c| c.id == provisional.id))
                {
                    *slot = stored.clone();
                }
                stored
            },
            revert: |state: &mut StoreState, pending: ProvisionalComment| {
                let provisional = pending.comment;
                let removed = match state.comments.get_mut(&provisional.document_id) {
                    Some(list) => {
                        let before = list.len();
                        list.retain(|c| c.id != provisional.id);
                        list.len() < before
                    }
                    None => false,
                };
                if removed {
                    if let Some(doc) = state.document_mut(&provisional.document_id) {
                        doc.counters.comments = pending.comments_count;
                    }
                }
                if !pending.cached
                    && state
                        .comments
                        .get(&provisional.document_id)
                        .is_some_and(Vec::is_empty)
                {
                    state.comments.remove(&provisional.document_id);
                }
            },
        }
        .run(&self.state, self.settings.gateway_timeout)
    }

    /// Removes a comment, and any cached replies to it, ahead of the gateway.
    pub fn delete_comment(&self, document_id: &str, comment_id: &str) -> Option<Pending<()>> {
        let gateway = Rc::clone(&self.gateway);
        let target = comment_id.to_string();

        Optimistic {
            operation: "delete_comment",
            snapshot: |state: &StoreState| -> Option<RemovedComments> {
                let doc = state.document(document_id)?;
                let list = state.comments.get(document_id)?;
                if !list.iter().any(|c| c.id == comment_id) {
                    return None;
                }
                let mut doomed: HashSet<&str> = HashSet::from([comment_id]);
                loop {
                    let before = doomed.len();
                    for c in list {
                        if c.parent_id.as_deref().is_some_and(|p| doomed.contains(p)) {
                            doomed.insert(c.id.as_str());
                        }
                    }
                    if doomed.len() == before {
                        break;
                    }
                }
                Some(RemovedComments {
                    document_id: document_id.to_string(),
                    entries: list
                        .iter()
                        .enumerate()
                        .filter(|(_, c)| doomed.contains(c.id.as_str()))
                        .map(|(i, c)| (i, c.clone()))
                        .collect(),
                    comments_count: doc.counters.comments,
                })
            },
            apply: |state: &mut StoreState, removed: &RemovedComments| {
                if let Some(list) = state.comments.get_mut(&removed.document_id) {
                    list.retain(|c| !removed.entries.iter().any(|(_, r)| r.id == c.id));
                }
                if let Some(doc) = state.document_mut(&removed.document_id) {
                    for _ in &removed.entries {
                        doc.counters.decrement(CounterField::Comments);
                    }
                }
            },
            remote: move |_: &RemovedComments| async move { gateway.delete_comment(&target).await },
            confirm: |_: &mut StoreState, _: &RemovedComments, (): ()| {},
            revert: |state: &mut StoreState, removed: RemovedComments| {
                let list = state
                    .comments
                    .entry(removed.document_id.clone())
                    .or_default();
                let mut restored = 0;
                for (index, comment) in removed.entries {
                    if list.iter().any(|c| c.id == comment.id) {
                        continue;
                    }
                    let at = index.min(list.len());
                    list.insert(at, comment);
                    restored += 1;
                }
                if restored > 0 {
                    if let Some(doc) = state.document_mut(&removed.document_id) {
                        doc.counters.comments = removed.comments_count;
                    }
                }
            },
        }
        .run(&self.state, self.settings.gateway_timeout)
    }

    /// Uploads through the gateway, then inserts the stored document at its
    /// display position. Not optimistic: the id and storage path come from
    /// the gateway. A document uploaded to another school group is not
    /// inserted into the current view.
    pub async fn upload_document(
        &self,
        document: &NewDocument,
        source: PathBuf,
    ) -> Result<Document, StoreError> {
        let stored = bounded(
            "upload_document",
            self.settings.gateway_timeout,
            self.gateway.upload_document(document, &source),
        )
        .await?;

        let mut state = self.state.borrow_mut();
        if state
            .scope
            .as_deref()
            .is_some_and(|scope| scope != stored.school_group_id)
        {
            tracing::debug!(
                document_id = %stored.id,
                school_group_id = %stored.school_group_id,
                "uploaded outside the current scope"
            );
            return Ok(stored);
        }
        let at = state
            .documents
            .partition_point(|d| Document::display_order(d, &stored).is_lt());
        state.documents.insert(at, stored.clone());
        Ok(stored)
    }

    pub fn delete_document(&self, document_id: &str) -> Option<Pending<()>> {
        let gateway = Rc::clone(&self.gateway);
        let target = document_id.to_string();

        Optimistic {
            operation: "delete_document",
            snapshot: |state: &StoreState| -> Option<RemovedDocument> {
                let index = state.position(document_id)?;
                Some(RemovedDocument {
                    index,
                    document: state.documents[index].clone(),
                    comments: state.comments.get(document_id).cloned(),
                })
            },
            apply: |state: &mut StoreState, removed: &RemovedDocument| {
                state.documents.retain(|d| d.id != removed.document.id);
                state.comments.remove(&removed.document.id);
            },
            remote: move |_: &RemovedDocument| async move {
                gateway.delete_document(&target).await
            },
            confirm: |_: &mut StoreState, _: &RemovedDocument, (): ()| {},
            revert: |state: &mut StoreState, removed: RemovedDocument| {
                let id = removed.document.id.clone();
                if state.position(&id).is_none() {
                    let at = removed.index.min(state.documents.len());
                    state.documents.insert(at, removed.document);
                }
                if let Some(comments) = removed.comments {
                    state.comments.entry(id).or_insert(comments);
                }
            },
        }
        .run(&self.state, self.settings.gateway_timeout)
    }

    /// Pinning moves the document to the front group.
    pub fn set_pinned(&self, document_id: &str, pinned: bool) -> Option<Pending<()>> {
        self.set_flag(document_id, DocumentFlag::Pinned, pinned)
    }

    /// Archived documents stay in the list until the next reload drops them.
    pub fn set_archived(&self, document_id: &str, archived: bool) -> Option<Pending<()>> {
        self.set_flag(document_id, DocumentFlag::Archived, archived)
    }

    fn set_flag(&self, document_id: &str, flag: DocumentFlag, value: bool) -> Option<Pending<()>> {
        let gateway = Rc::clone(&self.gateway);
        let target = document_id.to_string();

        Optimistic {
            operation: match flag {
                DocumentFlag::Pinned => "set_pinned",
                DocumentFlag::Archived => "set_archived",
            },
            snapshot: |state: &StoreState| -> Option<FlagChange> {
                let doc = state.document(document_id)?;
                Some(FlagChange {
                    document_id: doc.id.clone(),
                    flag,
                    previous: match flag {
                        DocumentFlag::Pinned => doc.pinned,
                        DocumentFlag::Archived => doc.archived,
                    },
                    order: state.documents.iter().map(|d| d.id.clone()).collect(),
                })
            },
            apply: |state: &mut StoreState, change: &FlagChange| {
                if let Some(doc) = state.document_mut(&change.document_id) {
                    write_flag(doc, change.flag, value);
                }
                if change.flag == DocumentFlag::Pinned {
                    state.documents.sort_by(Document::display_order);
                }
            },
            remote: move |change: &FlagChange| {
                let flag = change.flag;
                async move { gateway.set_document_flag(&target, flag, value).await }
            },
            confirm: |_: &mut StoreState, _: &FlagChange, (): ()| {},
            revert: |state: &mut StoreState, change: FlagChange| {
                if let Some(doc) = state.document_mut(&change.document_id) {
                    write_flag(doc, change.flag, change.previous);
                }
                state.restore_order(&change.order);
            },
        }
        .run(&self.state, self.settings.gateway_timeout)
    }
}

fn write_flag(doc: &mut Document, flag: DocumentFlag, value: bool) {
    match flag {
        DocumentFlag::Pinned => doc.pinned = value,
        DocumentFlag::Archived => doc.archived = value,
    }
}
