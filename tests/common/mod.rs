#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use schooldocsd::model::{
    Comment, CounterField, Counters, Document, DocumentCategory, DocumentFlag, FileMeta,
    NewComment, NewDocument, Reaction, ReactionKind, Visibility,
};
use schooldocsd::{DocumentStore, Gateway, GatewayError, GatewayRef, GatewayResult, StoreSettings};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

/// In-memory gateway with per-operation failure and hang scripting.
#[derive(Default)]
pub struct ScriptedGateway {
    calls: RefCell<Vec<String>>,
    failures: RefCell<HashMap<&'static str, VecDeque<GatewayError>>>,
    hangs: RefCell<HashSet<&'static str>>,
    next_comment_ids: RefCell<VecDeque<String>>,
    seq: Cell<u64>,
    pub documents: RefCell<Vec<Document>>,
    pub comments: RefCell<HashMap<String, Vec<Comment>>>,
}

impl ScriptedGateway {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn fail_next(&self, operation: &'static str, error: GatewayError) {
        self.failures
            .borrow_mut()
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// The next call of `operation` never resolves.
    pub fn hang_next(&self, operation: &'static str) {
        self.hangs.borrow_mut().insert(operation);
    }

    pub fn queue_comment_id(&self, id: &str) {
        self.next_comment_ids.borrow_mut().push_back(id.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn next_seq(&self) -> u64 {
        let n = self.seq.get() + 1;
        self.seq.set(n);
        n
    }

    async fn enter(&self, operation: &'static str, detail: String) -> GatewayResult<()> {
        self.calls.borrow_mut().push(if detail.is_empty() {
            operation.to_string()
        } else {
            format!("{operation}:{detail}")
        });
        let hang = self.hangs.borrow_mut().remove(operation);
        if hang {
            std::future::pending::<()>().await;
        }
        let failure = self
            .failures
            .borrow_mut()
            .get_mut(operation)
            .and_then(|q| q.pop_front());
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait(?Send)]
impl Gateway for ScriptedGateway {
    async fn insert_reaction(
        &self,
        document_id: &str,
        user_id: &str,
        kind: ReactionKind,
    ) -> GatewayResult<Reaction> {
        self.enter("insert_reaction", format!("{document_id}/{user_id}/{kind}"))
            .await?;
        Ok(Reaction {
            id: format!("srv-reaction-{}", self.next_seq()),
            document_id: document_id.to_string(),
            user_id: user_id.to_string(),
            kind,
            created_at: Utc::now(),
        })
    }

    async fn delete_reaction(
        &self,
        document_id: &str,
        user_id: &str,
        kind: ReactionKind,
    ) -> GatewayResult<()> {
        self.enter("delete_reaction", format!("{document_id}/{user_id}/{kind}"))
            .await
    }

    async fn insert_comment(&self, comment: &NewComment) -> GatewayResult<Comment> {
        self.enter("insert_comment", comment.document_id.clone()).await?;
        let id = self
            .next_comment_ids
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| format!("srv-comment-{}", self.next_seq()));
        let now = Utc::now();
        Ok(Comment {
            id,
            document_id: comment.document_id.clone(),
            user_id: comment.user_id.clone(),
            parent_id: comment.parent_id.clone(),
            body: comment.body.clone(),
            created_at: now,
            updated_at: now,
            author: None,
        })
    }

    async fn delete_comment(&self, comment_id: &str) -> GatewayResult<()> {
        self.enter("delete_comment", comment_id.to_string()).await
    }

    async fn fetch_comments(&self, document_id: &str) -> GatewayResult<Vec<Comment>> {
        self.enter("fetch_comments", document_id.to_string()).await?;
        Ok(self
            .comments
            .borrow()
            .get(document_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_documents(&self, school_group_id: &str) -> GatewayResult<Vec<Document>> {
        self.enter("fetch_documents", school_group_id.to_string())
            .await?;
        Ok(self
            .documents
            .borrow()
            .iter()
            .filter(|d| d.school_group_id == school_group_id)
            .cloned()
            .collect())
    }

    async fn update_counter(
        &self,
        document_id: &str,
        field: CounterField,
        value: u64,
    ) -> GatewayResult<()> {
        self.enter("update_counter", format!("{document_id}/{}={value}", field.column()))
            .await
    }

    async fn upload_document(
        &self,
        document: &NewDocument,
        _source: &Path,
    ) -> GatewayResult<Document> {
        self.enter("upload_document", document.title.clone()).await?;
        let id = format!("srv-doc-{}", self.next_seq());
        let now = Utc::now();
        Ok(Document {
            id: id.clone(),
            school_group_id: document.school_group_id.clone(),
            title: document.title.clone(),
            description: document.description.clone(),
            category: document.category,
            tags: document.tags.clone(),
            file: FileMeta {
                name: document.file_name.clone(),
                storage_path: format!("{}/{id}", document.school_group_id),
                size: 0,
                mime_type: document.mime_type.clone(),
                sha256: None,
            },
            visibility: document.visibility.clone(),
            pinned: document.pinned,
            archived: false,
            counters: Counters::default(),
            uploaded_by: document.uploaded_by.clone(),
            created_at: now,
            updated_at: now,
            reactions: Vec::new(),
        })
    }

    async fn record_view(&self, document_id: &str, user_id: &str) -> GatewayResult<()> {
        self.enter("record_view", format!("{document_id}/{user_id}"))
            .await
    }

    async fn delete_document(&self, document_id: &str) -> GatewayResult<()> {
        self.enter("delete_document", document_id.to_string()).await
    }

    async fn set_document_flag(
        &self,
        document_id: &str,
        flag: DocumentFlag,
        value: bool,
    ) -> GatewayResult<()> {
        self.enter("set_document_flag", format!("{document_id}/{}={value}", flag.column()))
            .await
    }
}

pub fn store_with(gateway: &Rc<ScriptedGateway>) -> DocumentStore {
    let gateway_ref: GatewayRef = gateway.clone();
    DocumentStore::new(
        gateway_ref,
        StoreSettings {
            gateway_timeout: Duration::from_secs(5),
        },
    )
}

pub fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, 2, 8, 0, 0).unwrap() + ChronoDuration::minutes(minutes)
}

pub fn doc(id: &str, created_minute: i64, pinned: bool) -> Document {
    Document {
        id: id.to_string(),
        school_group_id: "group-1".to_string(),
        title: format!("Document {id}"),
        description: None,
        category: DocumentCategory::Circular,
        tags: BTreeSet::from(["rentree".to_string()]),
        file: FileMeta {
            name: format!("{id}.pdf"),
            storage_path: format!("group-1/{id}.pdf"),
            size: 1024,
            mime_type: "application/pdf".to_string(),
            sha256: None,
        },
        visibility: Visibility::Group,
        pinned,
        archived: false,
        counters: Counters::default(),
        uploaded_by: "director-1".to_string(),
        created_at: at(created_minute),
        updated_at: at(created_minute),
        reactions: Vec::new(),
    }
}

pub fn comment(id: &str, document_id: &str, parent_id: Option<&str>, minute: i64) -> Comment {
    Comment {
        id: id.to_string(),
        document_id: document_id.to_string(),
        user_id: "teacher-1".to_string(),
        parent_id: parent_id.map(str::to_string),
        body: format!("comment {id}"),
        created_at: at(minute),
        updated_at: at(minute),
        author: None,
    }
}

pub fn rejected() -> GatewayError {
    GatewayError::Unavailable("network down".to_string())
}
