use super::{Gateway, GatewayError, GatewayResult};
use crate::db::OBJECTS_DIR;
use crate::model::{
    Comment, CommentAuthor, CounterField, Counters, Document, DocumentFlag,
    FileMeta, NewComment, NewDocument, Reaction, ReactionKind, Visibility,
};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Gateway over a workspace database plus its `objects/` directory.
pub struct SqliteGateway {
    conn: Connection,
    workspace: PathBuf,
}

impl SqliteGateway {
    pub fn new(conn: Connection, workspace: PathBuf) -> Self {
        Self { conn, workspace }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    pub fn object_path(&self, storage_path: &str) -> PathBuf {
        self.workspace.join(OBJECTS_DIR).join(storage_path)
    }

    pub fn upsert_profile(&self, user_id: &str, first_name: &str, last_name: &str) -> GatewayResult<()> {
        self.conn.execute(
            "INSERT INTO profiles(id, first_name, last_name) VALUES(?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET first_name = excluded.first_name, last_name = excluded.last_name",
            (user_id, first_name, last_name),
        )?;
        Ok(())
    }

    fn document_exists(&self, document_id: &str) -> GatewayResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM documents WHERE id = ?", [document_id], |r| {
                r.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    fn reactions_for_group(&self, school_group_id: &str) -> GatewayResult<HashMap<String, Vec<Reaction>>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.id, r.document_id, r.user_id, r.kind, r.created_at
             FROM document_reactions r
             JOIN documents d ON d.id = r.document_id
             WHERE d.school_group_id = ?
             ORDER BY r.created_at, r.id",
        )?;
        let rows = stmt
            .query_map([school_group_id], reaction_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut by_document: HashMap<String, Vec<Reaction>> = HashMap::new();
        for reaction in rows {
            by_document
                .entry(reaction.document_id.clone())
                .or_default()
                .push(reaction);
        }
        Ok(by_document)
    }

    fn comment_by_id(&self, comment_id: &str) -> GatewayResult<Option<Comment>> {
        let comment = self
            .conn
            .query_row(
                "SELECT c.id, c.document_id, c.user_id, c.parent_id, c.body, c.created_at, c.updated_at,
                        p.first_name, p.last_name
                 FROM document_comments c
                 LEFT JOIN profiles p ON p.id = c.user_id
                 WHERE c.id = ?",
                [comment_id],
                comment_from_row,
            )
            .optional()?;
        Ok(comment)
    }
}

fn storage_err(e: anyhow::Error) -> GatewayError {
    GatewayError::Storage(format!("{e:#}"))
}

fn parse_ts(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn conversion_err(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

fn reaction_from_row(row: &Row<'_>) -> rusqlite::Result<Reaction> {
    let kind: String = row.get(3)?;
    Ok(Reaction {
        id: row.get(0)?,
        document_id: row.get(1)?,
        user_id: row.get(2)?,
        kind: kind.parse().map_err(|e| conversion_err(3, e))?,
        created_at: parse_ts(4, row.get(4)?)?,
    })
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    let first_name: Option<String> = row.get(7)?;
    let last_name: Option<String> = row.get(8)?;
    Ok(Comment {
        id: row.get(0)?,
        document_id: row.get(1)?,
        user_id: row.get(2)?,
        parent_id: row.get(3)?,
        body: row.get(4)?,
        created_at: parse_ts(5, row.get(5)?)?,
        updated_at: parse_ts(6, row.get(6)?)?,
        author: match (first_name, last_name) {
            (Some(first_name), Some(last_name)) => Some(CommentAuthor {
                first_name,
                last_name,
            }),
            _ => None,
        },
    })
}

const DOCUMENT_COLUMNS: &str = "id, school_group_id, title, description, category, tags_json,
    file_name, storage_path, file_size, mime_type, sha256, visibility, school_id,
    is_pinned, is_archived, views_count, downloads_count, comments_count,
    uploaded_by, created_at, updated_at";

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    let category: String = row.get(4)?;
    let tags_json: String = row.get(5)?;
    let tags: BTreeSet<String> =
        serde_json::from_str(&tags_json).map_err(|e| conversion_err(5, e.to_string()))?;
    let visibility: String = row.get(11)?;
    let school_id: Option<String> = row.get(12)?;
    let file_size: i64 = row.get(8)?;
    let views: i64 = row.get(15)?;
    let downloads: i64 = row.get(16)?;
    let comments: i64 = row.get(17)?;

    Ok(Document {
        id: row.get(0)?,
        school_group_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        category: category.parse().map_err(|e| conversion_err(4, e))?,
        tags,
        file: FileMeta {
            name: row.get(6)?,
            storage_path: row.get(7)?,
            size: file_size.max(0) as u64,
            mime_type: row.get(9)?,
            sha256: row.get(10)?,
        },
        visibility: Visibility::from_columns(&visibility, school_id)
            .map_err(|e| conversion_err(11, e))?,
        pinned: row.get::<_, i64>(13)? != 0,
        archived: row.get::<_, i64>(14)? != 0,
        counters: Counters {
            views: views.max(0) as u64,
            downloads: downloads.max(0) as u64,
            comments: comments.max(0) as u64,
        },
        uploaded_by: row.get(18)?,
        created_at: parse_ts(19, row.get(19)?)?,
        updated_at: parse_ts(20, row.get(20)?)?,
        reactions: Vec::new(),
    })
}

fn write_object(dest: &Path, source: &Path) -> anyhow::Result<(u64, String)> {
    let bytes = std::fs::read(source)
        .with_context(|| format!("failed to read {}", source.to_string_lossy()))?;
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    std::fs::write(dest, &bytes)
        .with_context(|| format!("failed to write object {}", dest.to_string_lossy()))?;
    let digest = Sha256::digest(&bytes);
    Ok((bytes.len() as u64, hex::encode(digest)))
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').trim();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

#[async_trait(?Send)]
impl Gateway for SqliteGateway {
    async fn insert_reaction(
        &self,
        document_id: &str,
        user_id: &str,
        kind: ReactionKind,
    ) -> GatewayResult<Reaction> {
        if !self.document_exists(document_id)? {
            return Err(GatewayError::NotFound(format!("document {document_id}")));
        }
        let reaction = Reaction {
            id: Uuid::new_v4().to_string(),
            document_id: document_id.to_string(),
            user_id: user_id.to_string(),
            kind,
            created_at: Utc::now(),
        };
        let inserted = self.conn.execute(
            "INSERT INTO document_reactions(id, document_id, user_id, kind, created_at)
             VALUES(?, ?, ?, ?, ?)
             ON CONFLICT(document_id, user_id, kind) DO NOTHING",
            (
                &reaction.id,
                &reaction.document_id,
                &reaction.user_id,
                kind.as_str(),
                reaction.created_at.to_rfc3339(),
            ),
        )?;
        if inserted == 0 {
            return Err(GatewayError::Rejected(format!(
                "{kind} reaction by {user_id} already exists"
            )));
        }
        Ok(reaction)
    }

    async fn delete_reaction(
        &self,
        document_id: &str,
        user_id: &str,
        kind: ReactionKind,
    ) -> GatewayResult<()> {
        self.conn.execute(
            "DELETE FROM document_reactions WHERE document_id = ? AND user_id = ? AND kind = ?",
            (document_id, user_id, kind.as_str()),
        )?;
        Ok(())
    }

    async fn insert_comment(&self, comment: &NewComment) -> GatewayResult<Comment> {
        if comment.body.trim().is_empty() {
            return Err(GatewayError::Rejected("comment body must not be empty".into()));
        }
        if !self.document_exists(&comment.document_id)? {
            return Err(GatewayError::NotFound(format!(
                "document {}",
                comment.document_id
            )));
        }
        if let Some(parent_id) = comment.parent_id.as_deref() {
            let parent_document: Option<String> = self
                .conn
                .query_row(
                    "SELECT document_id FROM document_comments WHERE id = ?",
                    [parent_id],
                    |r| r.get(0),
                )
                .optional()?;
            match parent_document {
                Some(d) if d == comment.document_id => {}
                Some(_) => {
                    return Err(GatewayError::Rejected(format!(
                        "parent comment {parent_id} belongs to another document"
                    )))
                }
                None => return Err(GatewayError::NotFound(format!("comment {parent_id}"))),
            }
        }

        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO document_comments(id, document_id, user_id, parent_id, body, created_at, updated_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                &id,
                &comment.document_id,
                &comment.user_id,
                &comment.parent_id,
                &comment.body,
                &now,
                &now,
            ),
        )?;
        tx.execute(
            "UPDATE documents SET comments_count = comments_count + 1 WHERE id = ?",
            [&comment.document_id],
        )?;
        tx.commit()?;

        self.comment_by_id(&id)?
            .ok_or_else(|| GatewayError::Storage(format!("comment {id} missing after insert")))
    }

    async fn delete_comment(&self, comment_id: &str) -> GatewayResult<()> {
        let document_id: Option<String> = self
            .conn
            .query_row(
                "SELECT document_id FROM document_comments WHERE id = ?",
                [comment_id],
                |r| r.get(0),
            )
            .optional()?;
        let Some(document_id) = document_id else {
            return Err(GatewayError::NotFound(format!("comment {comment_id}")));
        };

        // Replies go with their parent.
        let tx = self.conn.unchecked_transaction()?;
        let removed = tx.execute(
            "WITH RECURSIVE subtree(id) AS (
               SELECT id FROM document_comments WHERE id = ?1
               UNION ALL
               SELECT c.id FROM document_comments c JOIN subtree s ON c.parent_id = s.id
             )
             DELETE FROM document_comments WHERE id IN (SELECT id FROM subtree)",
            [comment_id],
        )?;
        tx.execute(
            "UPDATE documents SET comments_count = MAX(0, comments_count - ?) WHERE id = ?",
            (removed as i64, &document_id),
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn fetch_comments(&self, document_id: &str) -> GatewayResult<Vec<Comment>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.id, c.document_id, c.user_id, c.parent_id, c.body, c.created_at, c.updated_at,
                    p.first_name, p.last_name
             FROM document_comments c
             LEFT JOIN profiles p ON p.id = c.user_id
             WHERE c.document_id = ?
             ORDER BY c.created_at, c.rowid",
        )?;
        let comments = stmt
            .query_map([document_id], comment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(comments)
    }

    async fn fetch_documents(&self, school_group_id: &str) -> GatewayResult<Vec<Document>> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS}
             FROM documents
             WHERE school_group_id = ? AND is_archived = 0
             ORDER BY is_pinned DESC, created_at DESC, rowid DESC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let mut documents = stmt
            .query_map([school_group_id], document_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut reactions = self.reactions_for_group(school_group_id)?;
        for doc in documents.iter_mut() {
            doc.reactions = reactions.remove(&doc.id).unwrap_or_default();
        }
        Ok(documents)
    }

    async fn update_counter(
        &self,
        document_id: &str,
        field: CounterField,
        value: u64,
    ) -> GatewayResult<()> {
        let sql = format!("UPDATE documents SET {} = ? WHERE id = ?", field.column());
        let value = i64::try_from(value)
            .map_err(|_| GatewayError::Rejected(format!("counter value out of range: {value}")))?;
        let updated = self.conn.execute(&sql, (value, document_id))?;
        if updated == 0 {
            return Err(GatewayError::NotFound(format!("document {document_id}")));
        }
        Ok(())
    }

    async fn record_view(&self, document_id: &str, user_id: &str) -> GatewayResult<()> {
        if !self.document_exists(document_id)? {
            return Err(GatewayError::NotFound(format!("document {document_id}")));
        }
        self.conn.execute(
            "INSERT INTO document_views(id, document_id, user_id, viewed_at) VALUES(?, ?, ?, ?)",
            (
                Uuid::new_v4().to_string(),
                document_id,
                user_id,
                Utc::now().to_rfc3339(),
            ),
        )?;
        Ok(())
    }

    async fn upload_document(
        &self,
        document: &NewDocument,
        source: &Path,
    ) -> GatewayResult<Document> {
        if document.title.trim().is_empty() {
            return Err(GatewayError::Rejected("title must not be empty".into()));
        }

        let id = Uuid::new_v4().to_string();
        let storage_path = format!(
            "{}/{}-{}",
            sanitize_file_name(&document.school_group_id),
            id,
            sanitize_file_name(&document.file_name)
        );
        let dest = self.object_path(&storage_path);
        let (size, sha256) = write_object(&dest, source).map_err(storage_err)?;

        let now = Utc::now();
        let tags_json = serde_json::to_string(&document.tags)
            .map_err(|e| GatewayError::Rejected(e.to_string()))?;
        let inserted = self.conn.execute(
            "INSERT INTO documents(
                id, school_group_id, title, description, category, tags_json,
                file_name, storage_path, file_size, mime_type, sha256, visibility, school_id,
                is_pinned, is_archived, uploaded_by, created_at, updated_at
             ) VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?)",
            rusqlite::params![
                &id,
                &document.school_group_id,
                document.title.trim(),
                &document.description,
                document.category.as_str(),
                &tags_json,
                &document.file_name,
                &storage_path,
                size as i64,
                &document.mime_type,
                &sha256,
                document.visibility.as_str(),
                document.visibility.school_id(),
                document.pinned as i64,
                &document.uploaded_by,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        );
        if let Err(e) = inserted {
            let _ = std::fs::remove_file(&dest);
            return Err(e.into());
        }

        Ok(Document {
            id,
            school_group_id: document.school_group_id.clone(),
            title: document.title.trim().to_string(),
            description: document.description.clone(),
            category: document.category,
            tags: document.tags.clone(),
            file: FileMeta {
                name: document.file_name.clone(),
                storage_path,
                size,
                mime_type: document.mime_type.clone(),
                sha256: Some(sha256),
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

    async fn delete_document(&self, document_id: &str) -> GatewayResult<()> {
        let storage_path: Option<String> = self
            .conn
            .query_row(
                "SELECT storage_path FROM documents WHERE id = ?",
                [document_id],
                |r| r.get(0),
            )
            .optional()?;
        let Some(storage_path) = storage_path else {
            return Err(GatewayError::NotFound(format!("document {document_id}")));
        };

        // Explicitly delete in dependency order (no ON DELETE CASCADE).
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM document_reactions WHERE document_id = ?",
            [document_id],
        )?;
        tx.execute(
            "DELETE FROM document_comments WHERE document_id = ?",
            [document_id],
        )?;
        tx.execute(
            "DELETE FROM document_views WHERE document_id = ?",
            [document_id],
        )?;
        tx.execute("DELETE FROM documents WHERE id = ?", [document_id])?;
        tx.commit()?;

        // The row is gone at this point, so an orphaned object is only logged.
        let object = self.object_path(&storage_path);
        if let Err(e) = std::fs::remove_file(&object) {
            tracing::warn!(path = %object.display(), error = %e, "failed to remove stored object");
        }
        Ok(())
    }

    async fn set_document_flag(
        &self,
        document_id: &str,
        flag: DocumentFlag,
        value: bool,
    ) -> GatewayResult<()> {
        let sql = format!(
            "UPDATE documents SET {} = ?, updated_at = ? WHERE id = ?",
            flag.column()
        );
        let updated = self
            .conn
            .execute(&sql, (value as i64, Utc::now().to_rfc3339(), document_id))?;
        if updated == 0 {
            return Err(GatewayError::NotFound(format!("document {document_id}")));
        }
        Ok(())
    }
}
