use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub const TEMP_ID_PREFIX: &str = "tmp-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentCategory {
    Course,
    Exam,
    Administrative,
    Circular,
    Report,
    Other,
}

impl DocumentCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentCategory::Course => "course",
            DocumentCategory::Exam => "exam",
            DocumentCategory::Administrative => "administrative",
            DocumentCategory::Circular => "circular",
            DocumentCategory::Report => "report",
            DocumentCategory::Other => "other",
        }
    }
}

impl FromStr for DocumentCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "course" => Ok(DocumentCategory::Course),
            "exam" => Ok(DocumentCategory::Exam),
            "administrative" => Ok(DocumentCategory::Administrative),
            "circular" => Ok(DocumentCategory::Circular),
            "report" => Ok(DocumentCategory::Report),
            "other" => Ok(DocumentCategory::Other),
            _ => Err(format!("unknown document category: {s}")),
        }
    }
}

/// Who can see a document. The scoped reference lives inside the variant, so
/// a school-scoped document always names its school and nothing else does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "visibility", rename_all = "snake_case")]
pub enum Visibility {
    Group,
    School {
        #[serde(rename = "schoolId")]
        school_id: String,
    },
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Group => "group",
            Visibility::School { .. } => "school",
            Visibility::Private => "private",
        }
    }

    pub fn school_id(&self) -> Option<&str> {
        match self {
            Visibility::School { school_id } => Some(school_id),
            _ => None,
        }
    }

    /// Rebuilds the enum from its stored column pair.
    pub fn from_columns(kind: &str, school_id: Option<String>) -> Result<Self, String> {
        match (kind, school_id) {
            ("group", None) => Ok(Visibility::Group),
            ("private", None) => Ok(Visibility::Private),
            ("school", Some(school_id)) => Ok(Visibility::School { school_id }),
            (k, s) => Err(format!(
                "inconsistent visibility columns: {k} / school_id={}",
                s.as_deref().unwrap_or("NULL")
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMeta {
    pub name: String,
    pub storage_path: String,
    pub size: u64,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counters {
    pub views: u64,
    pub downloads: u64,
    pub comments: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterField {
    Views,
    Downloads,
    Comments,
}

impl CounterField {
    pub fn column(self) -> &'static str {
        match self {
            CounterField::Views => "views_count",
            CounterField::Downloads => "downloads_count",
            CounterField::Comments => "comments_count",
        }
    }
}

impl Counters {
    pub fn get(&self, field: CounterField) -> u64 {
        match field {
            CounterField::Views => self.views,
            CounterField::Downloads => self.downloads,
            CounterField::Comments => self.comments,
        }
    }

    pub fn increment(&mut self, field: CounterField) -> u64 {
        let slot = self.slot(field);
        *slot = slot.saturating_add(1);
        *slot
    }

    /// Decrements, floored at zero.
    pub fn decrement(&mut self, field: CounterField) -> u64 {
        let slot = self.slot(field);
        *slot = slot.saturating_sub(1);
        *slot
    }

    fn slot(&mut self, field: CounterField) -> &mut u64 {
        match field {
            CounterField::Views => &mut self.views,
            CounterField::Downloads => &mut self.downloads,
            CounterField::Comments => &mut self.comments,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionKind {
    Seen,
    Important,
    Useful,
    Like,
}

impl ReactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReactionKind::Seen => "seen",
            ReactionKind::Important => "important",
            ReactionKind::Useful => "useful",
            ReactionKind::Like => "like",
        }
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "seen" => Ok(ReactionKind::Seen),
            "important" => Ok(ReactionKind::Important),
            "useful" => Ok(ReactionKind::Useful),
            "like" => Ok(ReactionKind::Like),
            _ => Err(format!("unknown reaction kind: {s}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub id: String,
    pub document_id: String,
    pub user_id: String,
    pub kind: ReactionKind,
    pub created_at: DateTime<Utc>,
}

impl Reaction {
    pub fn provisional(document_id: &str, user_id: &str, kind: ReactionKind) -> Self {
        Self {
            id: temp_id(),
            document_id: document_id.to_string(),
            user_id: user_id.to_string(),
            kind,
            created_at: Utc::now(),
        }
    }

    pub fn matches(&self, user_id: &str, kind: ReactionKind) -> bool {
        self.user_id == user_id && self.kind == kind
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: String,
    pub school_group_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: DocumentCategory,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub file: FileMeta,
    #[serde(flatten)]
    pub visibility: Visibility,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub counters: Counters,
    pub uploaded_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
}

impl Document {
    /// Pinned first, then newest first.
    pub fn display_order(a: &Document, b: &Document) -> std::cmp::Ordering {
        b.pinned
            .cmp(&a.pinned)
            .then_with(|| b.created_at.cmp(&a.created_at))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentAuthor {
    pub first_name: String,
    pub last_name: String,
}

impl CommentAuthor {
    /// Splits "Alice Doe" into first and last fragments. Everything after the
    /// first space is treated as the last name.
    pub fn from_display_name(name: &str) -> Self {
        let name = name.trim();
        match name.split_once(' ') {
            Some((first, last)) => Self {
                first_name: first.to_string(),
                last_name: last.trim().to_string(),
            },
            None => Self {
                first_name: name.to_string(),
                last_name: String::new(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub document_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<CommentAuthor>,
}

impl Comment {
    pub fn is_provisional(&self) -> bool {
        self.id.starts_with(TEMP_ID_PREFIX)
    }
}

/// What the gateway needs to persist a comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub document_id: String,
    pub user_id: String,
    pub parent_id: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDocument {
    pub school_group_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: DocumentCategory,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(flatten)]
    pub visibility: Visibility,
    #[serde(default)]
    pub pinned: bool,
    pub uploaded_by: String,
    pub file_name: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFlag {
    Pinned,
    Archived,
}

impl DocumentFlag {
    pub fn column(self) -> &'static str {
        match self {
            DocumentFlag::Pinned => "is_pinned",
            DocumentFlag::Archived => "is_archived",
        }
    }
}

pub fn temp_id() -> String {
    format!("{TEMP_ID_PREFIX}{}", uuid::Uuid::new_v4())
}
