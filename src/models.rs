use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Admin,
    DepartmentHead,
    Employee,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::DepartmentHead => "department_head",
            UserRole::Employee => "employee",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(UserRole::Admin),
            "department_head" => Some(UserRole::DepartmentHead),
            "employee" => Some(UserRole::Employee),
            _ => None,
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Draft,
    Pending,
    InProgress,
    Completed,
    Archived,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Draft => "draft",
            DocumentStatus::Pending => "pending",
            DocumentStatus::InProgress => "in_progress",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Archived => "archived",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(DocumentStatus::Draft),
            "pending" => Some(DocumentStatus::Pending),
            "in_progress" => Some(DocumentStatus::InProgress),
            "completed" => Some(DocumentStatus::Completed),
            "archived" => Some(DocumentStatus::Archived),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl DocumentPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentPriority::Low => "low",
            DocumentPriority::Medium => "medium",
            DocumentPriority::High => "high",
            DocumentPriority::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(DocumentPriority::Low),
            "medium" => Some(DocumentPriority::Medium),
            "high" => Some(DocumentPriority::High),
            "urgent" => Some(DocumentPriority::Urgent),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a document, serialized as `document_type` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Request,
    Response,
    Memo,
    Report,
    Notification,
    Other,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Request => "request",
            DocumentKind::Response => "response",
            DocumentKind::Memo => "memo",
            DocumentKind::Report => "report",
            DocumentKind::Notification => "notification",
            DocumentKind::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "request" => Some(DocumentKind::Request),
            "response" => Some(DocumentKind::Response),
            "memo" => Some(DocumentKind::Memo),
            "report" => Some(DocumentKind::Report),
            "notification" => Some(DocumentKind::Notification),
            "other" => Some(DocumentKind::Other),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Forwarded,
    Viewed,
    Responded,
    StatusChanged,
    Modified,
    Archived,
    FileAdded,
    FileRemoved,
    Assigned,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Created => "created",
            HistoryAction::Forwarded => "forwarded",
            HistoryAction::Viewed => "viewed",
            HistoryAction::Responded => "responded",
            HistoryAction::StatusChanged => "status_changed",
            HistoryAction::Modified => "modified",
            HistoryAction::Archived => "archived",
            HistoryAction::FileAdded => "file_added",
            HistoryAction::FileRemoved => "file_removed",
            HistoryAction::Assigned => "assigned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created" => Some(HistoryAction::Created),
            "forwarded" => Some(HistoryAction::Forwarded),
            "viewed" => Some(HistoryAction::Viewed),
            "responded" => Some(HistoryAction::Responded),
            "status_changed" => Some(HistoryAction::StatusChanged),
            "modified" => Some(HistoryAction::Modified),
            "archived" => Some(HistoryAction::Archived),
            "file_added" => Some(HistoryAction::FileAdded),
            "file_removed" => Some(HistoryAction::FileRemoved),
            "assigned" => Some(HistoryAction::Assigned),
            _ => None,
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    DocumentReceived,
    DocumentForwarded,
    ResponseReceived,
    StatusChanged,
    DeadlineApproaching,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::DocumentReceived => "document_received",
            NotificationKind::DocumentForwarded => "document_forwarded",
            NotificationKind::ResponseReceived => "response_received",
            NotificationKind::StatusChanged => "status_changed",
            NotificationKind::DeadlineApproaching => "deadline_approaching",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "document_received" => Some(NotificationKind::DocumentReceived),
            "document_forwarded" => Some(NotificationKind::DocumentForwarded),
            "response_received" => Some(NotificationKind::ResponseReceived),
            "status_changed" => Some(NotificationKind::StatusChanged),
            "deadline_approaching" => Some(NotificationKind::DeadlineApproaching),
            _ => None,
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry number in the form `DOC-<year>-<seq>`, zero padded to five
/// digits. Sequences above 99999 keep their natural width.
pub fn format_document_number(year: i32, seq: i64) -> String {
    format!("DOC-{year}-{seq:05}")
}

#[derive(Debug, Clone, Serialize)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDepartment {
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub department_id: Uuid,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub role: UserRole,
    pub department_id: Uuid,
    pub active: bool,
}

/// The resolved identity a lifecycle operation runs as. Name and department
/// are captured here so ledger entries can snapshot them.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Uuid,
    pub name: String,
    pub role: UserRole,
    pub department_id: Uuid,
}

impl Actor {
    pub fn from_user(user: &User) -> Self {
        Actor {
            id: user.id,
            name: user.full_name.clone(),
            role: user.role,
            department_id: user.department_id,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, UserRole::Admin)
    }

    pub fn is_department_head(&self) -> bool {
        matches!(self.role, UserRole::DepartmentHead)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: Uuid,
    pub number: String,
    pub title: String,
    pub description: String,
    pub document_type: DocumentKind,
    pub priority: DocumentPriority,
    pub status: DocumentStatus,
    pub creator_id: Uuid,
    pub creator_department_id: Uuid,
    pub holder_department_id: Uuid,
    pub assigned_to: Option<Uuid>,
    pub deadline: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub metadata: Value,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: Uuid,
    pub number: String,
    pub title: String,
    pub description: String,
    pub document_type: DocumentKind,
    pub priority: DocumentPriority,
    pub status: DocumentStatus,
    pub creator_id: Uuid,
    pub creator_department_id: Uuid,
    pub holder_department_id: Uuid,
    pub assigned_to: Option<Uuid>,
    pub deadline: Option<DateTime<Utc>>,
    pub tags: Vec<String>,
    pub metadata: Value,
}

impl NewDocument {
    /// The record this row becomes once stored at `now`.
    pub fn into_document(self, now: DateTime<Utc>) -> Document {
        Document {
            id: self.id,
            number: self.number,
            title: self.title,
            description: self.description,
            document_type: self.document_type,
            priority: self.priority,
            status: self.status,
            creator_id: self.creator_id,
            creator_department_id: self.creator_department_id,
            holder_department_id: self.holder_department_id,
            assigned_to: self.assigned_to,
            deadline: self.deadline,
            tags: self.tags,
            metadata: self.metadata,
            archived_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FileAttachment {
    pub id: Uuid,
    pub document_id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub uploaded_by: Uuid,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub uploaded_by: Uuid,
}

/// A single recorded field modification, stored on `modified` entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    pub old_value: Value,
    pub new_value: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub document_id: Uuid,
    pub document_number: String,
    pub action: HistoryAction,
    pub actor_id: Uuid,
    pub actor_name: String,
    pub actor_department_id: Uuid,
    pub from_department_id: Option<Uuid>,
    pub to_department_id: Option<Uuid>,
    pub old_status: Option<DocumentStatus>,
    pub new_status: Option<DocumentStatus>,
    pub status_reason: Option<String>,
    pub changes: Option<FieldChange>,
    pub comment: Option<String>,
    pub metadata: Value,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub document_id: Uuid,
    pub document_number: String,
    pub action: HistoryAction,
    pub actor_id: Uuid,
    pub actor_name: String,
    pub actor_department_id: Uuid,
    pub from_department_id: Option<Uuid>,
    pub to_department_id: Option<Uuid>,
    pub old_status: Option<DocumentStatus>,
    pub new_status: Option<DocumentStatus>,
    pub status_reason: Option<String>,
    pub changes: Option<FieldChange>,
    pub comment: Option<String>,
    pub metadata: Value,
}

impl NewHistoryEntry {
    /// Entry skeleton with the actor snapshot filled in; transition-specific
    /// fields are set by the caller.
    pub fn record(
        action: HistoryAction,
        document_id: Uuid,
        document_number: &str,
        actor: &Actor,
    ) -> Self {
        NewHistoryEntry {
            document_id,
            document_number: document_number.to_string(),
            action,
            actor_id: actor.id,
            actor_name: actor.name.clone(),
            actor_department_id: actor.department_id,
            from_department_id: None,
            to_department_id: None,
            old_status: None,
            new_status: None,
            status_reason: None,
            changes: None,
            comment: None,
            metadata: Value::Object(Default::default()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub document_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub email_sent: bool,
    pub email_sent_at: Option<DateTime<Utc>>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub document_id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub metadata: Value,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: Value,
    pub status: String,
    pub attempts: i32,
    pub run_after: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
