//! Row structs mirroring the tables, plus conversions to and from the
//! domain types. Enum columns are stored as their wire strings; decode
//! failures surface as [`StoreError::Decode`] instead of panicking on
//! hand-edited rows.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::models::{
    Department, Document, DocumentKind, DocumentPriority, DocumentStatus, FileAttachment,
    FieldChange, HistoryAction, HistoryEntry, Job, NewDocument, NewHistoryEntry, NewNotification,
    Notification, NotificationKind, User, UserRole,
};
use crate::store::StoreError;

use super::schema::{
    departments, document_files, document_history, documents, jobs, notifications, users,
};

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = departments)]
pub struct DepartmentRow {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DepartmentRow> for Department {
    fn from(row: DepartmentRow) -> Self {
        Department {
            id: row.id,
            name: row.name,
            code: row.code,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = departments)]
pub struct DepartmentInsert {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub active: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub role: String,
    pub department_id: Uuid,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = UserRole::parse(&row.role).ok_or_else(|| StoreError::decode("role", &row.role))?;
        Ok(User {
            id: row.id,
            email: row.email,
            full_name: row.full_name,
            password_hash: row.password_hash,
            role,
            department_id: row.department_id,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct UserInsert {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub role: String,
    pub department_id: Uuid,
    pub active: bool,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = documents)]
pub struct DocumentRow {
    pub id: Uuid,
    pub number: String,
    pub title: String,
    pub description: String,
    pub document_type: String,
    pub priority: String,
    pub status: String,
    pub creator_id: Uuid,
    pub creator_department_id: Uuid,
    pub holder_department_id: Uuid,
    pub assigned_to: Option<Uuid>,
    pub deadline: Option<DateTime<Utc>>,
    pub tags: Value,
    pub metadata: Value,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DocumentRow> for Document {
    type Error = StoreError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        let document_type = DocumentKind::parse(&row.document_type)
            .ok_or_else(|| StoreError::decode("document_type", &row.document_type))?;
        let priority = DocumentPriority::parse(&row.priority)
            .ok_or_else(|| StoreError::decode("priority", &row.priority))?;
        let status = DocumentStatus::parse(&row.status)
            .ok_or_else(|| StoreError::decode("status", &row.status))?;
        let tags_repr = row.tags.to_string();
        let tags: Vec<String> = serde_json::from_value(row.tags)
            .map_err(|_| StoreError::decode("tags", &tags_repr))?;
        Ok(Document {
            id: row.id,
            number: row.number,
            title: row.title,
            description: row.description,
            document_type,
            priority,
            status,
            creator_id: row.creator_id,
            creator_department_id: row.creator_department_id,
            holder_department_id: row.holder_department_id,
            assigned_to: row.assigned_to,
            deadline: row.deadline,
            tags,
            metadata: row.metadata,
            archived_at: row.archived_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub struct DocumentInsert {
    pub id: Uuid,
    pub number: String,
    pub title: String,
    pub description: String,
    pub document_type: String,
    pub priority: String,
    pub status: String,
    pub creator_id: Uuid,
    pub creator_department_id: Uuid,
    pub holder_department_id: Uuid,
    pub assigned_to: Option<Uuid>,
    pub deadline: Option<DateTime<Utc>>,
    pub tags: Value,
    pub metadata: Value,
}

impl From<NewDocument> for DocumentInsert {
    fn from(new: NewDocument) -> Self {
        DocumentInsert {
            id: new.id,
            number: new.number,
            title: new.title,
            description: new.description,
            document_type: new.document_type.as_str().to_string(),
            priority: new.priority.as_str().to_string(),
            status: new.status.as_str().to_string(),
            creator_id: new.creator_id,
            creator_department_id: new.creator_department_id,
            holder_department_id: new.holder_department_id,
            assigned_to: new.assigned_to,
            deadline: new.deadline,
            tags: Value::from(new.tags),
            metadata: new.metadata,
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = document_files)]
pub struct AttachmentRow {
    pub id: Uuid,
    pub document_id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub uploaded_by: Uuid,
    pub uploaded_at: DateTime<Utc>,
}

impl From<AttachmentRow> for FileAttachment {
    fn from(row: AttachmentRow) -> Self {
        FileAttachment {
            id: row.id,
            document_id: row.document_id,
            filename: row.filename,
            content_type: row.content_type,
            size_bytes: row.size_bytes,
            uploaded_by: row.uploaded_by,
            uploaded_at: row.uploaded_at,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = document_files)]
pub struct AttachmentInsert {
    pub id: Uuid,
    pub document_id: Uuid,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub uploaded_by: Uuid,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = document_history)]
pub struct HistoryRow {
    pub id: Uuid,
    pub document_id: Uuid,
    pub document_number: String,
    pub action: String,
    pub actor_id: Uuid,
    pub actor_name: String,
    pub actor_department_id: Uuid,
    pub from_department_id: Option<Uuid>,
    pub to_department_id: Option<Uuid>,
    pub old_status: Option<String>,
    pub new_status: Option<String>,
    pub status_reason: Option<String>,
    pub changes: Option<Value>,
    pub comment: Option<String>,
    pub metadata: Value,
    pub recorded_at: DateTime<Utc>,
}

fn parse_status_column(
    field: &'static str,
    value: Option<String>,
) -> Result<Option<DocumentStatus>, StoreError> {
    value
        .map(|raw| DocumentStatus::parse(&raw).ok_or_else(|| StoreError::decode(field, &raw)))
        .transpose()
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = StoreError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        let action = HistoryAction::parse(&row.action)
            .ok_or_else(|| StoreError::decode("action", &row.action))?;
        let changes = row
            .changes
            .map(|value| {
                let repr = value.to_string();
                serde_json::from_value::<FieldChange>(value)
                    .map_err(|_| StoreError::decode("changes", &repr))
            })
            .transpose()?;
        Ok(HistoryEntry {
            id: row.id,
            document_id: row.document_id,
            document_number: row.document_number,
            action,
            actor_id: row.actor_id,
            actor_name: row.actor_name,
            actor_department_id: row.actor_department_id,
            from_department_id: row.from_department_id,
            to_department_id: row.to_department_id,
            old_status: parse_status_column("old_status", row.old_status)?,
            new_status: parse_status_column("new_status", row.new_status)?,
            status_reason: row.status_reason,
            changes,
            comment: row.comment,
            metadata: row.metadata,
            recorded_at: row.recorded_at,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = document_history)]
pub struct HistoryInsert {
    pub id: Uuid,
    pub document_id: Uuid,
    pub document_number: String,
    pub action: String,
    pub actor_id: Uuid,
    pub actor_name: String,
    pub actor_department_id: Uuid,
    pub from_department_id: Option<Uuid>,
    pub to_department_id: Option<Uuid>,
    pub old_status: Option<String>,
    pub new_status: Option<String>,
    pub status_reason: Option<String>,
    pub changes: Option<Value>,
    pub comment: Option<String>,
    pub metadata: Value,
}

impl TryFrom<NewHistoryEntry> for HistoryInsert {
    type Error = serde_json::Error;

    fn try_from(entry: NewHistoryEntry) -> Result<Self, Self::Error> {
        let changes = entry.changes.map(serde_json::to_value).transpose()?;
        Ok(HistoryInsert {
            id: Uuid::new_v4(),
            document_id: entry.document_id,
            document_number: entry.document_number,
            action: entry.action.as_str().to_string(),
            actor_id: entry.actor_id,
            actor_name: entry.actor_name,
            actor_department_id: entry.actor_department_id,
            from_department_id: entry.from_department_id,
            to_department_id: entry.to_department_id,
            old_status: entry.old_status.map(|s| s.as_str().to_string()),
            new_status: entry.new_status.map(|s| s.as_str().to_string()),
            status_reason: entry.status_reason,
            changes,
            comment: entry.comment,
            metadata: entry.metadata,
        })
    }
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = notifications)]
pub struct NotificationRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub document_id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub email_sent: bool,
    pub email_sent_at: Option<DateTime<Utc>>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let kind = NotificationKind::parse(&row.kind)
            .ok_or_else(|| StoreError::decode("kind", &row.kind))?;
        Ok(Notification {
            id: row.id,
            user_id: row.user_id,
            document_id: row.document_id,
            kind,
            title: row.title,
            message: row.message,
            is_read: row.is_read,
            read_at: row.read_at,
            email_sent: row.email_sent,
            email_sent_at: row.email_sent_at,
            metadata: row.metadata,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notifications)]
pub struct NotificationInsert {
    pub id: Uuid,
    pub user_id: Uuid,
    pub document_id: Uuid,
    pub kind: String,
    pub title: String,
    pub message: String,
    pub metadata: Value,
}

impl From<NewNotification> for NotificationInsert {
    fn from(new: NewNotification) -> Self {
        NotificationInsert {
            id: new.id,
            user_id: new.user_id,
            document_id: new.document_id,
            kind: new.kind.as_str().to_string(),
            title: new.title,
            message: new.message,
            metadata: new.metadata,
        }
    }
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = jobs)]
pub struct JobRow {
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

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Job {
            id: row.id,
            job_type: row.job_type,
            payload: row.payload,
            status: row.status,
            attempts: row.attempts,
            run_after: row.run_after,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct JobInsert {
    pub id: Uuid,
    pub job_type: String,
    pub payload: Value,
    pub status: String,
    pub run_after: DateTime<Utc>,
}
