//! Persistence traits for the lifecycle engine and the HTTP layer.
//!
//! Everything above this module talks to [`DataStore`]; the concrete backend
//! is picked at startup ([`postgres::PgStore`] in production,
//! [`memory::MemStore`] for development and tests). State-changing document
//! operations commit their mutation, ledger entry, and outbox job through a
//! single call so each backend can make the write atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Department, Document, DocumentKind, DocumentPriority, DocumentStatus, FileAttachment,
    HistoryEntry, Job, NewAttachment, NewDepartment, NewDocument, NewHistoryEntry,
    NewNotification, NewUser, Notification, User,
};
use crate::notify::NotificationBatch;

pub mod memory;
pub mod postgres;

pub use memory::MemStore;
pub use postgres::PgStore;

pub const JOB_DISPATCH_NOTIFICATIONS: &str = "dispatch_notifications";

pub const JOB_STATUS_QUEUED: &str = "queued";
pub const JOB_STATUS_PROCESSING: &str = "processing";
pub const JOB_STATUS_SUCCEEDED: &str = "succeeded";
pub const JOB_STATUS_FAILED: &str = "failed";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("connection pool unavailable: {0}")]
    Pool(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("stored {field} value {value:?} is not valid")]
    Decode { field: &'static str, value: String },
    #[error("payload serialization failed: {0}")]
    Payload(#[from] serde_json::Error),
}

impl StoreError {
    pub fn decode(field: &'static str, value: &str) -> Self {
        StoreError::Decode {
            field,
            value: value.to_string(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

impl Page {
    pub fn new(offset: i64, limit: i64) -> Self {
        Page {
            offset: offset.max(0),
            limit: limit.clamp(1, 100),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Page {
            offset: 0,
            limit: 20,
        }
    }
}

/// Which slice of the document table a query may see. Derived from the
/// caller's role before the store is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentScope {
    All,
    /// Documents created by or currently held by the department.
    Department(Uuid),
    AssignedTo(Uuid),
    CreatedBy(Uuid),
}

#[derive(Debug, Clone)]
pub struct DocumentFilter {
    pub scope: DocumentScope,
    pub status: Option<DocumentStatus>,
    pub search: Option<String>,
}

impl DocumentFilter {
    pub fn scoped(scope: DocumentScope) -> Self {
        DocumentFilter {
            scope,
            status: None,
            search: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentStats {
    pub total: i64,
    pub by_status: HashMap<String, i64>,
    pub by_priority: HashMap<String, i64>,
}

/// Partial update applied by a transition. `None` leaves the field alone;
/// the double options distinguish "set" from "clear".
#[derive(Debug, Clone, Default)]
pub struct DocumentChange {
    pub title: Option<String>,
    pub description: Option<String>,
    pub document_type: Option<DocumentKind>,
    pub priority: Option<DocumentPriority>,
    pub status: Option<DocumentStatus>,
    pub holder_department_id: Option<Uuid>,
    pub assigned_to: Option<Option<Uuid>>,
    pub deadline: Option<Option<DateTime<Utc>>>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<Value>,
    pub archived_at: Option<DateTime<Utc>>,
    pub attach: Option<NewAttachment>,
    pub detach: Option<Uuid>,
}

/// Field mutation shared by the backends so both worlds change documents
/// identically. Attach/detach are handled by each backend since descriptors
/// live outside the document row.
pub(crate) fn apply_document_change(
    document: &mut Document,
    change: &DocumentChange,
    now: DateTime<Utc>,
) {
    if let Some(title) = &change.title {
        document.title = title.clone();
    }
    if let Some(description) = &change.description {
        document.description = description.clone();
    }
    if let Some(document_type) = change.document_type {
        document.document_type = document_type;
    }
    if let Some(priority) = change.priority {
        document.priority = priority;
    }
    if let Some(status) = change.status {
        document.status = status;
    }
    if let Some(holder) = change.holder_department_id {
        document.holder_department_id = holder;
    }
    if let Some(assigned_to) = change.assigned_to {
        document.assigned_to = assigned_to;
    }
    if let Some(deadline) = change.deadline {
        document.deadline = deadline;
    }
    if let Some(tags) = &change.tags {
        document.tags = tags.clone();
    }
    if let Some(metadata) = &change.metadata {
        document.metadata = metadata.clone();
    }
    if let Some(archived_at) = change.archived_at {
        document.archived_at = Some(archived_at);
    }
    document.updated_at = now;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts the document, its `created` ledger entry, and the optional
    /// fan-out job in one transaction.
    async fn create_document(
        &self,
        document: NewDocument,
        entry: NewHistoryEntry,
        fanout: Option<NotificationBatch>,
    ) -> StoreResult<Document>;

    async fn document(&self, id: Uuid) -> StoreResult<Option<Document>>;

    async fn list_documents(
        &self,
        filter: &DocumentFilter,
        page: Page,
    ) -> StoreResult<Vec<Document>>;

    /// Applies `change`, appends `entry`, and enqueues the fan-out job in
    /// one transaction. Fails with [`StoreError::NotFound`] when the
    /// document does not exist.
    async fn apply_transition(
        &self,
        id: Uuid,
        change: DocumentChange,
        entry: NewHistoryEntry,
        fanout: Option<NotificationBatch>,
    ) -> StoreResult<Document>;

    /// Atomically increments and returns the per-year sequence.
    async fn next_document_number(&self, year: i32) -> StoreResult<i64>;

    async fn document_stats(&self, filter: &DocumentFilter) -> StoreResult<DocumentStats>;

    /// Attached-file descriptors for a batch of documents, keyed by
    /// document id. Documents without files are absent from the map.
    async fn attachments_for(
        &self,
        document_ids: &[Uuid],
    ) -> StoreResult<HashMap<Uuid, Vec<FileAttachment>>>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Plain append outside any transition (the `viewed` trail).
    async fn append_entry(&self, entry: NewHistoryEntry) -> StoreResult<HistoryEntry>;

    /// All entries of one document, oldest first.
    async fn document_timeline(
        &self,
        document_id: Uuid,
        page: Page,
    ) -> StoreResult<Vec<HistoryEntry>>;

    /// Entries performed by one user, newest first.
    async fn entries_by_actor(&self, actor_id: Uuid, page: Page)
        -> StoreResult<Vec<HistoryEntry>>;

    /// Entries touching a department: performed by one of its members, or
    /// forwarded from or to it. Newest first.
    async fn entries_for_department(
        &self,
        department_id: Uuid,
        page: Page,
    ) -> StoreResult<Vec<HistoryEntry>>;

    /// The `forwarded` entries of one document, oldest first.
    async fn forwarding_chain(&self, document_id: Uuid) -> StoreResult<Vec<HistoryEntry>>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Inserts by the caller-provided id; returns `None` when that id was
    /// already delivered, which makes outbox redelivery idempotent.
    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> StoreResult<Option<Notification>>;

    async fn notification(&self, id: Uuid) -> StoreResult<Option<Notification>>;

    async fn notifications_for_user(
        &self,
        user_id: Uuid,
        unread_only: bool,
        page: Page,
    ) -> StoreResult<Vec<Notification>>;

    async fn unread_count(&self, user_id: Uuid) -> StoreResult<i64>;

    async fn mark_notification_read(&self, id: Uuid) -> StoreResult<Notification>;

    /// Marks every unread notification of the user read; returns how many
    /// rows changed. Already-read rows keep their original `read_at`.
    async fn mark_all_read(&self, user_id: Uuid) -> StoreResult<usize>;

    async fn mark_email_sent(&self, id: Uuid) -> StoreResult<()>;

    async fn delete_notification(&self, id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn department(&self, id: Uuid) -> StoreResult<Option<Department>>;

    async fn departments(&self) -> StoreResult<Vec<Department>>;

    async fn insert_department(&self, department: NewDepartment) -> StoreResult<Department>;

    async fn user(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    async fn users_in_department(&self, department_id: Uuid) -> StoreResult<Vec<User>>;

    async fn active_users_in_department(&self, department_id: Uuid) -> StoreResult<Vec<User>>;

    async fn insert_user(&self, user: NewUser) -> StoreResult<User>;
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn enqueue_job(&self, job_type: &str, payload: Value) -> StoreResult<Job>;

    /// Claims the oldest runnable job of the given types, bumping its
    /// attempt counter. Concurrent workers never claim the same job.
    async fn reserve_job(&self, job_types: &[&str]) -> StoreResult<Option<Job>>;

    async fn mark_job_succeeded(&self, job_id: Uuid) -> StoreResult<()>;

    async fn retry_job_after(
        &self,
        job_id: Uuid,
        delay: Duration,
        error: &str,
    ) -> StoreResult<()>;

    async fn mark_job_failed(&self, job_id: Uuid, error: &str) -> StoreResult<()>;
}

pub trait DataStore:
    DocumentStore + LedgerStore + NotificationStore + Directory + OutboxStore
{
}

impl<T> DataStore for T where
    T: DocumentStore + LedgerStore + NotificationStore + Directory + OutboxStore
{
}
