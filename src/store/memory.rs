//! In-memory backend. One `RwLock` over the whole world keeps transition
//! commits atomic; it backs the test suite and `STORE_BACKEND=memory`
//! development runs.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    Department, Document, FileAttachment, HistoryEntry, Job, NewDepartment, NewDocument,
    NewHistoryEntry, NewNotification, NewUser, Notification, User,
};
use crate::notify::NotificationBatch;
use crate::store::{
    DocumentChange, DocumentFilter, DocumentScope, DocumentStats, DocumentStore, Directory,
    LedgerStore, NotificationStore, OutboxStore, Page, StoreError, StoreResult,
    JOB_DISPATCH_NOTIFICATIONS, JOB_STATUS_FAILED, JOB_STATUS_PROCESSING, JOB_STATUS_QUEUED,
    JOB_STATUS_SUCCEEDED,
};

#[derive(Default)]
struct Inner {
    departments: HashMap<Uuid, Department>,
    users: HashMap<Uuid, User>,
    documents: HashMap<Uuid, Document>,
    attachments: HashMap<Uuid, Vec<FileAttachment>>,
    history: Vec<HistoryEntry>,
    notifications: HashMap<Uuid, Notification>,
    counters: HashMap<i32, i64>,
    jobs: HashMap<Uuid, Job>,
}

#[derive(Default)]
pub struct MemStore {
    inner: RwLock<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn materialize_entry(entry: NewHistoryEntry, now: DateTime<Utc>) -> HistoryEntry {
    HistoryEntry {
        id: Uuid::new_v4(),
        document_id: entry.document_id,
        document_number: entry.document_number,
        action: entry.action,
        actor_id: entry.actor_id,
        actor_name: entry.actor_name,
        actor_department_id: entry.actor_department_id,
        from_department_id: entry.from_department_id,
        to_department_id: entry.to_department_id,
        old_status: entry.old_status,
        new_status: entry.new_status,
        status_reason: entry.status_reason,
        changes: entry.changes,
        comment: entry.comment,
        metadata: entry.metadata,
        recorded_at: now,
    }
}

fn push_job(inner: &mut Inner, job_type: &str, payload: Value, now: DateTime<Utc>) -> Job {
    let job = Job {
        id: Uuid::new_v4(),
        job_type: job_type.to_string(),
        payload,
        status: JOB_STATUS_QUEUED.to_string(),
        attempts: 0,
        run_after: now,
        last_error: None,
        created_at: now,
        updated_at: now,
    };
    inner.jobs.insert(job.id, job.clone());
    job
}

fn push_fanout(
    inner: &mut Inner,
    fanout: Option<NotificationBatch>,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    if let Some(batch) = fanout {
        let payload = serde_json::to_value(&batch)?;
        push_job(inner, JOB_DISPATCH_NOTIFICATIONS, payload, now);
    }
    Ok(())
}

fn matches_filter(document: &Document, filter: &DocumentFilter) -> bool {
    let scoped = match filter.scope {
        DocumentScope::All => true,
        DocumentScope::Department(id) => {
            document.creator_department_id == id || document.holder_department_id == id
        }
        DocumentScope::AssignedTo(id) => document.assigned_to == Some(id),
        DocumentScope::CreatedBy(id) => document.creator_id == id,
    };
    if !scoped {
        return false;
    }
    if let Some(status) = filter.status {
        if document.status != status {
            return false;
        }
    }
    if let Some(search) = &filter.search {
        let needle = search.to_lowercase();
        let hit = document.number.to_lowercase().contains(&needle)
            || document.title.to_lowercase().contains(&needle)
            || document.description.to_lowercase().contains(&needle);
        if !hit {
            return false;
        }
    }
    true
}

fn apply_change(
    inner: &mut Inner,
    id: Uuid,
    change: DocumentChange,
    now: DateTime<Utc>,
) -> StoreResult<Document> {
    let document = inner
        .documents
        .get_mut(&id)
        .ok_or(StoreError::NotFound("document"))?;

    crate::store::apply_document_change(document, &change, now);
    let snapshot = document.clone();

    if let Some(attach) = change.attach {
        inner.attachments.entry(id).or_default().push(FileAttachment {
            id: attach.id,
            document_id: id,
            filename: attach.filename,
            content_type: attach.content_type,
            size_bytes: attach.size_bytes,
            uploaded_by: attach.uploaded_by,
            uploaded_at: now,
        });
    }
    if let Some(file_id) = change.detach {
        if let Some(files) = inner.attachments.get_mut(&id) {
            files.retain(|file| file.id != file_id);
        }
    }

    Ok(snapshot)
}

#[async_trait]
impl DocumentStore for MemStore {
    async fn create_document(
        &self,
        document: NewDocument,
        entry: NewHistoryEntry,
        fanout: Option<NotificationBatch>,
    ) -> StoreResult<Document> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let stored = document.into_document(now);
        inner.documents.insert(stored.id, stored.clone());
        let entry = materialize_entry(entry, now);
        inner.history.push(entry);
        push_fanout(&mut inner, fanout, now)?;
        Ok(stored)
    }

    async fn document(&self, id: Uuid) -> StoreResult<Option<Document>> {
        let inner = self.inner.read().await;
        Ok(inner.documents.get(&id).cloned())
    }

    async fn list_documents(
        &self,
        filter: &DocumentFilter,
        page: Page,
    ) -> StoreResult<Vec<Document>> {
        let inner = self.inner.read().await;
        let mut documents: Vec<Document> = inner
            .documents
            .values()
            .filter(|document| matches_filter(document, filter))
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(documents
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        change: DocumentChange,
        entry: NewHistoryEntry,
        fanout: Option<NotificationBatch>,
    ) -> StoreResult<Document> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let document = apply_change(&mut inner, id, change, now)?;
        let entry = materialize_entry(entry, now);
        inner.history.push(entry);
        push_fanout(&mut inner, fanout, now)?;
        Ok(document)
    }

    async fn next_document_number(&self, year: i32) -> StoreResult<i64> {
        let mut inner = self.inner.write().await;
        let seq = inner.counters.entry(year).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }

    async fn document_stats(&self, filter: &DocumentFilter) -> StoreResult<DocumentStats> {
        let inner = self.inner.read().await;
        let mut stats = DocumentStats::default();
        for document in inner.documents.values() {
            if !matches_filter(document, filter) {
                continue;
            }
            stats.total += 1;
            *stats
                .by_status
                .entry(document.status.as_str().to_string())
                .or_insert(0) += 1;
            *stats
                .by_priority
                .entry(document.priority.as_str().to_string())
                .or_insert(0) += 1;
        }
        Ok(stats)
    }

    async fn attachments_for(
        &self,
        document_ids: &[Uuid],
    ) -> StoreResult<HashMap<Uuid, Vec<FileAttachment>>> {
        let inner = self.inner.read().await;
        let mut map = HashMap::new();
        for id in document_ids {
            if let Some(files) = inner.attachments.get(id) {
                if !files.is_empty() {
                    map.insert(*id, files.clone());
                }
            }
        }
        Ok(map)
    }
}

#[async_trait]
impl LedgerStore for MemStore {
    async fn append_entry(&self, entry: NewHistoryEntry) -> StoreResult<HistoryEntry> {
        let mut inner = self.inner.write().await;
        let entry = materialize_entry(entry, Utc::now());
        inner.history.push(entry.clone());
        Ok(entry)
    }

    async fn document_timeline(
        &self,
        document_id: Uuid,
        page: Page,
    ) -> StoreResult<Vec<HistoryEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .history
            .iter()
            .filter(|entry| entry.document_id == document_id)
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn entries_by_actor(
        &self,
        actor_id: Uuid,
        page: Page,
    ) -> StoreResult<Vec<HistoryEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .history
            .iter()
            .rev()
            .filter(|entry| entry.actor_id == actor_id)
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn entries_for_department(
        &self,
        department_id: Uuid,
        page: Page,
    ) -> StoreResult<Vec<HistoryEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .history
            .iter()
            .rev()
            .filter(|entry| {
                entry.actor_department_id == department_id
                    || entry.from_department_id == Some(department_id)
                    || entry.to_department_id == Some(department_id)
            })
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn forwarding_chain(&self, document_id: Uuid) -> StoreResult<Vec<HistoryEntry>> {
        use crate::models::HistoryAction;
        let inner = self.inner.read().await;
        Ok(inner
            .history
            .iter()
            .filter(|entry| {
                entry.document_id == document_id && entry.action == HistoryAction::Forwarded
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl NotificationStore for MemStore {
    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> StoreResult<Option<Notification>> {
        let mut inner = self.inner.write().await;
        if inner.notifications.contains_key(&notification.id) {
            return Ok(None);
        }
        let stored = Notification {
            id: notification.id,
            user_id: notification.user_id,
            document_id: notification.document_id,
            kind: notification.kind,
            title: notification.title,
            message: notification.message,
            is_read: false,
            read_at: None,
            email_sent: false,
            email_sent_at: None,
            metadata: notification.metadata,
            created_at: Utc::now(),
        };
        inner.notifications.insert(stored.id, stored.clone());
        Ok(Some(stored))
    }

    async fn notification(&self, id: Uuid) -> StoreResult<Option<Notification>> {
        let inner = self.inner.read().await;
        Ok(inner.notifications.get(&id).cloned())
    }

    async fn notifications_for_user(
        &self,
        user_id: Uuid,
        unread_only: bool,
        page: Page,
    ) -> StoreResult<Vec<Notification>> {
        let inner = self.inner.read().await;
        let mut notifications: Vec<Notification> = inner
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && (!unread_only || !n.is_read))
            .cloned()
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn unread_count(&self, user_id: Uuid) -> StoreResult<i64> {
        let inner = self.inner.read().await;
        Ok(inner
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count() as i64)
    }

    async fn mark_notification_read(&self, id: Uuid) -> StoreResult<Notification> {
        let mut inner = self.inner.write().await;
        let notification = inner
            .notifications
            .get_mut(&id)
            .ok_or(StoreError::NotFound("notification"))?;
        notification.is_read = true;
        notification.read_at = Some(Utc::now());
        Ok(notification.clone())
    }

    async fn mark_all_read(&self, user_id: Uuid) -> StoreResult<usize> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let mut updated = 0;
        for notification in inner.notifications.values_mut() {
            if notification.user_id == user_id && !notification.is_read {
                notification.is_read = true;
                notification.read_at = Some(now);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn mark_email_sent(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let notification = inner
            .notifications
            .get_mut(&id)
            .ok_or(StoreError::NotFound("notification"))?;
        notification.email_sent = true;
        notification.email_sent_at = Some(Utc::now());
        Ok(())
    }

    async fn delete_notification(&self, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .notifications
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound("notification"))
    }
}

#[async_trait]
impl Directory for MemStore {
    async fn department(&self, id: Uuid) -> StoreResult<Option<Department>> {
        let inner = self.inner.read().await;
        Ok(inner.departments.get(&id).cloned())
    }

    async fn departments(&self) -> StoreResult<Vec<Department>> {
        let inner = self.inner.read().await;
        let mut departments: Vec<Department> = inner.departments.values().cloned().collect();
        departments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(departments)
    }

    async fn insert_department(&self, department: NewDepartment) -> StoreResult<Department> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let stored = Department {
            id: Uuid::new_v4(),
            name: department.name,
            code: department.code,
            active: true,
            created_at: now,
            updated_at: now,
        };
        inner.departments.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn users_in_department(&self, department_id: Uuid) -> StoreResult<Vec<User>> {
        let inner = self.inner.read().await;
        let mut users: Vec<User> = inner
            .users
            .values()
            .filter(|u| u.department_id == department_id)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(users)
    }

    async fn active_users_in_department(&self, department_id: Uuid) -> StoreResult<Vec<User>> {
        let inner = self.inner.read().await;
        let mut users: Vec<User> = inner
            .users
            .values()
            .filter(|u| u.department_id == department_id && u.active)
            .cloned()
            .collect();
        users.sort_by(|a, b| a.full_name.cmp(&b.full_name));
        Ok(users)
    }

    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let stored = User {
            id: Uuid::new_v4(),
            email: user.email,
            full_name: user.full_name,
            password_hash: user.password_hash,
            role: user.role,
            department_id: user.department_id,
            active: user.active,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(stored.id, stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl OutboxStore for MemStore {
    async fn enqueue_job(&self, job_type: &str, payload: Value) -> StoreResult<Job> {
        let mut inner = self.inner.write().await;
        Ok(push_job(&mut inner, job_type, payload, Utc::now()))
    }

    async fn reserve_job(&self, job_types: &[&str]) -> StoreResult<Option<Job>> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let candidate = inner
            .jobs
            .values()
            .filter(|job| {
                job.status == JOB_STATUS_QUEUED
                    && job.run_after <= now
                    && job_types.contains(&job.job_type.as_str())
            })
            .min_by_key(|job| job.created_at)
            .map(|job| job.id);
        let Some(id) = candidate else {
            return Ok(None);
        };
        let job = inner.jobs.get_mut(&id).ok_or(StoreError::NotFound("job"))?;
        job.status = JOB_STATUS_PROCESSING.to_string();
        job.attempts += 1;
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn mark_job_succeeded(&self, job_id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::NotFound("job"))?;
        job.status = JOB_STATUS_SUCCEEDED.to_string();
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn retry_job_after(
        &self,
        job_id: Uuid,
        delay: Duration,
        error: &str,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::NotFound("job"))?;
        job.status = JOB_STATUS_QUEUED.to_string();
        job.run_after = now + delay;
        job.last_error = Some(error.to_string());
        job.updated_at = now;
        Ok(())
    }

    async fn mark_job_failed(&self, job_id: Uuid, error: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let job = inner
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::NotFound("job"))?;
        job.status = JOB_STATUS_FAILED.to_string();
        job.last_error = Some(error.to_string());
        job.updated_at = Utc::now();
        Ok(())
    }
}
