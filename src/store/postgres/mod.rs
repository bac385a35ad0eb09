//! Postgres backend. Every transition commits the document row, the ledger
//! entry, and the outbox job in one transaction; racing transitions on the
//! same document serialize on the row lock.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use serde_json::Value;
use uuid::Uuid;

use crate::db::{PgPool, PgPooledConnection};
use crate::models::{
    Department, Document, FileAttachment, HistoryEntry, Job, NewDepartment, NewDocument,
    NewHistoryEntry, NewNotification, NewUser, Notification, User,
};
use crate::notify::NotificationBatch;
use crate::store::{
    apply_document_change, DocumentChange, DocumentFilter, DocumentScope, DocumentStats,
    DocumentStore, Directory, LedgerStore, NotificationStore, OutboxStore, Page, StoreError,
    StoreResult, JOB_DISPATCH_NOTIFICATIONS, JOB_STATUS_FAILED, JOB_STATUS_PROCESSING,
    JOB_STATUS_QUEUED, JOB_STATUS_SUCCEEDED,
};

pub mod schema;

mod rows;

use rows::{
    AttachmentInsert, AttachmentRow, DepartmentInsert, DepartmentRow, DocumentInsert, DocumentRow,
    HistoryInsert, HistoryRow, JobInsert, JobRow, NotificationInsert, NotificationRow, UserInsert,
    UserRow,
};
use schema::{
    departments, document_counters, document_files, document_history, documents, jobs,
    notifications, users,
};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }

    pub fn run_migrations(&self) -> anyhow::Result<()> {
        let mut conn = self
            .pool
            .get()
            .map_err(|e| anyhow::anyhow!("connection pool unavailable: {e}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow::anyhow!("running migrations failed: {e}"))?;
        Ok(())
    }

    fn conn(&self) -> StoreResult<PgPooledConnection> {
        self.pool.get().map_err(|e| StoreError::Pool(e.to_string()))
    }
}

fn document_query(filter: &DocumentFilter) -> documents::BoxedQuery<'static, diesel::pg::Pg> {
    let mut query = documents::table.into_boxed();
    match filter.scope {
        DocumentScope::All => {}
        DocumentScope::Department(id) => {
            query = query.filter(
                documents::creator_department_id
                    .eq(id)
                    .or(documents::holder_department_id.eq(id)),
            );
        }
        DocumentScope::AssignedTo(id) => {
            query = query.filter(documents::assigned_to.eq(Some(id)));
        }
        DocumentScope::CreatedBy(id) => {
            query = query.filter(documents::creator_id.eq(id));
        }
    }
    if let Some(status) = filter.status {
        query = query.filter(documents::status.eq(status.as_str()));
    }
    if let Some(search) = &filter.search {
        let escaped = search
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{escaped}%");
        query = query.filter(
            documents::number
                .ilike(pattern.clone())
                .or(documents::title.ilike(pattern.clone()))
                .or(documents::description.ilike(pattern)),
        );
    }
    query
}

fn insert_history(conn: &mut PgConnection, entry: NewHistoryEntry) -> Result<(), StoreError> {
    let insert = HistoryInsert::try_from(entry).map_err(StoreError::Payload)?;
    diesel::insert_into(document_history::table)
        .values(&insert)
        .execute(conn)?;
    Ok(())
}

fn insert_fanout(
    conn: &mut PgConnection,
    fanout: Option<NotificationBatch>,
) -> Result<(), StoreError> {
    let Some(batch) = fanout else {
        return Ok(());
    };
    let insert = JobInsert {
        id: Uuid::new_v4(),
        job_type: JOB_DISPATCH_NOTIFICATIONS.to_string(),
        payload: serde_json::to_value(&batch)?,
        status: JOB_STATUS_QUEUED.to_string(),
        run_after: Utc::now(),
    };
    diesel::insert_into(jobs::table).values(&insert).execute(conn)?;
    Ok(())
}

fn convert_documents(rows: Vec<DocumentRow>) -> StoreResult<Vec<Document>> {
    rows.into_iter().map(Document::try_from).collect()
}

fn convert_entries(rows: Vec<HistoryRow>) -> StoreResult<Vec<HistoryEntry>> {
    rows.into_iter().map(HistoryEntry::try_from).collect()
}

fn convert_users(rows: Vec<UserRow>) -> StoreResult<Vec<User>> {
    rows.into_iter().map(User::try_from).collect()
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn create_document(
        &self,
        document: NewDocument,
        entry: NewHistoryEntry,
        fanout: Option<NotificationBatch>,
    ) -> StoreResult<Document> {
        let mut conn = self.conn()?;
        conn.transaction::<Document, StoreError, _>(|conn| {
            let insert = DocumentInsert::from(document);
            let row: DocumentRow = diesel::insert_into(documents::table)
                .values(&insert)
                .get_result(conn)?;
            insert_history(conn, entry)?;
            insert_fanout(conn, fanout)?;
            Document::try_from(row)
        })
    }

    async fn document(&self, id: Uuid) -> StoreResult<Option<Document>> {
        let mut conn = self.conn()?;
        let row: Option<DocumentRow> = documents::table.find(id).first(&mut conn).optional()?;
        row.map(Document::try_from).transpose()
    }

    async fn list_documents(
        &self,
        filter: &DocumentFilter,
        page: Page,
    ) -> StoreResult<Vec<Document>> {
        let mut conn = self.conn()?;
        let rows: Vec<DocumentRow> = document_query(filter)
            .order(documents::created_at.desc())
            .offset(page.offset)
            .limit(page.limit)
            .load(&mut conn)?;
        convert_documents(rows)
    }

    async fn apply_transition(
        &self,
        id: Uuid,
        change: DocumentChange,
        entry: NewHistoryEntry,
        fanout: Option<NotificationBatch>,
    ) -> StoreResult<Document> {
        let mut conn = self.conn()?;
        conn.transaction::<Document, StoreError, _>(|conn| {
            let now = Utc::now();
            let row: Option<DocumentRow> = documents::table
                .find(id)
                .for_update()
                .first(conn)
                .optional()?;
            let row = row.ok_or(StoreError::NotFound("document"))?;
            let mut document = Document::try_from(row)?;
            apply_document_change(&mut document, &change, now);

            diesel::update(documents::table.find(id))
                .set((
                    documents::title.eq(document.title.clone()),
                    documents::description.eq(document.description.clone()),
                    documents::document_type.eq(document.document_type.as_str()),
                    documents::priority.eq(document.priority.as_str()),
                    documents::status.eq(document.status.as_str()),
                    documents::holder_department_id.eq(document.holder_department_id),
                    documents::assigned_to.eq(document.assigned_to),
                    documents::deadline.eq(document.deadline),
                    documents::tags.eq(Value::from(document.tags.clone())),
                    documents::metadata.eq(document.metadata.clone()),
                    documents::archived_at.eq(document.archived_at),
                    documents::updated_at.eq(now),
                ))
                .execute(conn)?;

            if let Some(attach) = change.attach {
                diesel::insert_into(document_files::table)
                    .values(&AttachmentInsert {
                        id: attach.id,
                        document_id: id,
                        filename: attach.filename,
                        content_type: attach.content_type,
                        size_bytes: attach.size_bytes,
                        uploaded_by: attach.uploaded_by,
                    })
                    .execute(conn)?;
            }
            if let Some(file_id) = change.detach {
                diesel::delete(document_files::table.find(file_id)).execute(conn)?;
            }

            insert_history(conn, entry)?;
            insert_fanout(conn, fanout)?;
            Ok(document)
        })
    }

    async fn next_document_number(&self, year: i32) -> StoreResult<i64> {
        let mut conn = self.conn()?;
        let seq: i64 = diesel::insert_into(document_counters::table)
            .values((
                document_counters::year.eq(year),
                document_counters::last_seq.eq(1_i64),
            ))
            .on_conflict(document_counters::year)
            .do_update()
            .set(document_counters::last_seq.eq(document_counters::last_seq + 1))
            .returning(document_counters::last_seq)
            .get_result(&mut conn)?;
        Ok(seq)
    }

    async fn document_stats(&self, filter: &DocumentFilter) -> StoreResult<DocumentStats> {
        let mut conn = self.conn()?;
        let rows: Vec<DocumentRow> = document_query(filter).load(&mut conn)?;
        let mut stats = DocumentStats::default();
        for row in rows {
            stats.total += 1;
            *stats.by_status.entry(row.status).or_insert(0) += 1;
            *stats.by_priority.entry(row.priority).or_insert(0) += 1;
        }
        Ok(stats)
    }

    async fn attachments_for(
        &self,
        document_ids: &[Uuid],
    ) -> StoreResult<HashMap<Uuid, Vec<FileAttachment>>> {
        let mut conn = self.conn()?;
        let rows: Vec<AttachmentRow> = document_files::table
            .filter(document_files::document_id.eq_any(document_ids.to_vec()))
            .order(document_files::uploaded_at.asc())
            .load(&mut conn)?;
        let mut map: HashMap<Uuid, Vec<FileAttachment>> = HashMap::new();
        for row in rows {
            map.entry(row.document_id).or_default().push(row.into());
        }
        Ok(map)
    }
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn append_entry(&self, entry: NewHistoryEntry) -> StoreResult<HistoryEntry> {
        let mut conn = self.conn()?;
        let insert = HistoryInsert::try_from(entry).map_err(StoreError::Payload)?;
        let row: HistoryRow = diesel::insert_into(document_history::table)
            .values(&insert)
            .get_result(&mut conn)?;
        HistoryEntry::try_from(row)
    }

    async fn document_timeline(
        &self,
        document_id: Uuid,
        page: Page,
    ) -> StoreResult<Vec<HistoryEntry>> {
        let mut conn = self.conn()?;
        let rows: Vec<HistoryRow> = document_history::table
            .filter(document_history::document_id.eq(document_id))
            .order(document_history::recorded_at.asc())
            .offset(page.offset)
            .limit(page.limit)
            .load(&mut conn)?;
        convert_entries(rows)
    }

    async fn entries_by_actor(
        &self,
        actor_id: Uuid,
        page: Page,
    ) -> StoreResult<Vec<HistoryEntry>> {
        let mut conn = self.conn()?;
        let rows: Vec<HistoryRow> = document_history::table
            .filter(document_history::actor_id.eq(actor_id))
            .order(document_history::recorded_at.desc())
            .offset(page.offset)
            .limit(page.limit)
            .load(&mut conn)?;
        convert_entries(rows)
    }

    async fn entries_for_department(
        &self,
        department_id: Uuid,
        page: Page,
    ) -> StoreResult<Vec<HistoryEntry>> {
        let mut conn = self.conn()?;
        let rows: Vec<HistoryRow> = document_history::table
            .filter(
                document_history::actor_department_id
                    .nullable()
                    .eq(Some(department_id))
                    .or(document_history::from_department_id.eq(Some(department_id)))
                    .or(document_history::to_department_id.eq(Some(department_id))),
            )
            .order(document_history::recorded_at.desc())
            .offset(page.offset)
            .limit(page.limit)
            .load(&mut conn)?;
        convert_entries(rows)
    }

    async fn forwarding_chain(&self, document_id: Uuid) -> StoreResult<Vec<HistoryEntry>> {
        use crate::models::HistoryAction;
        let mut conn = self.conn()?;
        let rows: Vec<HistoryRow> = document_history::table
            .filter(document_history::document_id.eq(document_id))
            .filter(document_history::action.eq(HistoryAction::Forwarded.as_str()))
            .order(document_history::recorded_at.asc())
            .load(&mut conn)?;
        convert_entries(rows)
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert_notification(
        &self,
        notification: NewNotification,
    ) -> StoreResult<Option<Notification>> {
        let mut conn = self.conn()?;
        let row: Option<NotificationRow> = diesel::insert_into(notifications::table)
            .values(&NotificationInsert::from(notification))
            .on_conflict(notifications::id)
            .do_nothing()
            .get_result(&mut conn)
            .optional()?;
        row.map(Notification::try_from).transpose()
    }

    async fn notification(&self, id: Uuid) -> StoreResult<Option<Notification>> {
        let mut conn = self.conn()?;
        let row: Option<NotificationRow> =
            notifications::table.find(id).first(&mut conn).optional()?;
        row.map(Notification::try_from).transpose()
    }

    async fn notifications_for_user(
        &self,
        user_id: Uuid,
        unread_only: bool,
        page: Page,
    ) -> StoreResult<Vec<Notification>> {
        let mut conn = self.conn()?;
        let mut query = notifications::table
            .filter(notifications::user_id.eq(user_id))
            .into_boxed();
        if unread_only {
            query = query.filter(notifications::is_read.eq(false));
        }
        let rows: Vec<NotificationRow> = query
            .order(notifications::created_at.desc())
            .offset(page.offset)
            .limit(page.limit)
            .load(&mut conn)?;
        rows.into_iter().map(Notification::try_from).collect()
    }

    async fn unread_count(&self, user_id: Uuid) -> StoreResult<i64> {
        let mut conn = self.conn()?;
        let count: i64 = notifications::table
            .filter(notifications::user_id.eq(user_id))
            .filter(notifications::is_read.eq(false))
            .count()
            .get_result(&mut conn)?;
        Ok(count)
    }

    async fn mark_notification_read(&self, id: Uuid) -> StoreResult<Notification> {
        let mut conn = self.conn()?;
        let row: Option<NotificationRow> = diesel::update(notifications::table.find(id))
            .set((
                notifications::is_read.eq(true),
                notifications::read_at.eq(Some(Utc::now())),
            ))
            .get_result(&mut conn)
            .optional()?;
        let row = row.ok_or(StoreError::NotFound("notification"))?;
        Notification::try_from(row)
    }

    async fn mark_all_read(&self, user_id: Uuid) -> StoreResult<usize> {
        let mut conn = self.conn()?;
        let updated = diesel::update(
            notifications::table
                .filter(notifications::user_id.eq(user_id))
                .filter(notifications::is_read.eq(false)),
        )
        .set((
            notifications::is_read.eq(true),
            notifications::read_at.eq(Some(Utc::now())),
        ))
        .execute(&mut conn)?;
        Ok(updated)
    }

    async fn mark_email_sent(&self, id: Uuid) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let updated = diesel::update(notifications::table.find(id))
            .set((
                notifications::email_sent.eq(true),
                notifications::email_sent_at.eq(Some(Utc::now())),
            ))
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(StoreError::NotFound("notification"));
        }
        Ok(())
    }

    async fn delete_notification(&self, id: Uuid) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let deleted = diesel::delete(notifications::table.find(id)).execute(&mut conn)?;
        if deleted == 0 {
            return Err(StoreError::NotFound("notification"));
        }
        Ok(())
    }
}

#[async_trait]
impl Directory for PgStore {
    async fn department(&self, id: Uuid) -> StoreResult<Option<Department>> {
        let mut conn = self.conn()?;
        let row: Option<DepartmentRow> =
            departments::table.find(id).first(&mut conn).optional()?;
        Ok(row.map(Department::from))
    }

    async fn departments(&self) -> StoreResult<Vec<Department>> {
        let mut conn = self.conn()?;
        let rows: Vec<DepartmentRow> = departments::table
            .order(departments::name.asc())
            .load(&mut conn)?;
        Ok(rows.into_iter().map(Department::from).collect())
    }

    async fn insert_department(&self, department: NewDepartment) -> StoreResult<Department> {
        let mut conn = self.conn()?;
        let row: DepartmentRow = diesel::insert_into(departments::table)
            .values(&DepartmentInsert {
                id: Uuid::new_v4(),
                name: department.name,
                code: department.code,
                active: true,
            })
            .get_result(&mut conn)?;
        Ok(row.into())
    }

    async fn user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let mut conn = self.conn()?;
        let row: Option<UserRow> = users::table.find(id).first(&mut conn).optional()?;
        row.map(User::try_from).transpose()
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let mut conn = self.conn()?;
        let row: Option<UserRow> = users::table
            .filter(users::email.eq(email))
            .first(&mut conn)
            .optional()?;
        row.map(User::try_from).transpose()
    }

    async fn users_in_department(&self, department_id: Uuid) -> StoreResult<Vec<User>> {
        let mut conn = self.conn()?;
        let rows: Vec<UserRow> = users::table
            .filter(users::department_id.eq(department_id))
            .order(users::full_name.asc())
            .load(&mut conn)?;
        convert_users(rows)
    }

    async fn active_users_in_department(&self, department_id: Uuid) -> StoreResult<Vec<User>> {
        let mut conn = self.conn()?;
        let rows: Vec<UserRow> = users::table
            .filter(users::department_id.eq(department_id))
            .filter(users::active.eq(true))
            .order(users::full_name.asc())
            .load(&mut conn)?;
        convert_users(rows)
    }

    async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        let mut conn = self.conn()?;
        let row: UserRow = diesel::insert_into(users::table)
            .values(&UserInsert {
                id: Uuid::new_v4(),
                email: user.email,
                full_name: user.full_name,
                password_hash: user.password_hash,
                role: user.role.as_str().to_string(),
                department_id: user.department_id,
                active: user.active,
            })
            .get_result(&mut conn)?;
        User::try_from(row)
    }
}

#[async_trait]
impl OutboxStore for PgStore {
    async fn enqueue_job(&self, job_type: &str, payload: Value) -> StoreResult<Job> {
        let mut conn = self.conn()?;
        let row: JobRow = diesel::insert_into(jobs::table)
            .values(&JobInsert {
                id: Uuid::new_v4(),
                job_type: job_type.to_string(),
                payload,
                status: JOB_STATUS_QUEUED.to_string(),
                run_after: Utc::now(),
            })
            .get_result(&mut conn)?;
        Ok(row.into())
    }

    async fn reserve_job(&self, job_types: &[&str]) -> StoreResult<Option<Job>> {
        let mut conn = self.conn()?;
        conn.transaction::<Option<Job>, StoreError, _>(|conn| {
            let now = Utc::now();
            let row: Option<JobRow> = jobs::table
                .filter(jobs::status.eq(JOB_STATUS_QUEUED))
                .filter(jobs::job_type.eq_any(job_types))
                .filter(jobs::run_after.le(now))
                .order(jobs::run_after.asc())
                .for_update()
                .skip_locked()
                .first(conn)
                .optional()?;
            let Some(row) = row else {
                return Ok(None);
            };
            let attempts = row.attempts + 1;
            diesel::update(jobs::table.find(row.id))
                .set((
                    jobs::status.eq(JOB_STATUS_PROCESSING),
                    jobs::attempts.eq(attempts),
                    jobs::updated_at.eq(now),
                ))
                .execute(conn)?;
            let mut job = Job::from(row);
            job.status = JOB_STATUS_PROCESSING.to_string();
            job.attempts = attempts;
            Ok(Some(job))
        })
    }

    async fn mark_job_succeeded(&self, job_id: Uuid) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let updated = diesel::update(jobs::table.find(job_id))
            .set((
                jobs::status.eq(JOB_STATUS_SUCCEEDED),
                jobs::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(StoreError::NotFound("job"));
        }
        Ok(())
    }

    async fn retry_job_after(
        &self,
        job_id: Uuid,
        delay: Duration,
        error: &str,
    ) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let now = Utc::now();
        let updated = diesel::update(jobs::table.find(job_id))
            .set((
                jobs::status.eq(JOB_STATUS_QUEUED),
                jobs::run_after.eq(now + delay),
                jobs::last_error.eq(Some(error.to_string())),
                jobs::updated_at.eq(now),
            ))
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(StoreError::NotFound("job"));
        }
        Ok(())
    }

    async fn mark_job_failed(&self, job_id: Uuid, error: &str) -> StoreResult<()> {
        let mut conn = self.conn()?;
        let updated = diesel::update(jobs::table.find(job_id))
            .set((
                jobs::status.eq(JOB_STATUS_FAILED),
                jobs::last_error.eq(Some(error.to_string())),
                jobs::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)?;
        if updated == 0 {
            return Err(StoreError::NotFound("job"));
        }
        Ok(())
    }
}
