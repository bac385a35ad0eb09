//! The lifecycle engine. Every write to a document, the ledger, or the
//! outbox goes through here: operations check the access policy, validate
//! their input against the directory, then hand the store one atomic
//! transition (mutation + ledger entry + fan-out job).

use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::models::{
    format_document_number, Actor, Document, DocumentKind, DocumentPriority, DocumentStatus,
    FieldChange, FileAttachment, HistoryAction, HistoryEntry, NewAttachment, NewDocument,
    NewHistoryEntry,
};
use crate::notify::{self, ForwardAudience, NotificationBatch};
use crate::policy::{allows, Capability};
use crate::store::{DataStore, DocumentChange, Page, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Validation(String),
    #[error("operation not permitted")]
    Forbidden,
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn invalid(message: impl Into<String>) -> LifecycleError {
    LifecycleError::Validation(message.into())
}

#[derive(Debug, Deserialize)]
pub struct CreateDocument {
    pub title: String,
    pub description: String,
    pub document_type: DocumentKind,
    pub priority: Option<DocumentPriority>,
    pub assigned_to: Option<Uuid>,
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ForwardDocument {
    pub to_department_id: Uuid,
    pub assigned_to: Option<Uuid>,
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatusChange {
    pub status: DocumentStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModifyDocument {
    pub title: Option<String>,
    pub description: Option<String>,
    pub document_type: Option<DocumentKind>,
    pub priority: Option<DocumentPriority>,
    pub assigned_to: Option<Uuid>,
    pub deadline: Option<DateTime<Utc>>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<Value>,
}

#[derive(Clone)]
pub struct Lifecycle {
    store: Arc<dyn DataStore>,
}

impl Lifecycle {
    pub fn new(store: Arc<dyn DataStore>) -> Self {
        Lifecycle { store }
    }

    /// Loads the document and runs the policy; the building block of every
    /// operation below.
    async fn authorize(
        &self,
        actor: &Actor,
        id: Uuid,
        capability: Capability,
    ) -> Result<Document, LifecycleError> {
        let document = self
            .store
            .document(id)
            .await?
            .ok_or(LifecycleError::NotFound("document"))?;
        if !allows(actor, &document, capability) {
            return Err(LifecycleError::Forbidden);
        }
        Ok(document)
    }

    async fn expect_assignable(
        &self,
        user_id: Uuid,
        department_id: Uuid,
        scope: &str,
    ) -> Result<(), LifecycleError> {
        let user = self
            .store
            .user(user_id)
            .await?
            .ok_or_else(|| invalid("assigned user not found"))?;
        if user.department_id != department_id {
            return Err(invalid(format!("assigned user is not in {scope}")));
        }
        Ok(())
    }

    pub async fn create_document(
        &self,
        actor: &Actor,
        input: CreateDocument,
    ) -> Result<Document, LifecycleError> {
        let title = input.title.trim().to_string();
        if title.is_empty() {
            return Err(invalid("title must not be empty"));
        }
        let description = input.description.trim().to_string();
        if description.is_empty() {
            return Err(invalid("description must not be empty"));
        }
        if let Some(assignee) = input.assigned_to {
            self.expect_assignable(assignee, actor.department_id, "your department")
                .await?;
        }

        let year = Utc::now().year();
        let seq = self.store.next_document_number(year).await?;
        let number = format_document_number(year, seq);

        let new_document = NewDocument {
            id: Uuid::new_v4(),
            number,
            title,
            description,
            document_type: input.document_type,
            priority: input.priority.unwrap_or(DocumentPriority::Medium),
            status: DocumentStatus::Draft,
            creator_id: actor.id,
            creator_department_id: actor.department_id,
            holder_department_id: actor.department_id,
            assigned_to: input.assigned_to,
            deadline: input.deadline,
            tags: input.tags,
            metadata: input
                .metadata
                .unwrap_or_else(|| Value::Object(Default::default())),
        };

        let mut entry = NewHistoryEntry::record(
            HistoryAction::Created,
            new_document.id,
            &new_document.number,
            actor,
        );
        entry.comment = Some(format!("Document created: {}", new_document.title));

        // Template rendering needs the shape of the stored record.
        let preview = new_document.clone().into_document(Utc::now());
        let fanout = input
            .assigned_to
            .map(|assignee| notify::document_created(&preview, assignee))
            .and_then(NotificationBatch::into_option);

        let document = self
            .store
            .create_document(new_document, entry, fanout)
            .await?;
        info!(number = %document.number, creator = %actor.id, "document created");
        Ok(document)
    }

    /// Authorized detail read; records a `viewed` entry on every call.
    pub async fn view_document(
        &self,
        actor: &Actor,
        id: Uuid,
    ) -> Result<Document, LifecycleError> {
        let document = self.authorize(actor, id, Capability::View).await?;
        let entry = NewHistoryEntry::record(
            HistoryAction::Viewed,
            document.id,
            &document.number,
            actor,
        );
        self.store.append_entry(entry).await?;
        Ok(document)
    }

    /// Authorized read without a ledger write, for attachment listings and
    /// downloads.
    pub async fn read_document(
        &self,
        actor: &Actor,
        id: Uuid,
    ) -> Result<Document, LifecycleError> {
        self.authorize(actor, id, Capability::View).await
    }

    pub async fn forward_document(
        &self,
        actor: &Actor,
        id: Uuid,
        input: ForwardDocument,
    ) -> Result<Document, LifecycleError> {
        let document = self.authorize(actor, id, Capability::Forward).await?;
        let target = self
            .store
            .department(input.to_department_id)
            .await?
            .ok_or(LifecycleError::NotFound("department"))?;
        if let Some(assignee) = input.assigned_to {
            self.expect_assignable(assignee, target.id, "the target department")
                .await?;
        }

        let from_department_id = document.holder_department_id;
        let mut entry = NewHistoryEntry::record(
            HistoryAction::Forwarded,
            document.id,
            &document.number,
            actor,
        );
        entry.from_department_id = Some(from_department_id);
        entry.to_department_id = Some(target.id);
        entry.comment = input.comment;

        // Recipients resolve now; later directory changes do not reroute
        // the fan-out.
        let audience = match input.assigned_to {
            Some(user_id) => ForwardAudience::Assignee(user_id),
            None => {
                let members = self.store.active_users_in_department(target.id).await?;
                ForwardAudience::Department {
                    name: target.name.clone(),
                    user_ids: members.into_iter().map(|user| user.id).collect(),
                }
            }
        };
        let fanout =
            notify::document_forwarded(&document, actor, from_department_id, target.id, audience)
                .into_option();

        let change = DocumentChange {
            holder_department_id: Some(target.id),
            assigned_to: Some(input.assigned_to),
            ..Default::default()
        };
        let updated = self
            .store
            .apply_transition(document.id, change, entry, fanout)
            .await?;
        info!(
            number = %updated.number,
            from = %from_department_id,
            to = %target.id,
            "document forwarded"
        );
        Ok(updated)
    }

    pub async fn change_status(
        &self,
        actor: &Actor,
        id: Uuid,
        input: StatusChange,
    ) -> Result<Document, LifecycleError> {
        let document = self.authorize(actor, id, Capability::ChangeStatus).await?;
        if input.status == DocumentStatus::Archived {
            return Err(invalid("archiving has its own endpoint"));
        }

        let old_status = document.status;
        let mut entry = NewHistoryEntry::record(
            HistoryAction::StatusChanged,
            document.id,
            &document.number,
            actor,
        );
        entry.old_status = Some(old_status);
        entry.new_status = Some(input.status);
        entry.status_reason = input.reason;

        let fanout =
            notify::status_changed(&document, actor, old_status, input.status).into_option();
        let change = DocumentChange {
            status: Some(input.status),
            ..Default::default()
        };
        let updated = self
            .store
            .apply_transition(document.id, change, entry, fanout)
            .await?;
        info!(
            number = %updated.number,
            old = %old_status,
            new = %updated.status,
            "document status changed"
        );
        Ok(updated)
    }

    pub async fn archive_document(
        &self,
        actor: &Actor,
        id: Uuid,
    ) -> Result<Document, LifecycleError> {
        let document = self.authorize(actor, id, Capability::Archive).await?;

        let old_status = document.status;
        let mut entry = NewHistoryEntry::record(
            HistoryAction::Archived,
            document.id,
            &document.number,
            actor,
        );
        entry.comment = Some("Document archived".to_string());

        let fanout = notify::document_archived(&document, actor, old_status).into_option();
        let change = DocumentChange {
            status: Some(DocumentStatus::Archived),
            archived_at: Some(Utc::now()),
            ..Default::default()
        };
        let updated = self
            .store
            .apply_transition(document.id, change, entry, fanout)
            .await?;
        info!(number = %updated.number, "document archived");
        Ok(updated)
    }

    pub async fn modify_document(
        &self,
        actor: &Actor,
        id: Uuid,
        input: ModifyDocument,
    ) -> Result<Document, LifecycleError> {
        let document = self.authorize(actor, id, Capability::Modify).await?;

        let title = match input.title {
            Some(title) => {
                let title = title.trim().to_string();
                if title.is_empty() {
                    return Err(invalid("title must not be empty"));
                }
                Some(title)
            }
            None => None,
        };
        if matches!(&input.description, Some(d) if d.trim().is_empty()) {
            return Err(invalid("description must not be empty"));
        }

        // Only a change of assignee counts as a reassignment.
        let reassigned = match input.assigned_to {
            Some(user_id) if document.assigned_to != Some(user_id) => {
                self.store
                    .user(user_id)
                    .await?
                    .ok_or_else(|| invalid("assigned user not found"))?;
                Some(user_id)
            }
            _ => None,
        };

        let mut entry = NewHistoryEntry::record(
            HistoryAction::Modified,
            document.id,
            &document.number,
            actor,
        );
        entry.comment = Some("Document updated".to_string());
        if let Some(priority) = input.priority {
            if priority != document.priority {
                entry.changes = Some(FieldChange {
                    field: "priority".to_string(),
                    old_value: Value::String(document.priority.as_str().to_string()),
                    new_value: Value::String(priority.as_str().to_string()),
                });
            }
        }

        let fanout = reassigned
            .map(|assignee| notify::document_assigned(&document, actor, assignee))
            .and_then(NotificationBatch::into_option);

        let change = DocumentChange {
            title,
            description: input.description,
            document_type: input.document_type,
            priority: input.priority,
            assigned_to: input.assigned_to.map(Some),
            deadline: input.deadline.map(Some),
            tags: input.tags,
            metadata: input.metadata,
            ..Default::default()
        };
        let updated = self
            .store
            .apply_transition(document.id, change, entry, fanout)
            .await?;
        Ok(updated)
    }

    /// Records the descriptor and the `file_added` entry; the caller has
    /// already stored the blob under the descriptor id.
    pub async fn attach_file(
        &self,
        actor: &Actor,
        id: Uuid,
        file: NewAttachment,
    ) -> Result<(Document, FileAttachment), LifecycleError> {
        let document = self.authorize(actor, id, Capability::AttachFile).await?;

        let mut entry = NewHistoryEntry::record(
            HistoryAction::FileAdded,
            document.id,
            &document.number,
            actor,
        );
        entry.comment = Some(format!("File uploaded: {}", file.filename));

        let descriptor_id = file.id;
        let change = DocumentChange {
            attach: Some(file),
            ..Default::default()
        };
        let updated = self
            .store
            .apply_transition(document.id, change, entry, None)
            .await?;

        let attachments = self.store.attachments_for(&[document.id]).await?;
        let attachment = attachments
            .get(&document.id)
            .and_then(|files| files.iter().find(|f| f.id == descriptor_id))
            .cloned()
            .ok_or(LifecycleError::NotFound("file"))?;
        Ok((updated, attachment))
    }

    /// Removes the descriptor and returns it so the caller can delete the
    /// blob afterwards.
    pub async fn remove_file(
        &self,
        actor: &Actor,
        id: Uuid,
        file_id: Uuid,
    ) -> Result<(Document, FileAttachment), LifecycleError> {
        let document = self.authorize(actor, id, Capability::RemoveFile).await?;

        let attachments = self.store.attachments_for(&[document.id]).await?;
        let attachment = attachments
            .get(&document.id)
            .and_then(|files| files.iter().find(|f| f.id == file_id))
            .cloned()
            .ok_or(LifecycleError::NotFound("file"))?;

        let mut entry = NewHistoryEntry::record(
            HistoryAction::FileRemoved,
            document.id,
            &document.number,
            actor,
        );
        entry.comment = Some(format!("File deleted: {}", attachment.filename));

        let change = DocumentChange {
            detach: Some(file_id),
            ..Default::default()
        };
        let updated = self
            .store
            .apply_transition(document.id, change, entry, None)
            .await?;
        Ok((updated, attachment))
    }

    /// Timeline of a document, oldest first.
    pub async fn document_timeline(
        &self,
        actor: &Actor,
        id: Uuid,
        page: Page,
    ) -> Result<Vec<HistoryEntry>, LifecycleError> {
        let document = self.authorize(actor, id, Capability::View).await?;
        Ok(self.store.document_timeline(document.id, page).await?)
    }

    /// The `forwarded` entries of a document, oldest first.
    pub async fn forwarding_chain(
        &self,
        actor: &Actor,
        id: Uuid,
    ) -> Result<Vec<HistoryEntry>, LifecycleError> {
        let document = self.authorize(actor, id, Capability::View).await?;
        Ok(self.store.forwarding_chain(document.id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewDepartment, NewUser, UserRole};
    use crate::store::memory::MemStore;
    use crate::store::{Directory, DocumentStore, LedgerStore, OutboxStore, JOB_DISPATCH_NOTIFICATIONS};

    struct Fixture {
        lifecycle: Lifecycle,
        store: Arc<MemStore>,
        education: Uuid,
        sports: Uuid,
        head: Actor,
        employee: Actor,
        outsider: Actor,
    }

    async fn seed_user(
        store: &MemStore,
        name: &str,
        role: UserRole,
        department_id: Uuid,
    ) -> Actor {
        let user = store
            .insert_user(NewUser {
                email: format!("{}@example.test", name.to_lowercase().replace(' ', ".")),
                full_name: name.to_string(),
                password_hash: "x".to_string(),
                role,
                department_id,
                active: true,
            })
            .await
            .unwrap();
        Actor::from_user(&user)
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemStore::new());
        let education = store
            .insert_department(NewDepartment {
                name: "Education".to_string(),
                code: "EDU".to_string(),
            })
            .await
            .unwrap()
            .id;
        let sports = store
            .insert_department(NewDepartment {
                name: "Sports".to_string(),
                code: "SPO".to_string(),
            })
            .await
            .unwrap()
            .id;
        let head = seed_user(&store, "Ana Varga", UserRole::DepartmentHead, education).await;
        let employee = seed_user(&store, "Plain Clerk", UserRole::Employee, education).await;
        let outsider = seed_user(&store, "Other Clerk", UserRole::Employee, sports).await;
        Fixture {
            lifecycle: Lifecycle::new(store.clone() as Arc<dyn DataStore>),
            store,
            education,
            sports,
            head,
            employee,
            outsider,
        }
    }

    fn create_input(title: &str) -> CreateDocument {
        CreateDocument {
            title: title.to_string(),
            description: "A description".to_string(),
            document_type: DocumentKind::Memo,
            priority: None,
            assigned_to: None,
            deadline: None,
            tags: Vec::new(),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn numbers_are_sequential_within_a_year() {
        let fx = fixture().await;
        let first = fx
            .lifecycle
            .create_document(&fx.head, create_input("First"))
            .await
            .unwrap();
        let second = fx
            .lifecycle
            .create_document(&fx.head, create_input("Second"))
            .await
            .unwrap();

        let year = Utc::now().year();
        assert_eq!(first.number, format!("DOC-{year}-00001"));
        assert_eq!(second.number, format!("DOC-{year}-00002"));
        assert_eq!(first.holder_department_id, fx.education);
        assert_eq!(first.status, DocumentStatus::Draft);
    }

    #[tokio::test]
    async fn blank_title_is_rejected() {
        let fx = fixture().await;
        let err = fx
            .lifecycle
            .create_document(&fx.head, create_input("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)));
    }

    #[tokio::test]
    async fn forward_needs_the_capability() {
        let fx = fixture().await;
        let document = fx
            .lifecycle
            .create_document(&fx.head, create_input("Budget"))
            .await
            .unwrap();

        let err = fx
            .lifecycle
            .forward_document(
                &fx.employee,
                document.id,
                ForwardDocument {
                    to_department_id: fx.sports,
                    assigned_to: None,
                    comment: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Forbidden));
    }

    #[tokio::test]
    async fn assignee_outside_target_department_leaves_no_trace() {
        let fx = fixture().await;
        let document = fx
            .lifecycle
            .create_document(&fx.head, create_input("Budget"))
            .await
            .unwrap();
        let before = fx
            .store
            .document_timeline(document.id, Page::default())
            .await
            .unwrap()
            .len();

        // fx.employee belongs to Education, not to the Sports target.
        let err = fx
            .lifecycle
            .forward_document(
                &fx.head,
                document.id,
                ForwardDocument {
                    to_department_id: fx.sports,
                    assigned_to: Some(fx.employee.id),
                    comment: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)));

        let after = fx
            .store
            .document_timeline(document.id, Page::default())
            .await
            .unwrap();
        assert_eq!(after.len(), before, "failed forward must not be recorded");
        let unchanged = fx.store.document(document.id).await.unwrap().unwrap();
        assert_eq!(unchanged.holder_department_id, fx.education);
    }

    #[tokio::test]
    async fn forward_without_assignee_reaches_active_members_only() {
        let fx = fixture().await;
        let inactive = fx
            .store
            .insert_user(NewUser {
                email: "gone@example.test".to_string(),
                full_name: "Gone Person".to_string(),
                password_hash: "x".to_string(),
                role: UserRole::Employee,
                department_id: fx.sports,
                active: false,
            })
            .await
            .unwrap();

        let document = fx
            .lifecycle
            .create_document(&fx.head, create_input("Budget"))
            .await
            .unwrap();
        fx.lifecycle
            .forward_document(
                &fx.head,
                document.id,
                ForwardDocument {
                    to_department_id: fx.sports,
                    assigned_to: None,
                    comment: Some("please review".to_string()),
                },
            )
            .await
            .unwrap();

        let job = fx
            .store
            .reserve_job(&[JOB_DISPATCH_NOTIFICATIONS])
            .await
            .unwrap()
            .expect("forward enqueues a dispatch job");
        let batch: NotificationBatch = serde_json::from_value(job.payload).unwrap();
        let recipients: Vec<Uuid> = batch.notices.iter().map(|n| n.user_id).collect();
        assert_eq!(recipients, vec![fx.outsider.id]);
        assert!(!recipients.contains(&inactive.id));
    }

    #[tokio::test]
    async fn archived_is_unreachable_through_status_change() {
        let fx = fixture().await;
        let document = fx
            .lifecycle
            .create_document(&fx.head, create_input("Budget"))
            .await
            .unwrap();

        let err = fx
            .lifecycle
            .change_status(
                &fx.head,
                document.id,
                StatusChange {
                    status: DocumentStatus::Archived,
                    reason: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Validation(_)));

        let archived = fx
            .lifecycle
            .archive_document(&fx.head, document.id)
            .await
            .unwrap();
        assert_eq!(archived.status, DocumentStatus::Archived);
        assert!(archived.archived_at.is_some());
    }

    #[tokio::test]
    async fn every_view_appends_an_entry() {
        let fx = fixture().await;
        let document = fx
            .lifecycle
            .create_document(&fx.head, create_input("Budget"))
            .await
            .unwrap();

        for _ in 0..3 {
            fx.lifecycle
                .view_document(&fx.employee, document.id)
                .await
                .unwrap();
        }
        let timeline = fx
            .lifecycle
            .document_timeline(&fx.head, document.id, Page::default())
            .await
            .unwrap();
        let views = timeline
            .iter()
            .filter(|entry| entry.action == HistoryAction::Viewed)
            .count();
        assert_eq!(views, 3);
    }

    #[tokio::test]
    async fn outsider_cannot_view() {
        let fx = fixture().await;
        let document = fx
            .lifecycle
            .create_document(&fx.head, create_input("Budget"))
            .await
            .unwrap();
        let err = fx
            .lifecycle
            .view_document(&fx.outsider, document.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Forbidden));
    }
}
