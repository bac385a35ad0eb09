//! Fan-out planning for document transitions.
//!
//! Each transition derives its recipient set and message content here, at
//! the moment the transition commits. The resulting [`NotificationBatch`]
//! travels as the outbox job payload, so later directory changes cannot
//! alter who gets told. Notification ids are generated at plan time, which
//! lets the dispatcher insert idempotently when a job is redelivered.

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::models::{Actor, Document, DocumentStatus, NewNotification, NotificationKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedNotification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub document_id: Uuid,
    pub document_number: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub metadata: serde_json::Value,
}

impl From<PlannedNotification> for NewNotification {
    fn from(planned: PlannedNotification) -> Self {
        NewNotification {
            id: planned.id,
            user_id: planned.user_id,
            document_id: planned.document_id,
            kind: planned.kind,
            title: planned.title,
            message: planned.message,
            metadata: planned.metadata,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationBatch {
    pub notices: Vec<PlannedNotification>,
}

impl NotificationBatch {
    pub fn is_empty(&self) -> bool {
        self.notices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.notices.len()
    }

    /// `Some(self)` when there is anything to deliver, for direct use as a
    /// transition's fan-out argument.
    pub fn into_option(self) -> Option<Self> {
        if self.is_empty() {
            None
        } else {
            Some(self)
        }
    }
}

fn planned(
    document: &Document,
    user_id: Uuid,
    kind: NotificationKind,
    title: String,
    message: String,
    metadata: serde_json::Value,
) -> PlannedNotification {
    PlannedNotification {
        id: Uuid::new_v4(),
        user_id,
        document_id: document.id,
        document_number: document.number.clone(),
        kind,
        title,
        message,
        metadata,
    }
}

/// Create with an initial assignee: tell the assignee.
pub fn document_created(document: &Document, assignee: Uuid) -> NotificationBatch {
    NotificationBatch {
        notices: vec![planned(
            document,
            assignee,
            NotificationKind::DocumentReceived,
            format!("New Document Assigned: {}", document.number),
            format!(
                "You have been assigned document '{}' ({})",
                document.title, document.number
            ),
            json!({ "action": "assigned" }),
        )],
    }
}

/// Who receives a forward: the named assignee, or everyone active in the
/// target department as resolved when the forward committed.
#[derive(Debug, Clone)]
pub enum ForwardAudience {
    Assignee(Uuid),
    Department { name: String, user_ids: Vec<Uuid> },
}

pub fn document_forwarded(
    document: &Document,
    actor: &Actor,
    from_department_id: Uuid,
    to_department_id: Uuid,
    audience: ForwardAudience,
) -> NotificationBatch {
    let metadata = json!({
        "from_department_id": from_department_id,
        "to_department_id": to_department_id,
        "forwarded_by": actor.id,
    });

    let notices = match audience {
        ForwardAudience::Assignee(user_id) => vec![planned(
            document,
            user_id,
            NotificationKind::DocumentForwarded,
            format!("Document Forwarded to You: {}", document.number),
            format!(
                "'{}' has been forwarded to you by {}",
                document.title, actor.name
            ),
            metadata,
        )],
        ForwardAudience::Department { name, user_ids } => user_ids
            .into_iter()
            .map(|user_id| {
                planned(
                    document,
                    user_id,
                    NotificationKind::DocumentForwarded,
                    format!("Document Forwarded to {}: {}", name, document.number),
                    format!(
                        "'{}' has been forwarded to your department by {}",
                        document.title, actor.name
                    ),
                    metadata.clone(),
                )
            })
            .collect(),
    };

    NotificationBatch { notices }
}

/// Status change: tell the creator, and the assignee when distinct. The
/// actor is not excluded; someone moving their own document still sees the
/// change in their inbox.
pub fn status_changed(
    document: &Document,
    actor: &Actor,
    old_status: DocumentStatus,
    new_status: DocumentStatus,
) -> NotificationBatch {
    let mut recipients = vec![document.creator_id];
    if let Some(assignee) = document.assigned_to {
        if assignee != document.creator_id {
            recipients.push(assignee);
        }
    }
    status_notices(document, actor, old_status, new_status, recipients)
}

/// Archive: tell the creator, with the same status-change template.
pub fn document_archived(
    document: &Document,
    actor: &Actor,
    old_status: DocumentStatus,
) -> NotificationBatch {
    status_notices(
        document,
        actor,
        old_status,
        DocumentStatus::Archived,
        vec![document.creator_id],
    )
}

fn status_notices(
    document: &Document,
    actor: &Actor,
    old_status: DocumentStatus,
    new_status: DocumentStatus,
    recipients: Vec<Uuid>,
) -> NotificationBatch {
    let metadata = json!({
        "old_status": old_status.as_str(),
        "new_status": new_status.as_str(),
        "changed_by": actor.id,
    });
    let notices = recipients
        .into_iter()
        .map(|user_id| {
            planned(
                document,
                user_id,
                NotificationKind::StatusChanged,
                format!("Status Changed: {}", document.number),
                format!(
                    "Document '{}' status changed from {} to {} by {}",
                    document.title, old_status, new_status, actor.name
                ),
                metadata.clone(),
            )
        })
        .collect();
    NotificationBatch { notices }
}

/// Reassignment through a modify: tell the new assignee.
pub fn document_assigned(document: &Document, actor: &Actor, assignee: Uuid) -> NotificationBatch {
    NotificationBatch {
        notices: vec![planned(
            document,
            assignee,
            NotificationKind::DocumentReceived,
            format!("Document Assigned to You: {}", document.number),
            format!(
                "You have been assigned document '{}' by {}",
                document.title, actor.name
            ),
            json!({ "assigned_by": actor.id }),
        )],
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::*;
    use crate::models::{DocumentKind, DocumentPriority, UserRole};

    fn sample_document(creator_id: Uuid, assigned_to: Option<Uuid>) -> Document {
        let now = Utc::now();
        Document {
            id: Uuid::new_v4(),
            number: "DOC-2025-00007".to_string(),
            title: "Road maintenance plan".to_string(),
            description: "Plan for the northern district".to_string(),
            document_type: DocumentKind::Report,
            priority: DocumentPriority::High,
            status: DocumentStatus::Pending,
            creator_id,
            creator_department_id: Uuid::new_v4(),
            holder_department_id: Uuid::new_v4(),
            assigned_to,
            deadline: None,
            tags: Vec::new(),
            metadata: json!({}),
            archived_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_actor() -> Actor {
        Actor {
            id: Uuid::new_v4(),
            name: "Maria Ionescu".to_string(),
            role: UserRole::DepartmentHead,
            department_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn created_notice_targets_assignee_with_number() {
        let assignee = Uuid::new_v4();
        let doc = sample_document(Uuid::new_v4(), Some(assignee));
        let batch = document_created(&doc, assignee);

        assert_eq!(batch.len(), 1);
        let notice = &batch.notices[0];
        assert_eq!(notice.user_id, assignee);
        assert_eq!(notice.kind, NotificationKind::DocumentReceived);
        assert_eq!(notice.title, "New Document Assigned: DOC-2025-00007");
        assert_eq!(
            notice.message,
            "You have been assigned document 'Road maintenance plan' (DOC-2025-00007)"
        );
        assert_eq!(notice.metadata["action"], "assigned");
    }

    #[test]
    fn department_forward_fans_out_to_every_listed_user() {
        let actor = sample_actor();
        let doc = sample_document(Uuid::new_v4(), None);
        let users = vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let from = Uuid::new_v4();
        let to = Uuid::new_v4();

        let batch = document_forwarded(
            &doc,
            &actor,
            from,
            to,
            ForwardAudience::Department {
                name: "Education".to_string(),
                user_ids: users.clone(),
            },
        );

        assert_eq!(batch.len(), 3);
        for (notice, user_id) in batch.notices.iter().zip(users) {
            assert_eq!(notice.user_id, user_id);
            assert_eq!(
                notice.title,
                "Document Forwarded to Education: DOC-2025-00007"
            );
            assert_eq!(
                notice.message,
                "'Road maintenance plan' has been forwarded to your department by Maria Ionescu"
            );
            assert_eq!(notice.metadata["forwarded_by"], json!(actor.id));
            assert_eq!(notice.metadata["to_department_id"], json!(to));
        }
        // Plan-time ids must be distinct per recipient.
        assert_ne!(batch.notices[0].id, batch.notices[1].id);
    }

    #[test]
    fn assignee_forward_is_personal() {
        let actor = sample_actor();
        let doc = sample_document(Uuid::new_v4(), None);
        let assignee = Uuid::new_v4();

        let batch = document_forwarded(
            &doc,
            &actor,
            Uuid::new_v4(),
            Uuid::new_v4(),
            ForwardAudience::Assignee(assignee),
        );

        assert_eq!(batch.len(), 1);
        assert_eq!(batch.notices[0].title, "Document Forwarded to You: DOC-2025-00007");
        assert_eq!(
            batch.notices[0].message,
            "'Road maintenance plan' has been forwarded to you by Maria Ionescu"
        );
    }

    #[test]
    fn status_change_tells_creator_and_distinct_assignee() {
        let actor = sample_actor();
        let creator = Uuid::new_v4();
        let assignee = Uuid::new_v4();

        let both = status_changed(
            &sample_document(creator, Some(assignee)),
            &actor,
            DocumentStatus::Pending,
            DocumentStatus::Completed,
        );
        assert_eq!(both.len(), 2);
        assert_eq!(both.notices[0].user_id, creator);
        assert_eq!(both.notices[1].user_id, assignee);
        assert_eq!(
            both.notices[0].message,
            "Document 'Road maintenance plan' status changed from pending to completed by Maria Ionescu"
        );
        assert_eq!(both.notices[0].metadata["old_status"], "pending");
        assert_eq!(both.notices[0].metadata["new_status"], "completed");

        let solo = status_changed(
            &sample_document(creator, Some(creator)),
            &actor,
            DocumentStatus::Draft,
            DocumentStatus::Pending,
        );
        assert_eq!(solo.len(), 1, "self-assigned creator is told once");
    }

    #[test]
    fn archive_notice_reuses_status_template() {
        let actor = sample_actor();
        let creator = Uuid::new_v4();
        let batch = document_archived(
            &sample_document(creator, None),
            &actor,
            DocumentStatus::Completed,
        );

        assert_eq!(batch.len(), 1);
        assert_eq!(batch.notices[0].user_id, creator);
        assert_eq!(batch.notices[0].kind, NotificationKind::StatusChanged);
        assert_eq!(batch.notices[0].metadata["new_status"], "archived");
    }

    #[test]
    fn empty_batch_collapses_to_none() {
        let batch = NotificationBatch::default();
        assert!(batch.into_option().is_none());
    }
}
