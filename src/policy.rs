//! Access decisions for lifecycle operations.
//!
//! Every endpoint and engine transition funnels through [`allows`], so the
//! role rules live in exactly one place.

use crate::models::{Actor, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    View,
    Forward,
    ChangeStatus,
    Archive,
    Modify,
    AttachFile,
    RemoveFile,
}

/// Whether `actor` may apply `capability` to `document`.
pub fn allows(actor: &Actor, document: &Document, capability: Capability) -> bool {
    if actor.is_admin() {
        return true;
    }

    let is_creator = document.creator_id == actor.id;
    let in_creator_department = document.creator_department_id == actor.department_id;
    let in_holder_department = document.holder_department_id == actor.department_id;
    let heads_holder_department = actor.is_department_head() && in_holder_department;
    let is_assignee = document.assigned_to == Some(actor.id);

    match capability {
        Capability::View | Capability::AttachFile => {
            is_creator || in_creator_department || in_holder_department
        }
        Capability::Forward | Capability::ChangeStatus => heads_holder_department || is_assignee,
        Capability::Archive => is_creator,
        Capability::Modify | Capability::RemoveFile => is_creator || heads_holder_department,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::models::{DocumentKind, DocumentPriority, DocumentStatus, UserRole};

    fn actor(role: UserRole, department_id: Uuid) -> Actor {
        Actor {
            id: Uuid::new_v4(),
            name: "Test Actor".to_string(),
            role,
            department_id,
        }
    }

    fn document(creator: &Actor, holder_department_id: Uuid) -> Document {
        let now = Utc::now();
        Document {
            id: Uuid::new_v4(),
            number: "DOC-2025-00001".to_string(),
            title: "Budget request".to_string(),
            description: "Quarterly budget request".to_string(),
            document_type: DocumentKind::Request,
            priority: DocumentPriority::Medium,
            status: DocumentStatus::Draft,
            creator_id: creator.id,
            creator_department_id: creator.department_id,
            holder_department_id,
            assigned_to: None,
            deadline: None,
            tags: Vec::new(),
            metadata: json!({}),
            archived_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn admin_may_do_anything() {
        let dept = Uuid::new_v4();
        let other_dept = Uuid::new_v4();
        let creator = actor(UserRole::Employee, dept);
        let doc = document(&creator, dept);
        let admin = actor(UserRole::Admin, other_dept);

        for capability in [
            Capability::View,
            Capability::Forward,
            Capability::ChangeStatus,
            Capability::Archive,
            Capability::Modify,
            Capability::AttachFile,
            Capability::RemoveFile,
        ] {
            assert!(allows(&admin, &doc, capability));
        }
    }

    #[test]
    fn view_covers_creator_and_both_departments() {
        let origin = Uuid::new_v4();
        let holder = Uuid::new_v4();
        let elsewhere = Uuid::new_v4();
        let creator = actor(UserRole::Employee, origin);
        let doc = document(&creator, holder);

        assert!(allows(&creator, &doc, Capability::View));
        assert!(allows(&actor(UserRole::Employee, origin), &doc, Capability::View));
        assert!(allows(&actor(UserRole::Employee, holder), &doc, Capability::View));
        assert!(!allows(&actor(UserRole::Employee, elsewhere), &doc, Capability::View));
        assert!(!allows(
            &actor(UserRole::DepartmentHead, elsewhere),
            &doc,
            Capability::View
        ));
    }

    #[test]
    fn forward_requires_holder_head_or_assignee() {
        let origin = Uuid::new_v4();
        let holder = Uuid::new_v4();
        let creator = actor(UserRole::Employee, origin);
        let mut doc = document(&creator, holder);

        // Creators do not get routing rights just for creating.
        assert!(!allows(&creator, &doc, Capability::Forward));
        // Plain employee of the holder department: view yes, forward no.
        let holder_employee = actor(UserRole::Employee, holder);
        assert!(allows(&holder_employee, &doc, Capability::View));
        assert!(!allows(&holder_employee, &doc, Capability::Forward));
        // Head of the holder department may route.
        assert!(allows(&actor(UserRole::DepartmentHead, holder), &doc, Capability::Forward));
        // Head of some other department may not.
        assert!(!allows(&actor(UserRole::DepartmentHead, origin), &doc, Capability::Forward));

        doc.assigned_to = Some(holder_employee.id);
        assert!(allows(&holder_employee, &doc, Capability::Forward));
        assert!(allows(&holder_employee, &doc, Capability::ChangeStatus));
    }

    #[test]
    fn archive_is_creator_or_admin_only() {
        let origin = Uuid::new_v4();
        let holder = Uuid::new_v4();
        let creator = actor(UserRole::Employee, origin);
        let doc = document(&creator, holder);

        assert!(allows(&creator, &doc, Capability::Archive));
        assert!(!allows(&actor(UserRole::DepartmentHead, holder), &doc, Capability::Archive));
        assert!(!allows(&actor(UserRole::Employee, origin), &doc, Capability::Archive));
    }

    #[test]
    fn modify_and_remove_file_align() {
        let origin = Uuid::new_v4();
        let holder = Uuid::new_v4();
        let creator = actor(UserRole::Employee, origin);
        let doc = document(&creator, holder);
        let holder_head = actor(UserRole::DepartmentHead, holder);
        let holder_employee = actor(UserRole::Employee, holder);

        for capability in [Capability::Modify, Capability::RemoveFile] {
            assert!(allows(&creator, &doc, capability));
            assert!(allows(&holder_head, &doc, capability));
            assert!(!allows(&holder_employee, &doc, capability));
        }
        // But attaching follows the view rule, so the holder employee can.
        assert!(allows(&holder_employee, &doc, Capability::AttachFile));
    }
}
