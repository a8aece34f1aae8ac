//! Gateways over the two achievement stores
//!
//! The reference store holds the status record and is the authority for the
//! lifecycle. The detail store holds the free-form document. Nothing spans the
//! two: each write stands alone and the last write to a record wins.
use crate::achievement::{
    AchievementDetail, AchievementReference, Attachment, Details, NewDetail, Status, TimeStamp,
};
use crate::error::StoreError;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};

mod sled_store;

pub use sled_store::{SledDetailStore, SledDirectory, SledReferenceStore, SledStores};

pub trait ReferenceStore: Send + Sync {
    fn insert(&self, reference: &AchievementReference) -> Result<(), StoreError>;
    /// Applies `patch` and returns the stored result. Fails with
    /// `StoreError::Missing` when no reference has this id.
    fn update_fields(&self, id: &str, patch: &ReferencePatch) -> Result<AchievementReference, StoreError>;
    fn get_by_id(&self, id: &str) -> Result<Option<AchievementReference>, StoreError>;
    fn get_by_student_ids(&self, student_ids: &[String]) -> Result<Vec<AchievementReference>, StoreError>;
    fn get_all(&self) -> Result<Vec<AchievementReference>, StoreError>;
}

pub trait DetailStore: Send + Sync {
    /// Stores a new document and returns the id it was given.
    fn insert(&self, detail: NewDetail) -> Result<String, StoreError>;
    fn update_fields(&self, id: &str, patch: &DetailPatch) -> Result<AchievementDetail, StoreError>;
    fn get_by_id(&self, id: &str) -> Result<Option<AchievementDetail>, StoreError>;
    /// Ids with no stored document are simply absent from the map.
    fn get_by_ids(&self, ids: &[String]) -> Result<BTreeMap<String, AchievementDetail>, StoreError>;
    fn get_all(&self) -> Result<Vec<AchievementDetail>, StoreError>;
}

/// Partial update of a reference. `updated_at` is always refreshed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReferencePatch {
    pub status: Option<Status>,
    pub submitted_at: Option<TimeStamp<Utc>>,
    pub verified_at: Option<TimeStamp<Utc>>,
    pub verified_by: Option<String>,
    pub rejection_note: Option<String>,
}

impl ReferencePatch {
    /// Patch that only bumps `updated_at`.
    pub fn touch() -> Self {
        Self::default()
    }

    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn apply(&self, reference: &mut AchievementReference) {
        if let Some(status) = self.status {
            reference.status = status;
        }
        if let Some(at) = &self.submitted_at {
            reference.submitted_at = Some(at.clone());
        }
        if let Some(at) = &self.verified_at {
            reference.verified_at = Some(at.clone());
        }
        if let Some(by) = &self.verified_by {
            reference.verified_by = Some(by.clone());
        }
        if let Some(note) = &self.rejection_note {
            reference.rejection_note = Some(note.clone());
        }
        reference.updated_at = TimeStamp::new();
    }
}

/// Partial update of a detail document. `updated_at` is always refreshed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DetailPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub achievement_type: Option<String>,
    /// Merged into the stored map; keys not listed are kept.
    pub details: Option<Details>,
    /// Replaces the stored tag set.
    pub tags: Option<BTreeSet<String>>,
    pub push_attachment: Option<Attachment>,
    pub status: Option<Status>,
}

impl DetailPatch {
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn apply(&self, detail: &mut AchievementDetail) {
        if let Some(title) = &self.title {
            detail.title = title.clone();
        }
        if let Some(description) = &self.description {
            detail.description = description.clone();
        }
        if let Some(kind) = &self.achievement_type {
            detail.achievement_type = kind.clone();
        }
        if let Some(details) = &self.details {
            for (key, value) in details {
                detail.details.insert(key.clone(), value.clone());
            }
        }
        if let Some(tags) = &self.tags {
            detail.tags = tags.clone();
        }
        if let Some(attachment) = &self.push_attachment {
            detail.attachments.push(attachment.clone());
        }
        if let Some(status) = self.status {
            detail.status = status;
        }
        detail.updated_at = TimeStamp::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::achievement::FieldValue;

    fn sample_detail() -> AchievementDetail {
        NewDetail {
            student_id: "S1".into(),
            title: "Juara 1".into(),
            description: "Lomba debat".into(),
            achievement_type: "Lomba".into(),
            details: Details::from([
                ("level".to_string(), FieldValue::from("national")),
                ("organizer".to_string(), FieldValue::from("Kemdikbud")),
            ]),
            tags: BTreeSet::from(["debat".to_string()]),
        }
        .into_detail("det1".into())
    }

    #[test]
    fn detail_merge_keeps_unmentioned_keys() {
        let mut detail = sample_detail();
        let patch = DetailPatch {
            details: Some(Details::from([
                ("level".to_string(), FieldValue::from("international")),
                ("rank".to_string(), FieldValue::Integer(1)),
            ])),
            ..DetailPatch::default()
        };

        patch.apply(&mut detail);

        assert_eq!(detail.details["level"], FieldValue::from("international"));
        assert_eq!(detail.details["organizer"], FieldValue::from("Kemdikbud"));
        assert_eq!(detail.details["rank"], FieldValue::Integer(1));
        assert_eq!(detail.title, "Juara 1");
    }

    #[test]
    fn reference_patch_sets_only_given_fields() {
        let mut reference =
            AchievementReference::new_draft("ach1".into(), "S1".into(), "det1".into());
        let before = reference.updated_at.clone();

        ReferencePatch::status(Status::Deleted).apply(&mut reference);

        assert_eq!(reference.status, Status::Deleted);
        assert!(reference.submitted_at.is_none());
        assert!(reference.updated_at >= before);
    }
}
