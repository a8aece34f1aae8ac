//! Service layer API for achievement workflow operations
//!
//! Every transition is checked and committed against the reference store
//! first. The status is then mirrored onto the detail document on a
//! best-effort basis: a failed mirror is logged and left for reconciliation,
//! it never fails the call or rolls the reference back.
use super::access::AccessPolicy;
use super::achievement::{
    AchievementChanges, AchievementDraft, AchievementListing, AchievementReference, AchievementView,
    Attachment, HistoryEntry, ListedAchievement, Notification, RejectOutcome, Status, TimeStamp,
    VerifyOutcome,
};
use super::error::WorkflowError;
use super::identity::{Actor, IdentityResolver, Principal, Role};
use super::store::{DetailPatch, DetailStore, ReferencePatch, ReferenceStore};
use super::utils::{self, REFERENCE_HRP};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct AchievementService {
    references: Arc<dyn ReferenceStore>,
    details: Arc<dyn DetailStore>,
    access: AccessPolicy,
}

impl AchievementService {
    pub fn new(
        references: Arc<dyn ReferenceStore>,
        details: Arc<dyn DetailStore>,
        identities: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            references,
            details,
            access: AccessPolicy::new(identities),
        }
    }

    pub fn access(&self) -> &AccessPolicy {
        &self.access
    }

    /// Load a reference, `NotFound` if absent
    fn load_reference(&self, id: &str) -> Result<AchievementReference, WorkflowError> {
        self.references
            .get_by_id(id)?
            .ok_or_else(|| WorkflowError::NotFound(format!("achievement {id} not found")))
    }

    /// Copy the reference status onto its detail. Failures are only logged.
    fn mirror_status(&self, reference: &AchievementReference) {
        let patch = DetailPatch::status(reference.status);
        if let Err(err) = self.details.update_fields(&reference.detail_ref, &patch) {
            warn!(
                reference_id = %reference.id,
                detail_id = %reference.detail_ref,
                status = %reference.status,
                error = %err,
                "detail status mirror failed, reference left authoritative"
            );
        }
    }

    /// Join references to their details. Missing details come back as `None`.
    fn merge(&self, references: Vec<AchievementReference>) -> Result<Vec<ListedAchievement>, WorkflowError> {
        let detail_ids: Vec<String> = references.iter().map(|r| r.detail_ref.clone()).collect();
        let mut details = self.details.get_by_ids(&detail_ids)?;

        Ok(references
            .into_iter()
            .map(|reference| {
                let detail = details.remove(&reference.detail_ref);
                if detail.is_none() {
                    debug!(reference_id = %reference.id, "reference has no detail document");
                }
                ListedAchievement { reference, detail }
            })
            .collect())
    }

    /// Owner-only guard shared by the draft editing operations
    fn load_owned_draft(&self, id: &str, principal: &Principal) -> Result<AchievementReference, WorkflowError> {
        let reference = self.load_reference(id)?;
        let student_id = self.access.resolve_student(principal)?;
        if reference.student_id != student_id {
            return Err(WorkflowError::Forbidden(
                "achievement belongs to another student".into(),
            ));
        }
        if reference.status != Status::Draft {
            return Err(WorkflowError::InvalidState(format!(
                "only draft achievements can be edited, this one is {}",
                reference.status
            )));
        }
        Ok(reference)
    }

    /// Create a new draft for the calling student and return its reference id
    pub fn create(&self, principal: &Principal, draft: AchievementDraft) -> Result<String, WorkflowError> {
        if principal.role != Role::Student {
            return Err(WorkflowError::Forbidden(
                "only students can record achievements".into(),
            ));
        }
        let student_id = self.access.resolve_student(principal)?;
        let new_detail = draft.validate_and_finalise(&student_id)?;

        // The detail goes first so a stored reference never points at nothing
        let detail_id = self.details.insert(new_detail)?;

        let reference_id = utils::new_uuid_to_bech32(REFERENCE_HRP).map_err(|err| {
            error!(error = %err, detail_id = %detail_id, "reference id generation failed, detail orphaned");
            WorkflowError::Storage("failed to create achievement".into())
        })?;
        let reference = AchievementReference::new_draft(reference_id.clone(), student_id.clone(), detail_id.clone());

        if let Err(err) = self.references.insert(&reference) {
            warn!(detail_id = %detail_id, "reference insert failed, detail orphaned");
            return Err(err.into());
        }

        info!(reference_id = %reference_id, student_id = %student_id, "achievement created");
        Ok(reference_id)
    }

    /// Submit a draft for advisor verification
    pub fn submit(&self, id: &str) -> Result<AchievementReference, WorkflowError> {
        let reference = self.load_reference(id)?;
        let status = reference.status.transition(Status::Submitted)?;

        let patch = ReferencePatch {
            status: Some(status),
            submitted_at: Some(TimeStamp::new()),
            ..ReferencePatch::default()
        };
        let reference = self.references.update_fields(id, &patch)?;
        self.mirror_status(&reference);

        info!(reference_id = %id, "achievement submitted");
        Ok(reference)
    }

    /// Edit the content of one of the caller's drafts
    pub fn update(
        &self,
        id: &str,
        principal: &Principal,
        changes: AchievementChanges,
    ) -> Result<(), WorkflowError> {
        let reference = self.load_owned_draft(id, principal)?;
        changes.validate()?;

        let patch = DetailPatch {
            title: changes.title,
            description: changes.description,
            achievement_type: changes.achievement_type,
            details: changes.details,
            tags: changes.tags,
            ..DetailPatch::default()
        };
        self.details.update_fields(&reference.detail_ref, &patch)?;
        self.references.update_fields(id, &ReferencePatch::touch())?;

        info!(reference_id = %id, "achievement updated");
        Ok(())
    }

    /// Record attachment metadata on one of the caller's drafts
    pub fn add_attachment(
        &self,
        id: &str,
        principal: &Principal,
        attachment: Attachment,
    ) -> Result<(), WorkflowError> {
        if attachment.file_name.trim().is_empty() || attachment.file_url.trim().is_empty() {
            return Err(WorkflowError::InvalidArgument(
                "attachment needs a file name and url".into(),
            ));
        }
        let reference = self.load_owned_draft(id, principal)?;

        let patch = DetailPatch {
            push_attachment: Some(attachment),
            ..DetailPatch::default()
        };
        self.details.update_fields(&reference.detail_ref, &patch)?;
        self.references.update_fields(id, &ReferencePatch::touch())?;

        info!(reference_id = %id, "attachment recorded");
        Ok(())
    }

    /// Soft delete a draft
    pub fn delete(&self, id: &str) -> Result<(), WorkflowError> {
        let reference = self.load_reference(id)?;
        let status = reference.status.transition(Status::Deleted)?;

        let reference = self.references.update_fields(id, &ReferencePatch::status(status))?;
        self.mirror_status(&reference);

        info!(reference_id = %id, "achievement deleted");
        Ok(())
    }

    /// Verify a submitted achievement of one of the caller's advisees
    pub fn verify(&self, id: &str, principal: &Principal) -> Result<VerifyOutcome, WorkflowError> {
        let reference = self.load_reference(id)?;
        let status = reference.status.transition(Status::Verified)?;

        let advisor_id = self.access.resolve_advisor(principal)?;
        self.access
            .ensure_access(&Actor::Advisor(advisor_id.clone()), &reference)?;

        let patch = ReferencePatch {
            status: Some(status),
            verified_at: Some(TimeStamp::new()),
            verified_by: Some(advisor_id.clone()),
            ..ReferencePatch::default()
        };
        let reference = self.references.update_fields(id, &patch)?;
        self.mirror_status(&reference);

        info!(reference_id = %id, advisor_id = %advisor_id, "achievement verified");
        Ok(VerifyOutcome {
            id: reference.id,
            status: reference.status,
            verified_by: advisor_id,
            notification: Notification {
                student_id: reference.student_id,
                title: "Achievement verified".into(),
                message: "Your achievement has been verified by your academic advisor.".into(),
                sent_at: TimeStamp::new(),
            },
        })
    }

    /// Reject a submitted achievement of one of the caller's advisees
    pub fn reject(&self, id: &str, principal: &Principal, note: &str) -> Result<RejectOutcome, WorkflowError> {
        let note = note.trim();
        if note.is_empty() {
            return Err(WorkflowError::InvalidArgument(
                "a rejection note is required".into(),
            ));
        }

        let reference = self.load_reference(id)?;
        let status = reference.status.transition(Status::Rejected)?;

        let advisor_id = self.access.resolve_advisor(principal)?;
        self.access
            .ensure_access(&Actor::Advisor(advisor_id.clone()), &reference)?;

        let patch = ReferencePatch {
            status: Some(status),
            rejection_note: Some(note.to_string()),
            ..ReferencePatch::default()
        };
        let reference = self.references.update_fields(id, &patch)?;
        self.mirror_status(&reference);

        info!(reference_id = %id, advisor_id = %advisor_id, "achievement rejected");
        Ok(RejectOutcome {
            id: reference.id,
            status: reference.status,
            rejection_note: note.to_string(),
            notification: Notification {
                student_id: reference.student_id,
                title: "Achievement rejected".into(),
                message: format!("Your achievement was rejected. Note: {note}"),
                sent_at: TimeStamp::new(),
            },
        })
    }

    /// A single achievement with its detail, if the caller may see it
    pub fn get_by_id(&self, id: &str, principal: &Principal) -> Result<AchievementView, WorkflowError> {
        let reference = self.load_reference(id)?;
        let actor = self.access.resolve(principal)?;
        self.access.ensure_access(&actor, &reference)?;

        let detail = self.details.get_by_id(&reference.detail_ref)?.ok_or_else(|| {
            WorkflowError::NotFound(format!("detail for achievement {id} not found"))
        })?;

        debug!(reference_id = %id, "achievement loaded");
        Ok(AchievementView { reference, detail })
    }

    /// Status timeline of an achievement derived from its audit columns
    pub fn history(&self, id: &str, principal: &Principal) -> Result<Vec<HistoryEntry>, WorkflowError> {
        let reference = self.load_reference(id)?;
        let actor = self.access.resolve(principal)?;
        self.access.ensure_access(&actor, &reference)?;

        let mut entries = vec![HistoryEntry {
            status: Status::Draft,
            at: reference.created_at.clone(),
        }];
        if let Some(at) = &reference.submitted_at {
            entries.push(HistoryEntry {
                status: Status::Submitted,
                at: at.clone(),
            });
        }
        match reference.status {
            Status::Verified => entries.push(HistoryEntry {
                status: Status::Verified,
                at: reference
                    .verified_at
                    .clone()
                    .unwrap_or_else(|| reference.updated_at.clone()),
            }),
            Status::Rejected | Status::Deleted => entries.push(HistoryEntry {
                status: reference.status,
                at: reference.updated_at.clone(),
            }),
            Status::Draft | Status::Submitted => {}
        }
        Ok(entries)
    }

    /// Role-dispatched listing
    pub fn list(&self, principal: &Principal) -> Result<AchievementListing, WorkflowError> {
        match self.access.resolve(principal)? {
            Actor::Student(student_id) => Ok(AchievementListing::References(
                self.references.get_by_student_ids(&[student_id])?,
            )),
            Actor::Advisor(advisor_id) => {
                let advisees = self.access.identities().advisees(&advisor_id)?;
                if advisees.is_empty() {
                    return Ok(AchievementListing::Merged(vec![]));
                }
                let references = self.references.get_by_student_ids(&advisees)?;
                Ok(AchievementListing::Merged(self.merge(references)?))
            }
            Actor::Admin => {
                let references = self.references.get_all()?;
                Ok(AchievementListing::Merged(self.merge(references)?))
            }
        }
    }

    /// All achievements of one student with details, skipping any whose
    /// detail document is missing
    pub fn student_achievements(
        &self,
        principal: &Principal,
        student_id: &str,
    ) -> Result<Vec<AchievementView>, WorkflowError> {
        let actor = self.access.resolve(principal)?;
        self.access.ensure_student_access(&actor, student_id)?;

        let references = self.references.get_by_student_ids(&[student_id.to_string()])?;
        Ok(self
            .merge(references)?
            .into_iter()
            .filter_map(|item| {
                item.detail.map(|detail| AchievementView {
                    reference: item.reference,
                    detail,
                })
            })
            .collect())
    }
}
