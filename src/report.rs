//! Read-only achievement statistics
//!
//! References whose detail cannot be loaded are left out of the tally.
use super::access::AccessPolicy;
use super::achievement::AchievementReference;
use super::error::WorkflowError;
use super::identity::{IdentityResolver, Principal};
use super::store::{DetailStore, ReferenceStore};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct AchievementStatistics {
    pub per_type: BTreeMap<String, usize>,
    /// Keyed by the year the detail was created.
    pub per_period: BTreeMap<String, usize>,
    /// A multi-tag achievement counts once for each of its tags.
    pub per_tag: BTreeMap<String, usize>,
    pub top_students: Vec<TopStudent>,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct TopStudent {
    pub student_id: String,
    pub full_name: String,
    pub program_study: String,
    pub academic_year: String,
    pub count: usize,
}

pub struct ReportService {
    references: Arc<dyn ReferenceStore>,
    details: Arc<dyn DetailStore>,
    access: AccessPolicy,
}

impl ReportService {
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

    /// Tally everything visible to the caller
    pub fn global_statistics(&self, principal: &Principal) -> Result<AchievementStatistics, WorkflowError> {
        let actor = self.access.resolve(principal)?;
        let student_ids = self.access.visible_students(&actor)?;
        if student_ids.is_empty() {
            return Ok(AchievementStatistics::default());
        }

        let references = self.references.get_by_student_ids(&student_ids)?;
        let (mut stats, per_student) = self.tally(&references)?;

        let profiles = self.access.identities().students_by_ids(&student_ids)?;
        for (student_id, count) in per_student {
            if let Some(profile) = profiles.get(&student_id) {
                stats.top_students.push(TopStudent {
                    student_id,
                    full_name: profile.full_name.clone(),
                    program_study: profile.program_study.clone(),
                    academic_year: profile.academic_year.clone(),
                    count,
                });
            }
        }
        stats
            .top_students
            .sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.student_id.cmp(&b.student_id)));

        Ok(stats)
    }

    /// Tally for one student. Students may only ask about themselves,
    /// advisors about their advisees.
    pub fn student_statistics(
        &self,
        principal: &Principal,
        student_id: &str,
    ) -> Result<AchievementStatistics, WorkflowError> {
        let actor = self.access.resolve(principal)?;
        self.access.ensure_student_access(&actor, student_id)?;

        let references = self
            .references
            .get_by_student_ids(&[student_id.to_string()])?;
        let (mut stats, per_student) = self.tally(&references)?;

        let profile = self
            .access
            .identities()
            .students_by_ids(&[student_id.to_string()])?
            .remove(student_id)
            .unwrap_or_default();
        stats.top_students.push(TopStudent {
            student_id: student_id.to_string(),
            full_name: profile.full_name,
            program_study: profile.program_study,
            academic_year: profile.academic_year,
            count: per_student.get(student_id).copied().unwrap_or(0),
        });

        Ok(stats)
    }

    fn tally(
        &self,
        references: &[AchievementReference],
    ) -> Result<(AchievementStatistics, BTreeMap<String, usize>), WorkflowError> {
        let detail_ids: Vec<String> = references.iter().map(|r| r.detail_ref.clone()).collect();
        let details = self.details.get_by_ids(&detail_ids)?;

        let mut stats = AchievementStatistics::default();
        let mut per_student: BTreeMap<String, usize> = BTreeMap::new();

        for reference in references {
            let Some(detail) = details.get(&reference.detail_ref) else {
                debug!(reference_id = %reference.id, "skipping reference without detail");
                continue;
            };

            *stats
                .per_type
                .entry(detail.achievement_type.clone())
                .or_default() += 1;
            *stats
                .per_period
                .entry(detail.created_at.year().to_string())
                .or_default() += 1;
            for tag in &detail.tags {
                *stats.per_tag.entry(tag.clone()).or_default() += 1;
            }
            *per_student.entry(reference.student_id.clone()).or_default() += 1;
        }

        Ok((stats, per_student))
    }
}
