//! Cross-store consistency scan
//!
//! Diffs every reference against every detail document and reports what
//! has drifted. Nothing is repaired here.
use super::achievement::Status;
use super::error::WorkflowError;
use super::store::{DetailStore, ReferenceStore};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::info;

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StatusDrift {
    pub reference_id: String,
    pub detail_id: String,
    pub reference_status: Status,
    pub detail_status: Status,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconciliationReport {
    /// Detail ids no reference points at.
    pub orphan_details: Vec<String>,
    /// Reference ids whose detail is missing.
    pub dangling_references: Vec<String>,
    pub status_drift: Vec<StatusDrift>,
    /// Reference ids whose detail names a different student.
    pub owner_mismatches: Vec<String>,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.orphan_details.is_empty()
            && self.dangling_references.is_empty()
            && self.status_drift.is_empty()
            && self.owner_mismatches.is_empty()
    }
}

pub struct Reconciler {
    references: Arc<dyn ReferenceStore>,
    details: Arc<dyn DetailStore>,
}

impl Reconciler {
    pub fn new(references: Arc<dyn ReferenceStore>, details: Arc<dyn DetailStore>) -> Self {
        Self {
            references,
            details,
        }
    }

    pub fn scan(&self) -> Result<ReconciliationReport, WorkflowError> {
        let references = self.references.get_all()?;
        let details: BTreeMap<String, _> = self
            .details
            .get_all()?
            .into_iter()
            .map(|d| (d.id.clone(), d))
            .collect();

        let mut report = ReconciliationReport::default();
        let mut claimed = BTreeSet::new();

        for reference in &references {
            claimed.insert(reference.detail_ref.clone());
            let Some(detail) = details.get(&reference.detail_ref) else {
                report.dangling_references.push(reference.id.clone());
                continue;
            };
            if detail.student_id != reference.student_id {
                report.owner_mismatches.push(reference.id.clone());
            }
            if detail.status != reference.status {
                report.status_drift.push(StatusDrift {
                    reference_id: reference.id.clone(),
                    detail_id: detail.id.clone(),
                    reference_status: reference.status,
                    detail_status: detail.status,
                });
            }
        }

        report.orphan_details = details
            .keys()
            .filter(|id| !claimed.contains(*id))
            .cloned()
            .collect();

        info!(
            references = references.len(),
            details = details.len(),
            orphans = report.orphan_details.len(),
            dangling = report.dangling_references.len(),
            drifted = report.status_drift.len(),
            "reconciliation scan finished"
        );
        Ok(report)
    }
}
