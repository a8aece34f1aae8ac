//! Achievement records, the status lifecycle and the draft builder
use super::error::WorkflowError;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Lifecycle state of an achievement.
///
/// `Draft -> Submitted -> {Verified | Rejected}` and `Draft -> Deleted` are
/// the only legal moves. Everything except `Draft` and `Submitted` is terminal.
#[derive(
    minicbor::Encode,
    minicbor::Decode,
    Serialize,
    Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[n(0)]
    Draft,
    #[n(1)]
    Submitted,
    #[n(2)]
    Verified,
    #[n(3)]
    Rejected,
    #[n(4)]
    Deleted,
}

impl Status {
    pub const ALL: [Status; 5] = [
        Status::Draft,
        Status::Submitted,
        Status::Verified,
        Status::Rejected,
        Status::Deleted,
    ];

    pub fn can_transition_to(self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Draft, Status::Submitted)
                | (Status::Draft, Status::Deleted)
                | (Status::Submitted, Status::Verified)
                | (Status::Submitted, Status::Rejected)
        )
    }

    /// Checks the move and hands back the new state, or `InvalidState`.
    pub fn transition(self, next: Status) -> Result<Status, WorkflowError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(WorkflowError::InvalidState(format!(
                "cannot move an achievement from {self} to {next}"
            )))
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Status::Draft | Status::Submitted)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Draft => write!(f, "draft"),
            Status::Submitted => write!(f, "submitted"),
            Status::Verified => write!(f, "verified"),
            Status::Rejected => write!(f, "rejected"),
            Status::Deleted => write!(f, "deleted"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl<T: TimeZone> PartialEq for TimeStamp<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: TimeZone> Eq for TimeStamp<T> {}

impl<T: TimeZone> PartialOrd for TimeStamp<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: TimeZone> Ord for TimeStamp<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    /// Calendar year used to bucket statistics by period.
    pub fn year(&self) -> i32 {
        self.0.year()
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

impl Serialize for TimeStamp<Utc> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_rfc3339())
    }
}

/// A value inside the open `details` map. Its shape depends on the
/// achievement type, so the map is kept schemaless.
#[derive(minicbor::Encode, minicbor::Decode, Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    #[n(0)]
    Null,
    #[n(1)]
    Bool(#[n(0)] bool),
    #[n(2)]
    Integer(#[n(0)] i64),
    #[n(3)]
    Float(#[n(0)] f64),
    #[n(4)]
    Text(#[n(0)] String),
    #[n(5)]
    List(#[n(0)] Vec<FieldValue>),
    #[n(6)]
    Map(#[n(0)] BTreeMap<String, FieldValue>),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

pub type Details = BTreeMap<String, FieldValue>;

#[derive(minicbor::Encode, minicbor::Decode, Serialize, Debug, Clone, PartialEq)]
pub struct Attachment {
    #[n(0)]
    pub file_name: String,
    #[n(1)]
    pub file_url: String,
    #[n(2)]
    pub file_type: String,
    #[n(3)]
    pub uploaded_at: TimeStamp<Utc>,
}

impl Attachment {
    pub fn new(file_name: &str, file_url: &str, file_type: &str) -> Self {
        Self {
            file_name: file_name.to_string(),
            file_url: file_url.to_string(),
            file_type: file_type.to_string(),
            uploaded_at: TimeStamp::new(),
        }
    }
}

/// Relational record. Authoritative for status, ownership and audit columns.
#[derive(minicbor::Encode, minicbor::Decode, Serialize, Debug, Clone, PartialEq)]
pub struct AchievementReference {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub student_id: String,
    #[n(2)]
    pub detail_ref: String,
    #[n(3)]
    pub status: Status,
    #[n(4)]
    pub submitted_at: Option<TimeStamp<Utc>>,
    #[n(5)]
    pub verified_at: Option<TimeStamp<Utc>>,
    #[n(6)]
    pub verified_by: Option<String>,
    #[n(7)]
    pub rejection_note: Option<String>,
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
    #[n(9)]
    pub updated_at: TimeStamp<Utc>,
}

impl AchievementReference {
    pub fn new_draft(id: String, student_id: String, detail_ref: String) -> Self {
        let now = TimeStamp::new();
        Self {
            id,
            student_id,
            detail_ref,
            status: Status::Draft,
            submitted_at: None,
            verified_at: None,
            verified_by: None,
            rejection_note: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Audit columns agree with the status: verification fields only on
    /// `Verified`, a note only on `Rejected`, and a submission time on
    /// anything that went through `Submitted`.
    pub fn is_well_formed(&self) -> bool {
        let verified = self.verified_at.is_some() && self.verified_by.is_some();
        let unverified = self.verified_at.is_none() && self.verified_by.is_none();
        let verification_ok = match self.status {
            Status::Verified => verified,
            _ => unverified,
        };
        let note_ok = (self.status == Status::Rejected) == self.rejection_note.is_some();
        let submitted_ok = match self.status {
            Status::Submitted | Status::Verified | Status::Rejected => self.submitted_at.is_some(),
            Status::Draft | Status::Deleted => self.submitted_at.is_none(),
        };

        verification_ok && note_ok && submitted_ok
    }
}

/// Document record. Authoritative for content; `status` is a mirror.
#[derive(minicbor::Encode, minicbor::Decode, Serialize, Debug, Clone, PartialEq)]
pub struct AchievementDetail {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub student_id: String,
    #[n(2)]
    pub title: String,
    #[n(3)]
    pub description: String,
    #[n(4)]
    pub achievement_type: String,
    #[n(5)]
    pub details: Details,
    #[n(6)]
    pub tags: BTreeSet<String>,
    #[n(7)]
    pub attachments: Vec<Attachment>,
    #[n(8)]
    pub status: Status,
    #[n(9)]
    pub created_at: TimeStamp<Utc>,
    #[n(10)]
    pub updated_at: TimeStamp<Utc>,
}

/// Content of a detail before the store has given it an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDetail {
    pub student_id: String,
    pub title: String,
    pub description: String,
    pub achievement_type: String,
    pub details: Details,
    pub tags: BTreeSet<String>,
}

impl NewDetail {
    pub fn into_detail(self, id: String) -> AchievementDetail {
        let now = TimeStamp::new();
        AchievementDetail {
            id,
            student_id: self.student_id,
            title: self.title,
            description: self.description,
            achievement_type: self.achievement_type,
            details: self.details,
            tags: self.tags,
            attachments: vec![],
            status: Status::Draft,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

// Used for constructing drafts, the student id is filled in by the service
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AchievementDraft {
    title: Option<String>,
    description: String,
    achievement_type: Option<String>,
    details: Details,
    tags: BTreeSet<String>,
}

impl AchievementDraft {
    /// Construct a new builder object, this becomes the basis for a draft
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }
    pub fn set_achievement_type(mut self, achievement_type: &str) -> Self {
        self.achievement_type = Some(achievement_type.to_string());
        self
    }
    pub fn set_detail(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
    pub fn set_details(mut self, details: Details) -> Self {
        self.details = details;
        self
    }
    pub fn add_tag(mut self, tag: &str) -> Self {
        self.tags.insert(tag.to_string());
        self
    }
    pub fn set_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    // Checks the required fields and binds the draft to its owner
    pub fn validate_and_finalise(self, student_id: &str) -> Result<NewDetail, WorkflowError> {
        let title = non_blank(self.title, "title")?;
        let achievement_type = non_blank(self.achievement_type, "achievement_type")?;

        Ok(NewDetail {
            student_id: student_id.to_string(),
            title,
            description: self.description,
            achievement_type,
            details: self.details,
            tags: self.tags,
        })
    }
}

/// Field changes applied to a draft's detail.
///
/// `None` leaves a field alone. `details` is merged key by key: given keys
/// overwrite, keys not mentioned pass through untouched. `tags` replaces the
/// whole set.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AchievementChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub achievement_type: Option<String>,
    pub details: Option<Details>,
    pub tags: Option<BTreeSet<String>>,
}

impl AchievementChanges {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }
    pub fn set_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
    pub fn set_achievement_type(mut self, achievement_type: &str) -> Self {
        self.achievement_type = Some(achievement_type.to_string());
        self
    }
    pub fn set_detail(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.details
            .get_or_insert_with(Details::new)
            .insert(key.to_string(), value.into());
        self
    }
    pub fn set_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// A present title or type may not be blank.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if let Some(title) = &self.title {
            non_blank(Some(title.clone()), "title")?;
        }
        if let Some(kind) = &self.achievement_type {
            non_blank(Some(kind.clone()), "achievement_type")?;
        }
        Ok(())
    }
}

fn non_blank(value: Option<String>, field: &str) -> Result<String, WorkflowError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(WorkflowError::InvalidArgument(format!("{field} is required"))),
    }
}

/// Reference merged with its detail, as returned by a single lookup.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AchievementView {
    #[serde(flatten)]
    pub reference: AchievementReference,
    pub detail: AchievementDetail,
}

/// Reference with whatever detail could be joined to it.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ListedAchievement {
    #[serde(flatten)]
    pub reference: AchievementReference,
    pub detail: Option<AchievementDetail>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "view", content = "items", rename_all = "snake_case")]
pub enum AchievementListing {
    /// Student view: own references only.
    References(Vec<AchievementReference>),
    /// Advisor and admin view: references joined with details.
    Merged(Vec<ListedAchievement>),
}

impl AchievementListing {
    pub fn len(&self) -> usize {
        match self {
            AchievementListing::References(refs) => refs.len(),
            AchievementListing::Merged(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reference_ids(&self) -> Vec<String> {
        match self {
            AchievementListing::References(refs) => refs.iter().map(|r| r.id.clone()).collect(),
            AchievementListing::Merged(items) => {
                items.iter().map(|i| i.reference.id.clone()).collect()
            }
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub status: Status,
    pub at: TimeStamp<Utc>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Notification {
    pub student_id: String,
    pub title: String,
    pub message: String,
    pub sent_at: TimeStamp<Utc>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct VerifyOutcome {
    pub id: String,
    pub status: Status,
    pub verified_by: String,
    pub notification: Notification,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct RejectOutcome {
    pub id: String,
    pub status: Status,
    pub rejection_note: String,
    pub notification: Notification,
}
