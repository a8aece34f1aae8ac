//! Read access to the student and lecturer directory
//!
//! Admins see everyone. Advisors see the lecturer list, their own advisees and
//! those advisees' profiles. Students have no directory access.
use super::access::AccessPolicy;
use super::error::WorkflowError;
use super::identity::{Actor, Lecturer, Principal, Student};
use super::store::SledDirectory;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A student with the name of their advisor joined in.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StudentProfile {
    #[serde(flatten)]
    pub student: Student,
    pub advisor_name: Option<String>,
}

pub struct DirectoryService {
    directory: Arc<SledDirectory>,
    access: AccessPolicy,
}

impl DirectoryService {
    pub fn new(directory: Arc<SledDirectory>) -> Self {
        let access = AccessPolicy::new(directory.clone());
        Self { directory, access }
    }

    fn profiles(&self, students: Vec<Student>) -> Result<Vec<StudentProfile>, WorkflowError> {
        let advisors: BTreeMap<String, Lecturer> = self
            .directory
            .all_lecturers()?
            .into_iter()
            .map(|l| (l.lecturer_id.clone(), l))
            .collect();

        Ok(students
            .into_iter()
            .map(|student| {
                let advisor_name = student
                    .advisor_id
                    .as_ref()
                    .and_then(|id| advisors.get(id))
                    .map(|l| l.full_name.clone());
                StudentProfile {
                    student,
                    advisor_name,
                }
            })
            .collect())
    }

    /// All students. Admin only.
    pub fn list_students(&self, principal: &Principal) -> Result<Vec<StudentProfile>, WorkflowError> {
        match self.access.resolve(principal)? {
            Actor::Admin => self.profiles(self.directory.all_students()?),
            _ => Err(WorkflowError::Forbidden(
                "only admins can list students".into(),
            )),
        }
    }

    /// One student. Admins may look up anyone, advisors only their advisees.
    pub fn show_student(&self, principal: &Principal, student_id: &str) -> Result<StudentProfile, WorkflowError> {
        let actor = self.access.resolve(principal)?;
        if let Actor::Student(_) = actor {
            return Err(WorkflowError::Forbidden(
                "students cannot browse the directory".into(),
            ));
        }
        let student = self
            .directory
            .student(student_id)?
            .ok_or_else(|| WorkflowError::NotFound(format!("student {student_id} not found")))?;
        self.access.ensure_student_access(&actor, student_id)?;

        let mut profiles = self.profiles(vec![student])?;
        profiles
            .pop()
            .ok_or_else(|| WorkflowError::NotFound(format!("student {student_id} not found")))
    }

    /// All lecturers, for admins and advisors.
    pub fn list_lecturers(&self, principal: &Principal) -> Result<Vec<Lecturer>, WorkflowError> {
        match self.access.resolve(principal)? {
            Actor::Admin | Actor::Advisor(_) => Ok(self.directory.all_lecturers()?),
            Actor::Student(_) => Err(WorkflowError::Forbidden(
                "students cannot browse the directory".into(),
            )),
        }
    }

    /// Advisees of a lecturer. Advisors may only ask about themselves.
    pub fn advisees(&self, principal: &Principal, lecturer_id: &str) -> Result<Vec<StudentProfile>, WorkflowError> {
        match self.access.resolve(principal)? {
            Actor::Admin => {}
            Actor::Advisor(own) if own == lecturer_id => {}
            Actor::Advisor(_) => {
                return Err(WorkflowError::Forbidden(
                    "advisors can only list their own advisees".into(),
                ));
            }
            Actor::Student(_) => {
                return Err(WorkflowError::Forbidden(
                    "students cannot browse the directory".into(),
                ));
            }
        }
        if self.directory.lecturer(lecturer_id)?.is_none() {
            return Err(WorkflowError::NotFound(format!("lecturer {lecturer_id} not found")));
        }

        let students: Vec<Student> = self
            .directory
            .all_students()?
            .into_iter()
            .filter(|s| s.advisor_id.as_deref() == Some(lecturer_id))
            .collect();
        debug!(lecturer_id = %lecturer_id, count = students.len(), "advisees listed");
        self.profiles(students)
    }
}
