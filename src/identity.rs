//! Principals, roles and the identity directory seam
use super::error::{StoreError, WorkflowError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Closed set of roles. Parsed once from the credential claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Advisor,
    Admin,
}

impl FromStr for Role {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "student" | "mahasiswa" => Ok(Role::Student),
            "advisor" | "lecturer" | "dosen wali" => Ok(Role::Advisor),
            "admin" => Ok(Role::Admin),
            other => Err(WorkflowError::Forbidden(format!("unknown role '{other}'"))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Student => write!(f, "student"),
            Role::Advisor => write!(f, "advisor"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

/// The authenticated caller, as handed over by the credential issuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: &str, role: Role) -> Self {
        Self {
            user_id: user_id.to_string(),
            role,
        }
    }

    pub fn from_claims(user_id: &str, role_name: &str) -> Result<Self, WorkflowError> {
        Ok(Self::new(user_id, role_name.parse()?))
    }

    pub fn student(user_id: &str) -> Self {
        Self::new(user_id, Role::Student)
    }

    pub fn advisor(user_id: &str) -> Self {
        Self::new(user_id, Role::Advisor)
    }

    pub fn admin(user_id: &str) -> Self {
        Self::new(user_id, Role::Admin)
    }
}

/// A principal resolved to its domain identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Student(String),
    Advisor(String),
    Admin,
}

#[derive(minicbor::Encode, minicbor::Decode, Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Student {
    #[n(0)]
    pub student_id: String,
    #[n(1)]
    pub user_id: String,
    #[n(2)]
    pub full_name: String,
    #[n(3)]
    pub program_study: String,
    #[n(4)]
    pub academic_year: String,
    #[n(5)]
    pub advisor_id: Option<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Lecturer {
    #[n(0)]
    pub lecturer_id: String,
    #[n(1)]
    pub user_id: String,
    #[n(2)]
    pub full_name: String,
    #[n(3)]
    pub department: String,
}

/// Lookups from logins to domain identities and across the advisor relation.
///
/// Absent identities are `Ok(None)`, not errors.
pub trait IdentityResolver: Send + Sync {
    fn student_id_for_user(&self, user_id: &str) -> Result<Option<String>, StoreError>;
    fn advisor_id_for_user(&self, user_id: &str) -> Result<Option<String>, StoreError>;
    fn advisor_of(&self, student_id: &str) -> Result<Option<String>, StoreError>;
    fn advisees(&self, advisor_id: &str) -> Result<Vec<String>, StoreError>;
    fn all_student_ids(&self) -> Result<Vec<String>, StoreError>;
    fn students_by_ids(&self, ids: &[String]) -> Result<BTreeMap<String, Student>, StoreError>;

    fn is_advisee(&self, student_id: &str, advisor_id: &str) -> Result<bool, StoreError> {
        Ok(self.advisor_of(student_id)?.as_deref() == Some(advisor_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_parse_from_claim_labels() {
        assert_eq!("Mahasiswa".parse::<Role>().unwrap(), Role::Student);
        assert_eq!("Dosen Wali".parse::<Role>().unwrap(), Role::Advisor);
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!(" advisor ".parse::<Role>().unwrap(), Role::Advisor);
    }

    #[test]
    fn unknown_role_is_forbidden() {
        let err = Principal::from_claims("u1", "Kaprodi").unwrap_err();
        assert!(matches!(err, WorkflowError::Forbidden(_)));
    }
}
