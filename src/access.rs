//! Role-scoped access rules
//!
//! Identity resolution and authorization fail differently: a login with no
//! student or lecturer record is `NotFound`, a resolved caller who may not
//! touch the record is `Forbidden`.
use super::achievement::AchievementReference;
use super::error::WorkflowError;
use super::identity::{Actor, IdentityResolver, Principal, Role};
use std::sync::Arc;

#[derive(Clone)]
pub struct AccessPolicy {
    identities: Arc<dyn IdentityResolver>,
}

impl AccessPolicy {
    pub fn new(identities: Arc<dyn IdentityResolver>) -> Self {
        Self { identities }
    }

    pub fn identities(&self) -> &dyn IdentityResolver {
        self.identities.as_ref()
    }

    /// Map a principal to its domain identity.
    pub fn resolve(&self, principal: &Principal) -> Result<Actor, WorkflowError> {
        match principal.role {
            Role::Admin => Ok(Actor::Admin),
            Role::Student => self.resolve_student(principal).map(Actor::Student),
            Role::Advisor => self.resolve_advisor(principal).map(Actor::Advisor),
        }
    }

    pub fn resolve_student(&self, principal: &Principal) -> Result<String, WorkflowError> {
        if principal.role != Role::Student {
            return Err(WorkflowError::Forbidden(format!(
                "role {} cannot act as a student",
                principal.role
            )));
        }
        self.identities
            .student_id_for_user(&principal.user_id)?
            .ok_or_else(|| {
                WorkflowError::NotFound(format!("no student record for user {}", principal.user_id))
            })
    }

    pub fn resolve_advisor(&self, principal: &Principal) -> Result<String, WorkflowError> {
        if principal.role != Role::Advisor {
            return Err(WorkflowError::Forbidden(format!(
                "role {} cannot act as an advisor",
                principal.role
            )));
        }
        self.identities
            .advisor_id_for_user(&principal.user_id)?
            .ok_or_else(|| {
                WorkflowError::NotFound(format!("no lecturer record for user {}", principal.user_id))
            })
    }

    pub fn can_access(&self, actor: &Actor, reference: &AchievementReference) -> Result<bool, WorkflowError> {
        self.can_access_student(actor, &reference.student_id)
    }

    pub fn can_access_student(&self, actor: &Actor, student_id: &str) -> Result<bool, WorkflowError> {
        match actor {
            Actor::Admin => Ok(true),
            Actor::Student(own) => Ok(own == student_id),
            Actor::Advisor(advisor_id) => Ok(self.identities.is_advisee(student_id, advisor_id)?),
        }
    }

    /// `can_access` as a guard.
    pub fn ensure_access(&self, actor: &Actor, reference: &AchievementReference) -> Result<(), WorkflowError> {
        self.ensure_student_access(actor, &reference.student_id)
    }

    pub fn ensure_student_access(&self, actor: &Actor, student_id: &str) -> Result<(), WorkflowError> {
        if self.can_access_student(actor, student_id)? {
            return Ok(());
        }
        let reason = match actor {
            Actor::Student(_) => "achievement belongs to another student".to_string(),
            Actor::Advisor(_) => format!("student {student_id} is not your advisee"),
            Actor::Admin => "access denied".to_string(),
        };
        Err(WorkflowError::Forbidden(reason))
    }

    /// Student ids whose records the actor may see.
    pub fn visible_students(&self, actor: &Actor) -> Result<Vec<String>, WorkflowError> {
        match actor {
            Actor::Admin => Ok(self.identities.all_student_ids()?),
            Actor::Student(own) => Ok(vec![own.clone()]),
            Actor::Advisor(advisor_id) => Ok(self.identities.advisees(advisor_id)?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::identity::Student;
    use std::collections::BTreeMap;

    // S1 advised by L1, S2 without an advisor
    struct FixedDirectory;

    impl IdentityResolver for FixedDirectory {
        fn student_id_for_user(&self, user_id: &str) -> Result<Option<String>, StoreError> {
            Ok(match user_id {
                "u-s1" => Some("S1".into()),
                "u-s2" => Some("S2".into()),
                _ => None,
            })
        }
        fn advisor_id_for_user(&self, user_id: &str) -> Result<Option<String>, StoreError> {
            Ok((user_id == "u-l1").then(|| "L1".to_string()))
        }
        fn advisor_of(&self, student_id: &str) -> Result<Option<String>, StoreError> {
            Ok((student_id == "S1").then(|| "L1".to_string()))
        }
        fn advisees(&self, advisor_id: &str) -> Result<Vec<String>, StoreError> {
            Ok(if advisor_id == "L1" { vec!["S1".into()] } else { vec![] })
        }
        fn all_student_ids(&self) -> Result<Vec<String>, StoreError> {
            Ok(vec!["S1".into(), "S2".into()])
        }
        fn students_by_ids(&self, _ids: &[String]) -> Result<BTreeMap<String, Student>, StoreError> {
            Ok(BTreeMap::new())
        }
    }

    fn policy() -> AccessPolicy {
        AccessPolicy::new(Arc::new(FixedDirectory))
    }

    fn reference_of(student_id: &str) -> AchievementReference {
        AchievementReference::new_draft("ach1".into(), student_id.into(), "det1".into())
    }

    #[test]
    fn admin_sees_everything() {
        assert!(policy().can_access(&Actor::Admin, &reference_of("S2")).unwrap());
    }

    #[test]
    fn student_sees_only_own_records() {
        let policy = policy();
        let actor = policy.resolve(&Principal::student("u-s1")).unwrap();
        assert!(policy.can_access(&actor, &reference_of("S1")).unwrap());
        assert!(!policy.can_access(&actor, &reference_of("S2")).unwrap());
    }

    #[test]
    fn advisor_sees_only_advisees() {
        let policy = policy();
        let actor = policy.resolve(&Principal::advisor("u-l1")).unwrap();
        assert!(policy.can_access(&actor, &reference_of("S1")).unwrap());

        let err = policy.ensure_access(&actor, &reference_of("S2")).unwrap_err();
        assert!(matches!(err, WorkflowError::Forbidden(_)));
    }

    #[test]
    fn unresolved_login_is_not_found_not_forbidden() {
        let err = policy().resolve(&Principal::student("u-ghost")).unwrap_err();
        assert!(matches!(err, WorkflowError::NotFound(_)));
    }

    #[test]
    fn visible_students_follow_role() {
        let policy = policy();
        assert_eq!(policy.visible_students(&Actor::Admin).unwrap().len(), 2);
        assert_eq!(
            policy.visible_students(&Actor::Advisor("L1".into())).unwrap(),
            vec!["S1".to_string()]
        );
        assert!(policy.visible_students(&Actor::Advisor("L9".into())).unwrap().is_empty());
    }
}
