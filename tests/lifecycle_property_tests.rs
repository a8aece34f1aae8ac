//! Property-based tests for the achievement lifecycle
//!
//! The status machine is small but every operation leans on it, so these
//! tests drive random operation sequences through the real service and check
//! that only the legal moves ever land.
//!
//! Covered:
//!
//! 1. Only the four legal transitions succeed, everything else is InvalidState
//! 2. Terminal states never move again
//! 3. Audit columns always agree with the status
//! 4. Details merge on update keeps keys it was not given

use achievement_records::{
    ErrorKind,
    achievement::{
        AchievementDraft, AchievementReference, Details, FieldValue, NewDetail, Status,
    },
    identity::{Lecturer, Principal, Student},
    service::AchievementService,
    store::{DetailPatch, SledStores},
};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};
use tempfile::TempDir;

#[derive(Debug, Clone, Copy)]
enum Op {
    Submit,
    Delete,
    Verify,
    Reject,
}

impl Op {
    fn target(self) -> Status {
        match self {
            Op::Submit => Status::Submitted,
            Op::Delete => Status::Deleted,
            Op::Verify => Status::Verified,
            Op::Reject => Status::Rejected,
        }
    }
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Submit),
        Just(Op::Delete),
        Just(Op::Verify),
        Just(Op::Reject),
    ]
}

fn status_strategy() -> impl Strategy<Value = Status> {
    prop::sample::select(Status::ALL.to_vec())
}

fn field_value_strategy() -> impl Strategy<Value = FieldValue> {
    prop_oneof![
        any::<i64>().prop_map(FieldValue::Integer),
        any::<bool>().prop_map(FieldValue::Bool),
        "[a-z]{0,8}".prop_map(FieldValue::Text),
    ]
}

fn details_strategy() -> impl Strategy<Value = Details> {
    prop::collection::btree_map("[a-e]", field_value_strategy(), 0..5)
}

struct Shared {
    _dir: TempDir,
    service: AchievementService,
}

// one database for every case, each case works on a fresh achievement
fn shared() -> &'static Shared {
    static SHARED: OnceLock<Shared> = OnceLock::new();
    SHARED.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path().join("lifecycle.db")).unwrap();
        let stores = SledStores::open(Arc::new(db)).unwrap();
        stores
            .directory
            .register_lecturer(&Lecturer {
                lecturer_id: "L1".into(),
                user_id: "u-l1".into(),
                ..Lecturer::default()
            })
            .unwrap();
        stores
            .directory
            .register_student(&Student {
                student_id: "S1".into(),
                user_id: "u-s1".into(),
                advisor_id: Some("L1".into()),
                ..Student::default()
            })
            .unwrap();
        let service = AchievementService::new(
            stores.references.clone(),
            stores.details.clone(),
            stores.directory.clone(),
        );
        Shared { _dir: dir, service }
    })
}

fn apply(service: &AchievementService, id: &str, op: Op) -> Result<(), ErrorKind> {
    let advisor = Principal::advisor("u-l1");
    let result = match op {
        Op::Submit => service.submit(id).map(|_| ()),
        Op::Delete => service.delete(id),
        Op::Verify => service.verify(id, &advisor).map(|_| ()),
        Op::Reject => service.reject(id, &advisor, "needs a signed certificate").map(|_| ()),
    };
    result.map_err(|e| e.kind())
}

fn current(service: &AchievementService, id: &str) -> AchievementReference {
    service
        .get_by_id(id, &Principal::admin("root"))
        .unwrap()
        .reference
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn only_legal_transitions_land(ops in prop::collection::vec(op_strategy(), 1..8)) {
        let service = &shared().service;
        let draft = AchievementDraft::new().set_title("Juara 1").set_achievement_type("Lomba");
        let id = service.create(&Principal::student("u-s1"), draft).unwrap();

        let mut expected = Status::Draft;
        let mut was_submitted = false;

        for op in ops {
            let result = apply(service, &id, op);
            if expected.can_transition_to(op.target()) {
                prop_assert!(result.is_ok(), "{:?} from {:?} should succeed", op, expected);
                expected = op.target();
            } else {
                prop_assert_eq!(result, Err(ErrorKind::InvalidState));
            }

            let reference = current(service, &id);
            prop_assert_eq!(reference.status, expected);
            prop_assert!(reference.is_well_formed());

            // once set, never cleared
            if was_submitted {
                prop_assert!(reference.submitted_at.is_some());
            }
            was_submitted |= reference.submitted_at.is_some();
        }
    }

    #[test]
    fn terminal_states_reject_everything(from in status_strategy(), to in status_strategy()) {
        if from.is_terminal() {
            prop_assert!(from.transition(to).is_err());
        }
        prop_assert_eq!(from.transition(to).is_ok(), from.can_transition_to(to));
    }

    #[test]
    fn details_merge_keeps_untouched_keys(stored in details_strategy(), incoming in details_strategy()) {
        let mut detail = NewDetail {
            student_id: "S1".into(),
            title: "Juara 1".into(),
            description: String::new(),
            achievement_type: "Lomba".into(),
            details: stored.clone(),
            tags: BTreeSet::new(),
        }
        .into_detail("det1prop".into());

        let patch = DetailPatch { details: Some(incoming.clone()), ..DetailPatch::default() };
        patch.apply(&mut detail);

        for (key, value) in &incoming {
            prop_assert_eq!(detail.details.get(key), Some(value));
        }
        for (key, value) in &stored {
            if !incoming.contains_key(key) {
                prop_assert_eq!(detail.details.get(key), Some(value));
            }
        }
        prop_assert!(detail.details.len() <= stored.len() + incoming.len());
    }
}
