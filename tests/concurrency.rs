//! Concurrent callers against one database
//!
//! No lock spans the two stores, but each record is patched atomically within
//! its own store. Concurrent edits to different fields all land, and edits to
//! the same field end with the last write.

use achievement_records::{
    achievement::{AchievementChanges, AchievementDraft, Attachment, Status},
    identity::{Principal, Student},
    reconcile::Reconciler,
    service::AchievementService,
    store::SledStores,
};
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

fn service_with_student(stores: &SledStores) -> anyhow::Result<Arc<AchievementService>> {
    stores.directory.register_student(&Student {
        student_id: "S1".into(),
        user_id: "u-s1".into(),
        ..Student::default()
    })?;
    Ok(Arc::new(AchievementService::new(
        stores.references.clone(),
        stores.details.clone(),
        stores.directory.clone(),
    )))
}

#[test]
fn concurrent_updates_last_write_wins() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = sled::open(temp_dir.path().join("concurrent_updates.db"))?;
    let stores = SledStores::open(Arc::new(db))?;
    let service = service_with_student(&stores)?;
    let owner = Principal::student("u-s1");

    let id = service.create(
        &owner,
        AchievementDraft::new()
            .set_title("Juara 1")
            .set_achievement_type("Lomba"),
    )?;

    let handles: Vec<_> = ["Juara 2", "Juara 3"]
        .into_iter()
        .map(|title| {
            let service = Arc::clone(&service);
            let owner = owner.clone();
            let id = id.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    service
                        .update(&id, &owner, AchievementChanges::new().set_title(title))
                        .expect("update of an owned draft");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("update thread panicked");
    }

    let view = service.get_by_id(&id, &owner)?;
    assert!(["Juara 2", "Juara 3"].contains(&view.detail.title.as_str()));
    assert_eq!(view.reference.status, Status::Draft);

    let report = Reconciler::new(stores.references.clone(), stores.details.clone()).scan()?;
    assert!(report.is_consistent());

    Ok(())
}

#[test]
fn attachments_survive_racing_edits() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = sled::open(temp_dir.path().join("attach_vs_update.db"))?;
    let stores = SledStores::open(Arc::new(db))?;
    let service = service_with_student(&stores)?;
    let owner = Principal::student("u-s1");

    let id = service.create(
        &owner,
        AchievementDraft::new()
            .set_title("Juara 1")
            .set_achievement_type("Lomba"),
    )?;

    let attacher = {
        let service = Arc::clone(&service);
        let owner = owner.clone();
        let id = id.clone();
        thread::spawn(move || {
            for n in 0..20 {
                let attachment = Attachment::new(
                    &format!("sertifikat-{n}.pdf"),
                    "https://files.example/sertifikat.pdf",
                    "application/pdf",
                );
                service
                    .add_attachment(&id, &owner, attachment)
                    .expect("attachment on an owned draft");
            }
        })
    };
    let editor = {
        let service = Arc::clone(&service);
        let owner = owner.clone();
        let id = id.clone();
        thread::spawn(move || {
            for n in 0..20 {
                service
                    .update(
                        &id,
                        &owner,
                        AchievementChanges::new().set_detail("round", n as i64),
                    )
                    .expect("update of an owned draft");
            }
        })
    };
    attacher.join().expect("attach thread panicked");
    editor.join().expect("update thread panicked");

    let view = service.get_by_id(&id, &owner)?;
    assert_eq!(view.detail.attachments.len(), 20);
    assert!(view.detail.details.contains_key("round"));

    Ok(())
}

#[test]
fn racing_submit_and_delete_leave_one_winner() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = sled::open(temp_dir.path().join("submit_delete_race.db"))?;
    let stores = SledStores::open(Arc::new(db))?;
    let service = service_with_student(&stores)?;
    let owner = Principal::student("u-s1");

    for _ in 0..10 {
        let id = service.create(
            &owner,
            AchievementDraft::new()
                .set_title("Juara 1")
                .set_achievement_type("Lomba"),
        )?;

        let submitter = {
            let service = Arc::clone(&service);
            let id = id.clone();
            thread::spawn(move || service.submit(&id).is_ok())
        };
        let deleter = {
            let service = Arc::clone(&service);
            let id = id.clone();
            thread::spawn(move || service.delete(&id).is_ok())
        };
        let submitted = submitter.join().expect("submit thread panicked");
        let deleted = deleter.join().expect("delete thread panicked");

        assert!(submitted || deleted);
        let status = service.get_by_id(&id, &owner)?.reference.status;
        assert!(matches!(status, Status::Submitted | Status::Deleted));
        if submitted && !deleted {
            assert_eq!(status, Status::Submitted);
        }
        if deleted && !submitted {
            assert_eq!(status, Status::Deleted);
        }
    }

    Ok(())
}
