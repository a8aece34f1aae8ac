// Walks one achievement through its lifecycle against a throwaway sled database.
//
//   cargo run --example walkthrough

use achievement_records::{
    achievement::AchievementDraft,
    identity::{Lecturer, Principal, Student},
    logging,
    reconcile::Reconciler,
    report::ReportService,
    service::AchievementService,
    store::SledStores,
};
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    logging::init("debug", false);

    let dir = tempfile::tempdir()?;
    let db = sled::open(dir.path().join("walkthrough.db"))?;
    let stores = SledStores::open(Arc::new(db))?;

    stores.directory.register_lecturer(&Lecturer {
        lecturer_id: "L-001".into(),
        user_id: "dosen-1".into(),
        full_name: "Dr. Sari".into(),
        department: "Informatika".into(),
    })?;
    stores.directory.register_student(&Student {
        student_id: "S-001".into(),
        user_id: "mhs-1".into(),
        full_name: "Rina".into(),
        program_study: "Teknik Informatika".into(),
        academic_year: "2023".into(),
        advisor_id: Some("L-001".into()),
    })?;

    let service = AchievementService::new(
        stores.references.clone(),
        stores.details.clone(),
        stores.directory.clone(),
    );
    let student = Principal::student("mhs-1");
    let advisor = Principal::advisor("dosen-1");

    let id = service.create(
        &student,
        AchievementDraft::new()
            .set_title("Juara 1 Lomba Robotik Nasional")
            .set_achievement_type("Lomba")
            .set_detail("level", "nasional")
            .set_detail("rank", 1i64)
            .add_tag("robotik"),
    )?;
    println!("created {id}");

    let submitted = service.submit(&id)?;
    println!("submitted at {:?}", submitted.submitted_at);

    let outcome = service.verify(&id, &advisor)?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    for entry in service.history(&id, &student)? {
        println!("{:>10} {:?}", entry.status, entry.at);
    }

    let reports = ReportService::new(
        stores.references.clone(),
        stores.details.clone(),
        stores.directory.clone(),
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&reports.global_statistics(&advisor)?)?
    );

    let report = Reconciler::new(stores.references.clone(), stores.details.clone()).scan()?;
    println!("stores consistent: {}", report.is_consistent());

    Ok(())
}
