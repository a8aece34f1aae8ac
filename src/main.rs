use achievement_records::{
    WorkflowError,
    achievement::{AchievementChanges, AchievementDraft, Attachment, Details},
    config::{Args, Command},
    directory::DirectoryService,
    identity::{Lecturer, Principal, Student},
    logging,
    reconcile::Reconciler,
    report::ReportService,
    service::AchievementService,
    store::SledStores,
};
use anyhow::Context;
use clap::Parser;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, error};

fn parse_details(raw: Option<&str>) -> anyhow::Result<Option<Details>> {
    raw.map(|s| serde_json::from_str::<Details>(s).context("details must be a JSON object"))
        .transpose()
}

fn run(args: &Args, stores: &SledStores) -> anyhow::Result<Value> {
    let service = AchievementService::new(
        stores.references.clone(),
        stores.details.clone(),
        stores.directory.clone(),
    );
    let principal = || Principal::from_claims(&args.user_id, &args.role);

    let output = match &args.command {
        Command::RegisterStudent {
            student_id,
            user,
            full_name,
            program_study,
            academic_year,
            advisor_id,
        } => {
            let student = Student {
                student_id: student_id.clone(),
                user_id: user.clone(),
                full_name: full_name.clone(),
                program_study: program_study.clone(),
                academic_year: academic_year.clone(),
                advisor_id: advisor_id.clone(),
            };
            stores
                .directory
                .register_student(&student)
                .map_err(WorkflowError::from)?;
            serde_json::to_value(student)?
        }
        Command::RegisterLecturer {
            lecturer_id,
            user,
            full_name,
            department,
        } => {
            let lecturer = Lecturer {
                lecturer_id: lecturer_id.clone(),
                user_id: user.clone(),
                full_name: full_name.clone(),
                department: department.clone(),
            };
            stores
                .directory
                .register_lecturer(&lecturer)
                .map_err(WorkflowError::from)?;
            serde_json::to_value(lecturer)?
        }
        Command::AssignAdvisor {
            student_id,
            advisor_id,
        } => {
            let student = stores
                .directory
                .assign_advisor(student_id, advisor_id.as_deref())
                .map_err(WorkflowError::from)?;
            serde_json::to_value(student)?
        }
        Command::ListStudents => {
            let directory = DirectoryService::new(stores.directory.clone());
            serde_json::to_value(directory.list_students(&principal()?)?)?
        }
        Command::ShowStudent { student_id } => {
            let directory = DirectoryService::new(stores.directory.clone());
            serde_json::to_value(directory.show_student(&principal()?, student_id)?)?
        }
        Command::ListLecturers => {
            let directory = DirectoryService::new(stores.directory.clone());
            serde_json::to_value(directory.list_lecturers(&principal()?)?)?
        }
        Command::Advisees { lecturer_id } => {
            let directory = DirectoryService::new(stores.directory.clone());
            serde_json::to_value(directory.advisees(&principal()?, lecturer_id)?)?
        }
        Command::Create {
            title,
            achievement_type,
            description,
            details,
            tags,
        } => {
            let draft = AchievementDraft::new()
                .set_title(title)
                .set_achievement_type(achievement_type)
                .set_description(description)
                .set_details(parse_details(details.as_deref())?.unwrap_or_default())
                .set_tags(tags.iter().cloned());
            let id = service.create(&principal()?, draft)?;
            json!({ "message": "achievement created", "reference_id": id })
        }
        Command::Submit { id } => serde_json::to_value(service.submit(id)?)?,
        Command::Update {
            id,
            title,
            achievement_type,
            description,
            details,
            tags,
        } => {
            let changes = AchievementChanges {
                title: title.clone(),
                description: description.clone(),
                achievement_type: achievement_type.clone(),
                details: parse_details(details.as_deref())?,
                tags: tags.as_ref().map(|t| t.iter().cloned().collect()),
            };
            service.update(id, &principal()?, changes)?;
            json!({ "message": "achievement updated", "id": id })
        }
        Command::Delete { id } => {
            service.delete(id)?;
            json!({ "message": "achievement deleted", "id": id })
        }
        Command::Verify { id } => serde_json::to_value(service.verify(id, &principal()?)?)?,
        Command::Reject { id, note } => {
            serde_json::to_value(service.reject(id, &principal()?, note)?)?
        }
        Command::Attach {
            id,
            file_name,
            file_url,
            file_type,
        } => {
            service.add_attachment(id, &principal()?, Attachment::new(file_name, file_url, file_type))?;
            json!({ "message": "attachment recorded", "id": id })
        }
        Command::Show { id } => serde_json::to_value(service.get_by_id(id, &principal()?)?)?,
        Command::History { id } => serde_json::to_value(service.history(id, &principal()?)?)?,
        Command::List => serde_json::to_value(service.list(&principal()?)?)?,
        Command::StudentAchievements { student_id } => {
            serde_json::to_value(service.student_achievements(&principal()?, student_id)?)?
        }
        Command::Stats => {
            let reports = ReportService::new(
                stores.references.clone(),
                stores.details.clone(),
                stores.directory.clone(),
            );
            serde_json::to_value(reports.global_statistics(&principal()?)?)?
        }
        Command::StudentStats { student_id } => {
            let reports = ReportService::new(
                stores.references.clone(),
                stores.details.clone(),
                stores.directory.clone(),
            );
            serde_json::to_value(reports.student_statistics(&principal()?, student_id)?)?
        }
        Command::Reconcile => {
            let reconciler = Reconciler::new(stores.references.clone(), stores.details.clone());
            let report = reconciler.scan()?;
            json!({ "consistent": report.is_consistent(), "report": report })
        }
    };

    Ok(output)
}

/// Failure report written to stderr. Workflow errors keep their kind,
/// anything else came from parsing the caller's input.
fn error_body(err: &anyhow::Error) -> Value {
    match err.downcast_ref::<WorkflowError>() {
        Some(workflow) => json!({ "error": workflow.kind().to_string(), "message": workflow.to_string() }),
        None => json!({ "error": "invalid_argument", "message": format!("{err:#}") }),
    }
}

fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    logging::init(&args.log_level, args.log_json);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(2);
    }

    debug!(db_path = %args.db_path.display(), "opening database");
    let db = sled::open(&args.db_path)
        .with_context(|| format!("failed to open database at {}", args.db_path.display()))?;
    let stores = SledStores::open(Arc::new(db)).map_err(WorkflowError::from)?;

    match run(&args, &stores) {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", serde_json::to_string_pretty(&error_body(&err))?);
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_body_keeps_the_workflow_kind() {
        let err = anyhow::Error::new(WorkflowError::Forbidden("student S2 is not your advisee".into()));
        let body = error_body(&err);
        assert_eq!(body["error"], "forbidden");
        assert_eq!(body["message"], "student S2 is not your advisee");
    }

    #[test]
    fn malformed_details_are_invalid_arguments() {
        let err = parse_details(Some("[1, 2]")).unwrap_err();
        let body = error_body(&err);
        assert_eq!(body["error"], "invalid_argument");
        assert!(body["message"].as_str().unwrap().contains("details must be a JSON object"));
    }
}
