//! Command line and environment configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// achievementctl - record, verify and report on student achievements
#[derive(Parser, Debug, Clone)]
#[command(name = "achievementctl")]
#[command(about = "Student achievement records with advisor verification")]
pub struct Args {
    /// Path of the embedded database
    #[arg(long, env = "ACHIEVEMENTS_DB", default_value = "achievements.db")]
    pub db_path: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Authenticated user id of the caller
    #[arg(long, env = "ACHIEVEMENTS_USER_ID", default_value = "")]
    pub user_id: String,

    /// Role claim of the caller (student, advisor, admin)
    #[arg(long, env = "ACHIEVEMENTS_ROLE", default_value = "")]
    pub role: String,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    pub fn validate(&self) -> Result<(), String> {
        if self.db_path.as_os_str().is_empty() {
            return Err("db path must not be empty".into());
        }
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(format!(
                "invalid log level '{}', expected one of {}",
                self.log_level,
                LOG_LEVELS.join(", ")
            ));
        }
        Ok(())
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Add a student to the directory
    RegisterStudent {
        #[arg(long)]
        student_id: String,
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "")]
        full_name: String,
        #[arg(long, default_value = "")]
        program_study: String,
        #[arg(long, default_value = "")]
        academic_year: String,
        #[arg(long)]
        advisor_id: Option<String>,
    },
    /// Add a lecturer to the directory
    RegisterLecturer {
        #[arg(long)]
        lecturer_id: String,
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "")]
        full_name: String,
        #[arg(long, default_value = "")]
        department: String,
    },
    /// Set or clear a student's advisor
    AssignAdvisor {
        #[arg(long)]
        student_id: String,
        #[arg(long)]
        advisor_id: Option<String>,
    },
    /// List every student with their advisor
    ListStudents,
    /// Show one student with their advisor
    ShowStudent { student_id: String },
    /// List every lecturer
    ListLecturers,
    /// List a lecturer's advisees
    Advisees { lecturer_id: String },
    /// Record a new draft achievement
    Create {
        #[arg(long)]
        title: String,
        #[arg(long = "type")]
        achievement_type: String,
        #[arg(long, default_value = "")]
        description: String,
        /// JSON object of type-specific fields
        #[arg(long)]
        details: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Submit a draft for verification
    Submit { id: String },
    /// Edit a draft
    Update {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long = "type")]
        achievement_type: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// JSON object merged into the stored fields
        #[arg(long)]
        details: Option<String>,
        /// Replaces the tag set when given
        #[arg(long = "tag")]
        tags: Option<Vec<String>>,
    },
    /// Soft delete a draft
    Delete { id: String },
    /// Verify a submitted achievement
    Verify { id: String },
    /// Reject a submitted achievement
    Reject {
        id: String,
        #[arg(long)]
        note: String,
    },
    /// Record attachment metadata on a draft
    Attach {
        id: String,
        #[arg(long)]
        file_name: String,
        #[arg(long)]
        file_url: String,
        #[arg(long, default_value = "application/octet-stream")]
        file_type: String,
    },
    /// Show one achievement with its detail
    Show { id: String },
    /// Show the status timeline of an achievement
    History { id: String },
    /// List achievements visible to the caller
    List,
    /// List one student's achievements
    StudentAchievements { student_id: String },
    /// Statistics over everything visible to the caller
    Stats,
    /// Statistics for one student
    StudentStats { student_id: String },
    /// Report drift between the reference and detail stores
    Reconcile,
}
