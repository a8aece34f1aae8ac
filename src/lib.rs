//! Student achievement records with advisor verification.
//!
//! An achievement is split across two stores: a reference record that owns
//! the status and audit trail, and a detail document that owns the content.
//! [`service::AchievementService`] drives the lifecycle across both,
//! [`report::ReportService`] aggregates over them and
//! [`reconcile::Reconciler`] reports where they disagree.

pub mod access;
pub mod achievement;
pub mod config;
pub mod directory;
pub mod error;
pub mod identity;
pub mod logging;
pub mod reconcile;
pub mod report;
pub mod service;
pub mod store;
pub mod utils;

pub use error::{ErrorKind, StoreError, WorkflowError};
