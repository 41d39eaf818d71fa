//! Types for the migration system.

use crate::execution::ExecutionError;
use crate::mods::{CatalogError, Mod, Step};
use serde::Serialize;
use std::sync::mpsc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Error types for migration operations.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Catalog error: {0}")]
    CatalogError(#[from] CatalogError),

    #[error("A database update is already running")]
    AlreadyRunning,
}

/// Why a step failed.
#[derive(Error, Debug, Clone)]
pub enum StepError {
    #[error("{0}")]
    Execution(#[from] ExecutionError),

    #[error("SQL execution failed")]
    ExecutionFailed,

    #[error("Could not read external SQL file {path}: {message}")]
    ExternalSql { path: String, message: String },

    #[error("Unsupported step type: {0}")]
    Unsupported(String),

    #[error("Mod chain error: {0}")]
    Chain(String),

    #[error("No mod from version {from} to version {to}")]
    ModNotFound { from: String, to: String },

    #[error("Mod chains nested deeper than {0} levels")]
    ChainTooDeep(usize),

    #[error("Mod {from} -> {to} failed: {source}")]
    ModFailed {
        from: String,
        to: String,
        source: Box<StepError>,
    },
}

impl From<CatalogError> for StepError {
    fn from(e: CatalogError) -> Self {
        StepError::Chain(e.to_string())
    }
}

/// The identifying details of a mod, as reported in events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModSnapshot {
    pub author: String,
    pub date: String,
    pub comment: String,
    pub from: String,
    pub to: String,
    pub schema: u32,
}

impl From<&Mod> for ModSnapshot {
    fn from(m: &Mod) -> Self {
        Self {
            author: m.author.clone(),
            date: m.date.clone(),
            comment: m.comment.clone(),
            from: m.from_concat(),
            to: m.to_concat(),
            schema: m.schema,
        }
    }
}

/// A step within its mod, as reported in events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSnapshot {
    pub author: String,
    pub mod_from: String,
    pub mod_to: String,
    /// 1-based position of the step in its mod.
    pub step_number: usize,
    pub step_type: String,
    pub step_content: String,
}

impl StepSnapshot {
    pub fn new(m: &Mod, step_number: usize, step: &Step) -> Self {
        Self {
            author: m.author.clone(),
            mod_from: m.from_concat(),
            mod_to: m.to_concat(),
            step_number,
            step_type: step.step_type.to_string(),
            step_content: step.content.clone(),
        }
    }
}

/// Lifecycle notifications, emitted in order while a path is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum MigrationEvent {
    #[serde(rename_all = "camelCase")]
    StartingApplyMod { mod_info: ModSnapshot },

    #[serde(rename_all = "camelCase")]
    FinishedApplyMod {
        mod_info: ModSnapshot,
        success: bool,
        /// The guard did not apply, so no step ran.
        skipped: bool,
        failed_step: Option<StepSnapshot>,
        error: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    StartingApplyStep { step: StepSnapshot },

    #[serde(rename_all = "camelCase")]
    FinishedApplyStep {
        step: StepSnapshot,
        success: bool,
        error: Option<String>,
    },

    #[serde(rename_all = "camelCase")]
    SchemaChanged { old_schema: u32, new_schema: u32 },
}

/// Receives lifecycle events synchronously.
pub trait MigrationListener {
    fn on_event(&mut self, event: &MigrationEvent);
}

impl MigrationListener for mpsc::Sender<MigrationEvent> {
    fn on_event(&mut self, event: &MigrationEvent) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.send(event.clone());
    }
}

/// Reports progress through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingListener;

impl MigrationListener for LoggingListener {
    fn on_event(&mut self, event: &MigrationEvent) {
        match event {
            MigrationEvent::StartingApplyMod { mod_info } => {
                info!(
                    from = %mod_info.from,
                    to = %mod_info.to,
                    author = %mod_info.author,
                    "Applying mod"
                );
            }
            MigrationEvent::FinishedApplyMod {
                mod_info,
                success: true,
                skipped,
                ..
            } => {
                info!(from = %mod_info.from, to = %mod_info.to, skipped, "Mod applied");
            }
            MigrationEvent::FinishedApplyMod {
                mod_info,
                failed_step,
                error,
                ..
            } => {
                let step = failed_step.as_ref();
                error!(
                    author = %mod_info.author,
                    from = %mod_info.from,
                    to = %mod_info.to,
                    step_number = step.map(|s| s.step_number).unwrap_or(0),
                    step_type = step.map(|s| s.step_type.as_str()).unwrap_or(""),
                    step_content = step.map(|s| s.step_content.as_str()).unwrap_or(""),
                    error = error.as_deref().unwrap_or("unknown error"),
                    "Mod failed"
                );
            }
            MigrationEvent::StartingApplyStep { step } => {
                debug!(
                    step_number = step.step_number,
                    step_type = %step.step_type,
                    "Applying step"
                );
            }
            MigrationEvent::FinishedApplyStep { step, success, .. } => {
                debug!(step_number = step.step_number, success, "Step finished");
            }
            MigrationEvent::SchemaChanged {
                old_schema,
                new_schema,
            } => {
                warn!(old_schema, new_schema, "Schema changed");
            }
        }
    }
}
