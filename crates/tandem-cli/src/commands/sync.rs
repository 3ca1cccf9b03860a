use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tandem_core::sync;
use tandem_core::{ItemKey, PassOutcome, PassReport, Preview, QueuedAction, SyncPhase};

use crate::commands::common::{short_id, CliContext};
use crate::error::CliError;

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutput<'a> {
    Skipped { reason: String },
    AlreadyRunning,
    Completed(&'a PassReport),
}

#[derive(Debug, Serialize)]
pub struct PlannedActionItem {
    pub action: &'static str,
    pub key: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct PreviewOutput<'a> {
    pub skipped: Option<String>,
    pub actions: Vec<PlannedActionItem>,
    pub errors: &'a BTreeMap<ItemKey, String>,
}

pub async fn run_sync(
    context: &CliContext,
    watch: bool,
    dry_run: bool,
    as_json: bool,
) -> Result<(), CliError> {
    let engine = context.open_engine()?;

    if dry_run {
        let preview = engine.preview().await;
        print_preview(&preview, as_json)?;
        return Ok(());
    }

    if watch {
        return run_watch(Arc::new(engine), as_json).await;
    }

    let outcome = engine.run_pass().await;
    print_outcome(&outcome, as_json)?;
    match outcome {
        PassOutcome::Completed(report) if !report.is_clean() => {
            Err(CliError::SyncIncomplete(report.errors.len()))
        }
        _ => Ok(()),
    }
}

async fn run_watch(engine: Arc<tandem_core::SyncEngine>, as_json: bool) -> Result<(), CliError> {
    let mut phases = engine.subscribe_phase();
    let handle = sync::spawn(engine);
    if !as_json {
        println!("Watching for changes. Press Ctrl-C to stop.");
    }

    let mut last = SyncPhase::Idle;
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            changed = phases.changed() => {
                if changed.is_err() {
                    break;
                }
                let phase = phases.borrow_and_update().clone();
                print_phase(&last, &phase, as_json)?;
                last = phase;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}

fn print_outcome(outcome: &PassOutcome, as_json: bool) -> Result<(), CliError> {
    if as_json {
        let output = match outcome {
            PassOutcome::Skipped(reason) => SyncOutput::Skipped {
                reason: reason.to_string(),
            },
            PassOutcome::AlreadyRunning => SyncOutput::AlreadyRunning,
            PassOutcome::Completed(report) => SyncOutput::Completed(report),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for line in format_outcome_lines(outcome) {
        println!("{line}");
    }
    Ok(())
}

fn print_preview(preview: &Preview, as_json: bool) -> Result<(), CliError> {
    if as_json {
        let output = PreviewOutput {
            skipped: preview.skipped.map(|reason| reason.to_string()),
            actions: preview.queue.iter().map(planned_action_item).collect(),
            errors: &preview.errors,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for line in format_preview_lines(preview) {
        println!("{line}");
    }
    Ok(())
}

fn print_phase(last: &SyncPhase, phase: &SyncPhase, as_json: bool) -> Result<(), CliError> {
    if as_json {
        let value = match phase {
            SyncPhase::Idle => serde_json::json!({ "phase": "idle" }),
            SyncPhase::Planning => serde_json::json!({ "phase": "planning" }),
            SyncPhase::Executing => serde_json::json!({ "phase": "executing" }),
            SyncPhase::Cooldown(errors) => {
                serde_json::json!({ "phase": "cooldown", "errors": errors })
            }
        };
        println!("{value}");
        return Ok(());
    }

    // Routine passes are reported through tracing; only state changes print.
    match phase {
        SyncPhase::Idle if matches!(last, SyncPhase::Cooldown(_)) => println!("Sync resumed"),
        SyncPhase::Idle | SyncPhase::Planning | SyncPhase::Executing => {}
        SyncPhase::Cooldown(errors) => {
            println!("Sync paused after {} failure(s); waiting for changes", errors.len());
            for line in format_error_lines(errors) {
                println!("{line}");
            }
        }
    }
    Ok(())
}

pub fn planned_action_item(action: &QueuedAction) -> PlannedActionItem {
    let name = match action {
        QueuedAction::Site(action) => action.item().name.clone(),
        QueuedAction::File(action) => action.item().name.clone(),
    };
    PlannedActionItem {
        action: action.name(),
        key: action.key().to_string(),
        name,
    }
}

pub fn format_outcome_lines(outcome: &PassOutcome) -> Vec<String> {
    match outcome {
        PassOutcome::Skipped(reason) => vec![format!("Sync skipped: {reason}")],
        PassOutcome::AlreadyRunning => vec!["Sync already running".to_string()],
        PassOutcome::Completed(report) => {
            let mut lines = vec![format!(
                "Sync completed: {} applied, {} skipped, {} failed",
                report.applied,
                report.skipped,
                report.errors.len()
            )];
            lines.extend(format_error_lines(&report.errors));
            lines
        }
    }
}

pub fn format_preview_lines(preview: &Preview) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(reason) = preview.skipped {
        lines.push(format!("Nothing planned: {reason}"));
    } else if preview.queue.is_empty() {
        lines.push("Already in sync".to_string());
    } else {
        for action in &preview.queue {
            let item = planned_action_item(action);
            let key = action.key();
            lines.push(format!(
                "{:<22}  {}:{:<13}  {}",
                item.action,
                key.kind,
                short_id(&key.id),
                item.name
            ));
        }
    }
    lines.extend(format_error_lines(&preview.errors));
    lines
}

pub fn format_error_lines(errors: &BTreeMap<ItemKey, String>) -> Vec<String> {
    errors
        .iter()
        .map(|(key, message)| format!("  ! {key}  {message}"))
        .collect()
}
