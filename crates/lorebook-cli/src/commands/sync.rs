use std::path::Path;

use lorebook_core::models::ResolutionPolicy;
use lorebook_core::sync::SyncReport;

use crate::commands::common::{
    format_conflict_lines, format_timestamp, normalize_document_identifier, open_engine,
    resolve_document, short_id,
};
use crate::error::CliError;

pub async fn run_sync(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path)?;
    let report = engine.sync_with_remote().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for line in format_report_lines(&report) {
        println!("{line}");
    }
    let conflicts = engine.pending_conflicts().await;
    if !conflicts.is_empty() {
        println!();
        println!("Conflicts (resolve with `lore sync resolve <id> --policy local|remote|merge`):");
        for line in format_conflict_lines(&conflicts) {
            println!("  {line}");
        }
    }
    Ok(())
}

pub async fn run_sync_conflicts(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let engine = open_engine(db_path)?;
    engine.sync_with_remote().await?;
    let conflicts = engine.pending_conflicts().await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&conflicts)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts.");
        return Ok(());
    }

    for line in format_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_sync_resolve(
    id: &str,
    policy: ResolutionPolicy,
    db_path: &Path,
) -> Result<(), CliError> {
    let normalized_id = normalize_document_identifier(id)?;
    let engine = open_engine(db_path)?;
    let document = resolve_document(&normalized_id, engine.store()).await?;

    // Conflicts only live as long as the engine, so rediscover them with a
    // full pass. Other changed documents are synced along the way.
    engine.sync_with_remote().await?;
    let pending = engine.pending_conflicts().await;
    if !pending.iter().any(|conflict| conflict.id == document.id) {
        return Err(CliError::NoConflict(document.id.to_string()));
    }

    let resolved = engine.resolve_conflict(&document.id, policy).await?;
    println!("{}", resolved.id);
    Ok(())
}

pub fn format_report_lines(report: &SyncReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Sync finished at {}: {} uploaded, {} downloaded, {} conflicts, {} errors",
        format_timestamp(report.finished_at),
        report.uploaded,
        report.downloaded,
        report.conflicts,
        report.errors
    )];
    if !report.has_changes() && report.errors == 0 {
        lines.push("Everything is up to date.".to_string());
    }
    lines.extend(
        report
            .failures()
            .map(|(id, error)| format!("  failed {}: {error}", short_id(id.as_str()))),
    );
    lines
}
