use std::fmt::Write;

use noted_core::export::{export_stats, ExportStats};
use noted_core::{PendingOperation, SkipReason, SyncOutcome, SyncReport};
use serde::Serialize;

use crate::commands::common::{
    format_sync_conflict_lines, format_sync_timestamp, open_client, sync_conflict_to_item,
    ClientOptions, Connectivity, SyncConflictItem,
};
use crate::error::CliError;

pub async fn run_sync(options: &ClientOptions) -> Result<(), CliError> {
    let client = open_client(options, Connectivity::Check).await?;
    let outcome = client.facade.sync_notes().await?;

    if outcome == SyncOutcome::Skipped(SkipReason::Unauthenticated) {
        return Err(CliError::NotSignedIn);
    }
    if outcome == SyncOutcome::Skipped(SkipReason::Offline) {
        let pending = client.engine().pending_count().await?;
        println!(
            "API at {} is unreachable; {pending} queued change(s) kept for later",
            client.config.api_base_url
        );
        return Ok(());
    }

    println!("{}", describe_outcome(&outcome));
    Ok(())
}

pub fn describe_outcome(outcome: &SyncOutcome) -> String {
    match outcome {
        SyncOutcome::Completed(report) => describe_report(report),
        SyncOutcome::Skipped(SkipReason::AlreadySyncing) => "Sync already in progress".to_string(),
        SyncOutcome::Skipped(SkipReason::Offline) => "Sync skipped: offline".to_string(),
        SyncOutcome::Skipped(SkipReason::Unauthenticated) => {
            "Sync skipped: not signed in".to_string()
        }
    }
}

fn describe_report(report: &SyncReport) -> String {
    let mut line = format!(
        "Sync completed: {} pushed, {} new from server, {} refreshed",
        report.pushed, report.inserted, report.refreshed
    );
    if report.deferred > 0 {
        let _ = write!(line, ", {} still queued", report.deferred);
    }
    if report.discarded > 0 {
        let _ = write!(line, ", {} dropped", report.discarded);
    }
    if report.conflicts > 0 {
        let _ = write!(
            line,
            ", {} conflict(s) kept local (see `noted conflicts`)",
            report.conflicts
        );
    }
    line
}

pub async fn run_retry(id: &str, options: &ClientOptions) -> Result<(), CliError> {
    let client = open_client(options, Connectivity::Check).await?;
    client.require_session()?;
    let note = client.resolve_note(id).await?;

    let synced = client.facade.force_sync_note(&note.local_id).await?;
    println!(
        "{} -> {} ({})",
        synced.local_id,
        synced.server_id().unwrap_or("-"),
        synced.sync_status
    );
    Ok(())
}

pub async fn run_conflicts(
    limit: usize,
    as_json: bool,
    options: &ClientOptions,
) -> Result<(), CliError> {
    let client = open_client(options, Connectivity::LocalOnly).await?;
    let conflicts = client.engine().store().list_conflicts(limit).await?;

    if as_json {
        let json_items = conflicts
            .iter()
            .map(sync_conflict_to_item)
            .collect::<Vec<SyncConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_sync_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub profile: String,
    pub api_base_url: String,
    pub online: bool,
    pub session_id: Option<String>,
    pub last_sync_at: Option<String>,
    pub pending: Vec<PendingItem>,
    pub notes: ExportStats,
}

#[derive(Debug, Serialize)]
pub struct PendingItem {
    pub local_id: String,
    pub action: String,
    pub queued_at: String,
}

impl From<&PendingOperation> for PendingItem {
    fn from(op: &PendingOperation) -> Self {
        Self {
            local_id: op.id.to_string(),
            action: op.action.to_string(),
            queued_at: format_sync_timestamp(op.timestamp),
        }
    }
}

pub async fn run_status(as_json: bool, options: &ClientOptions) -> Result<(), CliError> {
    let client = open_client(options, Connectivity::Check).await?;
    let engine = client.engine();
    let last_sync = engine.last_sync_time().await?;
    let pending = engine.list_pending().await?;
    let notes = engine.get_all_notes().await?;

    let report = StatusReport {
        profile: client.profile_name.clone(),
        api_base_url: client.config.api_base_url.clone(),
        online: engine.network().is_online(),
        session_id: client.facade.session().map(|session| session.id().to_string()),
        last_sync_at: (last_sync > 0).then(|| format_sync_timestamp(last_sync)),
        pending: pending.iter().map(PendingItem::from).collect(),
        notes: export_stats(&notes),
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for line in format_status_lines(&report) {
            println!("{line}");
        }
    }
    Ok(())
}

pub fn format_status_lines(report: &StatusReport) -> Vec<String> {
    let mut lines = vec![
        format!("Profile:    {}", report.profile),
        format!(
            "API:        {} ({})",
            report.api_base_url,
            if report.online { "online" } else { "offline" }
        ),
        format!(
            "Session:    {}",
            report.session_id.as_deref().unwrap_or("(signed out)")
        ),
        format!(
            "Last sync:  {}",
            report.last_sync_at.as_deref().unwrap_or("never")
        ),
        format!(
            "Notes:      {} total, {} active, {} archived, {} pending",
            report.notes.total, report.notes.active, report.notes.archived, report.notes.pending
        ),
        format!("Queue:      {} operation(s)", report.pending.len()),
    ];
    lines.extend(report.pending.iter().map(|item| {
        format!(
            "  {:<9}  {}  queued {}",
            item.action, item.local_id, item.queued_at
        )
    }));
    lines
}
