//! Note export helpers shared by every client.

use std::fmt::Write as _;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{LocalId, NoteSyncStatus, StoredNote};

const EXPORT_APP_NAME: &str = "Noted";
const EXPORT_VERSION: &str = "1.0.0";
const TXT_RULE_WIDTH: usize = 50;

/// Export output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
    Txt,
    Markdown,
}

impl ExportFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Txt => "txt",
            Self::Markdown => "md",
        }
    }

    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv",
            Self::Txt => "text/plain",
            Self::Markdown => "text/markdown",
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Txt => "txt",
            Self::Markdown => "markdown",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "txt" | "text" => Ok(Self::Txt),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(format!("unsupported export format '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    pub format: ExportFormat,
    pub include_archived: bool,
    pub include_metadata: bool,
}

impl ExportOptions {
    #[must_use]
    pub const fn new(format: ExportFormat) -> Self {
        Self {
            format,
            include_archived: false,
            include_metadata: true,
        }
    }
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::new(ExportFormat::Json)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportStats {
    pub total: usize,
    pub active: usize,
    pub archived: usize,
    pub synced: usize,
    pub pending: usize,
}

/// Counts over the full note list, before any export filtering.
#[must_use]
pub fn export_stats(notes: &[StoredNote]) -> ExportStats {
    notes.iter().fold(ExportStats::default(), |mut stats, note| {
        stats.total += 1;
        if note.archived {
            stats.archived += 1;
        } else {
            stats.active += 1;
        }
        match note.sync_status {
            NoteSyncStatus::Synced => stats.synced += 1,
            NoteSyncStatus::Pending => stats.pending += 1,
            NoteSyncStatus::Conflict => {}
        }
        stats
    })
}

/// Notes selected for export, oldest first.
#[must_use]
pub fn select_notes(notes: &[StoredNote], include_archived: bool) -> Vec<&StoredNote> {
    let mut selected = notes
        .iter()
        .filter(|note| include_archived || !note.archived)
        .collect::<Vec<_>>();
    selected.sort_by_key(|note| note.created_at);
    selected
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonExport<'a> {
    export_info: ExportInfo<'a>,
    notes: Vec<ExportNote<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportInfo<'a> {
    app_name: &'a str,
    export_date: String,
    total_notes: usize,
    format: &'a str,
    version: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportNote<'a> {
    title: &'a str,
    content: &'a str,
    color: &'a str,
    created_at: String,
    updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    local_id: Option<&'a LocalId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sync_status: Option<NoteSyncStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_modified: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    archived: Option<bool>,
}

impl<'a> ExportNote<'a> {
    fn new(note: &'a StoredNote, include_metadata: bool) -> Self {
        let metadata = include_metadata.then_some(note);
        Self {
            title: &note.title,
            content: &note.content,
            color: &note.color,
            created_at: iso(&note.created_at),
            updated_at: iso(&note.updated_at),
            id: metadata.and_then(StoredNote::server_id),
            local_id: metadata.map(|note| &note.local_id),
            sync_status: metadata.map(|note| note.sync_status),
            last_modified: metadata.map(|note| note.last_modified),
            archived: metadata.and_then(|note| note.archived.then_some(true)),
        }
    }
}

/// Render notes as pretty-printed JSON with an `exportInfo` header.
pub fn render_json_export(
    notes: &[&StoredNote],
    include_metadata: bool,
    exported_at: DateTime<Utc>,
) -> serde_json::Result<String> {
    let payload = JsonExport {
        export_info: ExportInfo {
            app_name: EXPORT_APP_NAME,
            export_date: iso(&exported_at),
            total_notes: notes.len(),
            format: ExportFormat::Json.as_str(),
            version: EXPORT_VERSION,
        },
        notes: notes
            .iter()
            .map(|note| ExportNote::new(note, include_metadata))
            .collect(),
    };
    serde_json::to_string_pretty(&payload)
}

/// Render notes as CSV with a header row.
#[must_use]
pub fn render_csv_export(notes: &[&StoredNote], include_metadata: bool) -> String {
    let mut headers = vec!["Title", "Content", "Color", "Created At", "Updated At"];
    if include_metadata {
        headers.extend(["ID", "Sync Status", "Archived"]);
    }

    let mut rows = vec![headers.join(",")];
    for note in notes {
        let mut row = vec![
            escape_csv(&note.title),
            escape_csv(&note.content),
            escape_csv(&note.color),
            iso(&note.created_at),
            iso(&note.updated_at),
        ];
        if include_metadata {
            row.push(note.server_id().unwrap_or_default().to_string());
            row.push(note.sync_status.to_string());
            row.push(note.archived.to_string());
        }
        rows.push(row.join(","));
    }
    rows.join("\n")
}

/// Render notes as a plain-text report.
#[must_use]
pub fn render_txt_export(
    notes: &[&StoredNote],
    include_metadata: bool,
    exported_at: DateTime<Utc>,
) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "NOTED - NOTES EXPORT");
    let _ = writeln!(output, "===================");
    let _ = writeln!(output, "Export Date: {}", human(&exported_at));
    let _ = writeln!(output, "Total Notes: {}", notes.len());
    let _ = writeln!(output);

    for (index, note) in notes.iter().enumerate() {
        let _ = writeln!(output, "--- NOTE {} ---", index + 1);
        let _ = writeln!(output, "Title: {}", note.title);
        let _ = writeln!(output, "Created: {}", human(&note.created_at));
        let _ = writeln!(output, "Updated: {}", human(&note.updated_at));
        if include_metadata {
            let _ = writeln!(output, "Color: {}", note.color);
            let _ = writeln!(output, "Status: {}", note.sync_status);
            if note.archived {
                let _ = writeln!(output, "Archived: Yes");
            }
        }
        let _ = writeln!(output);
        let _ = writeln!(output, "Content:");
        let _ = writeln!(output, "{}", note.content);
        let _ = writeln!(output);
        let _ = writeln!(output, "{}", "━".repeat(TXT_RULE_WIDTH));
        let _ = writeln!(output);
    }

    output
}

/// Render notes as a Markdown document, one section per note.
#[must_use]
pub fn render_markdown_export(
    notes: &[&StoredNote],
    include_metadata: bool,
    exported_at: DateTime<Utc>,
) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Notes Export");
    let _ = writeln!(output);
    let _ = writeln!(output, "**Export Date:** {}", human(&exported_at));
    let _ = writeln!(output, "**Total Notes:** {}", notes.len());
    let _ = writeln!(output);
    let _ = writeln!(output, "---");

    for (index, note) in notes.iter().enumerate() {
        if index > 0 {
            let _ = writeln!(output);
            let _ = writeln!(output, "---");
        }
        let _ = writeln!(output);
        let _ = writeln!(output, "## {}", note.title);
        let _ = writeln!(output);
        if include_metadata {
            let _ = writeln!(output, "**Metadata:**");
            let _ = writeln!(output, "- Created: {}", human(&note.created_at));
            let _ = writeln!(output, "- Updated: {}", human(&note.updated_at));
            let _ = writeln!(output, "- Color: {}", note.color);
            if note.archived {
                let _ = writeln!(output, "- Status: Archived");
            }
            let _ = writeln!(output);
        }
        let _ = writeln!(output, "**Content:**");
        let _ = writeln!(output);
        let _ = writeln!(output, "{}", note.content);
    }

    output
}

/// Filter, sort and render notes per `options`.
pub fn render_notes_export(
    notes: &[StoredNote],
    options: ExportOptions,
    exported_at: DateTime<Utc>,
) -> serde_json::Result<String> {
    let selected = select_notes(notes, options.include_archived);
    let metadata = options.include_metadata;
    match options.format {
        ExportFormat::Json => render_json_export(&selected, metadata, exported_at),
        ExportFormat::Csv => Ok(render_csv_export(&selected, metadata)),
        ExportFormat::Txt => Ok(render_txt_export(&selected, metadata, exported_at)),
        ExportFormat::Markdown => Ok(render_markdown_export(&selected, metadata, exported_at)),
    }
}

/// Default export file name, e.g. `notes-export-20260102-0304.json`.
#[must_use]
pub fn suggested_export_file_name(format: ExportFormat, exported_at: DateTime<Utc>) -> String {
    format!(
        "notes-export-{}.{}",
        exported_at.format("%Y%m%d-%H%M"),
        format.extension()
    )
}

fn escape_csv(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn iso(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn human(value: &DateTime<Utc>) -> String {
    value.format("%Y-%m-%d %H:%M UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NoteDraft;
    use pretty_assertions::assert_eq;

    fn at(raw: &str) -> DateTime<Utc> {
        raw.parse().unwrap()
    }

    fn note(title: &str, content: &str, created: &str) -> StoredNote {
        let mut note = StoredNote::new_local(&NoteDraft::new(title, content), "#ffffff", "u1");
        note.created_at = at(created);
        note.updated_at = at(created);
        note
    }

    fn sample() -> Vec<StoredNote> {
        let mut archived = note("Old", "archived body", "2026-01-01T00:00:00Z");
        archived.archived = true;
        let mut synced = note("Second", "b", "2026-01-03T00:00:00Z");
        synced.id = Some("12".to_string());
        synced.sync_status = NoteSyncStatus::Synced;
        vec![synced, note("First", "a", "2026-01-02T00:00:00Z"), archived]
    }

    #[test]
    fn select_notes_skips_archived_and_sorts_by_creation() {
        let notes = sample();
        let titles = select_notes(&notes, false)
            .iter()
            .map(|note| note.title.as_str())
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["First", "Second"]);
        assert_eq!(select_notes(&notes, true).len(), 3);
    }

    #[test]
    fn json_export_includes_header_and_metadata() {
        let notes = sample();
        let rendered = render_notes_export(
            &notes,
            ExportOptions::new(ExportFormat::Json),
            at("2026-02-03T04:05:06Z"),
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&rendered).unwrap();

        assert_eq!(value["exportInfo"]["appName"], "Noted");
        assert_eq!(value["exportInfo"]["totalNotes"], 2);
        assert_eq!(value["exportInfo"]["version"], "1.0.0");
        assert_eq!(value["notes"][1]["id"], "12");
        assert_eq!(value["notes"][1]["syncStatus"], "synced");
        assert!(value["notes"][0].get("id").is_none());
        assert!(value["notes"][0].get("archived").is_none());
    }

    #[test]
    fn json_export_without_metadata_omits_identity() {
        let notes = sample();
        let options = ExportOptions {
            include_metadata: false,
            ..ExportOptions::new(ExportFormat::Json)
        };
        let rendered = render_notes_export(&notes, options, Utc::now()).unwrap();
        assert!(!rendered.contains("localId"));
        assert!(!rendered.contains("syncStatus"));
    }

    #[test]
    fn csv_export_escapes_fields() {
        let mut tricky = note("Hello, world", "say \"hi\"\nbye", "2026-01-01T00:00:00Z");
        tricky.sync_status = NoteSyncStatus::Pending;
        let rendered = render_csv_export(&[&tricky], true);
        let mut lines = rendered.lines();
        assert_eq!(
            lines.next(),
            Some("Title,Content,Color,Created At,Updated At,ID,Sync Status,Archived")
        );
        assert!(rendered.contains("\"Hello, world\",\"say \"\"hi\"\"\nbye\",#ffffff,"));
        assert!(rendered.ends_with(",,pending,false"));
    }

    #[test]
    fn txt_and_markdown_exports_list_every_note() {
        let notes = sample();
        let selected = select_notes(&notes, true);
        let exported_at = at("2026-02-03T04:05:06Z");

        let txt = render_txt_export(&selected, true, exported_at);
        assert!(txt.starts_with("NOTED - NOTES EXPORT\n"));
        assert!(txt.contains("Total Notes: 3"));
        assert!(txt.contains("--- NOTE 3 ---"));
        assert!(txt.contains("Archived: Yes"));

        let markdown = render_markdown_export(&selected, true, exported_at);
        assert!(markdown.starts_with("# Notes Export\n"));
        assert!(markdown.contains("**Export Date:** 2026-02-03 04:05 UTC"));
        assert!(markdown.contains("## Old"));
        assert!(markdown.contains("- Status: Archived"));
        assert_eq!(markdown.matches("## ").count(), 3);
    }

    #[test]
    fn stats_count_full_list() {
        let stats = export_stats(&sample());
        assert_eq!(
            stats,
            ExportStats {
                total: 3,
                active: 2,
                archived: 1,
                synced: 1,
                pending: 2,
            }
        );
    }

    #[test]
    fn suggested_export_file_name_uses_timestamp_and_extension() {
        let exported_at = at("2026-02-03T04:05:06Z");
        assert_eq!(
            suggested_export_file_name(ExportFormat::Json, exported_at),
            "notes-export-20260203-0405.json"
        );
        assert_eq!(
            suggested_export_file_name(ExportFormat::Markdown, exported_at),
            "notes-export-20260203-0405.md"
        );
    }

    #[test]
    fn export_format_parses_aliases() {
        assert_eq!("MD".parse::<ExportFormat>(), Ok(ExportFormat::Markdown));
        assert_eq!("text".parse::<ExportFormat>(), Ok(ExportFormat::Txt));
        assert!("pdf".parse::<ExportFormat>().is_err());
    }
}
