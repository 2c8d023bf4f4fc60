use std::env;
use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use noted_core::db::LibSqlKeyValueStore;
use noted_core::{
    ClientConfig, HttpHealthCheck, HttpNoteGateway, LocalNoteStore, NetworkMonitor, NotesFacade,
    Session, StoredNote, SyncConflict, SyncEngine,
};
use serde::Serialize;

use crate::auth::KeyringTokenProvider;
use crate::config_profiles::{default_db_path, CliProfile, CliProfilesConfig};
use crate::error::CliError;

const DB_PATH_ENV: &str = "NOTED_DB_PATH";
const LOCAL_ID_PREFIX: &str = "local_";
const SHORT_ID_LEN: usize = 10;

/// Flags shared by every command.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    pub db_path: Option<PathBuf>,
    pub profile: Option<String>,
}

/// Whether a command may talk to the API.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Connectivity {
    /// Check the API health endpoint before running
    Check,
    /// Stay offline; local reads only
    LocalOnly,
}

/// Everything a command needs to drive the notes facade.
pub struct ClientContext {
    pub profile_name: String,
    pub config: ClientConfig,
    pub facade: NotesFacade,
}

impl ClientContext {
    pub fn engine(&self) -> &SyncEngine {
        self.facade.engine()
    }

    pub async fn all_notes(&self) -> Result<Vec<StoredNote>, CliError> {
        Ok(self.engine().get_all_notes().await?)
    }

    /// Resolve an id or id fragment against the local store.
    pub async fn resolve_note(&self, query: &str) -> Result<StoredNote, CliError> {
        let query = normalize_note_identifier(query)?;
        let notes = self.all_notes().await?;
        resolve_note_in(&query, &notes).cloned()
    }

    pub fn require_session(&self) -> Result<Session, CliError> {
        self.facade.session().ok_or(CliError::NotSignedIn)
    }
}

pub async fn open_client(
    options: &ClientOptions,
    connectivity: Connectivity,
) -> Result<ClientContext, CliError> {
    let profiles = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = profiles.resolve_profile_name(options.profile.as_deref());
    let profile = profiles.profile(&profile_name).cloned().unwrap_or_default();

    let config = client_config_for(&profile, |key| env::var(key).ok())?;
    let db_path = resolve_db_path(options.db_path.clone(), &profile_name)?;
    let store = LocalNoteStore::new(Arc::new(LibSqlKeyValueStore::open_path(db_path).await?));
    let gateway = HttpNoteGateway::from_config(&config, Arc::new(KeyringTokenProvider))?;
    let network = Arc::new(NetworkMonitor::polling(
        Arc::new(HttpHealthCheck::from_config(&config)?),
        config.poll_interval(),
    ));
    if connectivity == Connectivity::Check {
        let online = network.sample_now().await;
        tracing::debug!(online, api = %config.api_base_url, "Sampled connectivity");
    }

    let engine = SyncEngine::new(store, Arc::new(gateway), network)
        .with_default_color(config.default_color.clone());
    let facade = NotesFacade::new(Arc::new(engine));
    facade.set_session(profile.session_id().and_then(Session::new));

    Ok(ClientContext {
        profile_name,
        config,
        facade,
    })
}

/// Profile values first, then `NOTED_*` environment overrides.
pub fn client_config_for<F>(profile: &CliProfile, lookup: F) -> Result<ClientConfig, CliError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ClientConfig::default();
    if let Some(url) = profile.api_base_url() {
        config.api_base_url = url;
    }
    Ok(config.with_overrides(lookup)?)
}

pub fn resolve_db_path(
    cli_db_path: Option<PathBuf>,
    profile_name: &str,
) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path(profile_name).map_err(CliError::Config)
}

pub fn resolve_note_in<'a>(query: &str, notes: &'a [StoredNote]) -> Result<&'a StoredNote, CliError> {
    if let Some(note) = notes
        .iter()
        .find(|note| note.local_id.as_str() == query || note.server_id() == Some(query))
    {
        return Ok(note);
    }

    let fragment = query.strip_prefix(LOCAL_ID_PREFIX).unwrap_or(query);
    let matches = notes
        .iter()
        .filter(|note| {
            let id = note.local_id.as_str();
            let bare = id.strip_prefix(LOCAL_ID_PREFIX).unwrap_or(id);
            bare.starts_with(fragment) || bare.ends_with(fragment)
        })
        .collect::<Vec<_>>();

    match matches.as_slice() {
        [] => Err(CliError::NoteNotFound(query.to_string())),
        [note] => Ok(*note),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|note| short_id(note))
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousNoteId(format!(
                "ID '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

/// Trailing characters of the local id. The leading part of a v7 id is a
/// timestamp, so the tail is what tells notes apart.
pub fn short_id(note: &StoredNote) -> String {
    let id = note.local_id.as_str();
    let bare = id.strip_prefix(LOCAL_ID_PREFIX).unwrap_or(id);
    let skip = bare.chars().count().saturating_sub(SHORT_ID_LEN);
    bare.chars().skip(skip).collect()
}

#[derive(Debug, Serialize)]
pub struct NoteListItem {
    pub local_id: String,
    pub server_id: Option<String>,
    pub title: String,
    pub preview: String,
    pub content: String,
    pub color: String,
    pub archived: bool,
    pub sync_status: String,
    pub created_at: String,
    pub updated_at: String,
    pub relative_time: String,
}

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub local_id: String,
    pub note_id: String,
    pub local_updated_at: i64,
    pub incoming_updated_at: i64,
    pub resolved_at: i64,
    pub resolved_at_iso: String,
    pub strategy: String,
}

/// Notes filtered by archive state, most recently updated first.
pub fn filter_notes(
    mut notes: Vec<StoredNote>,
    archived: bool,
    all: bool,
    limit: usize,
) -> Vec<StoredNote> {
    notes.retain(|note| all || note.archived == archived);
    notes.sort_by(|left, right| right.updated_at.cmp(&left.updated_at));
    notes.truncate(limit);
    notes
}

pub fn format_note_lines(notes: &[StoredNote]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    notes
        .iter()
        .map(|note| {
            let preview = note_preview(note, 40);
            let relative_time = format_relative_time(note.updated_at.timestamp_millis(), now_ms);
            let status = status_label(note);
            format!(
                "{:<width$}  {status:<8}  {preview:<40}  {relative_time}",
                short_id(note),
                width = SHORT_ID_LEN
            )
        })
        .collect()
}

pub fn format_note_detail(note: &StoredNote) -> String {
    let mut lines = vec![
        format!("ID:       {}", note.local_id),
        format!("Server:   {}", note.server_id().unwrap_or("(not yet synced)")),
        format!("Status:   {}", status_label(note)),
        format!("Color:    {}", note.color),
        format!("Created:  {}", note.created_at.format("%Y-%m-%d %H:%M:%S UTC")),
        format!("Updated:  {}", note.updated_at.format("%Y-%m-%d %H:%M:%S UTC")),
        String::new(),
    ];
    if !note.title.trim().is_empty() {
        lines.push(format!("# {}", note.title));
        lines.push(String::new());
    }
    lines.push(note.content.clone());
    lines.join("\n")
}

fn status_label(note: &StoredNote) -> String {
    if note.archived {
        format!("{}/arch", note.sync_status)
    } else {
        note.sync_status.to_string()
    }
}

pub fn note_to_list_item(note: &StoredNote) -> NoteListItem {
    let now_ms = Utc::now().timestamp_millis();
    NoteListItem {
        local_id: note.local_id.to_string(),
        server_id: note.server_id().map(ToString::to_string),
        title: note.title.clone(),
        preview: note_preview(note, 80),
        content: note.content.clone(),
        color: note.color.clone(),
        archived: note.archived,
        sync_status: note.sync_status.to_string(),
        created_at: note.created_at.to_rfc3339(),
        updated_at: note.updated_at.to_rfc3339(),
        relative_time: format_relative_time(note.updated_at.timestamp_millis(), now_ms),
    }
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        local_id: conflict.local_id.to_string(),
        note_id: conflict.note_id.clone(),
        local_updated_at: conflict.local_updated_at,
        incoming_updated_at: conflict.incoming_updated_at,
        resolved_at: conflict.resolved_at,
        resolved_at_iso: format_sync_timestamp(conflict.resolved_at),
        strategy: conflict.strategy.clone(),
    }
}

/// Title (or first content line) collapsed to one line and truncated.
pub fn note_preview(note: &StoredNote, max_chars: usize) -> String {
    let source = note.title_preview(usize::MAX);
    let collapsed = source.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {}  note={} server={}  local={} incoming={}",
                format_sync_timestamp(conflict.resolved_at),
                conflict.strategy,
                conflict.local_id,
                conflict.note_id,
                conflict.local_updated_at,
                conflict.incoming_updated_at
            )
        })
        .collect()
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

pub fn resolve_note_content(content_parts: &[String]) -> Result<String, CliError> {
    if let Some(content) = normalize_content(&content_parts.join(" ")) {
        return Ok(content);
    }

    if let Some(content) = read_piped_stdin()? {
        return Ok(content);
    }

    if let Some(content) = capture_editor_input_with_initial("")? {
        return Ok(content);
    }

    Err(CliError::EmptyContent)
}

pub fn normalize_content(content: &str) -> Option<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_note_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyNoteId)
    } else {
        Ok(trimmed.to_string())
    }
}

pub fn read_piped_stdin() -> Result<Option<String>, CliError> {
    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(None);
    }

    let mut buffer = String::new();
    stdin.lock().read_to_string(&mut buffer)?;
    Ok(normalize_content(&buffer))
}

pub fn capture_editor_input_with_initial(
    initial_content: &str,
) -> Result<Option<String>, CliError> {
    let editor = preferred_editor();
    let temp_file = create_temp_note_file_path();
    std::fs::write(&temp_file, initial_content)?;

    let launch_result = launch_editor(&editor, &temp_file);
    let note_content = std::fs::read_to_string(&temp_file)?;
    let _ = std::fs::remove_file(&temp_file);

    launch_result?;
    Ok(normalize_content(&note_content))
}

pub fn launch_editor(editor: &str, file_path: &Path) -> Result<(), CliError> {
    let mut parts = editor.split_whitespace();
    let Some(program) = parts.next() else {
        return Err(CliError::EditorFailed("empty EDITOR command".into()));
    };

    let status = Command::new(program).args(parts).arg(file_path).status()?;
    if status.success() {
        Ok(())
    } else {
        Err(CliError::EditorFailed(format!(
            "`{editor}` exited with status {status}"
        )))
    }
}

pub fn preferred_editor() -> String {
    env::var("VISUAL")
        .or_else(|_| env::var("EDITOR"))
        .unwrap_or_else(|_| default_editor().to_string())
}

pub const fn default_editor() -> &'static str {
    if cfg!(windows) {
        "notepad"
    } else {
        "vi"
    }
}

fn create_temp_note_file_path() -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_nanos());
    env::temp_dir().join(format!("noted-note-{}-{now}.md", std::process::id()))
}
