use noted_core::NoteDraft;

use crate::commands::common::{
    normalize_content, open_client, resolve_note_content, ClientOptions, Connectivity,
};
use crate::error::CliError;

pub async fn run_add(
    title: Option<&str>,
    color: Option<&str>,
    content_parts: &[String],
    options: &ClientOptions,
) -> Result<(), CliError> {
    let title = title.and_then(normalize_content).unwrap_or_default();
    let content = if title.is_empty() {
        resolve_note_content(content_parts)?
    } else {
        normalize_content(&content_parts.join(" ")).unwrap_or_default()
    };

    let mut draft = NoteDraft::new(title, content);
    if let Some(color) = color.and_then(normalize_content) {
        draft = draft.with_color(color);
    }

    let client = open_client(options, Connectivity::Check).await?;
    let note = client.facade.create_note(&draft).await?;
    tracing::debug!(local_id = %note.local_id, status = %note.sync_status, "Created note");

    println!("{}", note.local_id);
    Ok(())
}
