use noted_core::NoteDraft;

use crate::commands::common::{
    capture_editor_input_with_initial, normalize_content, open_client, ClientOptions,
    Connectivity,
};
use crate::error::CliError;

/// Field changes requested on the command line.
#[derive(Debug, Default)]
pub struct NoteEdits {
    pub title: Option<String>,
    pub content: Option<String>,
    pub color: Option<String>,
}

impl NoteEdits {
    pub const fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none() && self.color.is_none()
    }
}

pub async fn run_edit(id: &str, edits: NoteEdits, options: &ClientOptions) -> Result<(), CliError> {
    let client = open_client(options, Connectivity::Check).await?;
    let note = client.resolve_note(id).await?;

    let draft = if edits.is_empty() {
        let Some(edited_content) = capture_editor_input_with_initial(&note.content)? else {
            return Err(CliError::EmptyEditedContent);
        };
        NoteDraft::new(note.title.clone(), edited_content)
    } else {
        apply_edits(note.to_draft(), edits)
    };

    if draft.title == note.title
        && draft.content == note.content
        && draft.color.as_deref().is_none_or(|color| color == note.color)
    {
        println!("{}", note.local_id);
        return Ok(());
    }

    let updated = client.facade.update_note(&note.local_id, &draft).await?;
    println!("{}", updated.local_id);
    Ok(())
}

pub fn apply_edits(mut draft: NoteDraft, edits: NoteEdits) -> NoteDraft {
    if let Some(title) = edits.title {
        draft.title = title.trim().to_string();
    }
    if let Some(content) = edits.content {
        draft.content = content.trim().to_string();
    }
    if let Some(color) = edits.color.as_deref().and_then(normalize_content) {
        draft.color = Some(color);
    }
    draft
}
