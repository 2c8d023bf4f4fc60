use crate::commands::common::{
    filter_notes, format_note_detail, format_note_lines, note_to_list_item, open_client,
    ClientOptions, Connectivity, NoteListItem,
};
use crate::error::CliError;

pub async fn run_list(
    limit: usize,
    archived: bool,
    all: bool,
    as_json: bool,
    options: &ClientOptions,
) -> Result<(), CliError> {
    let client = open_client(options, Connectivity::LocalOnly).await?;
    let notes = filter_notes(client.all_notes().await?, archived, all, limit);

    if as_json {
        let json_items = notes
            .iter()
            .map(note_to_list_item)
            .collect::<Vec<NoteListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if notes.is_empty() {
        println!("No notes yet.");
    } else {
        for line in format_note_lines(&notes) {
            println!("{line}");
        }
    }

    Ok(())
}

pub async fn run_show(id: &str, as_json: bool, options: &ClientOptions) -> Result<(), CliError> {
    let client = open_client(options, Connectivity::LocalOnly).await?;
    let note = client.resolve_note(id).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&note)?);
    } else {
        println!("{}", format_note_detail(&note));
    }
    Ok(())
}
