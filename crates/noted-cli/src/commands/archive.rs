use crate::commands::common::{open_client, ClientOptions, Connectivity};
use crate::error::CliError;

pub async fn run_set_archived(
    id: &str,
    archived: bool,
    options: &ClientOptions,
) -> Result<(), CliError> {
    let client = open_client(options, Connectivity::Check).await?;
    let note = client.resolve_note(id).await?;

    if note.archived == archived {
        println!("{}", note.local_id);
        return Ok(());
    }

    let updated = if archived {
        client.facade.archive_note(&note.local_id).await?
    } else {
        client.facade.unarchive_note(&note.local_id).await?
    };
    println!("{}", updated.local_id);
    Ok(())
}
