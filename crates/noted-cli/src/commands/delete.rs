use crate::commands::common::{open_client, ClientOptions, Connectivity};
use crate::error::CliError;

pub async fn run_delete(id: &str, options: &ClientOptions) -> Result<(), CliError> {
    let client = open_client(options, Connectivity::Check).await?;
    let note = client.resolve_note(id).await?;

    client.facade.delete_note(&note.local_id).await?;
    println!("{}", note.local_id);
    Ok(())
}
