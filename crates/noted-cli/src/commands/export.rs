use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use noted_core::export::{
    render_notes_export, suggested_export_file_name, ExportFormat, ExportOptions,
};

use crate::cli::ExportFormatArg;
use crate::commands::common::{open_client, ClientOptions, Connectivity};
use crate::error::CliError;

impl From<ExportFormatArg> for ExportFormat {
    fn from(format: ExportFormatArg) -> Self {
        match format {
            ExportFormatArg::Json => Self::Json,
            ExportFormatArg::Csv => Self::Csv,
            ExportFormatArg::Txt => Self::Txt,
            ExportFormatArg::Markdown => Self::Markdown,
        }
    }
}

pub async fn run_export(
    options: ExportOptions,
    output_path: Option<&Path>,
    client_options: &ClientOptions,
) -> Result<(), CliError> {
    let client = open_client(client_options, Connectivity::LocalOnly).await?;
    let notes = client.all_notes().await?;
    let exported_at = Utc::now();
    let rendered = render_notes_export(&notes, options, exported_at)?;

    if let Some(path) = output_path {
        let target = export_target(path, options.format, exported_at);
        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&target, rendered)?;
        println!("{}", target.display());
    } else {
        println!("{rendered}");
    }

    Ok(())
}

/// A directory target gets the suggested file name appended.
pub fn export_target(path: &Path, format: ExportFormat, exported_at: DateTime<Utc>) -> PathBuf {
    if path.is_dir() {
        path.join(suggested_export_file_name(format, exported_at))
    } else {
        path.to_path_buf()
    }
}
