use std::path::Path;

use super::{file_name_of, CliError};
use crate::OutputFormat;

/// Normalize a local file the way the server would on upload.
pub(crate) fn cmd_normalize(
    file: &Path,
    out_dir: &Path,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), CliError> {
    let bytes = std::fs::read(file).map_err(|source| CliError::Read {
        path: file.to_path_buf(),
        source,
    })?;
    let normalized = stagewatch_normalize::normalize(&file_name_of(file), &bytes)?;

    std::fs::create_dir_all(out_dir).map_err(|source| CliError::Write {
        path: out_dir.to_path_buf(),
        source,
    })?;
    let target = out_dir.join(&normalized.file_name);
    std::fs::write(&target, &normalized.bytes).map_err(|source| CliError::Write {
        path: target.clone(),
        source,
    })?;

    match output {
        OutputFormat::Text => {
            if !quiet {
                let orientation = normalized
                    .orientation
                    .map(|o| format!(", {:?}", o).to_lowercase())
                    .unwrap_or_default();
                println!(
                    "Wrote {} ({}, {} bytes{})",
                    target.display(),
                    normalized.content_type,
                    normalized.size(),
                    orientation
                );
            }
        }
        OutputFormat::Json => {
            let size = normalized.size();
            let summary = serde_json::json!({
                "path": target.display().to_string(),
                "upload": normalized,
                "size": size,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).unwrap_or_else(|_| summary.to_string())
            );
        }
    }
    Ok(())
}
