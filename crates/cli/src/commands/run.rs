use std::path::{Path, PathBuf};

use stagewatch_client::{HttpClient, PollerConfig, StartRequest};

use super::watch::{follow, report};
use super::{client_runtime, file_name_of, CliError};
use crate::OutputFormat;

/// Upload `file`, start a job on it, and follow the job to its artifact.
#[allow(clippy::too_many_arguments)]
pub(crate) fn cmd_run(
    file: &Path,
    server: &str,
    prompt: Option<String>,
    out: Option<PathBuf>,
    poller_config: PollerConfig,
    delete_after: bool,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), CliError> {
    let bytes = std::fs::read(file).map_err(|source| CliError::Read {
        path: file.to_path_buf(),
        source,
    })?;
    let client = HttpClient::new(server, poller_config.request_timeout());
    let echo = output == OutputFormat::Text && !quiet;

    let rt = client_runtime()?;
    rt.block_on(async {
        let uploaded = client.upload(file_name_of(file), bytes).await?;
        tracing::info!(
            file_name = %uploaded.file_name,
            size = uploaded.size,
            content_type = %uploaded.content_type,
            "uploaded"
        );

        let started = client
            .start(StartRequest {
                prompt,
                document: Some(uploaded.file_name),
            })
            .await?;
        if echo {
            println!("Started {}", started.project_id);
        }

        let out = out.unwrap_or_else(|| PathBuf::from(format!("{}.zip", started.project_id)));
        let (outcome, written) =
            follow(client, &started.project_id, poller_config, &out, echo, delete_after).await?;
        report(&started.project_id, &outcome, &out, written, output, quiet);
        Ok::<(), CliError>(())
    })
}
