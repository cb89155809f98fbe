use std::collections::HashSet;
use std::path::{Path, PathBuf};

use stagewatch_client::{save_artifact, HttpClient, PollOutcome, Poller, PollerConfig};
use stagewatch_core::{ChatMessage, MessageKey, Origin, Timeline};

use super::{client_runtime, CliError};
use crate::OutputFormat;

/// Prints each timeline entry once, in display order.
struct TimelinePrinter {
    printed: HashSet<MessageKey>,
    enabled: bool,
}

impl TimelinePrinter {
    fn new(enabled: bool) -> Self {
        TimelinePrinter {
            printed: HashSet::new(),
            enabled,
        }
    }

    fn show(&mut self, timeline: &Timeline) {
        for m in timeline.messages() {
            if self.printed.insert(m.key()) && self.enabled {
                println!("{}", render(m));
            }
        }
    }
}

fn render(m: &ChatMessage) -> String {
    match m.origin {
        Origin::User => format!("> {}", m.message),
        Origin::Status => format!(
            "[{}] {}: {}",
            m.index,
            m.stage.as_deref().unwrap_or("?"),
            m.message
        ),
    }
}

/// Poll `project_id` on `client` until its artifact arrives, then save it.
/// With `delete_after`, the job is removed from the server once saved.
pub(super) async fn follow(
    client: HttpClient,
    project_id: &str,
    poller_config: PollerConfig,
    out: &Path,
    echo: bool,
    delete_after: bool,
) -> Result<(PollOutcome, usize), CliError> {
    let poller = Poller::new(client.clone(), poller_config);
    let mut printer = TimelinePrinter::new(echo);
    let outcome = poller
        .run_with(project_id, |timeline| printer.show(timeline))
        .await?;

    let written = match outcome.timeline.latest_artifact() {
        Some(artifact) => save_artifact(artifact, out)?,
        None => 0,
    };
    if delete_after {
        client.delete(project_id).await?;
        tracing::info!(project_id, "job deleted from server");
    }
    Ok((outcome, written))
}

pub(super) fn report(
    project_id: &str,
    outcome: &PollOutcome,
    out: &Path,
    written: usize,
    output: OutputFormat,
    quiet: bool,
) {
    match output {
        OutputFormat::Text => {
            if !quiet {
                println!(
                    "Saved {} ({} bytes) after {} polls",
                    out.display(),
                    written,
                    outcome.requests_sent
                );
            }
        }
        OutputFormat::Json => {
            let summary = serde_json::json!({
                "projectId": project_id,
                "artifact": out.display().to_string(),
                "bytes": written,
                "requests": outcome.requests_sent,
                "messages": outcome.timeline.messages(),
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&summary).unwrap_or_else(|_| summary.to_string())
            );
        }
    }
}

pub(crate) fn cmd_watch(
    project_id: &str,
    server: &str,
    out: Option<PathBuf>,
    poller_config: PollerConfig,
    delete_after: bool,
    output: OutputFormat,
    quiet: bool,
) -> Result<(), CliError> {
    let out = out.unwrap_or_else(|| PathBuf::from(format!("{}.zip", project_id)));
    let client = HttpClient::new(server, poller_config.request_timeout());
    let echo = output == OutputFormat::Text && !quiet;

    let rt = client_runtime()?;
    let (outcome, written) = rt.block_on(follow(
        client,
        project_id,
        poller_config,
        &out,
        echo,
        delete_after,
    ))?;
    report(project_id, &outcome, &out, written, output, quiet);
    Ok(())
}
