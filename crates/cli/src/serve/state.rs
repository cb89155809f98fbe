//! Application state shared across request handlers.

use std::path::PathBuf;
use std::sync::Arc;

use stagewatch_core::{EmitMode, SnapshotEmitter};
use stagewatch_storage::JobStore;

pub(crate) struct AppState {
    /// Every live job. The store serializes polls per job.
    pub(crate) store: Arc<dyn JobStore>,
    /// Renders a job's ledger into the configured response shape.
    pub(crate) emitter: Box<dyn SnapshotEmitter>,
    /// Where normalized uploads are written, and read back from at job start.
    pub(crate) upload_dir: PathBuf,
}

impl AppState {
    pub(crate) fn new(store: Arc<dyn JobStore>, emit_mode: EmitMode, upload_dir: PathBuf) -> Self {
        AppState {
            store,
            emitter: emit_mode.emitter(),
            upload_dir,
        }
    }
}
