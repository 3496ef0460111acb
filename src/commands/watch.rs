use std::future::Future;
use std::io::Write;

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::commands::render_detail;
use crate::services::state::{SyncEvent, SyncHandle};

/// Follow one document until `shutdown` resolves or the document is deleted.
pub async fn watch<W: Write>(
    handle: &SyncHandle,
    id: &str,
    out: &mut W,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let mut events = handle.subscribe();
    handle.open_detail(id).context("open detail view")?;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => match event {
                Ok(SyncEvent::RecordChanged(record)) if record.id == id => {
                    for line in render_detail(&record) {
                        writeln!(out, "{}", line)?;
                    }
                    writeln!(out)?;
                }
                Ok(SyncEvent::RecordRemoved(removed)) if removed == id => {
                    writeln!(out, "documento {} eliminado", id)?;
                    break;
                }
                Ok(SyncEvent::HardReload { id: target }) if target == id => {
                    info!(id = %id, "reloading detail view");
                    handle.reload().context("reload detail view")?;
                }
                Ok(SyncEvent::Connection(state)) => info!(state = state.as_str(), "push channel"),
                Ok(SyncEvent::FetchFailed { message, .. }) => warn!(id = %id, error = %message, "refresh failed"),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "view fell behind, refreshing");
                    handle.refresh().context("refresh detail view")?;
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    let _ = handle.close_detail();
    Ok(())
}
