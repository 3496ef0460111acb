use std::collections::HashSet;
use std::future::Future;
use std::io::Write;

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::commands::render_row;
use crate::models::{DocumentRecord, ListQuery};
use crate::services::state::{SyncEvent, SyncHandle};

fn print_page<W: Write>(out: &mut W, query: &ListQuery, items: &[DocumentRecord], total: u64) -> Result<()> {
    let pages = total.div_ceil(u64::from(query.page_size.max(1))).max(1);
    writeln!(out, "página {}/{} ({} documentos)", query.page, pages, total)?;
    for record in items {
        writeln!(out, "{}", render_row(record))?;
    }
    writeln!(out)?;
    Ok(())
}

/// Follow one page of the document list until `shutdown` resolves.
pub async fn list<W: Write>(
    handle: &SyncHandle,
    query: ListQuery,
    out: &mut W,
    shutdown: impl Future<Output = ()>,
) -> Result<()> {
    let mut events = handle.subscribe();
    handle.open_list(query.clone()).context("open list view")?;
    tokio::pin!(shutdown);

    let mut visible: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => match event {
                Ok(SyncEvent::PageChanged { items, total }) => {
                    visible = items.iter().map(|r| r.id.clone()).collect();
                    print_page(out, &query, &items, total)?;
                }
                Ok(SyncEvent::RecordChanged(record)) if visible.contains(&record.id) => {
                    writeln!(out, "{}", render_row(&record))?;
                }
                Ok(SyncEvent::RecordRemoved(id)) if visible.remove(&id) => {
                    writeln!(out, "documento {} eliminado", id)?;
                }
                Ok(SyncEvent::HardReload { id }) if visible.contains(&id) => {
                    info!(id = %id, "reloading list view");
                    handle.reload().context("reload list view")?;
                }
                Ok(SyncEvent::Connection(state)) => info!(state = state.as_str(), "push channel"),
                Ok(SyncEvent::FetchFailed { message, .. }) => warn!(error = %message, "list refresh failed"),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "view fell behind, refreshing");
                    handle.refresh().context("refresh list view")?;
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    let _ = handle.close_list();
    Ok(())
}
