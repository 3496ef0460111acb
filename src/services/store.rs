//! Snapshot store for the currently open views.
//!
//! Holds the fetched records behind a detail view and/or a list view, the
//! push updates still waiting for a base record, and the request sequencer
//! that keeps a slow older fetch from clobbering a newer one.

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::lifecycle::Status;
use crate::models::{DocumentPage, DocumentRecord, ListQuery, PartialUpdate};
use crate::services::reconciler::{combine, merge};

/// Updates buffered for documents without a base record.
const MAX_PENDING: usize = 512;

/// What to do when a progress value lower than the current one arrives
/// while the status is unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPolicy {
    /// Keep the highest progress seen in the current status phase.
    #[default]
    HoldHighest,
    /// Last write wins.
    Accept,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Detail(String),
    List,
}

/// Identifies one issued fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTicket {
    pub key: QueryKey,
    pub seq: u64,
}

/// Monotonic request ids per query key. Only the latest ticket for a key is
/// current; responses carrying an older ticket are discarded.
#[derive(Debug, Default)]
pub struct RequestSequencer {
    next: u64,
    latest: HashMap<QueryKey, u64>,
}

impl RequestSequencer {
    pub fn issue(&mut self, key: QueryKey) -> RequestTicket {
        self.next += 1;
        self.latest.insert(key.clone(), self.next);
        RequestTicket { key, seq: self.next }
    }

    pub fn is_current(&self, ticket: &RequestTicket) -> bool {
        self.latest.get(&ticket.key) == Some(&ticket.seq)
    }

    pub fn retire(&mut self, key: &QueryKey) {
        self.latest.remove(key);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListView {
    pub query: ListQuery,
    pub ids: Vec<String>,
    pub total: u64,
}

/// A fetched record as installed in the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Installed {
    pub record: DocumentRecord,
    /// Status the snapshot itself carried, before any buffered update was
    /// replayed on top of it.
    pub fetched_status: Status,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotOutcome {
    Applied(Installed),
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Applied(Vec<Installed>),
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The record changed; carries the merged result.
    Merged(DocumentRecord),
    /// The update asserted nothing new.
    Unchanged,
    /// No base record yet; kept until a fetch establishes one.
    Buffered,
}

#[derive(Debug, Default)]
pub struct SnapshotStore {
    records: HashMap<String, DocumentRecord>,
    detail: Option<String>,
    list: Option<ListView>,
    pending: HashMap<String, PartialUpdate>,
    pending_order: VecDeque<String>,
    /// Ids dropped because no open view references them any more.
    evicted: Vec<String>,
    sequencer: RequestSequencer,
    progress_policy: ProgressPolicy,
}

impl SnapshotStore {
    pub fn new(progress_policy: ProgressPolicy) -> Self {
        SnapshotStore {
            progress_policy,
            ..Default::default()
        }
    }

    pub fn begin(&mut self, key: QueryKey) -> RequestTicket {
        self.sequencer.issue(key)
    }

    pub fn is_current(&self, ticket: &RequestTicket) -> bool {
        self.sequencer.is_current(ticket)
    }

    /// Install a fetched detail record. A buffered push update for the same
    /// id is replayed on top of it, so an update that arrived before the
    /// fetch is not lost.
    pub fn apply_snapshot(&mut self, ticket: &RequestTicket, record: DocumentRecord) -> SnapshotOutcome {
        if !self.sequencer.is_current(ticket) {
            debug!(id = %record.id, seq = ticket.seq, "discarding stale snapshot");
            return SnapshotOutcome::Stale;
        }
        if let QueryKey::Detail(id) = &ticket.key {
            self.detail = Some(id.clone());
        }
        SnapshotOutcome::Applied(self.install(record))
    }

    pub fn apply_page(&mut self, ticket: &RequestTicket, query: ListQuery, page: DocumentPage) -> PageOutcome {
        if !self.sequencer.is_current(ticket) {
            debug!(page = query.page, seq = ticket.seq, "discarding stale page");
            return PageOutcome::Stale;
        }
        let ids = page.items.iter().map(|r| r.id.clone()).collect();
        let previous = self.list.replace(ListView {
            query,
            ids,
            total: page.total,
        });
        let installed = page.items.into_iter().map(|r| self.install(r)).collect();
        if let Some(previous) = previous {
            self.prune(previous.ids);
        }
        PageOutcome::Applied(installed)
    }

    pub fn apply_update(&mut self, update: PartialUpdate) -> UpdateOutcome {
        let Some(existing) = self.records.get(&update.id) else {
            self.buffer(update);
            return UpdateOutcome::Buffered;
        };
        let mut merged = merge(existing, &update);
        self.hold_progress(existing, &mut merged);
        if &merged == existing {
            return UpdateOutcome::Unchanged;
        }
        self.records.insert(merged.id.clone(), merged.clone());
        UpdateOutcome::Merged(merged)
    }

    /// The document was deleted upstream.
    pub fn remove(&mut self, id: &str) -> Option<DocumentRecord> {
        self.pending.remove(id);
        self.pending_order.retain(|p| p != id);
        if self.detail.as_deref() == Some(id) {
            self.detail = None;
        }
        if let Some(list) = self.list.as_mut() {
            let before = list.ids.len();
            list.ids.retain(|i| i != id);
            if list.ids.len() < before {
                list.total = list.total.saturating_sub(1);
            }
        }
        self.records.remove(id)
    }

    pub fn close_detail(&mut self) {
        if let Some(id) = self.detail.take() {
            self.sequencer.retire(&QueryKey::Detail(id.clone()));
            self.prune(vec![id]);
        }
    }

    pub fn close_list(&mut self) {
        if let Some(list) = self.list.take() {
            self.sequencer.retire(&QueryKey::List);
            self.prune(list.ids);
        }
    }

    /// Drop every record while keeping the view descriptors, so the views
    /// can be rebuilt from fresh fetches. Not reported as evicted.
    pub fn clear_records(&mut self) {
        self.records.clear();
        if let Some(list) = self.list.as_mut() {
            list.ids.clear();
        }
    }

    pub fn get(&self, id: &str) -> Option<&DocumentRecord> {
        self.records.get(id)
    }

    pub fn detail_id(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn detail(&self) -> Option<&DocumentRecord> {
        self.detail.as_deref().and_then(|id| self.records.get(id))
    }

    pub fn list_view(&self) -> Option<&ListView> {
        self.list.as_ref()
    }

    pub fn page(&self) -> Vec<&DocumentRecord> {
        self.list
            .iter()
            .flat_map(|list| list.ids.iter())
            .filter_map(|id| self.records.get(id))
            .collect()
    }

    pub fn in_list(&self, id: &str) -> bool {
        self.list.as_ref().is_some_and(|list| list.ids.iter().any(|i| i == id))
    }

    pub fn pending(&self, id: &str) -> Option<&PartialUpdate> {
        self.pending.get(id)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Ids pruned since the last call.
    pub fn take_evicted(&mut self) -> Vec<String> {
        std::mem::take(&mut self.evicted)
    }

    fn install(&mut self, record: DocumentRecord) -> Installed {
        let fetched_status = record.status.clone();
        let mut record = record;
        if let Some(update) = self.pending.remove(&record.id) {
            self.pending_order.retain(|p| p != &record.id);
            record = merge(&record, &update);
        }
        if let Some(existing) = self.records.get(&record.id) {
            self.hold_progress(existing, &mut record);
        }
        self.records.insert(record.id.clone(), record.clone());
        Installed { record, fetched_status }
    }

    fn buffer(&mut self, update: PartialUpdate) {
        match self.pending.get_mut(&update.id) {
            Some(older) => *older = combine(older, &update),
            None => {
                if self.pending.len() >= MAX_PENDING {
                    if let Some(evicted) = self.pending_order.pop_front() {
                        self.pending.remove(&evicted);
                    }
                }
                self.pending_order.push_back(update.id.clone());
                self.pending.insert(update.id.clone(), update);
            }
        }
    }

    fn hold_progress(&self, before: &DocumentRecord, after: &mut DocumentRecord) {
        if self.progress_policy != ProgressPolicy::HoldHighest || before.status != after.status {
            return;
        }
        if let (Some(old), Some(new)) = (before.progress, after.progress) {
            if new < old {
                debug!(id = %after.id, old, new, "ignoring progress regression");
                after.progress = Some(old);
            }
        }
    }

    /// Remove records no longer referenced by any open view.
    fn prune(&mut self, candidates: Vec<String>) {
        let live: HashSet<&str> = self
            .list
            .iter()
            .flat_map(|list| list.ids.iter().map(String::as_str))
            .chain(self.detail.as_deref())
            .collect();
        let dead: Vec<String> = candidates
            .into_iter()
            .filter(|id| !live.contains(id.as_str()))
            .collect();
        for id in dead {
            if self.records.remove(&id).is_some() {
                self.evicted.push(id);
            }
        }
    }
}
