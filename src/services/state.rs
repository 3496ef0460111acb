//! The synchronizer: one task per session that owns the snapshot store.
//!
//! Push updates are merged as they are drained from the channel; fetches run
//! as separate tasks and their results are sequenced by the store. Soft
//! refreshes are performed here, hard reloads are handed to the views as
//! [`SyncEvent::HardReload`].

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::api::DocumentApi;
use crate::error::ApiError;
use crate::lifecycle::{RefreshAction, Transition, TransitionTracker};
use crate::models::{DocumentPage, DocumentRecord, ListQuery, PartialUpdate};
use crate::services::channel::{ConnectionState, PushChannel, SyncGeneration};
use crate::services::store::{
    Installed, PageOutcome, ProgressPolicy, QueryKey, RequestTicket, SnapshotOutcome, SnapshotStore,
    UpdateOutcome,
};

const EVENT_CAPACITY: usize = 256;

/// Notifications to views.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    RecordChanged(DocumentRecord),
    RecordRemoved(String),
    PageChanged { items: Vec<DocumentRecord>, total: u64 },
    Connection(ConnectionState),
    Transition(Transition),
    /// The view must reconstruct itself, typically via [`SyncHandle::reload`].
    HardReload { id: String },
    FetchFailed { key: QueryKey, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("synchronizer shut down")]
    Shutdown,
}

enum SyncRequest {
    OpenDetail(String),
    CloseDetail,
    OpenList(ListQuery),
    CloseList,
    Refresh,
    Reload,
    Remove(String),
    Detail(oneshot::Sender<Option<DocumentRecord>>),
    Page(oneshot::Sender<Vec<DocumentRecord>>),
}

/// Result of a fetch task.
pub struct FetchResult {
    pub ticket: RequestTicket,
    pub payload: FetchPayload,
}

pub enum FetchPayload {
    Document(Result<DocumentRecord, ApiError>),
    Page(ListQuery, Result<DocumentPage, ApiError>),
}

/// Cloneable, `Send` handle to a running synchronizer.
#[derive(Clone)]
pub struct SyncHandle {
    tx: mpsc::UnboundedSender<SyncRequest>,
    events: broadcast::Sender<SyncEvent>,
    connection: watch::Receiver<ConnectionState>,
}

impl SyncHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.connection.borrow()
    }

    pub fn open_detail(&self, id: &str) -> Result<(), SyncError> {
        self.send(SyncRequest::OpenDetail(id.to_string()))
    }

    pub fn close_detail(&self) -> Result<(), SyncError> {
        self.send(SyncRequest::CloseDetail)
    }

    pub fn open_list(&self, query: ListQuery) -> Result<(), SyncError> {
        self.send(SyncRequest::OpenList(query))
    }

    pub fn close_list(&self) -> Result<(), SyncError> {
        self.send(SyncRequest::CloseList)
    }

    /// Soft refresh of every open view.
    pub fn refresh(&self) -> Result<(), SyncError> {
        self.send(SyncRequest::Refresh)
    }

    /// Hard reload: drop all records and rebuild the open views.
    pub fn reload(&self) -> Result<(), SyncError> {
        self.send(SyncRequest::Reload)
    }

    /// The document was deleted.
    pub fn remove(&self, id: &str) -> Result<(), SyncError> {
        self.send(SyncRequest::Remove(id.to_string()))
    }

    pub async fn detail(&self) -> Result<Option<DocumentRecord>, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.send(SyncRequest::Detail(reply))?;
        rx.await.map_err(|_| SyncError::Shutdown)
    }

    pub async fn page(&self) -> Result<Vec<DocumentRecord>, SyncError> {
        let (reply, rx) = oneshot::channel();
        self.send(SyncRequest::Page(reply))?;
        rx.await.map_err(|_| SyncError::Shutdown)
    }

    fn send(&self, request: SyncRequest) -> Result<(), SyncError> {
        self.tx.send(request).map_err(|_| SyncError::Shutdown)
    }
}

pub struct Synchronizer<A: DocumentApi> {
    api: Arc<A>,
    store: SnapshotStore,
    tracker: TransitionTracker,
    events: broadcast::Sender<SyncEvent>,
    fetch_tx: mpsc::UnboundedSender<FetchResult>,
}

impl<A: DocumentApi> Synchronizer<A> {
    pub fn new(
        api: Arc<A>,
        progress_policy: ProgressPolicy,
        events: broadcast::Sender<SyncEvent>,
        fetch_tx: mpsc::UnboundedSender<FetchResult>,
    ) -> Self {
        Synchronizer {
            api,
            store: SnapshotStore::new(progress_policy),
            tracker: TransitionTracker::new(),
            events,
            fetch_tx,
        }
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn apply_update(&mut self, update: PartialUpdate) {
        let id = update.id.clone();
        match self.store.apply_update(update) {
            UpdateOutcome::Merged(record) => {
                self.emit(SyncEvent::RecordChanged(record.clone()));
                self.observe(&record);
            }
            UpdateOutcome::Unchanged => {}
            UpdateOutcome::Buffered => debug!(id = %id, "buffered update without base record"),
        }
    }

    pub fn apply_fetch(&mut self, result: FetchResult) {
        let FetchResult { ticket, payload } = result;
        match payload {
            FetchPayload::Document(Ok(record)) => {
                if let SnapshotOutcome::Applied(installed) = self.store.apply_snapshot(&ticket, record) {
                    self.emit(SyncEvent::RecordChanged(installed.record.clone()));
                    self.observe_installed(&installed);
                }
            }
            FetchPayload::Page(query, Ok(page)) => {
                let total = page.total;
                if let PageOutcome::Applied(installed) = self.store.apply_page(&ticket, query, page) {
                    self.forget_evicted();
                    self.emit(SyncEvent::PageChanged {
                        items: installed.iter().map(|i| i.record.clone()).collect(),
                        total,
                    });
                    for entry in &installed {
                        self.observe_installed(entry);
                    }
                }
            }
            FetchPayload::Document(Err(ApiError::NotFound(_))) => {
                if let QueryKey::Detail(id) = &ticket.key {
                    if self.store.is_current(&ticket) {
                        info!(id = %id, "document no longer exists");
                        self.remove(id);
                    }
                }
            }
            FetchPayload::Document(Err(e)) | FetchPayload::Page(_, Err(e)) => {
                if self.store.is_current(&ticket) {
                    warn!(key = ?ticket.key, error = %e, "fetch failed");
                    self.emit(SyncEvent::FetchFailed {
                        key: ticket.key,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    pub fn open_detail(&mut self, id: &str) {
        if self.store.detail_id().is_some_and(|current| current != id) {
            self.close_detail();
        }
        self.fetch_document(id);
    }

    pub fn close_detail(&mut self) {
        self.store.close_detail();
        self.forget_evicted();
    }

    pub fn open_list(&mut self, query: ListQuery) {
        self.fetch_page(query);
    }

    pub fn close_list(&mut self) {
        self.store.close_list();
        self.forget_evicted();
    }

    /// Soft refresh of every open view, keeping its query.
    pub fn refresh(&mut self) {
        if let Some(id) = self.store.detail_id().map(str::to_string) {
            self.fetch_document(&id);
        }
        if let Some(query) = self.store.list_view().map(|list| list.query.clone()) {
            self.fetch_page(query);
        }
    }

    /// Transition baselines survive the reload, so the reloaded snapshot
    /// does not fire the same transition again.
    pub fn reload(&mut self) {
        info!("hard reload of open views");
        self.store.clear_records();
        self.refresh();
    }

    pub fn remove(&mut self, id: &str) {
        self.store.remove(id);
        self.tracker.forget(id);
        self.emit(SyncEvent::RecordRemoved(id.to_string()));
    }

    /// The push channel reopened; anything pushed while it was down is lost,
    /// so every open view is fetched again once.
    pub fn resync(&mut self, generation: SyncGeneration) {
        info!(generation = generation.0, "push channel reconnected, resynchronizing");
        self.refresh();
    }

    /// A buffered update replayed onto a snapshot is a transition away from
    /// the status the snapshot carried.
    fn observe_installed(&mut self, installed: &Installed) {
        self.tracker.seed(&installed.record.id, &installed.fetched_status);
        self.observe(&installed.record);
    }

    fn forget_evicted(&mut self) {
        for id in self.store.take_evicted() {
            self.tracker.forget(&id);
        }
    }

    fn observe(&mut self, record: &DocumentRecord) {
        let Some(transition) = self.tracker.observe(&record.id, &record.status) else {
            return;
        };
        debug!(id = %transition.id, from = %transition.from, to = %transition.to, "status transition");
        match transition.action {
            RefreshAction::Soft => self.refresh_for(&transition.id),
            RefreshAction::Hard => self.emit(SyncEvent::HardReload {
                id: transition.id.clone(),
            }),
            RefreshAction::None => {}
        }
        self.emit(SyncEvent::Transition(transition));
    }

    fn refresh_for(&mut self, id: &str) {
        if self.store.detail_id() == Some(id) {
            self.fetch_document(id);
        }
        if self.store.in_list(id) {
            if let Some(query) = self.store.list_view().map(|list| list.query.clone()) {
                self.fetch_page(query);
            }
        }
    }

    fn fetch_document(&mut self, id: &str) {
        let ticket = self.store.begin(QueryKey::Detail(id.to_string()));
        let api = self.api.clone();
        let tx = self.fetch_tx.clone();
        let id = id.to_string();
        tokio::spawn(async move {
            let result = api.fetch_document(&id).await;
            let _ = tx.send(FetchResult {
                ticket,
                payload: FetchPayload::Document(result),
            });
        });
    }

    fn fetch_page(&mut self, query: ListQuery) {
        let ticket = self.store.begin(QueryKey::List);
        let api = self.api.clone();
        let tx = self.fetch_tx.clone();
        tokio::spawn(async move {
            let result = api.fetch_page(&query).await;
            let _ = tx.send(FetchResult {
                ticket,
                payload: FetchPayload::Page(query, result),
            });
        });
    }

    fn handle_request(&mut self, request: SyncRequest) {
        match request {
            SyncRequest::OpenDetail(id) => self.open_detail(&id),
            SyncRequest::CloseDetail => self.close_detail(),
            SyncRequest::OpenList(query) => self.open_list(query),
            SyncRequest::CloseList => self.close_list(),
            SyncRequest::Refresh => self.refresh(),
            SyncRequest::Reload => self.reload(),
            SyncRequest::Remove(id) => self.remove(&id),
            SyncRequest::Detail(reply) => {
                let _ = reply.send(self.store.detail().cloned());
            }
            SyncRequest::Page(reply) => {
                let _ = reply.send(self.store.page().into_iter().cloned().collect());
            }
        }
    }

    fn emit(&self, event: SyncEvent) {
        // No subscribers is fine: views may not be listening yet.
        let _ = self.events.send(event);
    }

    async fn run(
        mut self,
        channel: PushChannel,
        mut requests: mpsc::UnboundedReceiver<SyncRequest>,
        mut fetches: mpsc::UnboundedReceiver<FetchResult>,
    ) {
        let mut state_rx = channel.subscribe_state();
        let mut generation_rx = channel.subscribe_generation();
        let mut channel_alive = true;

        loop {
            tokio::select! {
                _ = channel.updated() => {
                    for update in channel.take_pending() {
                        self.apply_update(update);
                    }
                }
                changed = state_rx.changed(), if channel_alive => {
                    if changed.is_err() {
                        channel_alive = false;
                        continue;
                    }
                    let state = *state_rx.borrow_and_update();
                    self.emit(SyncEvent::Connection(state));
                }
                changed = generation_rx.changed(), if channel_alive => {
                    if changed.is_err() {
                        channel_alive = false;
                        continue;
                    }
                    let generation = *generation_rx.borrow_and_update();
                    self.resync(generation);
                }
                Some(result) = fetches.recv() => self.apply_fetch(result),
                request = requests.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => break,
                },
            }
        }
        debug!("synchronizer shutting down: all handles dropped");
    }
}

/// Spawn a synchronizer fed by `channel` and reading snapshots from `api`.
///
/// The returned handle can be cloned and shared; the synchronizer stops when
/// every handle is dropped, closing the push channel with it.
pub fn spawn_synchronizer<A: DocumentApi>(
    api: A,
    channel: PushChannel,
    progress_policy: ProgressPolicy,
) -> SyncHandle {
    let (tx, requests) = mpsc::unbounded_channel();
    let (fetch_tx, fetches) = mpsc::unbounded_channel();
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    let connection = channel.subscribe_state();

    let synchronizer = Synchronizer::new(Arc::new(api), progress_policy, events.clone(), fetch_tx);
    tokio::spawn(synchronizer.run(channel, requests, fetches));

    SyncHandle {
        tx,
        events,
        connection,
    }
}
