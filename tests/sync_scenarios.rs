//! End-to-end synchronization scenarios over an in-memory push channel and a
//! fake document API.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::future::BoxFuture;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::time::timeout;

use balancelive::api::DocumentApi;
use balancelive::error::{ApiError, ChannelError};
use balancelive::lifecycle::{LifecycleState, Status};
use balancelive::models::{CompanyInfo, DocumentPage, DocumentRecord, ListQuery};
use balancelive::services::channel::{ConnectionState, PushChannel, ReconnectPolicy};
use balancelive::services::store::ProgressPolicy;
use balancelive::services::transport::{Connector, Endpoint, FrameStream, Session};
use balancelive::{spawn_synchronizer, SyncEvent, SyncHandle};

const WAIT: Duration = Duration::from_secs(3);

type Frames = UnboundedSender<Result<String, ChannelError>>;

/// Each `connect` takes the next prepared connection; none left means the
/// server is unreachable.
#[derive(Clone, Default)]
struct FakeConnector {
    connections: Arc<Mutex<VecDeque<UnboundedReceiver<Result<String, ChannelError>>>>>,
}

impl FakeConnector {
    fn prepare(&self) -> Frames {
        let (tx, rx) = unbounded();
        self.connections.lock().unwrap().push_back(rx);
        tx
    }
}

impl Connector for FakeConnector {
    fn connect<'a>(&'a self, _endpoint: &'a Endpoint) -> BoxFuture<'a, Result<FrameStream, ChannelError>> {
        Box::pin(async move {
            match self.connections.lock().unwrap().pop_front() {
                Some(rx) => Ok(rx.boxed()),
                None => Err(ChannelError::Connect("connection refused".into())),
            }
        })
    }
}

#[derive(Clone, Default)]
struct FakeApi {
    documents: Arc<Mutex<HashMap<String, DocumentRecord>>>,
    list: Arc<Mutex<Vec<String>>>,
    document_fetches: Arc<AtomicUsize>,
    page_fetches: Arc<AtomicUsize>,
}

impl FakeApi {
    fn put(&self, record: DocumentRecord) {
        self.documents.lock().unwrap().insert(record.id.clone(), record);
    }

    fn list_ids(&self, ids: &[&str]) {
        *self.list.lock().unwrap() = ids.iter().map(|s| s.to_string()).collect();
    }
}

impl DocumentApi for FakeApi {
    fn fetch_document<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<DocumentRecord, ApiError>> {
        Box::pin(async move {
            self.document_fetches.fetch_add(1, Ordering::SeqCst);
            self.documents
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| ApiError::NotFound(id.to_string()))
        })
    }

    fn fetch_page<'a>(&'a self, query: &'a ListQuery) -> BoxFuture<'a, Result<DocumentPage, ApiError>> {
        Box::pin(async move {
            self.page_fetches.fetch_add(1, Ordering::SeqCst);
            let documents = self.documents.lock().unwrap();
            let items: Vec<DocumentRecord> = self
                .list
                .lock()
                .unwrap()
                .iter()
                .filter_map(|id| documents.get(id).cloned())
                .collect();
            Ok(DocumentPage {
                total: items.len() as u64,
                items,
                page: query.page,
                page_size: query.page_size,
            })
        })
    }
}

fn fast_reconnect() -> ReconnectPolicy {
    ReconnectPolicy {
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        jitter: 0.0,
        ..ReconnectPolicy::default()
    }
}

fn endpoint() -> Endpoint {
    Endpoint {
        url: "ws://test/ws/documents".into(),
        session: Session::anonymous(),
    }
}

fn start(api: &FakeApi, connector: &FakeConnector, policy: ReconnectPolicy) -> SyncHandle {
    let channel = PushChannel::open(connector.clone(), endpoint(), policy).unwrap();
    spawn_synchronizer(api.clone(), channel, ProgressPolicy::HoldHighest)
}

fn push(frames: &Frames, json: &str) {
    frames.unbounded_send(Ok(json.to_string())).unwrap();
}

async fn next_event<F>(events: &mut broadcast::Receiver<SyncEvent>, mut pred: F) -> SyncEvent
where
    F: FnMut(&SyncEvent) -> bool,
{
    timeout(WAIT, async {
        loop {
            let event = events.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

async fn record_where<F>(events: &mut broadcast::Receiver<SyncEvent>, mut pred: F) -> DocumentRecord
where
    F: FnMut(&DocumentRecord) -> bool,
{
    match next_event(events, |e| matches!(e, SyncEvent::RecordChanged(r) if pred(r))).await {
        SyncEvent::RecordChanged(record) => record,
        _ => unreachable!(),
    }
}

async fn wait_open(events: &mut broadcast::Receiver<SyncEvent>, handle: &SyncHandle) {
    if handle.connection_state() == ConnectionState::Open {
        return;
    }
    next_event(events, |e| matches!(e, SyncEvent::Connection(ConnectionState::Open))).await;
}

fn acme(status: LifecycleState) -> DocumentRecord {
    let mut record = DocumentRecord::new("doc1", status);
    record.company_info = Some(CompanyInfo {
        company_name: Some("Acme".into()),
        ..Default::default()
    });
    record
}

#[tokio::test]
async fn progress_push_keeps_fetched_fields() {
    let api = FakeApi::default();
    api.put(acme(LifecycleState::Analyzing));
    let connector = FakeConnector::default();
    let frames = connector.prepare();
    let handle = start(&api, &connector, fast_reconnect());
    let mut events = handle.subscribe();

    handle.open_detail("doc1").unwrap();
    record_where(&mut events, |r| r.id == "doc1").await;

    push(&frames, r#"{"id":"doc1","progress":40}"#);
    let record = record_where(&mut events, |r| r.progress == Some(40)).await;
    assert_eq!(record.status, Status::Known(LifecycleState::Analyzing));
    assert_eq!(record.company_name(), Some("Acme"));

    let detail = handle.detail().await.unwrap().unwrap();
    assert_eq!(detail, record);
}

#[tokio::test]
async fn push_before_fetch_survives_the_snapshot() {
    let api = FakeApi::default();
    api.put(DocumentRecord::new("doc2", LifecycleState::Analyzing));
    let connector = FakeConnector::default();
    let frames = connector.prepare();
    let handle = start(&api, &connector, fast_reconnect());
    let mut events = handle.subscribe();

    push(&frames, r#"{"id":"doc2","status":"Error","error_message":"parse failed"}"#);
    wait_open(&mut events, &handle).await;
    handle.open_detail("doc2").unwrap();

    let record = record_where(&mut events, |r| r.status.is(LifecycleState::Error)).await;
    assert_eq!(record.error_message.as_deref(), Some("parse failed"));
    let detail = handle.detail().await.unwrap().unwrap();
    assert_eq!(detail.status, Status::Known(LifecycleState::Error));
}

#[tokio::test]
async fn hard_reload_fires_once_per_transition() {
    let api = FakeApi::default();
    api.put(acme(LifecycleState::Analyzing));
    let connector = FakeConnector::default();
    let frames = connector.prepare();
    let handle = start(&api, &connector, fast_reconnect());
    let mut events = handle.subscribe();

    handle.open_detail("doc1").unwrap();
    record_where(&mut events, |r| r.id == "doc1").await;

    push(&frames, r#"{"id":"doc1","status":"Analizando"}"#);
    push(&frames, r#"{"id":"doc1","status":"Analizado"}"#);
    push(&frames, r#"{"id":"doc1","status":"Analizado"}"#);
    next_event(&mut events, |e| matches!(e, SyncEvent::HardReload { id } if id == "doc1")).await;

    api.put(acme(LifecycleState::Analyzed));
    handle.reload().unwrap();
    record_where(&mut events, |r| r.status.is(LifecycleState::Analyzed)).await;

    push(&frames, r#"{"id":"doc1","status":"Analizado"}"#);
    push(&frames, r#"{"id":"doc1","page_count":12}"#);
    let mut reloads = 0;
    next_event(&mut events, |e| {
        if matches!(e, SyncEvent::HardReload { .. }) {
            reloads += 1;
        }
        matches!(e, SyncEvent::RecordChanged(r) if r.page_count == Some(12))
    })
    .await;
    assert_eq!(reloads, 0);
}

#[tokio::test]
async fn soft_refresh_keeps_the_list_query() {
    let api = FakeApi::default();
    api.put(DocumentRecord::new("doc1", LifecycleState::Uploading));
    api.list_ids(&["doc1"]);
    let connector = FakeConnector::default();
    let frames = connector.prepare();
    let handle = start(&api, &connector, fast_reconnect());
    let mut events = handle.subscribe();

    let query = ListQuery {
        page: 3,
        search: Some("acme".into()),
        ..ListQuery::default()
    };
    handle.open_list(query).unwrap();
    next_event(&mut events, |e| matches!(e, SyncEvent::PageChanged { .. })).await;
    assert_eq!(api.page_fetches.load(Ordering::SeqCst), 1);

    let mut converting = DocumentRecord::new("doc1", LifecycleState::Converting);
    converting.progress = Some(10);
    api.put(converting);
    push(&frames, r#"{"id":"doc1","status":"Convirtiendo","progress":10}"#);
    next_event(&mut events, |e| matches!(e, SyncEvent::PageChanged { .. })).await;
    assert_eq!(api.page_fetches.load(Ordering::SeqCst), 2);

    let page = handle.page().await.unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].status, Status::Known(LifecycleState::Converting));
}

#[tokio::test]
async fn unrecognized_status_is_inert() {
    let api = FakeApi::default();
    api.put(acme(LifecycleState::Analyzing));
    let connector = FakeConnector::default();
    let frames = connector.prepare();
    let handle = start(&api, &connector, fast_reconnect());
    let mut events = handle.subscribe();

    handle.open_detail("doc1").unwrap();
    record_where(&mut events, |r| r.id == "doc1").await;
    let fetches = api.document_fetches.load(Ordering::SeqCst);

    push(&frames, r#"{"id":"doc1","status":"Desconocido"}"#);
    let record = record_where(&mut events, |r| r.status.as_str() == "Desconocido").await;
    assert_eq!(record.status, Status::Unrecognized("Desconocido".into()));

    push(&frames, r#"{"id":"doc1","page_count":2}"#);
    let mut side_effects = 0;
    next_event(&mut events, |e| {
        if matches!(e, SyncEvent::HardReload { .. }) {
            side_effects += 1;
        }
        matches!(e, SyncEvent::RecordChanged(r) if r.page_count == Some(2))
    })
    .await;
    assert_eq!(side_effects, 0);
    assert_eq!(api.document_fetches.load(Ordering::SeqCst), fetches);
}

#[tokio::test]
async fn malformed_frames_are_dropped() {
    let api = FakeApi::default();
    api.put(acme(LifecycleState::Recognizing));
    let connector = FakeConnector::default();
    let frames = connector.prepare();
    let handle = start(&api, &connector, fast_reconnect());
    let mut events = handle.subscribe();

    handle.open_detail("doc1").unwrap();
    record_where(&mut events, |r| r.id == "doc1").await;

    push(&frames, "not json");
    push(&frames, r#"{"progress":50}"#);
    push(&frames, r#"{"id":"doc1","progress":"half"}"#);
    push(&frames, r#"{"id":"doc1","progress":55}"#);

    let record = record_where(&mut events, |r| r.progress.is_some()).await;
    assert_eq!(record.progress, Some(55));
    assert_eq!(handle.connection_state(), ConnectionState::Open);
}

#[tokio::test]
async fn reconnect_resynchronizes_open_views() {
    let api = FakeApi::default();
    api.put(acme(LifecycleState::Recognizing));
    let connector = FakeConnector::default();
    let first = connector.prepare();
    let second = connector.prepare();
    let handle = start(&api, &connector, fast_reconnect());
    let mut events = handle.subscribe();

    handle.open_detail("doc1").unwrap();
    record_where(&mut events, |r| r.id == "doc1").await;
    assert_eq!(api.document_fetches.load(Ordering::SeqCst), 1);

    // Progress the backend made while the connection was down.
    let mut moved_on = acme(LifecycleState::Recognizing);
    moved_on.progress = Some(80);
    api.put(moved_on);
    drop(first);

    let record = record_where(&mut events, |r| r.progress == Some(80)).await;
    assert_eq!(record.company_name(), Some("Acme"));
    assert_eq!(api.document_fetches.load(Ordering::SeqCst), 2);

    push(&second, r#"{"id":"doc1","progress":90}"#);
    record_where(&mut events, |r| r.progress == Some(90)).await;
}

#[tokio::test]
async fn channel_stays_closed_without_reconnect() {
    let api = FakeApi::default();
    let connector = FakeConnector::default();
    let frames = connector.prepare();
    let handle = start(&api, &connector, ReconnectPolicy::disabled());
    let mut events = handle.subscribe();

    wait_open(&mut events, &handle).await;
    drop(frames);
    next_event(&mut events, |e| matches!(e, SyncEvent::Connection(ConnectionState::Closed))).await;
    assert_eq!(handle.connection_state(), ConnectionState::Closed);
}

#[tokio::test]
async fn deleted_document_leaves_the_view() {
    let api = FakeApi::default();
    api.put(acme(LifecycleState::Analyzed));
    let connector = FakeConnector::default();
    let _frames = connector.prepare();
    let handle = start(&api, &connector, fast_reconnect());
    let mut events = handle.subscribe();

    handle.open_detail("doc1").unwrap();
    record_where(&mut events, |r| r.id == "doc1").await;

    api.documents.lock().unwrap().clear();
    handle.refresh().unwrap();
    next_event(&mut events, |e| matches!(e, SyncEvent::RecordRemoved(id) if id == "doc1")).await;
    assert!(handle.detail().await.unwrap().is_none());
}
