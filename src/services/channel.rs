//! Push channel manager.
//!
//! [`PushChannel::latest`] is the last update received per document; updates
//! not yet taken are folded per document, so a late consumer never sees a
//! backlog.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::StreamExt;
use rand::Rng;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ChannelError;
use crate::models::PartialUpdate;
use crate::services::frames::FrameParser;
use crate::services::reconciler::combine;
use crate::services::transport::{Connector, Endpoint};

/// A connection that delivered nothing lasting at least this long still
/// resets the backoff.
const HEALTHY_UPTIME: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closed => "closed",
        }
    }
}

/// Bumped every time the channel reopens after having been open, so
/// consumers know updates may have been missed in between.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SyncGeneration(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Fraction of the delay added or removed at random, 0.0..=1.0.
    pub jitter: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            enabled: true,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: None,
            jitter: 0.2,
        }
    }
}

impl ReconnectPolicy {
    /// Never reconnect: the connection lives until its first close.
    pub fn disabled() -> Self {
        ReconnectPolicy {
            enabled: false,
            ..Default::default()
        }
    }

    /// Exponential delay before retry `attempt` (1-based), capped.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return base;
        }
        let factor = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        base.mul_f64(factor)
    }
}

#[derive(Default)]
struct Mailbox {
    slots: Mutex<Slots>,
    notify: Notify,
}

#[derive(Default)]
struct Slots {
    latest: HashMap<String, PartialUpdate>,
    /// Not yet taken, in first-arrival order.
    queued: Vec<PartialUpdate>,
    queued_index: HashMap<String, usize>,
}

impl Mailbox {
    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, update: PartialUpdate) {
        {
            let mut slots = self.slots();
            let slots = &mut *slots;
            match slots.queued_index.get(&update.id) {
                Some(&i) => slots.queued[i] = combine(&slots.queued[i], &update),
                None => {
                    slots.queued_index.insert(update.id.clone(), slots.queued.len());
                    slots.queued.push(update.clone());
                }
            }
            slots.latest.insert(update.id.clone(), update);
        }
        self.notify.notify_one();
    }
}

/// Handle to the supervised push connection. Dropping it closes the
/// connection.
pub struct PushChannel {
    state: watch::Receiver<ConnectionState>,
    generation: watch::Receiver<SyncGeneration>,
    mailbox: Arc<Mailbox>,
    task: JoinHandle<()>,
}

impl PushChannel {
    /// Start the supervising loop. Must be called within a tokio runtime.
    pub fn open<C: Connector>(
        connector: C,
        endpoint: Endpoint,
        policy: ReconnectPolicy,
    ) -> Result<Self, ChannelError> {
        let parser = FrameParser::new()?;
        let (state_tx, state) = watch::channel(ConnectionState::Connecting);
        let (generation_tx, generation) = watch::channel(SyncGeneration::default());
        let mailbox = Arc::new(Mailbox::default());

        let task = tokio::spawn(supervise(
            connector,
            endpoint,
            policy,
            parser,
            state_tx,
            generation_tx,
            mailbox.clone(),
        ));

        Ok(PushChannel {
            state,
            generation,
            mailbox,
            task,
        })
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn subscribe_generation(&self) -> watch::Receiver<SyncGeneration> {
        self.generation.clone()
    }

    /// Latest update received for a document, if any.
    pub fn latest(&self, id: &str) -> Option<PartialUpdate> {
        self.mailbox.slots().latest.get(id).cloned()
    }

    /// Updates received since the last call, one per document. Several
    /// updates for the same document are folded in arrival order.
    pub fn take_pending(&self) -> Vec<PartialUpdate> {
        let mut slots = self.mailbox.slots();
        slots.queued_index.clear();
        std::mem::take(&mut slots.queued)
    }

    /// Resolves once new updates are waiting (immediately if some arrived
    /// since the last wake-up).
    pub async fn updated(&self) {
        self.mailbox.notify.notified().await;
    }

    pub fn close(self) {}
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn supervise<C: Connector>(
    connector: C,
    endpoint: Endpoint,
    policy: ReconnectPolicy,
    parser: FrameParser,
    state_tx: watch::Sender<ConnectionState>,
    generation_tx: watch::Sender<SyncGeneration>,
    mailbox: Arc<Mailbox>,
) {
    let mut attempt: u32 = 0;
    let mut opened_before = false;

    loop {
        let mut healthy = false;
        state_tx.send_replace(ConnectionState::Connecting);
        match connector.connect(&endpoint).await {
            Ok(mut frames) => {
                info!(endpoint = %endpoint, "push channel open");
                state_tx.send_replace(ConnectionState::Open);
                if opened_before {
                    generation_tx.send_modify(|generation| generation.0 += 1);
                }
                opened_before = true;
                let opened_at = Instant::now();
                let mut frames_seen: u64 = 0;

                while let Some(frame) = frames.next().await {
                    match frame {
                        Ok(text) => {
                            frames_seen += 1;
                            match parser.parse(&text) {
                                Ok(update) => mailbox.publish(update),
                                Err(e) => debug!(error = %e, "dropping push frame"),
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "push channel transport error");
                            break;
                        }
                    }
                }
                info!(endpoint = %endpoint, frames_seen, "push channel closed");
                healthy = was_healthy(frames_seen, opened_at.elapsed());
            }
            Err(e) => warn!(endpoint = %endpoint, attempt, error = %e, "push channel connect failed"),
        }
        state_tx.send_replace(ConnectionState::Closed);

        if !policy.enabled {
            break;
        }
        if healthy {
            attempt = 0;
        }
        attempt += 1;
        if policy.max_attempts.is_some_and(|max| attempt > max) {
            warn!(attempts = attempt - 1, "giving up on push channel");
            break;
        }
        let delay = policy.delay(attempt);
        debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting push channel");
        tokio::time::sleep(delay).await;
    }
}

/// Whether a closed connection was up long enough to count as a recovery.
fn was_healthy(frames_seen: u64, uptime: Duration) -> bool {
    frames_seen > 0 || uptime >= HEALTHY_UPTIME
}
