//! Fixed-interval polling per data source.
//!
//! Each source runs as its own task. A tick fetches, then hands the outcome
//! to the UI loop over a channel; the UI swaps the snapshot wholesale or, on
//! failure, only flips liveness. Changing a source's parameters fetches
//! right away and drops whatever fetch was still in flight.

use seedbank_client::{ClientError, SeedSource};
use seedbank_core::{AgentContext, MemoryType, Seed, Stats};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const EVENT_QUEUE_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Fetching,
    Settled,
    Failed,
}

#[derive(Debug)]
pub enum PollEvent<T> {
    Fetching,
    Settled(Arc<T>),
    Failed(String),
}

pub struct Poller<P> {
    name: &'static str,
    params: watch::Sender<P>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl<P> Poller<P>
where
    P: Clone + PartialEq + Send + Sync + 'static,
{
    pub fn spawn<T, E, F, Fut>(
        name: &'static str,
        period: Duration,
        initial: P,
        fetch: F,
    ) -> (Self, mpsc::Receiver<PollEvent<T>>)
    where
        T: Send + Sync + 'static,
        E: Display + Send + 'static,
        F: Fn(P) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (params_tx, params_rx) = watch::channel(initial);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let task = tokio::spawn(poll_loop(
            name,
            period,
            params_rx,
            shutdown_rx,
            fetch,
            event_tx,
        ));
        info!(event = "poller_start", source = name, period_ms = period.as_millis() as u64);
        (
            Self {
                name,
                params: params_tx,
                shutdown: shutdown_tx,
                task,
            },
            event_rx,
        )
    }

    /// Returns whether the parameters actually changed (and a fetch was
    /// triggered).
    pub fn set_params(&self, next: P) -> bool {
        self.params.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        })
    }

    /// Fetch now with the current parameters.
    pub fn refresh(&self) {
        self.params.send_modify(|_| {});
    }

    pub fn params(&self) -> P {
        self.params.borrow().clone()
    }

    /// Stops the loop and waits for it; no event is delivered afterwards.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            warn!(event = "poller_join_failed", source = self.name, error = %err);
        }
        info!(event = "poller_stop", source = self.name);
    }
}

async fn poll_loop<P, T, E, F, Fut>(
    name: &'static str,
    period: Duration,
    mut params: watch::Receiver<P>,
    mut shutdown: watch::Receiver<bool>,
    fetch: F,
    events: mpsc::Sender<PollEvent<T>>,
) where
    P: Clone,
    E: Display,
    F: Fn(P) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.reset();
    let mut fetch_now = true;

    loop {
        if !fetch_now {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                changed = params.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    ticker.reset();
                }
                _ = ticker.tick() => {}
            }
        }
        fetch_now = false;

        let current = params.borrow_and_update().clone();
        if !deliver(&events, &mut shutdown, PollEvent::Fetching).await {
            break;
        }

        let result = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            changed = params.changed() => {
                if changed.is_err() {
                    break;
                }
                debug!(event = "poll_superseded", source = name);
                ticker.reset();
                fetch_now = true;
                continue;
            }
            result = fetch(current) => result,
        };

        let event = match result {
            Ok(snapshot) => PollEvent::Settled(Arc::new(snapshot)),
            Err(err) => {
                warn!(event = "poll_tick_failed", source = name, error = %err);
                PollEvent::Failed(err.to_string())
            }
        };
        if !deliver(&events, &mut shutdown, event).await {
            break;
        }
    }
}

/// Sends one event unless shutdown is signalled first, even while the queue
/// is full.
async fn deliver<T>(
    events: &mpsc::Sender<PollEvent<T>>,
    shutdown: &mut watch::Receiver<bool>,
    event: PollEvent<T>,
) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        biased;
        _ = shutdown.changed() => false,
        sent = events.send(event) => sent.is_ok(),
    }
}

/// What the UI shows for one source: the last good snapshot plus liveness.
#[derive(Debug)]
pub struct SourceView<T> {
    snapshot: Option<Arc<T>>,
    state: PollState,
    live: bool,
    last_error: Option<String>,
    closed: bool,
}

impl<T> Default for SourceView<T> {
    fn default() -> Self {
        Self {
            snapshot: None,
            state: PollState::Idle,
            live: false,
            last_error: None,
            closed: false,
        }
    }
}

impl<T> SourceView<T> {
    /// Returns false once the view is closed; the event is then dropped.
    pub fn apply(&mut self, event: PollEvent<T>) -> bool {
        if self.closed {
            return false;
        }
        match event {
            PollEvent::Fetching => self.state = PollState::Fetching,
            PollEvent::Settled(snapshot) => {
                self.snapshot = Some(snapshot);
                self.state = PollState::Settled;
                self.live = true;
                self.last_error = None;
            }
            PollEvent::Failed(err) => {
                self.state = PollState::Failed;
                self.live = false;
                self.last_error = Some(err);
            }
        }
        true
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn snapshot(&self) -> Option<&Arc<T>> {
        self.snapshot.as_ref()
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeedQuery {
    pub query: String,
    pub limit: u32,
    pub threshold: f64,
}

/// Records, counters and health from one tick. Only ever built when every
/// constituent fetch succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedBundle {
    pub seeds: Vec<Seed>,
    pub stats: Stats,
    pub healthy: bool,
}

pub async fn fetch_seed_bundle<S: SeedSource>(
    source: &S,
    query: &SeedQuery,
) -> Result<SeedBundle, ClientError> {
    let (seeds, stats, healthy) = tokio::join!(
        source.search(&query.query, query.limit, query.threshold),
        source.fetch_stats(),
        source.fetch_health(),
    );
    Ok(SeedBundle {
        seeds: seeds?,
        stats: stats?,
        healthy,
    })
}

pub fn spawn_seed_poller<S>(
    source: Arc<S>,
    period: Duration,
    initial: SeedQuery,
) -> (Poller<SeedQuery>, mpsc::Receiver<PollEvent<SeedBundle>>)
where
    S: SeedSource + 'static,
{
    Poller::spawn("seeds", period, initial, move |query: SeedQuery| {
        let source = source.clone();
        async move { fetch_seed_bundle(source.as_ref(), &query).await }
    })
}

pub fn spawn_context_poller<S>(
    source: Arc<S>,
    period: Duration,
    initial: Option<MemoryType>,
) -> (
    Poller<Option<MemoryType>>,
    mpsc::Receiver<PollEvent<Vec<AgentContext>>>,
)
where
    S: SeedSource + 'static,
{
    Poller::spawn("contexts", period, initial, move |memory_type| {
        let source = source.clone();
        async move { source.fetch_contexts(None, memory_type).await }
    })
}
