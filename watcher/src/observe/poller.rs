//! Generic repeated-fetch primitive
//!
//! A [`ResourcePoller`] owns one background task that fetches a resource,
//! publishes the latest [`ResourceState`] through a watch channel and asks a
//! caller-supplied interval function when to fetch again. At most one fetch
//! per resource is in flight at any time.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::errors::ObserverError;
use crate::observe::cadence::Cadence;
use crate::utils::{calc_exp_backoff, RetryOptions};

/// Future returned by a fetch operation
pub type FetchFuture<T> = BoxFuture<'static, Result<T, ObserverError>>;

/// Fetch operation, invoked once per attempt
pub type FetchFn<T> = Arc<dyn Fn() -> FetchFuture<T> + Send + Sync>;

/// Interval selector, given the last successfully observed value
pub type IntervalFn<T> = Arc<dyn Fn(Option<&T>) -> Cadence + Send + Sync>;

/// Lifecycle phase of a polled resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourcePhase {
    /// Never fetched
    Idle,

    /// A fetch is in flight
    Loading,

    /// The last fetch succeeded and another one is scheduled
    Ready,

    /// The last fetch failed after its retries
    Error,

    /// The interval function asked to stop
    Stopped,

    /// The backend reported the resource as absent
    NotFound,
}

/// Snapshot of a polled resource
#[derive(Debug, Clone)]
pub struct ResourceState<T> {
    pub phase: ResourcePhase,

    /// Last successfully fetched value, kept across failures
    pub data: Option<T>,

    /// Last failure, cleared by the next success
    pub error: Option<String>,

    /// Generation of the most recently issued fetch
    pub generation: u64,

    /// Number of fetches issued (retries not counted)
    pub fetches: u64,

    /// Ticks dropped because a fetch was still in flight
    pub skipped_ticks: u64,

    pub consecutive_failures: u32,
    pub last_success_at: Option<DateTime<Utc>>,
}

impl<T> ResourceState<T> {
    fn idle() -> Self {
        Self {
            phase: ResourcePhase::Idle,
            data: None,
            error: None,
            generation: 0,
            fetches: 0,
            skipped_ticks: 0,
            consecutive_failures: 0,
            last_success_at: None,
        }
    }

    /// Whether the resource has never loaded and is still expected to
    pub fn is_first_load(&self) -> bool {
        self.data.is_none()
            && matches!(self.phase, ResourcePhase::Idle | ResourcePhase::Loading)
    }

    /// Whether the resource loaded once and has been failing since
    pub fn is_stale(&self) -> bool {
        self.data.is_some() && self.error.is_some()
    }
}

/// Poller options
#[derive(Debug, Clone)]
pub struct PollerOptions {
    /// Resource name used in logs
    pub name: String,

    /// Per-fetch retry budget
    pub retry: RetryOptions,

    /// Start fetching immediately
    pub enabled: bool,
}

impl PollerOptions {
    pub fn new(name: impl Into<String>, retry: RetryOptions) -> Self {
        Self {
            name: name.into(),
            retry,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Debug)]
enum Control {
    Enable,
    Disable,
    Refresh,
}

/// Handle to a running poll loop
///
/// Dropping the handle cancels the loop and aborts any in-flight fetch.
pub struct ResourcePoller<T> {
    name: String,
    control_tx: mpsc::UnboundedSender<Control>,
    state_rx: watch::Receiver<ResourceState<T>>,
    task: JoinHandle<()>,
}

impl<T> ResourcePoller<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Spawn a poll loop on the current tokio runtime
    pub fn spawn(options: PollerOptions, fetch: FetchFn<T>, interval: IntervalFn<T>) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ResourceState::idle());

        let poll_loop = PollLoop {
            name: options.name.clone(),
            fetch,
            interval,
            retry: options.retry,
            state_tx,
            control_rx,
            results_tx,
            results_rx,
            enabled: options.enabled,
            generation: 0,
            in_flight: None,
            next_tick: None,
        };
        let task = tokio::spawn(poll_loop.run());

        Self {
            name: options.name,
            control_tx,
            state_rx,
            task,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start polling, fetching right away unless a fetch is pending or scheduled
    pub fn enable(&self) {
        self.send(Control::Enable);
    }

    /// Stop polling and discard the result of any in-flight fetch
    pub fn disable(&self) {
        self.send(Control::Disable);
    }

    /// Fetch now, skipped if a fetch is already in flight
    pub fn refresh(&self) {
        self.send(Control::Refresh);
    }

    /// Subscribe to state changes
    pub fn subscribe(&self) -> watch::Receiver<ResourceState<T>> {
        self.state_rx.clone()
    }

    /// Current state snapshot
    pub fn state(&self) -> ResourceState<T> {
        self.state_rx.borrow().clone()
    }

    fn send(&self, control: Control) {
        if self.control_tx.send(control).is_err() {
            warn!("Poller {} is no longer running", self.name);
        }
    }
}

impl<T> Drop for ResourcePoller<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct InFlight {
    generation: u64,
    handle: AbortHandle,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

struct PollLoop<T> {
    name: String,
    fetch: FetchFn<T>,
    interval: IntervalFn<T>,
    retry: RetryOptions,
    state_tx: watch::Sender<ResourceState<T>>,
    control_rx: mpsc::UnboundedReceiver<Control>,
    results_tx: mpsc::UnboundedSender<(u64, Result<T, ObserverError>)>,
    results_rx: mpsc::UnboundedReceiver<(u64, Result<T, ObserverError>)>,
    enabled: bool,
    generation: u64,
    in_flight: Option<InFlight>,
    next_tick: Option<Instant>,
}

impl<T> PollLoop<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn run(mut self) {
        debug!("Poller {} starting (enabled: {})", self.name, self.enabled);

        if self.enabled {
            self.tick();
        }

        loop {
            let next_tick = self.next_tick;

            tokio::select! {
                control = self.control_rx.recv() => match control {
                    Some(control) => self.handle_control(control),
                    None => {
                        debug!("Poller {} handle dropped, stopping", self.name);
                        return;
                    }
                },
                Some((generation, result)) = self.results_rx.recv() => {
                    self.apply(generation, result);
                }
                _ = wait_until(next_tick) => {
                    self.next_tick = None;
                    self.tick();
                }
            }
        }
    }

    fn handle_control(&mut self, control: Control) {
        match control {
            Control::Enable => {
                self.enabled = true;
                if self.in_flight.is_none() && self.next_tick.is_none() {
                    self.tick();
                }
            }
            Control::Disable => {
                if !self.enabled {
                    return;
                }
                self.enabled = false;
                self.next_tick = None;
                self.generation += 1;
                if let Some(in_flight) = self.in_flight.take() {
                    debug!(
                        "Poller {} disabled, discarding fetch of generation {}",
                        self.name, in_flight.generation
                    );
                }

                let generation = self.generation;
                self.state_tx.send_modify(|state| {
                    state.generation = generation;
                    if state.phase == ResourcePhase::Loading {
                        state.phase = if state.data.is_some() {
                            ResourcePhase::Ready
                        } else {
                            ResourcePhase::Idle
                        };
                    }
                });
            }
            Control::Refresh => {
                self.next_tick = None;
                self.tick();
            }
        }
    }

    fn tick(&mut self) {
        if !self.enabled {
            return;
        }

        if let Some(in_flight) = &self.in_flight {
            debug!(
                "Poller {} tick skipped, generation {} still in flight",
                self.name, in_flight.generation
            );
            self.state_tx.send_modify(|state| state.skipped_ticks += 1);
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        debug!("Poller {} fetching (generation {})", self.name, generation);

        let fetch = fetch_with_retry(self.name.clone(), self.fetch.clone(), self.retry.clone());
        let results_tx = self.results_tx.clone();
        let handle = tokio::spawn(async move {
            let result = fetch.await;
            let _ = results_tx.send((generation, result));
        });

        self.in_flight = Some(InFlight {
            generation,
            handle: handle.abort_handle(),
        });

        self.state_tx.send_modify(|state| {
            state.phase = ResourcePhase::Loading;
            state.generation = generation;
            state.fetches += 1;
        });
    }

    fn apply(&mut self, generation: u64, result: Result<T, ObserverError>) {
        if !self.enabled || generation != self.generation {
            debug!(
                "Poller {} dropping stale result of generation {} (current {})",
                self.name, generation, self.generation
            );
            return;
        }
        self.in_flight = None;

        match result {
            Ok(value) => {
                let cadence = (self.interval)(Some(&value));
                self.schedule(cadence);
                self.state_tx.send_modify(|state| {
                    state.data = Some(value);
                    state.error = None;
                    state.consecutive_failures = 0;
                    state.last_success_at = Some(Utc::now());
                    state.phase = match cadence {
                        Cadence::Every(_) => ResourcePhase::Ready,
                        Cadence::Stop => ResourcePhase::Stopped,
                    };
                });
                if cadence == Cadence::Stop {
                    debug!("Poller {} settled, stopping", self.name);
                }
            }
            Err(e) if e.is_not_found() => {
                warn!("Poller {}: resource not found, stopping", self.name);
                self.next_tick = None;
                self.state_tx.send_modify(|state| {
                    state.phase = ResourcePhase::NotFound;
                    state.error = Some(e.to_string());
                });
            }
            Err(e) => {
                let cadence = {
                    let state = self.state_tx.borrow();
                    (self.interval)(state.data.as_ref())
                };
                self.schedule(cadence);
                self.state_tx.send_modify(|state| {
                    state.consecutive_failures += 1;
                    state.error = Some(e.to_string());
                    state.phase = ResourcePhase::Error;
                });
                warn!(
                    "Poller {} fetch failed ({} in a row): {}",
                    self.name,
                    self.state_tx.borrow().consecutive_failures,
                    e
                );
            }
        }
    }

    fn schedule(&mut self, cadence: Cadence) {
        self.next_tick = match cadence {
            Cadence::Every(interval) => Some(Instant::now() + interval),
            Cadence::Stop => None,
        };
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn fetch_with_retry<T>(
    name: String,
    fetch: FetchFn<T>,
    retry: RetryOptions,
) -> Result<T, ObserverError> {
    let mut attempt = 0;
    loop {
        match fetch().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < retry.retries => {
                let delay: Duration = calc_exp_backoff(&retry, attempt);
                debug!(
                    "Poller {} attempt {} failed, retrying in {:?}: {}",
                    name,
                    attempt + 1,
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
