//! Trigger scheduler
//!
//! Two producers feed one queue:
//! - node change notifications, gated by [`AdmissionFilter`]
//! - a fixed-period timer
//!
//! A single consumer drains the queue and runs one reconciliation at a
//! time, so the engine's read-modify-write never overlaps itself. Failed
//! cycles are requeued after a backoff; the engine itself never retries.

use crate::config::{LabellerConfig, RetryPolicy, TickMode};
use crate::engine::{CycleOutcome, Reconciler};
use crate::error::ReconcileError;
use crate::types::{NodeIdentity, ReconcileRequest};
use futures::{Stream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace, warn};

/// Requests that may wait in the queue at once
const QUEUE_DEPTH: usize = 16;

/// Class of a node change notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Node first observed
    Create,
    /// Node modified
    Update,
    /// Node removed
    Delete,
    /// Anything else the watch reports
    Generic,
}

/// "Something happened, maybe to this node"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// What happened
    pub kind: ChangeKind,
    /// Node it happened to
    pub subject: NodeIdentity,
}

impl Notification {
    /// Create notification
    #[inline]
    #[must_use]
    pub fn new(kind: ChangeKind, subject: NodeIdentity) -> Self {
        Self { kind, subject }
    }
}

/// Set of notification kinds that trigger a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmittedKinds {
    create: bool,
    update: bool,
    delete: bool,
    generic: bool,
}

impl AdmittedKinds {
    /// Only node creation; drift by other writers waits for the timer
    pub const CREATE_ONLY: Self = Self {
        create: true,
        update: false,
        delete: false,
        generic: false,
    };

    /// Creation and updates; drift is corrected as soon as it is seen
    pub const CREATE_AND_UPDATE: Self = Self {
        create: true,
        update: true,
        delete: false,
        generic: false,
    };

    /// Check if a kind is admitted
    #[inline]
    #[must_use]
    pub const fn contains(self, kind: ChangeKind) -> bool {
        match kind {
            ChangeKind::Create => self.create,
            ChangeKind::Update => self.update,
            ChangeKind::Delete => self.delete,
            ChangeKind::Generic => self.generic,
        }
    }
}

/// Predicate deciding which notifications become requests
#[derive(Debug, Clone)]
pub struct AdmissionFilter {
    identity: NodeIdentity,
    kinds: AdmittedKinds,
}

impl AdmissionFilter {
    /// Create filter for a node
    #[inline]
    #[must_use]
    pub fn new(identity: NodeIdentity, kinds: AdmittedKinds) -> Self {
        Self { identity, kinds }
    }

    /// Admit only admitted kinds whose subject is this node
    #[inline]
    #[must_use]
    pub fn admits(&self, notification: &Notification) -> bool {
        notification.subject == self.identity && self.kinds.contains(notification.kind)
    }
}

/// Where a queued request came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// Admitted notification
    Event,
    /// Timer tick
    Timer,
    /// Requeue after a failed cycle
    Retry,
}

struct Dispatch {
    request: ReconcileRequest,
    source: TriggerSource,
    done: Option<oneshot::Sender<()>>,
}

impl Dispatch {
    fn new(request: ReconcileRequest, source: TriggerSource) -> Self {
        Self {
            request,
            source,
            done: None,
        }
    }

    fn awaited(request: ReconcileRequest, source: TriggerSource) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let dispatch = Self {
            request,
            source,
            done: Some(tx),
        };
        (dispatch, rx)
    }
}

/// Counters over the scheduler's lifetime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Cycles run
    pub cycles: u64,
    /// Cycles that wrote labels
    pub applied: u64,
    /// Cycles that found labels converged
    pub unchanged: u64,
    /// Cycles skipped (node missing)
    pub skipped: u64,
    /// Cycles that failed
    pub failed: u64,
    /// Requeues scheduled after failures
    pub retries_scheduled: u64,
}

impl SchedulerStats {
    fn record(&mut self, result: &Result<CycleOutcome, ReconcileError>) {
        self.cycles += 1;
        match result {
            Ok(CycleOutcome::Applied(_)) => self.applied += 1,
            Ok(CycleOutcome::Unchanged) => self.unchanged += 1,
            Ok(CycleOutcome::Skipped) => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Serialises event, timer and retry triggers into reconciliation cycles
#[derive(Debug)]
pub struct TriggerScheduler {
    reconciler: Arc<Reconciler>,
    filter: AdmissionFilter,
    poll_interval: Duration,
    tick_mode: TickMode,
    retry: RetryPolicy,
}

impl TriggerScheduler {
    /// Create scheduler driving `reconciler`
    #[must_use]
    pub fn new(config: &LabellerConfig, reconciler: Arc<Reconciler>) -> Self {
        Self {
            filter: AdmissionFilter::new(config.identity.clone(), config.admitted_kinds),
            reconciler,
            poll_interval: config.poll_interval,
            tick_mode: config.tick_mode,
            retry: config.retry,
        }
    }

    /// Run until `shutdown` turns true (or its sender is dropped)
    ///
    /// A cycle already running when shutdown arrives is allowed to finish.
    pub async fn run<S>(&self, notifications: S, mut shutdown: watch::Receiver<bool>) -> SchedulerStats
    where
        S: Stream<Item = Notification> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel(QUEUE_DEPTH);
        let timer_pending = Arc::new(AtomicBool::new(false));
        let request = ReconcileRequest::new(self.reconciler.identity().clone());

        let producers = [
            spawn_event_trigger(notifications, self.filter.clone(), tx.clone(), shutdown.clone()),
            spawn_timer_trigger(
                self.poll_interval,
                self.tick_mode,
                request,
                Arc::clone(&timer_pending),
                tx.clone(),
                shutdown.clone(),
            ),
        ];
        info!(
            node = %self.reconciler.identity(),
            interval_secs = self.poll_interval.as_secs(),
            tick_mode = ?self.tick_mode,
            "scheduler started"
        );

        let mut stats = SchedulerStats::default();
        let mut failures: u32 = 0;
        let mut retry_pending = false;

        loop {
            let dispatch: Dispatch = tokio::select! {
                biased;
                () = wait_for_shutdown(&mut shutdown) => break,
                Some(dispatch) = rx.recv() => dispatch,
            };

            match dispatch.source {
                TriggerSource::Retry => retry_pending = false,
                TriggerSource::Timer => timer_pending.store(false, Ordering::Release),
                TriggerSource::Event => {}
            }
            trace!(source = ?dispatch.source, "dispatching reconcile request");

            let result = self.reconciler.reconcile(&dispatch.request).await;
            stats.record(&result);

            match &result {
                Ok(outcome) => {
                    failures = 0;
                    debug!(source = ?dispatch.source, ?outcome, "cycle finished");
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    error!(error = %e, phase = %e.phase(), source = ?dispatch.source, "cycle failed");

                    if e.is_retryable() && !retry_pending {
                        retry_pending = true;
                        stats.retries_scheduled += 1;
                        let delay = self.retry.delay(failures);
                        debug!(delay_ms = delay.as_millis(), attempt = failures, "requeueing");
                        spawn_retry(delay, dispatch.request.clone(), tx.clone(), shutdown.clone());
                    }
                }
            }

            if let Some(done) = dispatch.done {
                let _ = done.send(());
            }
        }

        // Unblocks producers parked on a full queue.
        drop(rx);
        drop(tx);
        for producer in producers {
            if let Err(e) = producer.await {
                warn!(error = %e, "trigger task ended abnormally");
            }
        }

        info!(cycles = stats.cycles, failed = stats.failed, "scheduler stopped");
        stats
    }
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender counts as shutdown.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

fn spawn_event_trigger<S>(
    notifications: S,
    filter: AdmissionFilter,
    tx: mpsc::Sender<Dispatch>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    S: Stream<Item = Notification> + Send + 'static,
{
    tokio::spawn(async move {
        let mut notifications = Box::pin(notifications);
        loop {
            tokio::select! {
                biased;
                () = wait_for_shutdown(&mut shutdown) => break,
                next = notifications.next() => match next {
                    Some(notification) if filter.admits(&notification) => {
                        debug!(kind = ?notification.kind, "admitted node notification");
                        let request = ReconcileRequest::new(notification.subject);
                        if tx.send(Dispatch::new(request, TriggerSource::Event)).await.is_err() {
                            break;
                        }
                    }
                    Some(notification) => {
                        trace!(
                            kind = ?notification.kind,
                            subject = %notification.subject,
                            "ignored node notification"
                        );
                    }
                    None => {
                        warn!("node notification stream ended; relying on timer");
                        break;
                    }
                },
            }
        }
        debug!("event trigger stopped");
    })
}

fn spawn_timer_trigger(
    period: Duration,
    mode: TickMode,
    request: ReconcileRequest,
    pending: Arc<AtomicBool>,
    tx: mpsc::Sender<Dispatch>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = wait_for_shutdown(&mut shutdown) => break,
                _ = ticker.tick() => {}
            }

            match mode {
                TickMode::Blocking => {
                    let (dispatch, done) = Dispatch::awaited(request.clone(), TriggerSource::Timer);
                    if tx.send(dispatch).await.is_err() {
                        break;
                    }
                    tokio::select! {
                        biased;
                        () = wait_for_shutdown(&mut shutdown) => break,
                        _ = done => {}
                    }
                }
                // At most one timer request waits in the queue; later ticks
                // coalesce into it.
                TickMode::Detached => {
                    if pending.swap(true, Ordering::AcqRel) {
                        trace!("timer request already queued, coalescing tick");
                        continue;
                    }
                    match tx.try_send(Dispatch::new(request.clone(), TriggerSource::Timer)) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            pending.store(false, Ordering::Release);
                            debug!("queue full, dropping timer tick");
                        }
                        Err(TrySendError::Closed(_)) => break,
                    }
                }
            }
        }
        debug!("timer trigger stopped");
    })
}

fn spawn_retry(
    delay: Duration,
    request: ReconcileRequest,
    tx: mpsc::Sender<Dispatch>,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::spawn(async move {
        tokio::select! {
            biased;
            () = wait_for_shutdown(&mut shutdown) => {}
            () = tokio::time::sleep(delay) => {
                let _ = tx.send(Dispatch::new(request, TriggerSource::Retry)).await;
            }
        }
    });
}
