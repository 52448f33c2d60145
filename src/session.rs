use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;

use crate::audit::DecisionSink;
use crate::authorize::{authorize, AccessDecision};
use crate::errors::EngineError;
use crate::facts::{AccountFacts, Capabilities};
use crate::level::{grant, AccessGrant, AccessLevel};
use crate::policy::PolicyTable;

/// Aggregate decision set published after each recomputation. Readers get
/// an `Arc` snapshot; the whole value is replaced atomically and never
/// mutated in place, so no reader can observe a half-updated state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedState {
    pub access_level: AccessLevel,
    /// Table patterns the account may navigate to.
    pub allowed_routes: BTreeSet<String>,
    /// Table patterns the account is denied.
    pub denied_routes: BTreeSet<String>,
    pub capabilities: Capabilities,
}

/// Tuning knobs for a session cache.
pub struct SessionOptions {
    /// Quiet window for trailing-edge debounce: fact updates arriving
    /// within this window of each other coalesce into one recomputation
    /// using the newest facts.
    pub debounce_window: Duration,
    /// Optional passive tap receiving every computed decision.
    pub audit: Option<Arc<dyn DecisionSink>>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            debounce_window: Duration::from_millis(50),
            audit: None,
        }
    }
}

/// Per-session reactive cache over the resolver and authorizer.
///
/// Exactly one instance exists per authenticated session; it is the sole
/// writer of that session's [`ResolvedState`]. Construct it at login, pass
/// it by reference to whatever needs decisions, and [`close`](Self::close)
/// it at logout — there is no process-wide instance.
///
/// Fact updates are pushed in and processed by a single worker task, so
/// recomputations for one session never overlap: a burst of updates is
/// coalesced (trailing edge) and only the newest snapshot is ever read.
/// Queries are answered from the latest published snapshot and are safe to
/// issue concurrently from many readers.
pub struct SessionCache {
    table: Arc<PolicyTable>,
    facts_tx: mpsc::Sender<AccountFacts>,
    state_rx: watch::Receiver<Arc<ResolvedState>>,
    audit: Option<Arc<dyn DecisionSink>>,
    shutdown: Arc<Notify>,
    closed: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SessionCache {
    /// Spawn the worker task and return the session handle.
    ///
    /// Until the first fact snapshot arrives the session serves the
    /// least-privilege state (no facts means `authenticated = false`): a
    /// missing or delayed fact source denies, it never allows by default.
    pub fn spawn(table: Arc<PolicyTable>, opts: SessionOptions) -> Self {
        let initial = Arc::new(compute_state(
            &table,
            &AccountFacts::absent(),
            opts.audit.as_deref(),
        ));
        let (state_tx, state_rx) = watch::channel(initial);
        let (facts_tx, facts_rx) = mpsc::channel(16);
        let shutdown = Arc::new(Notify::new());
        let closed = Arc::new(AtomicBool::new(false));

        let worker = tokio::spawn(run_worker(
            Arc::clone(&table),
            facts_rx,
            state_tx,
            opts.audit.clone(),
            Arc::clone(&shutdown),
            opts.debounce_window,
        ));

        Self {
            table,
            facts_tx,
            state_rx,
            audit: opts.audit,
            shutdown,
            closed,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Hand the session a fresh fact snapshot. The worker coalesces bursts
    /// and recomputes against the newest facts; snapshots superseded
    /// within the debounce window are discarded unread.
    pub async fn push_facts(&self, facts: AccountFacts) -> Result<(), EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::SessionInactive);
        }
        if self.facts_tx.send(facts).await.is_err() {
            tracing::warn!("fact update dropped: session worker already stopped");
            return Err(EngineError::SessionInactive);
        }
        Ok(())
    }

    /// Authorize one path against the latest published snapshot. Pure with
    /// respect to the snapshot; callable concurrently from many readers.
    pub fn decide(&self, path: &str) -> Result<AccessDecision, EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::SessionInactive);
        }
        let state = self.state_rx.borrow().clone();
        let g = AccessGrant {
            level: state.access_level,
            capabilities: state.capabilities,
        };
        let decision = authorize(&self.table, &g, path);
        if let Some(sink) = &self.audit {
            sink.record(&decision);
        }
        Ok(decision)
    }

    /// Current snapshot, for bulk decisions such as nav-link visibility.
    pub fn state(&self) -> Result<Arc<ResolvedState>, EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::SessionInactive);
        }
        Ok(self.state_rx.borrow().clone())
    }

    /// Watch receiver yielding each newly published snapshot. Receivers
    /// obtained before teardown keep the last snapshot they saw; new
    /// queries on the session itself fail once it is closed.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ResolvedState>> {
        self.state_rx.clone()
    }

    /// Tear the session down (logout): stop the worker and unsubscribe
    /// from fact updates. Any `decide`/`state`/`push_facts` call after
    /// this returns [`EngineError::SessionInactive`] — a usage error by
    /// the caller, deliberately distinct from a policy denial.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // notify_one stores a permit, so the signal is not lost if the
        // worker is mid-debounce rather than parked on the select.
        self.shutdown.notify_one();
        let worker = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(handle) = worker {
            let _ = handle.await;
        }
        tracing::info!("session cache closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Worker loop: receive fact updates, debounce (trailing edge), recompute,
/// publish. Strictly serialized; at most one recomputation is ever in
/// flight for the session.
async fn run_worker(
    table: Arc<PolicyTable>,
    mut facts_rx: mpsc::Receiver<AccountFacts>,
    state_tx: watch::Sender<Arc<ResolvedState>>,
    audit: Option<Arc<dyn DecisionSink>>,
    shutdown: Arc<Notify>,
    window: Duration,
) {
    loop {
        let first = tokio::select! {
            biased;
            _ = shutdown.notified() => break,
            msg = facts_rx.recv() => match msg {
                Some(facts) => facts,
                None => break,
            },
        };

        // Trailing-edge debounce: keep absorbing newer snapshots until the
        // channel stays quiet for the window, then recompute once against
        // the newest facts. Teardown interrupts a pending debounce so
        // close() never waits out the window and nothing is published
        // after it.
        let mut latest = first;
        let mut channel_open = true;
        let mut interrupted = false;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.notified() => {
                    interrupted = true;
                    break;
                }
                msg = tokio::time::timeout(window, facts_rx.recv()) => match msg {
                    Ok(Some(newer)) => latest = newer,
                    Ok(None) => {
                        channel_open = false;
                        break;
                    }
                    Err(_) => break,
                },
            }
        }
        if interrupted {
            break;
        }

        let state = Arc::new(compute_state(&table, &latest, audit.as_deref()));
        tracing::info!(
            level = %state.access_level,
            allowed = state.allowed_routes.len(),
            denied = state.denied_routes.len(),
            "published recomputed access state"
        );
        if state_tx.send(state).is_err() {
            // No receivers left, nothing to publish to.
            break;
        }

        if !channel_open {
            break;
        }
    }
}

/// Resolve the facts and authorize every table pattern, producing the full
/// decision set in one pass. Runs on the worker; pure apart from the
/// optional audit tap.
fn compute_state(
    table: &PolicyTable,
    facts: &AccountFacts,
    audit: Option<&dyn DecisionSink>,
) -> ResolvedState {
    let g = grant(facts, Utc::now());
    let mut allowed_routes = BTreeSet::new();
    let mut denied_routes = BTreeSet::new();

    for pattern in table.patterns() {
        let decision = authorize(table, &g, pattern);
        if let Some(sink) = audit {
            sink.record(&decision);
        }
        if decision.allowed {
            allowed_routes.insert(pattern.to_string());
        } else {
            denied_routes.insert(pattern.to_string());
        }
    }

    ResolvedState {
        access_level: g.level,
        allowed_routes,
        denied_routes,
        capabilities: g.capabilities,
    }
}
