//! Serialization of read-only queries against background index mutation.
//!
//! Every query passes three gates: the admission queue (priority plus
//! anti-starvation ordering, per-client fair-share quotas, a concurrency
//! cap), the per-sub-index read locks (acquired in one fixed global order,
//! with retry and exponential backoff on contention), and the availability
//! check (queries degrade gracefully while the indexer rebuilds one of the
//! sub-indexes). Generation swaps are a single `Arc` replacement; a query
//! that started before the swap keeps its clone for its full duration.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::control::{CancelToken, QueryControl};
use crate::engine::QueryEngine;
use crate::error::Error;
use crate::index::SourceIndex;
use crate::types::{FileId, RankingConfig, SearchHit, SearchOptions};

/// The orthogonal index families, declared in the fixed global lock order.
/// Weights drive the graceful-degradation availability score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubIndex {
    Trigram,
    Symbol,
    Reference,
    Postings,
    Location,
    Content,
    CallGraph,
}

impl SubIndex {
    pub const ALL: [SubIndex; 7] = [
        SubIndex::Trigram,
        SubIndex::Symbol,
        SubIndex::Reference,
        SubIndex::Postings,
        SubIndex::Location,
        SubIndex::Content,
        SubIndex::CallGraph,
    ];

    #[inline]
    pub fn weight(self) -> u32 {
        match self {
            SubIndex::Trigram => 7,
            SubIndex::Symbol => 6,
            SubIndex::Reference => 5,
            SubIndex::Postings => 4,
            SubIndex::Location => 3,
            SubIndex::Content => 2,
            SubIndex::CallGraph => 1,
        }
    }

    #[inline]
    fn idx(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Priority {
    const COUNT: usize = 4;

    #[inline]
    fn idx(self) -> usize {
        self as usize
    }

    /// Deadline scaling: lower priorities wait longer in the queue, so
    /// they get proportionally larger deadlines.
    #[inline]
    fn timeout_factor(self) -> f64 {
        match self {
            Priority::Critical => 1.0,
            Priority::High => 1.5,
            Priority::Normal => 2.25,
            Priority::Low => 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientKind {
    Cli,
    Rpc,
    Web,
}

impl ClientKind {
    const COUNT: usize = 3;

    #[inline]
    fn idx(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub max_concurrent_searches: usize,
    pub base_timeout: Duration,
    pub max_search_retries: u32,
    /// Minimum availability score for a degraded run.
    pub partial_search_threshold: f64,
    /// Below the threshold, fall back to a minimal literal scan instead of
    /// failing with `IndexUnavailable`.
    pub enable_fallback: bool,
    pub fallback_timeout: Duration,
    pub quota_window: Duration,
    /// Fair-share fractions per client type.
    pub cli_share: f64,
    pub rpc_share: f64,
    pub web_share: f64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_searches: 1000,
            base_timeout: Duration::from_secs(5),
            max_search_retries: 3,
            partial_search_threshold: 0.5,
            enable_fallback: true,
            fallback_timeout: Duration::from_millis(500),
            quota_window: Duration::from_secs(300),
            cli_share: 0.3,
            rpc_share: 0.5,
            web_share: 0.2,
        }
    }
}

impl CoordinatorConfig {
    #[inline]
    fn share(&self, client: ClientKind) -> f64 {
        match client {
            ClientKind::Cli => self.cli_share,
            ClientKind::Rpc => self.rpc_share,
            ClientKind::Web => self.web_share,
        }
    }
}

/// One coordinated query.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub pattern: String,
    /// `None` searches every indexed file.
    pub candidates: Option<Vec<FileId>>,
    pub options: SearchOptions,
    pub priority: Priority,
    pub client: ClientKind,
    pub cancel: CancelToken,
}

impl SearchRequest {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            candidates: None,
            options: SearchOptions::default(),
            priority: Priority::Normal,
            client: ClientKind::Cli,
            cancel: CancelToken::new(),
        }
    }
}

/// Outcome of one coordinated query. `error` is set instead of panicking or
/// raising; partial results are a flag, not an error.
#[derive(Debug)]
pub struct SearchResult {
    pub hits: Vec<SearchHit>,
    pub wait_time: Duration,
    pub locks_used: Vec<SubIndex>,
    pub unavailable_indexes: Vec<SubIndex>,
    pub degraded_mode: bool,
    pub partial_results: bool,
    pub error: Option<Error>,
}

impl SearchResult {
    #[inline]
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    fn failed(error: Error, wait_time: Duration, unavailable: Vec<SubIndex>) -> Self {
        Self {
            hits: Vec::new(),
            wait_time,
            locks_used: Vec::new(),
            unavailable_indexes: unavailable,
            degraded_mode: false,
            partial_results: false,
            error: Some(error),
        }
    }
}

/// Snapshot of queue counters, primarily for telemetry.
#[derive(Debug, Clone, Default)]
pub struct QueueStats {
    pub active: usize,
    pub waiting: usize,
    pub served_total: u64,
    pub served_by_priority: [u64; Priority::COUNT],
    pub served_by_client: [u64; ClientKind::COUNT],
}

struct Ticket {
    id: u64,
    priority: Priority,
    client: ClientKind,
    enqueued: Instant,
}

struct QueueState {
    active: usize,
    next_ticket: u64,
    waiting: Vec<Ticket>,
    served_total: u64,
    served_by_priority: [u64; Priority::COUNT],
    served_by_client: [u64; ClientKind::COUNT],
    last_service: [Option<Instant>; Priority::COUNT],
    window_started: Instant,
    window_total: u64,
    window_by_client: [u64; ClientKind::COUNT],
}

impl QueueState {
    fn new() -> Self {
        Self {
            active: 0,
            next_ticket: 0,
            waiting: Vec::new(),
            served_total: 0,
            served_by_priority: [0; Priority::COUNT],
            served_by_client: [0; ClientKind::COUNT],
            last_service: [None; Priority::COUNT],
            window_started: Instant::now(),
            window_total: 0,
            window_by_client: [0; ClientKind::COUNT],
        }
    }

    fn maybe_reset_window(&mut self, window: Duration) {
        if self.window_started.elapsed() >= window {
            self.window_started = Instant::now();
            self.window_total = 0;
            self.window_by_client = [0; ClientKind::COUNT];
        }
    }

    fn under_quota(&self, client: ClientKind, config: &CoordinatorConfig) -> bool {
        if self.window_total == 0 {
            return true;
        }
        let served = self.window_by_client[client.idx()] as f64;
        served / (self.window_total as f64) < config.share(client)
    }

    /// Starvation score: bounded wait time, bounded drought at this
    /// priority, plus a bump when the priority is under 10% of all service.
    fn starvation_score(&self, ticket: &Ticket, now: Instant) -> f64 {
        let wait = now
            .saturating_duration_since(ticket.enqueued)
            .as_secs_f64()
            .min(10.0);
        let drought = match self.last_service[ticket.priority.idx()] {
            Some(at) => (now.saturating_duration_since(at).as_secs_f64() / 60.0).min(5.0),
            None => 5.0,
        };
        let underserved = if self.served_total > 0
            && self.served_by_priority[ticket.priority.idx()] * 10 < self.served_total
        {
            3.0
        } else {
            0.0
        };
        wait + drought + underserved
    }

    /// The ticket the queue would admit next. Over-quota tickets are
    /// deferred while any under-quota ticket is waiting, but keep accruing
    /// starvation score.
    fn best_eligible(&self, config: &CoordinatorConfig, now: Instant) -> Option<u64> {
        let any_under_quota = self
            .waiting
            .iter()
            .any(|t| self.under_quota(t.client, config));

        self.waiting
            .iter()
            .filter(|t| !any_under_quota || self.under_quota(t.client, config))
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| {
                        self.starvation_score(a, now)
                            .total_cmp(&self.starvation_score(b, now))
                    })
                    // FIFO among equals: the lowest id wins the max.
                    .then_with(|| b.id.cmp(&a.id))
            })
            .map(|t| t.id)
    }

    fn record_service(&mut self, ticket_priority: Priority, client: ClientKind, now: Instant) {
        self.active += 1;
        self.served_total += 1;
        self.served_by_priority[ticket_priority.idx()] += 1;
        self.served_by_client[client.idx()] += 1;
        self.last_service[ticket_priority.idx()] = Some(now);
        self.window_total += 1;
        self.window_by_client[client.idx()] += 1;
    }
}

const RETRY_BACKOFF_START: Duration = Duration::from_millis(100);
const RETRY_BACKOFF_CAP: Duration = Duration::from_secs(2);
/// How often waiting tickets recompute their starvation score.
const QUEUE_POLL: Duration = Duration::from_millis(100);

pub struct SearchCoordinator {
    index: RwLock<Arc<dyn SourceIndex>>,
    ranking: RankingConfig,
    config: CoordinatorConfig,
    locks: [RwLock<()>; SubIndex::ALL.len()],
    available: [AtomicBool; SubIndex::ALL.len()],
    queue: Mutex<QueueState>,
    queue_cv: Condvar,
    subscribers: Mutex<[Vec<SyncSender<SubIndex>>; SubIndex::ALL.len()]>,
}

impl SearchCoordinator {
    pub fn new(index: Arc<dyn SourceIndex>) -> Self {
        Self::with_config(index, CoordinatorConfig::default(), RankingConfig::default())
    }

    pub fn with_config(
        index: Arc<dyn SourceIndex>,
        config: CoordinatorConfig,
        ranking: RankingConfig,
    ) -> Self {
        Self {
            index: RwLock::new(index),
            ranking,
            config,
            locks: std::array::from_fn(|_| RwLock::new(())),
            available: std::array::from_fn(|_| AtomicBool::new(true)),
            queue: Mutex::new(QueueState::new()),
            queue_cv: Condvar::new(),
            subscribers: Mutex::new(std::array::from_fn(|_| Vec::new())),
        }
    }

    /// Atomically install a new index generation. Queries already running
    /// keep the generation they started with.
    pub fn install_index(&self, index: Arc<dyn SourceIndex>) {
        *self.index.write() = index;
        info!("index generation installed");
    }

    #[inline]
    pub fn is_available(&self, sub: SubIndex) -> bool {
        self.available[sub.idx()].load(Ordering::Acquire)
    }

    pub fn mark_unavailable(&self, sub: SubIndex) {
        self.available[sub.idx()].store(false, Ordering::Release);
        debug!(?sub, "sub-index unavailable");
    }

    /// Flag a sub-index as usable again and notify subscribers. The send is
    /// non-blocking; a full channel drops the notification.
    pub fn mark_available(&self, sub: SubIndex) {
        self.available[sub.idx()].store(true, Ordering::Release);
        let mut subscribers = self.subscribers.lock();
        subscribers[sub.idx()].retain(|tx| match tx.try_send(sub) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
        debug!(?sub, "sub-index available");
    }

    /// Subscribe to completion notifications for one sub-index type over a
    /// bounded channel.
    pub fn subscribe(&self, sub: SubIndex, capacity: usize) -> Receiver<SubIndex> {
        let (tx, rx) = sync_channel(capacity.max(1));
        self.subscribers.lock()[sub.idx()].push(tx);
        rx
    }

    /// Writer-side gate for the indexer while it rebuilds one sub-index.
    pub fn write_lock(&self, sub: SubIndex) -> RwLockWriteGuard<'_, ()> {
        self.locks[sub.idx()].write()
    }

    pub fn queue_stats(&self) -> QueueStats {
        let state = self.queue.lock();
        QueueStats {
            active: state.active,
            waiting: state.waiting.len(),
            served_total: state.served_total,
            served_by_priority: state.served_by_priority,
            served_by_client: state.served_by_client,
        }
    }

    /// Run one coordinated query end to end: admission, availability,
    /// locks, execution.
    pub fn search(&self, request: SearchRequest) -> SearchResult {
        let enqueued = Instant::now();
        let budget = self
            .config
            .base_timeout
            .mul_f64(request.priority.timeout_factor());
        let deadline = enqueued + budget;

        if let Err(error) = self.admit(request.priority, request.client, deadline) {
            return SearchResult::failed(error, enqueued.elapsed(), Vec::new());
        }
        let wait_time = enqueued.elapsed();

        // Dequeued past the deadline: complete immediately with Timeout.
        let outcome = if Instant::now() >= deadline {
            SearchResult::failed(Error::Timeout(budget), wait_time, Vec::new())
        } else {
            self.execute(&request, deadline, wait_time)
        };

        self.release();
        outcome
    }

    // ── Admission queue ────────────────────────────────────────────────

    fn admit(&self, priority: Priority, client: ClientKind, deadline: Instant) -> Result<(), Error> {
        let enqueued = Instant::now();
        let mut state = self.queue.lock();
        let id = state.next_ticket;
        state.next_ticket += 1;
        state.waiting.push(Ticket {
            id,
            priority,
            client,
            enqueued,
        });

        loop {
            state.maybe_reset_window(self.config.quota_window);
            let now = Instant::now();
            if now >= deadline {
                state.waiting.retain(|t| t.id != id);
                warn!(?priority, "query timed out waiting for admission");
                return Err(Error::Timeout(now.saturating_duration_since(enqueued)));
            }

            if state.active < self.config.max_concurrent_searches
                && state.best_eligible(&self.config, now) == Some(id)
            {
                state.waiting.retain(|t| t.id != id);
                state.record_service(priority, client, now);
                return Ok(());
            }

            let wake_at = deadline.min(now + QUEUE_POLL);
            self.queue_cv.wait_until(&mut state, wake_at);
        }
    }

    fn release(&self) {
        let mut state = self.queue.lock();
        state.active = state.active.saturating_sub(1);
        drop(state);
        self.queue_cv.notify_all();
    }

    // ── Execution ──────────────────────────────────────────────────────

    fn execute(
        &self,
        request: &SearchRequest,
        mut deadline: Instant,
        wait_time: Duration,
    ) -> SearchResult {
        let mut options = request.options.clone();
        let required = required_subindexes(&options);
        let unavailable: Vec<SubIndex> = required
            .iter()
            .copied()
            .filter(|&sub| !self.is_available(sub))
            .collect();

        let mut degraded = false;
        if !unavailable.is_empty() {
            let required_weight: u32 = required.iter().map(|s| s.weight()).sum();
            let available_weight: u32 = required
                .iter()
                .filter(|&&s| self.is_available(s))
                .map(|s| s.weight())
                .sum();
            let score = available_weight as f64 / required_weight as f64;

            if score >= self.config.partial_search_threshold {
                adjust_for_unavailable(&mut options, &unavailable);
                degraded = true;
                debug!(?unavailable, score, "running degraded");
            } else if self.config.enable_fallback {
                // Minimal literal scan with a short leash.
                options = SearchOptions {
                    case_insensitive: options.case_insensitive,
                    max_results: options.max_results,
                    ..Default::default()
                };
                deadline = deadline.min(Instant::now() + self.config.fallback_timeout);
                degraded = true;
                debug!(?unavailable, score, "running minimal fallback scan");
            } else {
                return SearchResult::failed(
                    Error::IndexUnavailable(unavailable.clone()),
                    wait_time,
                    unavailable,
                );
            }
        }

        let to_lock: Vec<SubIndex> = required
            .iter()
            .copied()
            .filter(|&sub| self.is_available(sub))
            .collect();
        let guards = match self.acquire_read_locks(&to_lock, deadline) {
            Ok(guards) => guards,
            Err(error) => return SearchResult::failed(error, wait_time, unavailable),
        };

        // Pin the generation for the whole query.
        let index = self.index.read().clone();
        let engine = QueryEngine::with_ranking(index.clone(), self.ranking.clone());
        let candidates = match &request.candidates {
            Some(ids) => ids.clone(),
            None => index.all_file_ids(),
        };
        let control = QueryControl {
            cancel: request.cancel.clone(),
            deadline: Some(deadline),
        };

        let outcome = engine.run(&request.pattern, &candidates, &options, &control);
        drop(guards);

        match outcome {
            Ok(hits) => SearchResult {
                hits,
                wait_time,
                locks_used: to_lock,
                unavailable_indexes: unavailable,
                degraded_mode: degraded,
                partial_results: degraded,
                error: None,
            },
            Err(error) => SearchResult::failed(error, wait_time, unavailable),
        }
    }

    /// Try the read locks in the fixed global order, retrying with
    /// exponential backoff on contention. All-or-nothing per attempt.
    fn acquire_read_locks(
        &self,
        subs: &[SubIndex],
        deadline: Instant,
    ) -> Result<Vec<RwLockReadGuard<'_, ()>>, Error> {
        let mut backoff = RETRY_BACKOFF_START;
        let mut attempt = 0u32;
        loop {
            if let Some(guards) = self.try_acquire(subs) {
                return Ok(guards);
            }
            attempt += 1;
            if attempt > self.config.max_search_retries {
                return Err(Error::LockContention(subs.to_vec()));
            }
            let now = Instant::now();
            if now + backoff >= deadline {
                return Err(Error::LockContention(subs.to_vec()));
            }
            debug!(attempt, ?backoff, "lock contention, backing off");
            std::thread::sleep(backoff);
            backoff = (backoff * 2).min(RETRY_BACKOFF_CAP);
        }
    }

    fn try_acquire(&self, subs: &[SubIndex]) -> Option<Vec<RwLockReadGuard<'_, ()>>> {
        let mut guards = Vec::with_capacity(subs.len());
        for &sub in subs {
            match self.locks[sub.idx()].try_read() {
                Some(guard) => guards.push(guard),
                // Drop everything acquired so far and let the caller retry.
                None => return None,
            }
        }
        Some(guards)
    }
}

/// The sub-indexes a query needs, derived from its options. Order follows
/// the fixed global lock order.
pub fn required_subindexes(options: &SearchOptions) -> Vec<SubIndex> {
    let mut required = vec![SubIndex::Trigram];
    if options.usage_only {
        required.push(SubIndex::Reference);
    } else {
        required.push(SubIndex::Symbol);
    }
    if options.max_context_lines > 0 {
        required.push(SubIndex::Postings);
    }
    if options.include_pattern.is_some() || options.exclude_pattern.is_some() {
        required.push(SubIndex::Location);
    }
    if options.max_context_lines > 0 {
        required.push(SubIndex::Content);
    }
    required.sort();
    required
}

/// Option adjustments for a degraded run, per missing sub-index.
fn adjust_for_unavailable(options: &mut SearchOptions, unavailable: &[SubIndex]) {
    for sub in unavailable {
        match sub {
            SubIndex::Symbol => {
                options.declaration_only = true;
                options.usage_only = false;
            }
            SubIndex::Postings => options.max_context_lines = 0,
            SubIndex::Location => {
                options.include_pattern = None;
                options.exclude_pattern = None;
            }
            _ => {}
        }
    }
}
