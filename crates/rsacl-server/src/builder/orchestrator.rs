//! Cache build orchestrator.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use tokio::sync::{broadcast, mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, trace, warn};

use rsacl_domain::error::DomainResult;
use rsacl_domain::resolver::PageRequest;
use rsacl_domain::{
    ClosureCacheStore, ClosureRecord, DirectRelationChecker, RelationClosureResolver,
    RelationConfig, RequestScratch, TupleReader,
};

use super::tracker::{BuildTracker, FullRebuildGuard};
use super::BuilderConfig;
use crate::observability::{
    BUILDS_DEFERRED_TOTAL, BUILDS_TOTAL, BUILD_DURATION_SECONDS, BUILD_FAILURES_TOTAL,
};

/// Work item consumed by the worker pool.
#[derive(Debug)]
enum BuildJob {
    User(String),
    FullRebuild(FullRebuildGuard),
}

/// Result of building one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuildOutcome {
    /// The stored record already covered the watermark.
    Fresh,
    /// A new record was written.
    Written,
}

/// Schedules, deduplicates and runs closure cache builds.
///
/// Synchronous entry points (`build_one`, `rebuild_all`, `build_all_scheduled`)
/// run on the caller's task. Asynchronous ones (`build_async`,
/// `schedule_full_rebuild`) enqueue a job for the worker pool started by
/// [`start`](Self::start); jobs enqueued before `start` wait in the queue.
pub struct CacheBuildOrchestrator<T, C, K> {
    config: BuilderConfig,
    reader: Arc<T>,
    cache: Arc<C>,
    checker: Arc<K>,
    resolver: RelationClosureResolver<T>,
    tracker: BuildTracker,
    jobs: Mutex<Option<mpsc::UnboundedSender<BuildJob>>>,
    receiver: Arc<AsyncMutex<mpsc::UnboundedReceiver<BuildJob>>>,
    shutdown: broadcast::Sender<()>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl<T, C, K> CacheBuildOrchestrator<T, C, K>
where
    T: TupleReader + 'static,
    C: ClosureCacheStore + 'static,
    K: DirectRelationChecker + 'static,
{
    /// Creates an orchestrator. No task runs until [`start`](Self::start).
    pub fn new(
        config: BuilderConfig,
        reader: Arc<T>,
        relations: Arc<RelationConfig>,
        cache: Arc<C>,
        checker: Arc<K>,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (shutdown, _) = broadcast::channel(1);
        Self {
            config,
            resolver: RelationClosureResolver::new(Arc::clone(&reader), relations),
            reader,
            cache,
            checker,
            tracker: BuildTracker::new(),
            jobs: Mutex::new(Some(sender)),
            receiver: Arc::new(AsyncMutex::new(receiver)),
            shutdown,
            tasks: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn reader(&self) -> &Arc<T> {
        &self.reader
    }

    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }

    pub fn checker(&self) -> &Arc<K> {
        &self.checker
    }

    pub fn resolver(&self) -> &RelationClosureResolver<T> {
        &self.resolver
    }

    // ========== Per-user builds ==========

    /// Builds `user`'s closure record on the calling task.
    ///
    /// Returns `Ok(false)` without touching the store when the cache or
    /// update-on-mutation is disabled, when `user` is empty, or when `user`
    /// is already being built (the request is then deferred to the tick).
    /// Returns `Ok(true)` when the record is fresh afterwards, including when
    /// it already was.
    pub async fn build_one(&self, user: &str) -> DomainResult<bool> {
        if !self.config.update_on_acl_change {
            return Ok(false);
        }
        self.build_now(user).await
    }

    async fn build_now(&self, user: &str) -> DomainResult<bool> {
        if !self.config.enabled || user.is_empty() {
            return Ok(false);
        }

        let Some(_guard) = self.tracker.try_begin(user) else {
            self.defer(user);
            return Ok(false);
        };

        match self.build_user(user, false, None).await {
            Ok(_) => Ok(true),
            Err(e) => {
                metrics::counter!(BUILD_FAILURES_TOTAL).increment(1);
                error!(user, error = %e, "closure build failed");
                Err(e)
            }
        }
    }

    /// Enqueues a build for `user` on the worker pool.
    ///
    /// A user already being built is deferred to the tick instead; a user
    /// already waiting in the queue is not enqueued twice. Returns false when
    /// disabled, when `user` is empty, or after shutdown.
    pub fn build_async(&self, user: &str) -> bool {
        if !self.config.enabled || !self.config.update_on_acl_change || user.is_empty() {
            return false;
        }
        if self.is_shut_down() {
            return false;
        }
        if self.tracker.is_in_progress(user) {
            self.defer(user);
            return true;
        }
        if !self.tracker.mark_queued(user) {
            trace!(user, "build already queued");
            return true;
        }

        if self.send(BuildJob::User(user.to_string())) {
            true
        } else {
            self.tracker.unmark_queued(user);
            false
        }
    }

    /// Builds every scheduled user that is not currently in progress.
    ///
    /// Users still in progress stay scheduled for the next tick. Returns the
    /// number of users taken out of the scheduled set.
    pub async fn build_all_scheduled(&self) -> usize {
        if !self.config.enabled {
            return 0;
        }

        let mut processed = 0;
        for user in self.tracker.scheduled_snapshot() {
            if self.tracker.is_in_progress(&user) {
                trace!(user = %user, "still in progress, left for next tick");
                continue;
            }
            if !self.tracker.unschedule(&user) {
                continue;
            }
            processed += 1;
            // Failures are logged inside; the user is not re-scheduled.
            let _ = self.build_now(&user).await;
        }

        if processed > 0 {
            debug!(processed, "drained scheduled builds");
        }
        processed
    }

    // ========== Full rebuilds ==========

    /// Rebuilds every user's record on the calling task.
    ///
    /// Returns `Ok(false)` with no work when disabled, when a full rebuild
    /// is already queued or running, or when there are no namespaces or no
    /// end users.
    pub async fn rebuild_all(&self) -> DomainResult<bool> {
        if !self.config.enabled {
            return Ok(false);
        }
        let Some(guard) = self.tracker.try_begin_full_rebuild() else {
            debug!("full rebuild already active");
            return Ok(false);
        };
        self.run_full_rebuild(guard).await
    }

    /// Enqueues a full rebuild. Refuses while one is queued or running;
    /// the request is then kept and another rebuild is enqueued once the
    /// active one finishes.
    pub fn schedule_full_rebuild(&self) -> bool {
        if !self.config.enabled || self.is_shut_down() {
            return false;
        }
        let Some(guard) = self.tracker.try_begin_full_rebuild() else {
            self.tracker.request_rerun();
            debug!("full rebuild active, rerun requested");
            return false;
        };
        // On failure the job, and with it the guard, is dropped.
        self.send(BuildJob::FullRebuild(guard))
    }

    /// Runs a full rebuild if the cache has never been built.
    pub async fn first_time_build(&self) -> DomainResult<bool> {
        if !self.config.enabled {
            return Ok(false);
        }
        let records = self.cache.count().await?;
        if records > 0 {
            debug!(records, "closure cache already built");
            return Ok(false);
        }
        info!("closure cache empty, running first-time build");
        self.rebuild_all().await
    }

    /// Runs one full rebuild, then releases the slot and enqueues a rerun if
    /// one was requested meanwhile.
    ///
    /// Requests made before the pass starts are covered by it. The rerun flag
    /// is checked only after the slot is released, so a request either sees
    /// the slot free and schedules itself, or is picked up here.
    async fn run_full_rebuild(&self, guard: FullRebuildGuard) -> DomainResult<bool> {
        self.tracker.take_rerun();
        let result = self.full_rebuild_pass().await;
        drop(guard);

        if self.tracker.take_rerun() {
            info!("full rebuild requested while running, rescheduling");
            self.schedule_full_rebuild();
        }
        result
    }

    #[instrument(skip(self))]
    async fn full_rebuild_pass(&self) -> DomainResult<bool> {
        let started = Instant::now();
        let page_size = self.config.page_size;

        let namespaces = self.collect_namespaces().await?;
        if namespaces.is_empty() {
            info!("no namespaces, skipping full rebuild");
            return Ok(false);
        }

        let mut request = PageRequest::first(page_size);
        let (mut users, mut written, mut failed) = (0usize, 0usize, 0usize);
        loop {
            let page = self.reader.list_end_users(&request).await?;
            users += page.items.len();

            let mut claimed = Vec::with_capacity(page.items.len());
            for user in &page.items {
                match self.tracker.try_begin(user) {
                    Some(guard) => claimed.push(guard),
                    None => self.defer(user),
                }
            }

            for guard in &claimed {
                match self.build_user(guard.user(), true, Some(&namespaces)).await {
                    Ok(_) => written += 1,
                    Err(e) => {
                        failed += 1;
                        metrics::counter!(BUILD_FAILURES_TOTAL).increment(1);
                        error!(user = guard.user(), error = %e, "closure rebuild failed");
                    }
                }
            }
            drop(claimed);

            match page.next_request(page_size) {
                Some(next) => request = next,
                None => break,
            }
        }

        if users == 0 {
            info!("no end users, skipping full rebuild");
            return Ok(false);
        }

        info!(
            namespaces = namespaces.len(),
            users,
            written,
            failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "full closure rebuild finished"
        );
        Ok(true)
    }

    async fn collect_namespaces(&self) -> DomainResult<HashSet<String>> {
        let page_size = self.config.page_size;
        let mut namespaces = HashSet::new();
        let mut request = PageRequest::first(page_size);
        loop {
            let page = self.reader.list_namespaces(&request).await?;
            let next = page.next_request(page_size);
            namespaces.extend(page.items);
            match next {
                Some(next) => request = next,
                None => return Ok(namespaces),
            }
        }
    }

    // ========== Building one record ==========

    /// Computes and stores `user`'s record. Caller must hold the user's
    /// in-progress mark.
    ///
    /// The watermark is read before the tuples, so a mutation racing the
    /// build leaves a record that is stale and rebuilt next time.
    #[instrument(skip(self, namespaces))]
    async fn build_user(
        &self,
        user: &str,
        force: bool,
        namespaces: Option<&HashSet<String>>,
    ) -> DomainResult<BuildOutcome> {
        let started = Instant::now();
        let watermark = self.reader.max_mutation_version(user).await?;

        if !force {
            if let Some(record) = self.cache.get(user).await? {
                if record.covers(watermark) {
                    trace!(watermark, "closure record fresh, skipping");
                    return Ok(BuildOutcome::Fresh);
                }
            }
        }

        let start = self.reader.find_by_principal(user).await?;
        let mut scratch = RequestScratch::new();
        scratch.prime(user, &start);

        let closure = self.resolver.compute_closure(user, &start).await?;

        let mut relations = HashSet::new();
        for pair in &closure {
            if namespaces.is_some_and(|known| !known.contains(&pair.namespace)) {
                continue;
            }
            let matched = self
                .checker
                .evaluate(&pair.namespace, &pair.object, None, user, &mut scratch)
                .await?;
            relations.extend(matched);
        }

        // Directly held tags are answered from the tuple store at check time.
        if let Some(direct) = scratch.tags(user) {
            relations.retain(|tag| !direct.contains(tag));
        }

        let count = relations.len();
        self.cache
            .put(ClosureRecord::new(user, relations, watermark))
            .await?;

        let kind = if force { "full" } else { "user" };
        metrics::counter!(BUILDS_TOTAL, "kind" => kind).increment(1);
        metrics::histogram!(BUILD_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        debug!(pairs = closure.len(), relations = count, watermark, "closure record written");
        Ok(BuildOutcome::Written)
    }

    fn defer(&self, user: &str) {
        if self.tracker.schedule(user) {
            metrics::counter!(BUILDS_DEFERRED_TOTAL).increment(1);
            warn!(user, "build already in progress, deferred to next tick");
        }
    }

    // ========== Introspection ==========

    /// True when checks for `user` may be answered from the cache.
    ///
    /// A user with a pending build (scheduled, queued or running) is not,
    /// and neither is anyone while a full rebuild is pending.
    pub fn can_use_cache(&self, user: &str) -> bool {
        self.config.enabled
            && !self.tracker.is_full_rebuild_active()
            && !self.tracker.is_rerun_requested()
            && !self.tracker.is_scheduled(user)
            && !self.tracker.is_in_progress(user)
            && !self.tracker.is_queued(user)
    }

    /// Adds `user` to the scheduled set for the next tick.
    pub fn schedule_update(&self, user: &str) -> bool {
        if !self.config.enabled || user.is_empty() {
            return false;
        }
        self.tracker.schedule(user)
    }

    pub fn has_scheduled(&self, user: &str) -> bool {
        self.tracker.is_scheduled(user)
    }

    pub fn has_in_progress(&self, user: &str) -> bool {
        self.tracker.is_in_progress(user)
    }

    /// True while a full rebuild is queued or running.
    pub fn is_in_progress(&self) -> bool {
        self.tracker.is_full_rebuild_active()
    }

    // ========== Lifecycle ==========

    /// Spawns the worker pool and the periodic tick. Later calls are no-ops.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for worker in 0..self.config.workers {
            let this = Arc::clone(self);
            tasks.push(tokio::spawn(async move { this.run_worker(worker).await }));
        }

        let this = Arc::clone(self);
        let shutdown = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move { this.run_tick(shutdown).await }));

        info!(
            workers = self.config.workers,
            period_ms = self.config.scheduled_period.as_millis() as u64,
            "closure cache builder started"
        );
    }

    /// Stops the tick, closes the job queue and waits for the workers to
    /// drain the jobs already queued.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(());
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let tasks = {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::take(&mut *tasks)
        };
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "build task ended abnormally");
            }
        }
        info!("closure cache builder stopped");
    }

    fn is_shut_down(&self) -> bool {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    fn send(&self, job: BuildJob) -> bool {
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        match jobs.as_ref() {
            Some(sender) => sender.send(job).is_ok(),
            None => false,
        }
    }

    async fn run_worker(&self, worker: usize) {
        trace!(worker, "build worker started");
        loop {
            let job = self.receiver.lock().await.recv().await;
            let Some(job) = job else {
                break;
            };
            match job {
                BuildJob::User(user) => {
                    self.tracker.unmark_queued(&user);
                    let _ = self.build_now(&user).await;
                }
                BuildJob::FullRebuild(guard) => {
                    if let Err(e) = self.run_full_rebuild(guard).await {
                        error!(error = %e, "full closure rebuild failed");
                    }
                }
            }
        }
        trace!(worker, "build worker stopped");
    }

    async fn run_tick(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.config.scheduled_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    self.build_all_scheduled().await;
                }
            }
        }
    }
}
