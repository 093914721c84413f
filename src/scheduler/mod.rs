//! Background refresh of parts on a bounded worker pool.
//!
//! The [`RefreshScheduler`] decouples extraction from the callers of
//! [`PartCache::get`](crate::cache::PartCache::get). Submitting a part never
//! waits: the job is placed on a bounded queue and a dispatcher task hands
//! it to a worker once one of `max_parallel` permits is free.
//!
//! # Guarantees
//!
//! - At most one refresh per part is in flight. Submission claims the part
//!   through `Part::try_begin_refresh`; a part that is already resolving, or
//!   still fresh, is left alone.
//! - A full queue rejects the job and the part fails with
//!   [`PartError::SchedulerBusy`]; it is retried like any other failure once
//!   its refresh interval has elapsed.
//! - Extraction is bounded by the extraction timeout. A timeout or a panic
//!   inside a strategy becomes a captured failure on the part.
//! - Failures are recorded on the part, never returned to the submitter.

use crate::bom::{BomAssembler, Lineage};
use crate::cache::{CacheInner, PartCache};
use crate::config::CacheSettings;
use crate::core::PartError;
use crate::extract::{ExtractorRegistry, RawPart};
use crate::part::{Part, PartRecord};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Instant;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// A part waiting for a worker, with the chain of lookups that led to it.
struct RefreshJob {
    part: Arc<Part>,
    lineage: Lineage,
}

/// Bounded queue and worker pool refreshing parts.
pub struct RefreshScheduler {
    sender: Mutex<Option<mpsc::Sender<RefreshJob>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    max_parallel: usize,
    queue_capacity: usize,
}

impl RefreshScheduler {
    /// Start the dispatcher task. Must be called within a Tokio runtime.
    pub(crate) fn start(
        cache: Weak<CacheInner>,
        registry: Arc<ExtractorRegistry>,
        settings: Arc<CacheSettings>,
        max_parallel: usize,
        queue_capacity: usize,
    ) -> Self {
        let max_parallel = max_parallel.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let worker = Arc::new(Worker {
            cache,
            registry,
            settings,
        });
        let dispatcher = tokio::spawn(dispatch(receiver, worker, max_parallel));

        Self {
            sender: Mutex::new(Some(sender)),
            dispatcher: Mutex::new(Some(dispatcher)),
            max_parallel,
            queue_capacity,
        }
    }

    /// Queue a refresh of `part`.
    ///
    /// Returns `true` if a refresh was dispatched. A part that is already
    /// resolving or still fresh is not touched and `false` is returned; so
    /// is a part whose job was rejected, which is marked failed.
    pub(crate) fn submit(&self, part: Arc<Part>, lineage: Lineage) -> bool {
        if !part.try_begin_refresh() {
            return false;
        }

        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let Some(sender) = sender else {
            let locator = part.locator().to_string();
            part.fail(PartError::SchedulerClosed { locator });
            return false;
        };

        match sender.try_send(RefreshJob { part, lineage }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job)) => {
                warn!(target: "refresh", "Refresh queue full, rejecting {}", job.part.locator());
                let locator = job.part.locator().to_string();
                job.part.fail(PartError::SchedulerBusy { locator });
                false
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                let locator = job.part.locator().to_string();
                job.part.fail(PartError::SchedulerClosed { locator });
                false
            }
        }
    }

    /// Maximum number of refreshes running at once.
    #[must_use]
    pub const fn max_parallel(&self) -> usize {
        self.max_parallel
    }

    /// Number of jobs that may wait for a worker.
    #[must_use]
    pub const fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Stop accepting jobs and wait for queued and running refreshes to
    /// finish. Later submissions fail with [`PartError::SchedulerClosed`].
    pub(crate) async fn shutdown(&self) {
        drop(self.sender.lock().unwrap_or_else(PoisonError::into_inner).take());
        let dispatcher = self.dispatcher.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(dispatcher) = dispatcher
            && let Err(e) = dispatcher.await
        {
            warn!(target: "refresh", "Refresh dispatcher ended abnormally: {}", e);
        }
    }
}

impl std::fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("max_parallel", &self.max_parallel)
            .field("queue_capacity", &self.queue_capacity)
            .finish_non_exhaustive()
    }
}

/// Pull jobs off the queue, running at most `max_parallel` at once.
async fn dispatch(mut receiver: mpsc::Receiver<RefreshJob>, worker: Arc<Worker>, max_parallel: usize) {
    let permits = Arc::new(Semaphore::new(max_parallel));
    let mut running = JoinSet::new();

    while let Some(job) = receiver.recv().await {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let worker = worker.clone();
        running.spawn(async move {
            let _permit = permit;
            worker.run(job).await;
        });
        while running.try_join_next().is_some() {}
    }

    while running.join_next().await.is_some() {}
    debug!(target: "refresh", "Refresh dispatcher stopped");
}

struct Worker {
    cache: Weak<CacheInner>,
    registry: Arc<ExtractorRegistry>,
    settings: Arc<CacheSettings>,
}

impl Worker {
    async fn run(&self, job: RefreshJob) {
        let locator = job.part.locator().clone();
        let timeout = self.settings.extraction_timeout();
        let started = Instant::now();
        debug!(target: "refresh", "Refreshing {}", locator);

        let extraction = AssertUnwindSafe(self.registry.extract(&locator)).catch_unwind();
        let outcome = match tokio::time::timeout(timeout, extraction).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(PartError::ExtractorPanicked {
                locator: locator.to_string(),
            }),
            Err(_) => Err(PartError::Timeout {
                locator: locator.to_string(),
                after: timeout,
            }),
        };

        match outcome.and_then(|raw| self.publish(&job, raw)) {
            Ok(()) => {
                info!(target: "refresh", "Resolved {} in {:?}", locator, started.elapsed());
            }
            Err(error) => {
                warn!(target: "refresh", "Refresh of {} failed: {}", locator, error);
                job.part.fail(error);
            }
        }
    }

    /// Assemble the bill of materials and publish the resolved part.
    fn publish(&self, job: &RefreshJob, raw: RawPart) -> Result<(), PartError> {
        let record = PartRecord {
            identifier: raw.identifier,
            unit_cost: raw.unit_cost,
            package_cost: raw.package_cost,
            package_units: raw.package_units,
            project: raw.project,
        };

        if raw.sub_parts.is_empty() {
            job.part.complete(record, Vec::new());
            return Ok(());
        }

        let cache = self.cache.upgrade().map(PartCache::from_inner).ok_or_else(|| {
            PartError::SchedulerClosed {
                locator: job.part.locator().to_string(),
            }
        })?;

        // Publication happens under the assembly lock so cycle detection
        // sees every tree published before this one.
        let _guard = cache.assembly_guard();
        let required = BomAssembler::new(cache.clone()).assemble(&job.part, &raw.sub_parts, &job.lineage)?;
        job.part.complete(record, required);
        Ok(())
    }
}
