// THEORY:
// The `ParallelPipeline` is the asynchronous counterpart of `TrackingPipeline`.
// Tracking itself is strictly sequential (frame t needs the identity map of
// frame t-1), but cost extraction depends on the frame alone. The pipeline
// therefore splits the work in two:
//
// 1.  **Worker Pool**: a dispatcher hands frames round-robin to one worker per
//     CPU. Each worker computes the frame's `FrameCosts` on tokio's blocking
//     pool and answers over a oneshot channel.
// 2.  **Ordered Consumer**: pending answers are held in a `FuturesOrdered`, so
//     they come back in submission order no matter which worker finishes
//     first. Each one is tracked against the previous map as soon as it is
//     next in line.
// 3.  **Bounded Look-ahead**: at most `max_in_flight` frames are being costed
//     at once, which bounds memory on long sequences.
//
// All cross-frame state (previous map, ledger, volume) lives in the pipeline
// and is only touched by the ordered consumer.

use crate::config::TrackerConfig;
use crate::core_modules::costs::{ChromaCostProvider, CostProvider, FrameCosts};
use crate::core_modules::energy::{AlphaExpansion, EnergySolver};
use crate::core_modules::grid::IdentityMap;
use crate::core_modules::tracker::IdentityLedger;
use crate::driver::Driver;
use crate::{Error, Result};
use futures::stream::{FuturesOrdered, StreamExt};
use image::RgbImage;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// A frame waiting to be turned into costs.
pub struct CostTask {
    pub frame_id: u64,
    pub frame: RgbImage,
    pub result_sender: oneshot::Sender<Result<FrameCosts>>,
}

/// Computes frame costs concurrently on a fixed set of workers.
pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<CostTask>,
    dispatcher: tokio::task::JoinHandle<()>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `worker_count` workers. Must be called from within a tokio runtime.
    pub fn new<P>(provider: Arc<P>, worker_count: usize) -> Self
    where
        P: CostProvider + Send + Sync + 'static,
    {
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<CostTask>();

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<CostTask>())
            .unzip();

        // A single dispatcher distributes tasks to workers round-robin.
        let dispatcher = tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                if let Err(mpsc::error::SendError(task)) = worker_senders[worker_idx].send(task) {
                    warn!(worker = worker_idx, frame = task.frame_id, "worker is gone; dropping task");
                }
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        let workers = worker_receivers
            .into_iter()
            .enumerate()
            .map(|(worker_idx, mut worker_receiver)| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move {
                    while let Some(task) = worker_receiver.recv().await {
                        let CostTask {
                            frame_id,
                            frame,
                            result_sender,
                        } = task;
                        let provider = Arc::clone(&provider);
                        let result = tokio::task::spawn_blocking(move || provider.costs(&frame))
                            .await
                            .unwrap_or_else(|e| Err(Error::Worker(format!("cost task for frame {frame_id} failed: {e}"))));
                        debug!(worker = worker_idx, frame = frame_id, ok = result.is_ok(), "costs computed");
                        // The receiver may have given up on this frame.
                        let _ = result_sender.send(result);
                    }
                })
            })
            .collect();

        Self {
            task_sender,
            dispatcher,
            workers,
        }
    }

    /// Queues a frame and returns a future that resolves to its costs.
    pub fn submit(&self, frame_id: u64, frame: RgbImage) -> Result<impl Future<Output = Result<FrameCosts>> + use<>> {
        let (result_sender, result_receiver) = oneshot::channel();
        self.task_sender
            .send(CostTask {
                frame_id,
                frame,
                result_sender,
            })
            .map_err(|_| Error::Worker("failed to send task to worker pool".to_string()))?;

        Ok(async move {
            result_receiver
                .await
                .map_err(|_| Error::Worker(format!("no result received for frame {frame_id}")))?
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Stops accepting work and waits for every worker to finish.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.task_sender);
        self.dispatcher
            .await
            .map_err(|e| Error::Worker(format!("dispatcher failed: {e}")))?;
        for worker in self.workers {
            worker.await.map_err(|e| Error::Worker(format!("worker failed: {e}")))?;
        }
        Ok(())
    }
}

/// Tracks a sequence with cost extraction spread over a worker pool.
pub struct ParallelPipeline<S: EnergySolver = AlphaExpansion> {
    driver: Arc<Driver<S>>,
    worker_pool: WorkerPool,
    max_in_flight: usize,
    frame_counter: u64,
    ledger: IdentityLedger,
    volume: Vec<IdentityMap>,
}

impl ParallelPipeline {
    /// A pipeline with the built-in cost model and solver and one worker per CPU.
    /// Must be called from within a tokio runtime.
    pub fn new(config: TrackerConfig) -> Result<Self> {
        let provider = Arc::new(ChromaCostProvider::new(config.clone()));
        Self::with_parts(provider, Driver::new(config)?, num_cpus::get())
    }
}

impl<S: EnergySolver + Send + Sync + 'static> ParallelPipeline<S> {
    pub fn with_parts<P>(provider: Arc<P>, driver: Driver<S>, worker_count: usize) -> Result<Self>
    where
        P: CostProvider + Send + Sync + 'static,
    {
        let worker_pool = WorkerPool::new(provider, worker_count);
        let max_in_flight = worker_pool.worker_count() * 2;
        Ok(Self {
            driver: Arc::new(driver),
            worker_pool,
            max_in_flight,
            frame_counter: 0,
            ledger: IdentityLedger::new(),
            volume: Vec::new(),
        })
    }

    /// Tracks `frames` in order and returns their identity maps.
    ///
    /// The maps are also appended to the pipeline's volume, so a long sequence
    /// may be fed in several batches.
    pub async fn process_sequence<I>(&mut self, frames: I) -> Result<Vec<IdentityMap>>
    where
        I: IntoIterator<Item = RgbImage>,
    {
        let first_new = self.volume.len();
        let mut pending = FuturesOrdered::new();

        for frame in frames {
            let frame_id = self.frame_counter;
            self.frame_counter += 1;
            pending.push_back(self.worker_pool.submit(frame_id, frame)?);

            if pending.len() >= self.max_in_flight {
                if let Some(costs) = pending.next().await {
                    self.track_next(costs?).await?;
                }
            }
        }
        while let Some(costs) = pending.next().await {
            self.track_next(costs?).await?;
        }

        info!(
            frames = self.volume.len() - first_new,
            highest_issued = self.ledger.highest_issued(),
            "sequence tracked"
        );
        Ok(self.volume[first_new..].to_vec())
    }

    /// Tracks one frame after all frames submitted before it.
    pub async fn process_frame(&mut self, frame: RgbImage) -> Result<&IdentityMap> {
        let frame_id = self.frame_counter;
        self.frame_counter += 1;
        let costs = self.worker_pool.submit(frame_id, frame)?.await?;
        self.track_next(costs).await?;
        Ok(&self.volume[self.volume.len() - 1])
    }

    /// Runs the driver for the next frame in line on the blocking pool.
    async fn track_next(&mut self, costs: FrameCosts) -> Result<()> {
        let driver = Arc::clone(&self.driver);
        let previous = self.volume.last().cloned();
        let mut ledger = self.ledger;

        let (map, ledger) = tokio::task::spawn_blocking(move || {
            driver
                .track_frame(&costs, previous.as_ref(), &mut ledger)
                .map(|map| (map, ledger))
        })
        .await
        .map_err(|e| Error::Worker(format!("tracking task failed: {e}")))??;

        debug!(
            frame = self.volume.len(),
            identities = map.identities().len(),
            "frame tracked in order"
        );
        self.ledger = ledger;
        self.volume.push(map);
        Ok(())
    }

    pub fn volume(&self) -> &[IdentityMap] {
        &self.volume
    }

    pub fn ledger(&self) -> &IdentityLedger {
        &self.ledger
    }

    /// Stops the worker pool and hands back the identity volume.
    pub async fn finish(self) -> Result<Vec<IdentityMap>> {
        self.worker_pool.shutdown().await?;
        Ok(self.volume)
    }
}
