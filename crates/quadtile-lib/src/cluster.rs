//! Distributed decomposition: coordinator-owned frontier, scatter/gather rounds
//!
//! One coordinator (the calling thread) owns the global frontier and the
//! accumulated terminal set; `W` worker threads classify batches. The
//! coordinator never classifies anything itself. Each round is a synchronous
//! barrier: every worker receives exactly one batch (possibly empty) and the
//! coordinator blocks until every worker has replied. Nodes travel between the
//! coordinator and the workers by value only.
//!
//! Termination is signalled explicitly: when the frontier drains, the
//! coordinator broadcasts a sentinel and the workers exit their loops. There is
//! no round-count limit, so the caller must keep the tile size limit bounded
//! relative to the root extent.
//!
//! Failure policy is fail-fast: a worker error aborts the whole job with a
//! diagnostic carrying the failing batch's spatial extent. No partial results
//! are salvaged and no retry is attempted.

use crate::{Coverage, OpenNode, Rect, Result, TerminalRecord, TileError, process_batch};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

/// Configuration for a distributed decomposition run
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Number of worker threads (>= 1); the coordinator is not one of them
    pub workers: usize,
    /// Minimum tile side length at which decomposition stops
    pub tile_size_limit: f64,
    /// Seed for the frontier shuffle; `None` draws from OS entropy.
    /// Seeding makes batch partitions reproducible across runs.
    pub shuffle_seed: Option<u64>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            tile_size_limit: 1024.0,
            shuffle_seed: None,
        }
    }
}

/// One scatter message: a batch to classify, or the termination sentinel
enum WorkOrder {
    Batch(Vec<OpenNode>),
    Drain,
}

/// One gather message
struct WorkerReply {
    worker: usize,
    outcome: std::result::Result<crate::BatchOutcome, String>,
}

/// Decompose a root extent against the coverage across a worker pool
///
/// The returned terminal set equals (up to ordering) the output of the
/// single-process [`crate::decompose`] run on the same root and coverage;
/// distribution changes only the wall-clock shape of the work.
pub fn run_distributed(
    root: Rect,
    coverage: Arc<Coverage>,
    config: &ClusterConfig,
) -> Result<Vec<TerminalRecord>> {
    if config.workers == 0 {
        return Err(TileError::InvalidConfig(
            "at least one worker is required".to_string(),
        ));
    }
    if !(config.tile_size_limit > 0.0) {
        return Err(TileError::InvalidConfig(format!(
            "tile size limit must be positive, got {}",
            config.tile_size_limit
        )));
    }

    let workers = config.workers;
    let limit = config.tile_size_limit;

    let (reply_tx, reply_rx) = mpsc::channel::<WorkerReply>();
    let mut order_txs = Vec::with_capacity(workers);
    let mut handles = Vec::with_capacity(workers);

    for id in 0..workers {
        let (order_tx, order_rx) = mpsc::channel::<WorkOrder>();
        let reply_tx = reply_tx.clone();
        let coverage = Arc::clone(&coverage);
        let handle = thread::Builder::new()
            .name(format!("quadtile-worker-{id}"))
            .spawn(move || worker_loop(id, order_rx, reply_tx, coverage, limit))?;
        order_txs.push(order_tx);
        handles.push(handle);
    }
    // The coordinator keeps only the original senders; replies arrive solely
    // from live workers.
    drop(reply_tx);

    let mut rng = match config.shuffle_seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut frontier = vec![OpenNode::new(root, 0)];
    let mut terminals: Vec<TerminalRecord> = Vec::new();
    let mut round: u64 = 0;

    while !frontier.is_empty() {
        round += 1;

        // Shuffling decorrelates geometric complexity from spatial position
        // before the contiguous partition.
        frontier.shuffle(&mut rng);
        let batches = partition(std::mem::take(&mut frontier), workers);
        let extents: Vec<Option<Rect>> = batches.iter().map(|b| batch_extent(b)).collect();

        tracing::debug!(
            round,
            batches = batches.len(),
            sizes = ?batches.iter().map(Vec::len).collect::<Vec<_>>(),
            "scatter"
        );

        for (worker, batch) in batches.into_iter().enumerate() {
            if order_txs[worker].send(WorkOrder::Batch(batch)).is_err() {
                let error = worker_failure(worker, &extents, "worker exited before scatter");
                return abort(error, order_txs, handles);
            }
        }

        let mut replied = vec![false; workers];
        for _ in 0..workers {
            match reply_rx.recv() {
                Ok(WorkerReply {
                    worker,
                    outcome: Ok(outcome),
                }) => {
                    tracing::debug!(
                        round,
                        worker,
                        opened = outcome.opened.len(),
                        closed = outcome.closed.len(),
                        "gather"
                    );
                    replied[worker] = true;
                    frontier.extend(outcome.opened);
                    terminals.extend(outcome.closed);
                }
                Ok(WorkerReply {
                    worker,
                    outcome: Err(detail),
                }) => {
                    let error = worker_failure(worker, &extents, &detail);
                    return abort(error, order_txs, handles);
                }
                Err(_) => {
                    let missing = replied.iter().position(|&done| !done).unwrap_or(0);
                    let error =
                        worker_failure(missing, &extents, "worker died without replying");
                    return abort(error, order_txs, handles);
                }
            }
        }

        tracing::info!(
            round,
            open = frontier.len(),
            terminal = terminals.len(),
            "round complete"
        );
    }

    // Frontier drained: broadcast the termination sentinel and join
    for order_tx in &order_txs {
        let _ = order_tx.send(WorkOrder::Drain);
    }
    drop(order_txs);
    for handle in handles {
        let _ = handle.join();
    }

    tracing::info!(rounds = round, terminal = terminals.len(), "frontier drained");
    Ok(terminals)
}

fn worker_loop(
    id: usize,
    order_rx: mpsc::Receiver<WorkOrder>,
    reply_tx: mpsc::Sender<WorkerReply>,
    coverage: Arc<Coverage>,
    tile_size_limit: f64,
) {
    while let Ok(order) = order_rx.recv() {
        let batch = match order {
            WorkOrder::Drain => break,
            WorkOrder::Batch(batch) => batch,
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            process_batch(&batch, &coverage, tile_size_limit)
        }))
        .map_err(|payload| panic_message(payload.as_ref()));

        if reply_tx
            .send(WorkerReply {
                worker: id,
                outcome,
            })
            .is_err()
        {
            // Coordinator is gone; nothing left to reply to.
            break;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked during classification".to_string()
    }
}

/// Split items into `parts` roughly-equal contiguous sublists
///
/// Sublist `i` covers `[(i*n)/parts, ((i+1)*n)/parts)`, so sizes differ by at
/// most one and empty inputs yield all-empty sublists.
fn partition<T>(mut items: Vec<T>, parts: usize) -> Vec<Vec<T>> {
    let n = items.len();
    let mut sublists = Vec::with_capacity(parts);
    // Split back-to-front so each split_off is O(sublist)
    let mut bounds: Vec<usize> = (0..parts).map(|i| (i * n) / parts).collect();
    while let Some(start) = bounds.pop() {
        sublists.push(items.split_off(start));
    }
    sublists.reverse();
    sublists
}

/// Bounding extent of a batch, for failure diagnostics
fn batch_extent(batch: &[OpenNode]) -> Option<Rect> {
    let mut iter = batch.iter();
    let first = iter.next()?.boundary;
    Some(iter.fold(first, |acc, node| acc.expand(&node.boundary)))
}

fn worker_failure(worker: usize, extents: &[Option<Rect>], detail: &str) -> TileError {
    let extent = extents
        .get(worker)
        .and_then(|e| e.as_ref())
        .map(|r| r.to_string())
        .unwrap_or_else(|| "empty batch".to_string());
    TileError::WorkerFailure {
        worker,
        extent,
        detail: detail.to_string(),
    }
}

/// Tear the pool down after a failed round: dropping the order channels makes
/// every worker's `recv` fail, which exits its loop.
fn abort(
    error: TileError,
    order_txs: Vec<mpsc::Sender<WorkOrder>>,
    handles: Vec<thread::JoinHandle<()>>,
) -> Result<Vec<TerminalRecord>> {
    drop(order_txs);
    for handle in handles {
        let _ = handle.join();
    }
    Err(error)
}
