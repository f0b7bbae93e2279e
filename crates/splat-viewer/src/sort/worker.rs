//! Depth sort on a dedicated thread.
//!
//! The frame loop hands the worker a view matrix (plus the previous order's
//! buffer for reuse) and picks the result up on a later frame. Both channels
//! hold one message; a request made while one is pending is dropped.
//!
//! The sort's parallel passes run on a rayon pool owned by the worker, so they
//! never queue behind the compositor's jobs on the global pool.

use super::DepthSorter;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};
use glam::{Mat4, Vec3};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

struct SortRequest {
    id: u64,
    view: Mat4,
    recycled: Option<Vec<u32>>,
}

/// A finished permutation and the view it was computed for.
#[derive(Debug)]
pub struct SortResult {
    pub id: u64,
    pub view: Mat4,
    pub order: Vec<u32>,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Sent(u64),
    /// A sort is already in flight; the request was dropped.
    Busy,
    /// The worker thread is gone.
    Closed,
}

pub struct SortWorker {
    tx: Option<Sender<SortRequest>>,
    rx: Receiver<SortResult>,
    handle: Option<JoinHandle<()>>,
    in_flight: Option<u64>,
    next_id: u64,
    splat_count: usize,
    sort_threads: usize,
}

/// Half the machine, at least one thread.
fn default_sort_threads() -> usize {
    thread::available_parallelism().map_or(1, |n| n.get() / 2).max(1)
}

impl SortWorker {
    pub fn spawn(positions: Arc<[Vec3]>, buckets: u32) -> std::io::Result<Self> {
        let (req_tx, req_rx) = bounded::<SortRequest>(1);
        let (res_tx, res_rx) = bounded::<SortResult>(1);
        let splat_count = positions.len();
        let mut sorter = DepthSorter::new(positions, buckets);
        let sort_threads = default_sort_threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(sort_threads)
            .thread_name(|i| format!("depth-sort-{i}"))
            .build()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        let handle = thread::Builder::new()
            .name("depth-sort".into())
            .spawn(move || {
                for req in req_rx.iter() {
                    let started = Instant::now();
                    let mut order = req.recycled.unwrap_or_default();
                    pool.install(|| sorter.sort_into(&req.view, &mut order));
                    let elapsed = started.elapsed();
                    log::debug!(
                        "sort #{}: {} splats in {:.2} ms",
                        req.id,
                        order.len(),
                        elapsed.as_secs_f64() * 1e3
                    );
                    let result = SortResult {
                        id: req.id,
                        view: req.view,
                        order,
                        elapsed,
                    };
                    if res_tx.send(result).is_err() {
                        break;
                    }
                }
                log::debug!("depth-sort thread exiting");
            })?;

        Ok(Self {
            tx: Some(req_tx),
            rx: res_rx,
            handle: Some(handle),
            in_flight: None,
            next_id: 0,
            splat_count,
            sort_threads,
        })
    }

    #[inline]
    pub fn splat_count(&self) -> usize {
        self.splat_count
    }

    /// Size of the worker's own rayon pool.
    #[inline]
    pub fn sort_threads(&self) -> usize {
        self.sort_threads
    }

    #[inline]
    pub fn in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Queues a sort for `view`. `recycled` is an old order whose allocation
    /// the worker may reuse.
    pub fn request(&mut self, view: Mat4, recycled: Option<Vec<u32>>) -> Dispatch {
        if self.in_flight.is_some() {
            return Dispatch::Busy;
        }
        let Some(tx) = self.tx.as_ref() else {
            return Dispatch::Closed;
        };

        let id = self.next_id;
        match tx.try_send(SortRequest { id, view, recycled }) {
            Ok(()) => {
                self.next_id += 1;
                self.in_flight = Some(id);
                Dispatch::Sent(id)
            }
            Err(TrySendError::Full(_)) => {
                log::debug!("dropped sort request (worker busy)");
                Dispatch::Busy
            }
            Err(TrySendError::Disconnected(_)) => Dispatch::Closed,
        }
    }

    /// Non-blocking: the finished result, if any.
    pub fn poll(&mut self) -> Option<SortResult> {
        match self.rx.try_recv() {
            Ok(result) => {
                self.in_flight = None;
                Some(result)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.in_flight = None;
                None
            }
        }
    }

    /// Blocks until the in-flight sort finishes. `None` if nothing is in
    /// flight or the worker died.
    pub fn wait(&mut self) -> Option<SortResult> {
        self.in_flight?;
        let result = self.rx.recv().ok();
        self.in_flight = None;
        result
    }
}

impl Drop for SortWorker {
    fn drop(&mut self) {
        // Closing the request channel ends the thread's loop.
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("depth-sort thread panicked");
            }
        }
    }
}
