//! Background merge worker
//!
//! A small pool of threads fed through a crossbeam channel. Each wake-up runs
//! merges until the policy finds nothing left to do. Merges are built off the
//! writer lock and poll a cancellation token; only the install step locks.

use std::sync::Arc;
use std::thread;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::SearchError;
use crate::query::CancellationToken;
use crate::segment::TieredMergePolicy;

use super::writer::IndexWriter;

#[derive(Clone, Copy, Debug)]
enum MergeTask {
    /// Look for merges and run them
    Merge,
}

/// Spawns merge threads
pub struct MergeWorker;

impl MergeWorker {
    /// Start `threads` workers merging segments of `writer`
    pub fn start(writer: IndexWriter, policy: TieredMergePolicy, threads: usize) -> MergeHandle {
        let threads = threads.max(1);
        // One queued wake-up per thread is enough: a pass drains the policy
        let (tx, rx) = channel::bounded(threads);
        let token = Arc::new(Mutex::new(CancellationToken::new()));
        let policy = Arc::new(policy);

        let joins = (0..threads)
            .map(|n| {
                let rx = rx.clone();
                let writer = writer.clone();
                let policy = Arc::clone(&policy);
                let token = Arc::clone(&token);
                thread::Builder::new()
                    .name(format!("eureka-merge-{}", n))
                    .spawn(move || merge_loop(rx, writer, policy, token))
            })
            .filter_map(|spawned| match spawned {
                Ok(join) => Some(join),
                Err(e) => {
                    warn!(error = %e, "Failed to spawn merge thread");
                    None
                }
            })
            .collect::<Vec<_>>();

        info!(threads = joins.len(), "Started merge worker");
        MergeHandle {
            tx: Some(tx),
            joins,
            token,
        }
    }
}

fn merge_loop(
    rx: Receiver<MergeTask>,
    writer: IndexWriter,
    policy: Arc<TieredMergePolicy>,
    token: Arc<Mutex<CancellationToken>>,
) {
    while let Ok(MergeTask::Merge) = rx.recv() {
        loop {
            let cancel = token.lock().clone();
            match writer.merge_with_cancel(&policy, &cancel) {
                Ok(Some(outcome)) => {
                    debug!(generation = outcome.generation, merged = outcome.merged.len(), "Background merge installed")
                }
                Ok(None) => break,
                Err(SearchError::Cancelled) => break,
                Err(e) => {
                    warn!(error = %e, "Background merge failed");
                    break;
                }
            }
        }
    }
}

/// Control handle for a running [`MergeWorker`]
///
/// Dropping the handle shuts the worker down.
pub struct MergeHandle {
    tx: Option<Sender<MergeTask>>,
    joins: Vec<thread::JoinHandle<()>>,
    token: Arc<Mutex<CancellationToken>>,
}

impl MergeHandle {
    /// Ask the workers to look for merges
    pub fn notify(&self) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(MergeTask::Merge) {
            // A pending wake-up covers this one
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => debug!("Merge worker already stopped"),
        }
    }

    /// Stop in-flight merges; later notifications start fresh ones
    pub fn cancel(&self) {
        let mut token = self.token.lock();
        token.cancel();
        *token = CancellationToken::new();
    }

    /// Cancel in-flight merges and join every worker thread
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.tx.take().is_none() {
            return;
        }
        self.token.lock().cancel();
        for join in self.joins.drain(..) {
            if join.join().is_err() {
                warn!("Merge thread panicked");
            }
        }
        debug!("Merge worker stopped");
    }
}

impl Drop for MergeHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
