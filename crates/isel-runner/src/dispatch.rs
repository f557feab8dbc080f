use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// Runs `run` over `items` on at most `workers` threads and returns once
/// every item has finished.
///
/// Items are taken from the front of a shared queue, so jobs start in input
/// order; they may finish in any order. An item that returns an error or
/// panics is counted as failed and its worker moves on to the next item.
pub fn dispatch<T, F>(items: Vec<T>, workers: usize, run: F) -> Result<DispatchReport>
where
    T: Send,
    F: Fn(T) -> Result<()> + Sync,
{
    let workers = workers.max(1).min(items.len());
    let queue = Mutex::new(VecDeque::from(items));
    let succeeded = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);

    thread::scope(|scope| -> Result<()> {
        for id in 0..workers {
            let (queue, run, succeeded, failed) = (&queue, &run, &succeeded, &failed);
            thread::Builder::new()
                .name(format!("campaign-worker-{}", id))
                .spawn_scoped(scope, move || loop {
                    let next = queue
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .pop_front();
                    let Some(item) = next else {
                        debug!(worker = id, "queue drained");
                        break;
                    };
                    match panic::catch_unwind(AssertUnwindSafe(|| run(item))) {
                        Ok(Ok(())) => {
                            succeeded.fetch_add(1, Ordering::SeqCst);
                        }
                        Ok(Err(err)) => {
                            warn!(worker = id, "job failed: {:#}", err);
                            failed.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(_) => {
                            warn!(worker = id, "job panicked");
                            failed.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
                .context("failed to spawn campaign worker")?;
        }
        Ok(())
    })?;

    Ok(DispatchReport {
        succeeded: succeeded.into_inner(),
        failed: failed.into_inner(),
    })
}
