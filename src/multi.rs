//! Several requests against one collection: submit and wait on a few workers, download
//! on a bounded set of others.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, mpsc};
use std::thread;
use tracing::{debug, info, warn};

use crate::client::ApiClient;
use crate::error::{Error, Result};
use crate::remote::Remote;
use crate::results::Results;

/// Worker counts for [`ApiClient::retrieve_many`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Concurrency {
    /// Jobs submitted and polled at the same time.
    pub max_updates: usize,
    /// Downloads running at the same time; also bounds finished jobs waiting for one.
    pub max_downloads: usize,
}

impl Default for Concurrency {
    fn default() -> Self {
        Self {
            max_updates: 10,
            max_downloads: 2,
        }
    }
}

/// Finished job handed from a polling worker to a download worker.
struct Finished {
    index: usize,
    remote: Remote,
    results: Results,
}

pub(crate) fn retrieve_many<R: Serialize + Sync>(
    client: &ApiClient,
    collection_id: &str,
    requests: &[R],
    target_dir: Option<&Path>,
    concurrency: Concurrency,
) -> Vec<Result<PathBuf>> {
    if let Some(dir) = target_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            let context = format!("failed to create directory {}", dir.display());
            return requests
                .iter()
                .map(|_| Err(Error::io(context.clone(), std::io::Error::new(e.kind(), e.to_string()))))
                .collect();
        }
    }
    let target = target_dir.filter(|d| !d.as_os_str().is_empty());

    let outcomes: Mutex<Vec<Option<Result<PathBuf>>>> =
        Mutex::new(requests.iter().map(|_| None).collect());
    let record = |index: usize, outcome: Result<PathBuf>| {
        if let Err(e) = &outcome {
            warn!("request {} failed: {}", index, e);
        }
        outcomes.lock().unwrap_or_else(PoisonError::into_inner)[index] = Some(outcome);
    };

    let next = AtomicUsize::new(0);
    let (tx, rx) = mpsc::sync_channel::<Finished>(concurrency.max_downloads.max(1));
    let rx = Mutex::new(rx);

    thread::scope(|s| {
        let updaters = concurrency.max_updates.max(1).min(requests.len());
        for _ in 0..updaters {
            let tx = tx.clone();
            let (next, record) = (&next, &record);
            s.spawn(move || {
                loop {
                    let index = next.fetch_add(1, Ordering::SeqCst);
                    let Some(request) = requests.get(index) else {
                        break;
                    };
                    let finished = client.submit(collection_id, request).and_then(|remote| {
                        debug!("{} - waiting on results", remote.request_uid());
                        let results = remote.wait_on_results()?;
                        Ok(Finished {
                            index,
                            remote,
                            results,
                        })
                    });
                    match finished {
                        Ok(finished) => {
                            if tx.send(finished).is_err() {
                                break;
                            }
                        }
                        Err(e) => record(index, Err(e)),
                    }
                }
            });
        }
        drop(tx);

        for _ in 0..concurrency.max_downloads.max(1) {
            let (rx, record) = (&rx, &record);
            s.spawn(move || {
                loop {
                    let received = rx.lock().unwrap_or_else(PoisonError::into_inner).recv();
                    let Ok(Finished {
                        index,
                        remote,
                        results,
                    }) = received
                    else {
                        break;
                    };
                    debug!("{} - downloading", remote.request_uid());
                    let outcome = results.download(target);
                    // Cleanup on drop must wait for the file.
                    drop(remote);
                    record(index, outcome);
                }
            });
        }
    });

    let outcomes: Vec<Result<PathBuf>> = outcomes
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
        .into_iter()
        .map(|o| o.unwrap_or_else(|| Err(Error::ProcessingFailed("request was not processed".into()))))
        .collect();
    info!(
        "{} of {} request(s) downloaded",
        outcomes.iter().filter(|o| o.is_ok()).count(),
        outcomes.len()
    );
    outcomes
}
