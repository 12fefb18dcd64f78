//! The mining worker: a long-lived task that waits for start signals, runs
//! mining operations, and coordinates with peer-block commits through a
//! cancel rendezvous. All three signals coalesce: repeated sends while one
//! is pending change nothing.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::state::{sync, State, StateError};

/// Handle to the worker tasks, registered on the state at startup.
pub struct Worker {
    start_mining: mpsc::Sender<()>,
    cancel_mining: mpsc::Sender<oneshot::Receiver<()>>,
    shut: CancellationToken,
    handles: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

/// Rendezvous held by a peer-block commit. The mining task will not leave its
/// current operation until this guard is dropped, which guarantees the commit
/// critical section has finished before any new mining attempt starts.
pub struct CancelGuard {
    done: Option<oneshot::Sender<()>>,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if let Some(done) = self.done.take() {
            // The worker may have already dropped its side; nothing to do then.
            let _ = done.send(());
        }
    }
}

/// Construct the worker, register it on the state, run the initial peer sync
/// and start the long-lived tasks. Sync completes before the loops start so
/// the node comes up with the freshest view its peers can give it.
pub(crate) async fn run(state: &Arc<State>, sync_interval: Option<Duration>) {
    let (start_tx, start_rx) = mpsc::channel(1);
    let (cancel_tx, cancel_rx) = mpsc::channel(1);
    let shut = CancellationToken::new();

    state.register_worker(Worker {
        start_mining: start_tx,
        cancel_mining: cancel_tx,
        shut: shut.clone(),
        handles: std::sync::Mutex::new(Vec::new()),
    });

    sync::run_once(state).await;

    let mut handles = vec![tokio::spawn(mining_operations(
        state.clone(),
        start_rx,
        cancel_rx,
        shut.clone(),
    ))];
    if let Some(every) = sync_interval {
        handles.push(tokio::spawn(sync::peer_operations(state.clone(), every, shut)));
    }

    state.worker().store_handles(handles);
}

impl Worker {
    /// Non-blocking offer: a signal already pending guarantees a run.
    pub fn signal_start_mining(&self) {
        let _ = self.start_mining.try_send(());
        debug!("worker: start mining signaled");
    }

    /// Ask the mining task to stop immediately. It will not start another
    /// operation until the returned guard is dropped, which lets the caller
    /// finish its state changes first.
    pub fn signal_cancel_mining(&self) -> CancelGuard {
        let (done, wait) = oneshot::channel();
        let _ = self.cancel_mining.try_send(wait);
        debug!("worker: cancel mining signaled");

        CancelGuard { done: Some(done) }
    }

    /// Stop the worker tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        info!("worker: shutdown started");

        drop(self.signal_cancel_mining());
        self.shut.cancel();

        let handles: Vec<JoinHandle<()>> = self.handles.lock().unwrap().drain(..).collect();
        for handle in handles {
            if let Err(err) = handle.await {
                error!("worker: shutdown join: {err}");
            }
        }

        info!("worker: shutdown completed");
    }

    fn store_handles(&self, handles: Vec<JoinHandle<()>>) {
        self.handles.lock().unwrap().extend(handles);
    }
}

/// The worker main loop: run one mining operation per start signal until shut.
async fn mining_operations(
    state: Arc<State>,
    mut start_rx: mpsc::Receiver<()>,
    mut cancel_rx: mpsc::Receiver<oneshot::Receiver<()>>,
    shut: CancellationToken,
) {
    info!("worker: mining operations started");

    loop {
        tokio::select! {
            _ = shut.cancelled() => {
                info!("worker: mining operations received shut signal");
                return;
            }
            signal = start_rx.recv() => {
                if signal.is_none() {
                    return;
                }
                if !shut.is_cancelled() {
                    run_mining_operation(&state, &mut cancel_rx).await;
                }
            }
        }
    }
}

/// One full mining attempt: threshold fast-check, cancellation plumbing, the
/// PoW search, and the post-run re-signal when work remains queued.
async fn run_mining_operation(
    state: &Arc<State>,
    cancel_rx: &mut mpsc::Receiver<oneshot::Receiver<()>>,
) {
    let trans_per_block = state.genesis().trans_per_block;

    let length = state.query_mempool_length();
    if length < trans_per_block {
        debug!("worker: mining: not enough transactions: {length}");
        return;
    }

    // Drop any stale rendezvous left over from a commit that already finished.
    while let Ok(stale) = cancel_rx.try_recv() {
        drop(stale);
    }

    let token = CancellationToken::new();
    let mut wait: Option<oneshot::Receiver<()>> = None;

    // The canceller side: turns an incoming cancel signal into token
    // cancellation and captures the rendezvous the committer is holding. The
    // miner cancels the token on return so this side always unblocks.
    let canceller = async {
        tokio::select! {
            received = cancel_rx.recv() => {
                info!("worker: mining: cancel requested");
                wait = received;
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    };

    let miner_token = token.clone();
    let miner = async {
        let result = state.mine_new_block(&miner_token).await;
        miner_token.cancel();
        result
    };

    let (result, ()) = tokio::join!(miner, canceller);

    match result {
        Ok((block, duration)) => {
            info!(
                "worker: mining: mined block {} in {duration:?}",
                block.header.number
            );
        }
        Err(StateError::NotEnoughTransactions) => {
            warn!("worker: mining: not enough transactions in mempool");
        }
        Err(StateError::Cancelled) => info!("worker: mining: cancelled by request"),
        Err(err) => error!("worker: mining: {err}"),
    }

    // The handshake: hold here until the commit that cancelled us completes.
    if let Some(wait) = wait.take() {
        debug!("worker: mining: waiting for the commit to finish");
        let _ = wait.await;
        debug!("worker: mining: commit finished");
    }

    // More transactions may have queued while we were busy.
    if state.query_mempool_length() >= trans_per_block {
        state.worker().signal_start_mining();
    }
}
