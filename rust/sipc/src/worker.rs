//! Background transmit work.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::ipc::{SamsungIpc, TX_RETRY_DELAY, TxPass};

/// Drains the multiplexer's transmit queues whenever it is kicked.
///
/// Each pass runs on tokio's blocking pool, since links may block while
/// they wait for transport ownership. A pass that ends in
/// [`TxPass::Retry`] is repeated after [`TX_RETRY_DELAY`].
pub struct TxWorker {
    handle: JoinHandle<()>,
    kick: Arc<Notify>,
    shutdown: Arc<AtomicBool>,
}

impl TxWorker {
    /// Spawn on the current tokio runtime.
    pub fn spawn(ipc: Arc<SamsungIpc>) -> Self {
        Self::spawn_on(ipc, &tokio::runtime::Handle::current())
    }

    pub fn spawn_on(ipc: Arc<SamsungIpc>, runtime: &tokio::runtime::Handle) -> Self {
        let kick = ipc.tx_kick();
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = runtime.spawn(run(ipc, kick.clone(), shutdown.clone()));
        Self {
            handle,
            kick,
            shutdown,
        }
    }

    /// Ask for a pass even though nothing new was queued.
    pub fn kick(&self) {
        self.kick.notify_one();
    }

    /// Stop after the current pass and wait for the task to finish.
    pub async fn shutdown(self) {
        self.shutdown.store(true, Ordering::Release);
        self.kick.notify_one();
        if let Err(err) = self.handle.await {
            error!(%err, "tx worker ended abnormally");
        }
    }
}

async fn run(ipc: Arc<SamsungIpc>, kick: Arc<Notify>, shutdown: Arc<AtomicBool>) {
    debug!("tx worker started");
    loop {
        kick.notified().await;
        if shutdown.load(Ordering::Acquire) {
            break;
        }
        loop {
            let pass_ipc = ipc.clone();
            let outcome = match tokio::task::spawn_blocking(move || pass_ipc.tx_pass()).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(%err, "tx pass panicked");
                    break;
                }
            };
            trace!(?outcome, "tx pass finished");
            if outcome != TxPass::Retry || shutdown.load(Ordering::Acquire) {
                break;
            }
            tokio::time::sleep(TX_RETRY_DELAY).await;
        }
    }
    debug!("tx worker stopped");
}
