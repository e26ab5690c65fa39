//! Graceful shutdown handling
//!
//! A run checks the coordinator between stages and races it against in-flight work, so
//! an interrupt leaves the last checkpoint consistent.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct Flag {
    raised: AtomicBool,
    notify: Notify,
}

/// Cloneable stop switch shared by the orchestrator, the scheduler and the signal task
#[derive(Clone, Default)]
pub struct ShutdownCoordinator {
    flag: Arc<Flag>,
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("requested", &self.is_shutdown_requested())
            .finish()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop; later calls are no-ops
    pub fn request_shutdown(&self) {
        if !self.flag.raised.swap(true, Ordering::SeqCst) {
            info!("Stop requested; in-flight chapters will be abandoned");
            self.flag.notify.notify_waiters();
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.raised.load(Ordering::SeqCst)
    }

    /// Resolve once a stop has been requested, immediately if it already was
    pub async fn cancelled(&self) {
        let notified = self.flag.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_shutdown_requested() {
            return;
        }
        notified.await;
    }

    /// Spawn a task that turns the first interrupt or terminate signal into a stop request
    pub fn install_signal_handlers(&self) -> tokio::task::JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            match wait_for_signal().await {
                Ok(name) => {
                    warn!(signal = name, "Interrupted; the run can be resumed from its last checkpoint");
                    coordinator.request_shutdown();
                }
                Err(e) => warn!(error = %e, "Signal handling unavailable"),
            }
        })
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
    })
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
