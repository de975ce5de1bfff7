//! Cooperative stop flag shared between the signal handler and the scanner.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Cloneable stop flag; scans check it between page fetches
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    /// Ask every holder of this signal to stop
    pub fn raise(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_raised(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the signal has been raised
    pub async fn raised(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as `self`, so this only returns once raised
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

/// Raise `stop` on Ctrl-C or SIGTERM
pub fn install_signal_handlers(stop: StopSignal) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Received shutdown signal, stopping after the current page");
        stop.raise();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
