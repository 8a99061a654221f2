//! Shutdown signalling
//!
//! OS signals (Ctrl+C, Ctrl+Break, console close, SIGINT, SIGTERM) are
//! turned into a single shutdown flag carried by a `tokio::sync::watch`
//! channel. The control loop checks the flag between passes and wakes from
//! its inter-poll sleep as soon as it flips, so cleanup always runs.

use tokio::sync::watch;
use tracing::{info, warn};

/// Sending half: flips the shutdown flag.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    tx: watch::Sender<bool>,
}

/// Receiving half, held by the control loop.
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<bool>,
}

/// Creates a connected signal/listener pair.
pub fn channel() -> (ShutdownSignal, ShutdownListener) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSignal { tx }, ShutdownListener { rx })
}

impl ShutdownSignal {
    /// Requests shutdown. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.tx.subscribe(),
        }
    }
}

impl ShutdownListener {
    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested.
    ///
    /// Never resolves if every [`ShutdownSignal`] was dropped without
    /// triggering.
    pub async fn triggered(&mut self) {
        if self.rx.wait_for(|requested| *requested).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Spawns a task that triggers `signal` on the first OS shutdown signal.
pub fn install_signal_handlers(signal: ShutdownSignal) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_os_signal().await;
        signal.trigger();
    })
}

#[cfg(unix)]
async fn wait_for_os_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                }
            }
        }
        _ => {
            warn!("Failed to set up signal handlers, falling back to Ctrl+C only");
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(windows)]
async fn wait_for_os_signal() {
    use tokio::signal::windows::{ctrl_break, ctrl_c, ctrl_close};

    match (ctrl_c(), ctrl_break(), ctrl_close()) {
        (Ok(mut ctrl_c), Ok(mut ctrl_break), Ok(mut ctrl_close)) => {
            tokio::select! {
                _ = ctrl_c.recv() => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                }
                _ = ctrl_break.recv() => {
                    info!("Received Ctrl+Break, initiating graceful shutdown");
                }
                _ = ctrl_close.recv() => {
                    info!("Console closing, initiating graceful shutdown");
                }
            }
        }
        _ => {
            warn!("Failed to set up console handlers, falling back to Ctrl+C only");
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(any(unix, windows)))]
async fn wait_for_os_signal() {
    warn!("Signal handling not supported on this platform");
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_trigger_sets_flag() {
        let (signal, listener) = channel();
        assert!(!listener.is_triggered());

        signal.trigger();
        signal.trigger();
        assert!(listener.is_triggered());
        assert!(signal.listener().is_triggered());
    }

    #[tokio::test]
    async fn test_triggered_resolves() {
        let (signal, mut listener) = channel();
        signal.trigger();

        tokio::time::timeout(Duration::from_secs(1), listener.triggered())
            .await
            .expect("listener should resolve after trigger");
    }

    #[tokio::test]
    async fn test_dropped_signal_never_resolves() {
        let (signal, mut listener) = channel();
        drop(signal);

        let result = tokio::time::timeout(Duration::from_millis(50), listener.triggered()).await;
        assert!(result.is_err());
    }
}
