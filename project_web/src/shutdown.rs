use tokio::sync::watch;

/// Sender side — held by main, triggers shutdown.
#[derive(Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

/// Receiver side — handed to each subsystem.
#[derive(Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

pub fn shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}

impl ShutdownTx {
    /// Signal all receivers to shut down.
    pub fn trigger(&self) {
        let _ = self.0.send(true);
    }
}

impl ShutdownRx {
    /// Unwrap into the underlying watch::Receiver for passing to external crates.
    pub fn into_inner(self) -> watch::Receiver<bool> {
        self.0
    }
}

/// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C (all platforms).
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = sigint.recv() => { tracing::info!("Received SIGINT"); }
            _ = sigterm.recv() => { tracing::info!("Received SIGTERM"); }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
        tracing::info!("Received Ctrl+C");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_channel_default_not_shutdown() {
        let (_tx, rx) = shutdown_channel();
        assert!(!*rx.into_inner().borrow());
    }

    #[test]
    fn shutdown_channel_trigger_reaches_all_clones() {
        let (tx, rx) = shutdown_channel();
        let rx2 = rx.clone();
        tx.trigger();
        assert!(*rx.into_inner().borrow());
        assert!(*rx2.into_inner().borrow());
    }
}
