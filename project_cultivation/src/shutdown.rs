use tokio::sync::watch;

/// Held by main; flips every receiver to shut down.
#[derive(Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

/// Cloned into the HTTP server, the net bridge and the cleanup worker.
#[derive(Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

pub fn shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}

impl ShutdownTx {
    pub fn trigger(&self) {
        let _ = self.0.send(true);
    }
}

impl ShutdownRx {
    pub async fn wait(&mut self) {
        while !*self.0.borrow() {
            if self.0.changed().await.is_err() {
                return; // sender dropped
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Polled between ticks by the blocking job threads.
    pub fn stop_flag(&self) -> impl Fn() -> bool + Send + 'static {
        let rx = self.0.clone();
        move || *rx.borrow()
    }

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
