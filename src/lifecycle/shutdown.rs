//! Shutdown coordination for the balancer.

use tokio::sync::broadcast;

/// Fans the process-wide stop signal out to every long-lived task.
///
/// The health scorer, the breaker sweeper, and the HTTP front-end each
/// subscribe a receiver; one `trigger` from the signal listener tells all
/// of them to wind down. Background loops must exit within one tick of the
/// signal, and the front-end starts its bounded drain.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        // Capacity 1 is enough: the signal carries no payload and is only
        // ever sent once.
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// A receiver that resolves once the stop signal fires.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Fire the stop signal. Send errors mean no task is listening, which
    /// is fine during early startup or teardown.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Block until SIGINT or SIGTERM arrives, then fire the stop signal.
    pub async fn listen_for_signals(&self) {
        let ctrl_c = async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::error!(%error, "Failed to install Ctrl+C handler");
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(error) => tracing::error!(%error, "Failed to install SIGTERM handler"),
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate => {}
        }

        tracing::info!("Shutdown signal received");
        self.trigger();
    }
}
