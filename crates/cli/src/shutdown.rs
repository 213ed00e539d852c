use std::{
    fmt,
    sync::{Arc, OnceLock},
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownSignal::Interrupt => write!(f, "SIGINT"),
            ShutdownSignal::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Turns SIGINT or SIGTERM into a cancellation of the loader's token. The
/// loader then stops pulling, drains what it holds and releases its channel.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    cancel_token: CancellationToken,
    received: Arc<OnceLock<ShutdownSignal>>,
}

impl ShutdownCoordinator {
    pub fn new(cancel_token: CancellationToken) -> Self {
        Self {
            cancel_token,
            received: Arc::new(OnceLock::new()),
        }
    }

    pub fn register_handlers(&self) {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let signal = wait_for_signal().await;
            info!(%signal, "Shutdown requested, draining in-flight batches");
            coordinator.trigger(signal);
        });
    }

    pub fn trigger(&self, signal: ShutdownSignal) {
        let _ = self.received.set(signal);
        self.cancel_token.cancel();
    }

    /// The signal that stopped the run, if any.
    pub fn received(&self) -> Option<ShutdownSignal> {
        self.received.get().copied()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

async fn wait_for_signal() -> ShutdownSignal {
    let interrupt = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(%err, "Could not listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(%err, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => ShutdownSignal::Interrupt,
        _ = terminate => ShutdownSignal::Terminate,
    }
}

/// Process exit status.
#[derive(Debug, Clone, Copy)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_signal_wins_and_cancels() {
        let coordinator = ShutdownCoordinator::new(CancellationToken::new());
        assert_eq!(coordinator.received(), None);

        coordinator.trigger(ShutdownSignal::Terminate);
        coordinator.trigger(ShutdownSignal::Interrupt);

        assert_eq!(coordinator.received(), Some(ShutdownSignal::Terminate));
        assert!(coordinator.cancel_token().is_cancelled());
    }
}
