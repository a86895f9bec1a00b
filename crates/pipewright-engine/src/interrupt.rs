use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Cooperative interrupt flag owned by the engine.
///
/// Setting the flag never aborts a running stage; the executor checks it
/// only between stages, after the checkpoint has been written.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    token: CancellationToken,
}

impl InterruptHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop at the next stage boundary.
    pub fn interrupt(&self) {
        self.token.cancel();
    }

    pub fn is_interrupted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once an interrupt has been requested.
    pub async fn interrupted(&self) {
        self.token.cancelled().await
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Listen for Ctrl-C (and SIGTERM on unix) and set the interrupt flag.
///
/// Further signals after the first are logged and ignored so the final
/// checkpoint is always written.
pub fn install_signal_handlers(handle: InterruptHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        #[cfg(unix)]
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!(error = %e, "Failed to install SIGTERM handler");
                    None
                }
            };

        loop {
            #[cfg(unix)]
            let signal = {
                let term = async {
                    match sigterm.as_mut() {
                        Some(s) => {
                            s.recv().await;
                        }
                        None => std::future::pending::<()>().await,
                    }
                };
                tokio::select! {
                    r = tokio::signal::ctrl_c() => r.map(|_| "SIGINT"),
                    _ = term => Ok("SIGTERM"),
                }
            };
            #[cfg(not(unix))]
            let signal = tokio::signal::ctrl_c().await.map(|_| "ctrl-c");

            let name = match signal {
                Ok(name) => name,
                Err(e) => {
                    warn!(error = %e, "Signal listener failed");
                    return;
                }
            };

            if handle.is_interrupted() {
                warn!(signal = name, "Already stopping, waiting for the current stage to finish");
            } else {
                info!(signal = name, "Interrupt received, stopping after the current stage");
                handle.interrupt();
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_interrupt_flag() {
        let handle = InterruptHandle::new();
        let clone = handle.clone();
        assert!(!handle.is_interrupted());

        clone.interrupt();
        assert!(handle.is_interrupted());
        // Resolves immediately once set.
        handle.interrupted().await;
    }
}
