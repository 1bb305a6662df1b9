use crate::client::{Client, SessionError};
use crate::config::SessionConfig;
use influcore::types::events::{Event, Reconnecting};
use log::{debug, info, warn};
use rand::Rng;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// Delay before reconnect attempt `attempt` (1-based). `jitter_sample` is a
/// uniform sample in `[0, 1)` that spreads the delay by the configured ratio.
pub(crate) fn backoff_delay(config: &SessionConfig, attempt: u32, jitter_sample: f64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let base = config
        .reconnect_initial_delay
        .saturating_mul(1u32 << exponent)
        .min(config.reconnect_max_delay);
    let jitter = config.reconnect_jitter.clamp(0.0, 1.0);
    let factor = 1.0 + jitter * (2.0 * jitter_sample.clamp(0.0, 1.0) - 1.0);
    base.mul_f64(factor).min(config.reconnect_max_delay)
}

impl Client {
    /// Starts the background reconnect task unless one is already running.
    pub(crate) fn spawn_reconnect(self: &Arc<Self>) {
        if self.is_reconnecting.swap(true, Ordering::SeqCst) {
            debug!(target: "Client/Reconnect", "Reconnect task already running");
            return;
        }

        let client = self.clone();
        tokio::spawn(async move {
            let _running = scopeguard::guard(client.clone(), |client| {
                client.is_reconnecting.store(false, Ordering::SeqCst);
            });
            client.reconnect_loop().await;
        });
    }

    async fn reconnect_loop(self: Arc<Self>) {
        let mut attempt = 0u32;

        loop {
            if !self.enable_auto_reconnect.load(Ordering::Relaxed) {
                debug!(target: "Client/Reconnect", "Auto-reconnect disabled, exiting reconnect loop.");
                return;
            }

            attempt += 1;
            let errors = self.auto_reconnect_errors.fetch_add(1, Ordering::Relaxed) + 1;
            let delay = backoff_delay(&self.config, errors, rand::rng().random::<f64>());
            info!(target: "Client/Reconnect", "Will attempt to reconnect in {delay:?} (attempt {attempt})");
            self.context
                .event_bus()
                .dispatch(&Event::Reconnecting(Reconnecting { attempt, delay }));

            tokio::select! {
                _ = tokio::time::sleep(delay) => {},
                _ = self.shutdown_notifier.notified() => {
                    debug!(target: "Client/Reconnect", "Shutdown signaled, exiting reconnect loop.");
                    return;
                }
            }
            if !self.enable_auto_reconnect.load(Ordering::Relaxed) {
                debug!(target: "Client/Reconnect", "Auto-reconnect disabled while waiting.");
                return;
            }

            match self.reconnect_once().await {
                Ok(()) => {
                    info!(target: "Client/Reconnect", "Reconnected after {attempt} attempt(s)");
                    self.context.event_bus().dispatch(&Event::Reconnected);
                    return;
                }
                Err(e @ (SessionError::EmptyCredentials | SessionError::InvalidCredentials)) => {
                    warn!(target: "Client/Reconnect", "Giving up on reconnect: {e}");
                    self.enable_auto_reconnect.store(false, Ordering::Relaxed);
                    return;
                }
                Err(SessionError::Cancelled) => {
                    debug!(target: "Client/Reconnect", "Reconnect cancelled");
                    return;
                }
                Err(e) => {
                    warn!(target: "Client/Reconnect", "Reconnect attempt {attempt} failed: {e}");
                }
            }
        }
    }

    /// Replaces the dead stream of the current link with a fresh one.
    async fn reconnect_once(self: &Arc<Self>) -> Result<(), SessionError> {
        let credentials = self.context.credentials().current();
        if credentials.is_empty() {
            return Err(SessionError::EmptyCredentials);
        }
        if credentials.is_blank() {
            return Err(SessionError::InvalidCredentials);
        }

        let generation = {
            let mut guard = self.link.lock().await;
            let Some(link) = guard.as_mut() else {
                return Err(SessionError::Cancelled);
            };
            let generation = self.next_generation();
            link.generation = generation;
            link.established = false;
            generation
        };
        self.clear_bindings();

        let connection = self.establish(&credentials, generation).await?;
        if !self.mark_established(generation).await {
            connection.disconnect().await;
            return Err(SessionError::Cancelled);
        }
        self.on_session_established(&credentials, &connection, generation)
            .await;
        Ok(())
    }
}
