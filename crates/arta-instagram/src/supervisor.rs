use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::{mpsc, watch};

use crate::events::{Credentials, LinkEvent};
use crate::resilience::{ConnectionMonitor, LinkStatus, ReconnectDirective, ReconnectPolicy};
use crate::session_store::SessionStore;
use crate::transport::{PlatformTransport, TransportError};

/// Owns the realtime session: authenticates (persisted session first, fresh
/// login otherwise), pumps inbound events toward the dispatcher, and retries
/// with exponential backoff after a disconnect until the attempt ceiling.
///
/// A first-boot login failure and ceiling exhaustion both surface as errors;
/// the process is expected to abort on either, by design.
pub struct ConnectionSupervisor<T> {
    transport: Arc<T>,
    credentials: Credentials,
    session_store: SessionStore,
    monitor: ConnectionMonitor,
    status_tx: watch::Sender<LinkStatus>,
    shutdown_rx: watch::Receiver<bool>,
}

impl<T: PlatformTransport> ConnectionSupervisor<T> {
    pub fn new(
        transport: Arc<T>,
        credentials: Credentials,
        session_store: SessionStore,
        policy: ReconnectPolicy,
        shutdown_rx: watch::Receiver<bool>,
    ) -> (Self, watch::Receiver<LinkStatus>) {
        let (status_tx, status_rx) = watch::channel(LinkStatus::Disconnected);
        (
            Self {
                transport,
                credentials,
                session_store,
                monitor: ConnectionMonitor::new(policy),
                status_tx,
                shutdown_rx,
            },
            status_rx,
        )
    }

    pub fn status(&self) -> LinkStatus {
        self.monitor.status()
    }

    pub fn attempt_count(&self) -> u32 {
        self.monitor.attempt_count()
    }

    fn publish_status(&self) {
        let _ = self.status_tx.send(self.monitor.status());
    }

    /// Runs until graceful shutdown (`Ok`), first-boot auth failure, or
    /// backoff-ceiling exhaustion (both `Err`). Inbound direct messages and
    /// comments are forwarded on `events_tx`; subscription errors and
    /// disconnects are consumed here and drive reconnection.
    pub async fn run(&mut self, events_tx: mpsc::Sender<LinkEvent>) -> Result<()> {
        self.monitor.begin_authentication();
        self.publish_status();
        if let Err(error) = self.authenticate().await {
            self.monitor.mark_failed();
            self.publish_status();
            return Err(error).context("initial platform authentication failed");
        }
        self.monitor.mark_connected();
        self.publish_status();

        loop {
            let session_end = self.pump_events(&events_tx).await?;
            match session_end {
                SessionEnd::Shutdown => {
                    if let Err(error) = self.transport.disconnect().await {
                        tracing::warn!(error = %error, "graceful disconnect failed");
                    }
                    self.monitor.mark_disconnected();
                    self.publish_status();
                    tracing::info!("realtime session closed after shutdown request");
                    return Ok(());
                }
                SessionEnd::ConnectionLost { detail } => {
                    tracing::warn!(detail, "realtime connection lost");
                    if !self.reconnect_until_connected().await? {
                        // Shutdown was requested while waiting out a backoff.
                        self.monitor.mark_disconnected();
                        self.publish_status();
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Re-authenticates with backoff until connected. Returns `Ok(false)` if
    /// shutdown arrived mid-backoff, `Err` once the ceiling is exhausted.
    async fn reconnect_until_connected(&mut self) -> Result<bool> {
        loop {
            match self.monitor.begin_reconnect() {
                ReconnectDirective::GiveUp => {
                    self.publish_status();
                    bail!(
                        "reconnect ceiling of {} attempts exhausted",
                        self.monitor.policy().max_attempts
                    );
                }
                ReconnectDirective::RetryAfter(delay) => {
                    self.publish_status();
                    tracing::info!(
                        attempt = self.monitor.attempt_count(),
                        max_attempts = self.monitor.policy().max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "scheduling reconnection attempt"
                    );
                    let mut shutdown_rx = self.shutdown_rx.clone();
                    tokio::select! {
                        _ = shutdown_rx.wait_for(|requested| *requested) => {
                            return Ok(false);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }

                    self.monitor.begin_authentication();
                    self.publish_status();
                    match self.authenticate().await {
                        Ok(()) => {
                            self.monitor.mark_connected();
                            self.publish_status();
                            tracing::info!("reconnected to platform");
                            return Ok(true);
                        }
                        Err(error) => {
                            tracing::warn!(error = %error, "reconnection attempt failed");
                        }
                    }
                }
            }
        }
    }

    /// Logs in, preferring a persisted session. A persisted session that
    /// fails its validation call is deleted before the fresh-login fallback;
    /// a failed fresh login also clears any session file on disk.
    async fn authenticate(&mut self) -> Result<()> {
        if let Some(session) = self.session_store.load()? {
            match self.transport.restore_session(&session).await {
                Ok(()) => {
                    tracing::info!("resumed persisted platform session");
                    return Ok(());
                }
                Err(TransportError::SessionInvalid) => {
                    tracing::warn!("persisted session is invalid, falling back to fresh login");
                    let _ = self.session_store.delete()?;
                }
                Err(error) => {
                    return Err(error).context("persisted session validation errored");
                }
            }
        }

        match self.transport.login(&self.credentials).await {
            Ok(session) => {
                self.session_store
                    .save(&session)
                    .context("failed to persist fresh session")?;
                Ok(())
            }
            Err(error) => {
                let _ = self.session_store.delete();
                Err(error).context("fresh platform login failed")
            }
        }
    }

    /// Forwards dispatcher-bound events until the subscription ends or
    /// shutdown is requested.
    async fn pump_events(&mut self, events_tx: &mpsc::Sender<LinkEvent>) -> Result<SessionEnd> {
        let mut subscription = match self.transport.subscribe().await {
            Ok(subscription) => subscription,
            Err(error) => {
                return Ok(SessionEnd::ConnectionLost {
                    detail: format!("subscription failed: {error}"),
                });
            }
        };

        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                _ = async { let _ = shutdown_rx.wait_for(|requested| *requested).await; } => {
                    return Ok(SessionEnd::Shutdown);
                }
                event = subscription.recv() => {
                    match event {
                        Some(LinkEvent::SubscriptionError { detail }) => {
                            return Ok(SessionEnd::ConnectionLost { detail });
                        }
                        Some(LinkEvent::Disconnected) => {
                            return Ok(SessionEnd::ConnectionLost {
                                detail: "realtime stream disconnected".to_string(),
                            });
                        }
                        Some(event) => {
                            if events_tx.send(event).await.is_err() {
                                bail!("dispatcher event channel closed");
                            }
                        }
                        None => {
                            return Ok(SessionEnd::ConnectionLost {
                                detail: "realtime stream ended".to_string(),
                            });
                        }
                    }
                }
            }
        }
    }
}

#[derive(Debug)]
enum SessionEnd {
    Shutdown,
    ConnectionLost { detail: String },
}
