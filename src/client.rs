use crate::archive::ArchiveHandle;
use crate::config::SessionConfig;
use crate::context::SessionContext;
use crate::roster::RosterSlot;
use crate::store::error::StoreError;
use crate::transport::{ConnectionEvent, TransportError, TransportFactory, XmppConnection};
use chrono::{DateTime, Utc};
use influcore::credentials::Credentials;
use influcore::types::events::{AuthenticationSucceeded, Connected, Disconnected, Event};
use influcore::types::presence::Presence;
use log::{debug, error, info, warn};
use rand::RngCore;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, Notify, mpsc, watch};
use tokio::time::timeout;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no credentials stored")]
    EmptyCredentials,
    #[error("stored credentials are blank")]
    InvalidCredentials,
    #[error("connect failed: {0}")]
    ConnectFailure(#[source] TransportError),
    #[error("connect aborted by disconnect")]
    Cancelled,
    #[error("client is not connected")]
    NotConnected,
    #[error("roster has not been loaded")]
    RosterUnavailable,
    #[error("roster not ready after {0:?}")]
    RosterTimeout(Duration),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    Connected,
    #[default]
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    LoggedIn,
    #[default]
    LoggedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStatus {
    pub connection: ConnectionState,
    pub session: SessionState,
}

impl LinkStatus {
    pub fn is_alive(&self) -> bool {
        self.connection == ConnectionState::Connected && self.session == SessionState::LoggedIn
    }
}

/// Where the client is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No connection object.
    Idle,
    Connecting,
    Unauthenticated,
    Authenticated,
    /// A connection object exists but the stream is down.
    Disconnected,
}

/// How inbound subscription requests are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriptionMode {
    #[default]
    AcceptAll,
    /// Requests are only reported on the event bus.
    Manual,
}

/// The connection object slot. `None` in [`Client::link`] means idle.
pub(crate) struct Link {
    pub(crate) generation: u64,
    pub(crate) connection: Option<Arc<dyn XmppConnection>>,
    pub(crate) established: bool,
}

pub struct Client {
    pub(crate) context: Arc<SessionContext>,
    pub(crate) config: SessionConfig,
    pub(crate) transport_factory: Arc<dyn TransportFactory>,

    pub(crate) link: Mutex<Option<Link>>,
    pub(crate) status: watch::Sender<LinkStatus>,
    pub(crate) roster: watch::Sender<RosterSlot>,
    /// Presence received while the roster is still loading.
    pub(crate) pending_presences: std::sync::Mutex<Vec<Presence>>,
    pub(crate) archive: RwLock<Option<ArchiveHandle>>,
    pub(crate) subscription_mode: RwLock<SubscriptionMode>,

    /// Incremented whenever the connection object is replaced or dropped.
    /// Events and background tasks tagged with an older value are stale.
    pub(crate) connection_generation: AtomicU64,
    pub(crate) shutdown_notifier: Notify,
    pub(crate) is_reconnecting: AtomicBool,

    pub enable_auto_reconnect: AtomicBool,
    pub auto_reconnect_errors: AtomicU32,
    pub last_successful_connect: RwLock<Option<DateTime<Utc>>>,

    pub(crate) unique_id: String,
    pub(crate) id_counter: AtomicU64,
}

impl Client {
    pub fn new(
        context: Arc<SessionContext>,
        transport_factory: Arc<dyn TransportFactory>,
        config: SessionConfig,
    ) -> Arc<Self> {
        let mut unique_id_bytes = [0u8; 4];
        rand::rng().fill_bytes(&mut unique_id_bytes);

        Arc::new(Self {
            context,
            config,
            transport_factory,
            link: Mutex::new(None),
            status: watch::channel(LinkStatus::default()).0,
            roster: watch::channel(RosterSlot::default()).0,
            pending_presences: std::sync::Mutex::new(Vec::new()),
            archive: RwLock::new(None),
            subscription_mode: RwLock::new(SubscriptionMode::default()),
            connection_generation: AtomicU64::new(0),
            shutdown_notifier: Notify::new(),
            is_reconnecting: AtomicBool::new(false),
            enable_auto_reconnect: AtomicBool::new(false),
            auto_reconnect_errors: AtomicU32::new(0),
            last_successful_connect: RwLock::new(None),
            unique_id: hex::encode_upper(unique_id_bytes),
            id_counter: AtomicU64::new(0),
        })
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Connects and authenticates with the stored credentials, returning once
    /// the session is live or the attempt failed.
    ///
    /// Does nothing if a connection object already exists; call
    /// [`disconnect`](Self::disconnect) first to start over.
    pub async fn connect(self: &Arc<Self>) -> Result<(), SessionError> {
        let credentials = self.context.credentials().current();
        if credentials.is_empty() {
            warn!(target: "Client", "Refusing to connect: no credentials stored");
            return Err(SessionError::EmptyCredentials);
        }
        if credentials.is_blank() {
            warn!(target: "Client", "Refusing to connect: credentials are blank");
            return Err(SessionError::InvalidCredentials);
        }

        let generation = {
            let mut link = self.link.lock().await;
            if link.is_some() {
                debug!(target: "Client", "connect() called with a live connection object, ignoring");
                return Ok(());
            }
            let generation = self.next_generation();
            *link = Some(Link {
                generation,
                connection: None,
                established: false,
            });
            generation
        };

        let connection = match self.establish(&credentials, generation).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!(target: "Client", "Failed to connect as {}: {e}", credentials.identity());
                self.abandon(generation).await;
                return Err(e);
            }
        };

        if !self.mark_established(generation).await {
            connection.disconnect().await;
            return Err(SessionError::Cancelled);
        }
        self.on_session_established(&credentials, &connection, generation)
            .await;
        Ok(())
    }

    /// Opens a transport connection, logs in and waits for the authenticated
    /// callback. The new connection is stored in the link slot tagged with
    /// `generation` as soon as it exists so `disconnect` can tear it down.
    pub(crate) async fn establish(
        self: &Arc<Self>,
        credentials: &Credentials,
        generation: u64,
    ) -> Result<Arc<dyn XmppConnection>, SessionError> {
        let cancelled = self.shutdown_notifier.notified();
        tokio::pin!(cancelled);

        let options = self.config.connect_options(credentials);
        info!(target: "Client", "Connecting to {} as {}...", options.host, credentials.identity());

        let (connection, events) = tokio::select! {
            result = self.transport_factory.connect(&options) => {
                result.map_err(SessionError::ConnectFailure)?
            }
            _ = &mut cancelled => return Err(SessionError::Cancelled),
        };

        let replaced = {
            let mut guard = self.link.lock().await;
            match guard.as_mut() {
                Some(link) if link.generation == generation => {
                    Some(link.connection.replace(connection.clone()))
                }
                _ => None,
            }
        };
        let Some(previous) = replaced else {
            connection.disconnect().await;
            return Err(SessionError::Cancelled);
        };
        if let Some(previous) = previous {
            previous.disconnect().await;
        }
        self.spawn_event_loop(events, generation);

        let authenticated = async {
            tokio::select! {
                result = connection.login(&credentials.username, &credentials.password) => {
                    result.map_err(SessionError::ConnectFailure)?
                }
                _ = &mut cancelled => return Err(SessionError::Cancelled),
            }

            let mut status = self.status.subscribe();
            let logged_in = timeout(
                self.config.auth_timeout,
                status.wait_for(|s| s.session == SessionState::LoggedIn),
            );
            tokio::select! {
                result = logged_in => match result {
                    Ok(Ok(_)) => Ok(()),
                    _ => Err(SessionError::ConnectFailure(TransportError::Timeout)),
                },
                _ = &mut cancelled => Err(SessionError::Cancelled),
            }
        }
        .await;

        match authenticated {
            Ok(()) => Ok(connection),
            Err(e) => {
                connection.disconnect().await;
                Err(e)
            }
        }
    }

    /// Post-login setup shared by `connect` and the reconnect task.
    pub(crate) async fn on_session_established(
        self: &Arc<Self>,
        credentials: &Credentials,
        connection: &Arc<dyn XmppConnection>,
        generation: u64,
    ) {
        self.set_subscription_mode(SubscriptionMode::AcceptAll);
        self.enable_auto_reconnect.store(true, Ordering::Relaxed);
        self.auto_reconnect_errors.store(0, Ordering::Relaxed);
        *self
            .last_successful_connect
            .write()
            .expect("RwLock should not be poisoned") = Some(Utc::now());

        self.bind_roster(connection.clone(), generation);
        self.bind_archive(connection).await;
        self.context.set_own_jid(credentials.jid());
        info!(target: "Client", "Session established for {}", credentials.identity());

        if self.context.is_foreground_torn_down() {
            debug!(target: "Client", "Main screen is gone, announcing unavailable presence");
            self.send_presence(Presence::unavailable()).await;
        }
    }

    /// Tears down the session: clears the persisted logged-in flag, stops
    /// automatic reconnection and drops the connection object. Safe to call
    /// on an idle client.
    pub async fn disconnect(&self) {
        self.context.set_logged_in(false).await;
        self.enable_auto_reconnect.store(false, Ordering::Relaxed);
        self.shutdown_notifier.notify_waiters();

        let link = {
            let mut guard = self.link.lock().await;
            let link = guard.take();
            if link.is_some() {
                self.next_generation();
            }
            link
        };

        let Some(link) = link else {
            debug!(target: "Client", "disconnect() on an idle client");
            self.status.send_replace(LinkStatus::default());
            return;
        };

        info!(target: "Client", "Disconnecting client intentionally.");
        if let Some(connection) = link.connection {
            connection.disconnect().await;
        }
        self.clear_bindings();
        self.status.send_replace(LinkStatus::default());
        self.context
            .event_bus()
            .dispatch(&Event::Disconnected(Disconnected { error: None }));
    }

    /// Drops a link that never became established.
    async fn abandon(&self, generation: u64) {
        let link = {
            let mut guard = self.link.lock().await;
            if guard
                .as_ref()
                .is_some_and(|link| link.generation == generation)
            {
                self.next_generation();
                guard.take()
            } else {
                None
            }
        };
        if let Some(connection) = link.and_then(|l| l.connection) {
            connection.disconnect().await;
        }
        self.status.send_replace(LinkStatus::default());
    }

    pub(crate) async fn mark_established(&self, generation: u64) -> bool {
        match self.link.lock().await.as_mut() {
            Some(link) if link.generation == generation => {
                link.established = true;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn clear_bindings(&self) {
        self.reset_roster();
        *self.archive.write().expect("RwLock should not be poisoned") = None;
    }

    /// Must be called with the link lock held.
    pub(crate) fn next_generation(&self) -> u64 {
        self.connection_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.connection_generation.load(Ordering::SeqCst) == generation
    }

    pub(crate) async fn current_connection(&self) -> Option<Arc<dyn XmppConnection>> {
        self.link
            .lock()
            .await
            .as_ref()
            .and_then(|link| link.connection.clone())
    }

    fn spawn_event_loop(
        self: &Arc<Self>,
        mut events: mpsc::Receiver<ConnectionEvent>,
        generation: u64,
    ) {
        let client = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if !client.is_current(generation) {
                    debug!(target: "Client", "Dropping event from superseded connection {generation}");
                    break;
                }
                client.handle_connection_event(event).await;
            }
            debug!(target: "Client", "Event loop for connection {generation} finished");
        });
    }

    async fn handle_connection_event(self: &Arc<Self>, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected => self.on_connected().await,
            ConnectionEvent::Authenticated { resumed } => self.on_authenticated(resumed).await,
            ConnectionEvent::ConnectionClosed => self.on_connection_closed().await,
            ConnectionEvent::ConnectionClosedOnError(reason) => {
                self.on_connection_closed_on_error(reason).await
            }
            ConnectionEvent::Message(message) => {
                self.context.event_bus().dispatch(&Event::Message(message))
            }
            ConnectionEvent::Presence(presence) => self.handle_incoming_presence(presence).await,
        }
    }

    pub(crate) async fn on_connected(&self) {
        self.status
            .send_modify(|s| s.connection = ConnectionState::Connected);
        debug!(target: "Client", "Transport connected");
        self.context
            .event_bus()
            .dispatch(&Event::Connected(Connected));
    }

    pub(crate) async fn on_authenticated(&self, resumed: bool) {
        self.context.set_logged_in(true).await;
        self.status.send_modify(|s| s.session = SessionState::LoggedIn);
        info!(target: "Client", "Authenticated (resumed: {resumed})");
        self.context
            .event_bus()
            .dispatch(&Event::AuthenticationSucceeded(AuthenticationSucceeded {
                jid: self.context.credentials().current().jid(),
                resumed,
            }));
    }

    pub(crate) async fn on_connection_closed(&self) {
        self.mark_closed().await;
        info!(target: "Client", "Connection closed");
        self.context
            .event_bus()
            .dispatch(&Event::Disconnected(Disconnected { error: None }));
    }

    pub(crate) async fn on_connection_closed_on_error(self: &Arc<Self>, reason: String) {
        self.mark_closed().await;
        error!(target: "Client", "Connection closed, exception occurred: {reason}");
        self.context
            .event_bus()
            .dispatch(&Event::Disconnected(Disconnected {
                error: Some(reason),
            }));
        if self.enable_auto_reconnect.load(Ordering::Relaxed) {
            self.spawn_reconnect();
        }
    }

    async fn mark_closed(&self) {
        self.context.set_logged_in(false).await;
        self.status.send_replace(LinkStatus::default());
    }

    /// True iff the stream is connected and authenticated.
    pub fn is_alive(&self) -> bool {
        self.status.borrow().is_alive()
    }

    pub fn status(&self) -> LinkStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<LinkStatus> {
        self.status.subscribe()
    }

    pub async fn phase(&self) -> SessionPhase {
        let status = self.status();
        match self.link.lock().await.as_ref() {
            None => SessionPhase::Idle,
            Some(_) if status.is_alive() => SessionPhase::Authenticated,
            Some(_) if status.connection == ConnectionState::Connected => {
                SessionPhase::Unauthenticated
            }
            Some(link) if !link.established => SessionPhase::Connecting,
            Some(_) => SessionPhase::Disconnected,
        }
    }

    pub fn subscription_mode(&self) -> SubscriptionMode {
        *self
            .subscription_mode
            .read()
            .expect("RwLock should not be poisoned")
    }

    pub fn set_subscription_mode(&self, mode: SubscriptionMode) {
        *self
            .subscription_mode
            .write()
            .expect("RwLock should not be poisoned") = mode;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_client, create_test_client_with};
    use influcore::credentials::Credentials;

    #[tokio::test]
    async fn test_callbacks_drive_liveness() {
        let (client, _server) = create_test_client().await;
        assert!(!client.is_alive());

        client.on_connected().await;
        assert_eq!(client.status().connection, ConnectionState::Connected);
        assert!(!client.is_alive());

        client.on_authenticated(false).await;
        assert!(client.is_alive());
        assert!(client.context.was_logged_in().await);

        client.on_connection_closed().await;
        assert!(!client.is_alive());
        assert!(!client.context.was_logged_in().await);
    }

    #[tokio::test]
    async fn test_closed_on_error_without_session_does_not_reconnect() {
        let (client, server) = create_test_client().await;
        client.on_connected().await;
        client.on_authenticated(false).await;

        client
            .on_connection_closed_on_error("stream reset".to_string())
            .await;

        assert_eq!(client.status(), LinkStatus::default());
        assert!(!client.is_reconnecting.load(Ordering::Relaxed));
        assert_eq!(server.connect_attempts(), 0);
    }

    #[tokio::test]
    async fn test_phase_follows_lifecycle() {
        let (client, _server) = create_test_client().await;
        assert_eq!(client.phase().await, SessionPhase::Idle);

        client.connect().await.expect("connect should succeed");
        assert_eq!(client.phase().await, SessionPhase::Authenticated);

        client.on_connection_closed().await;
        assert_eq!(client.phase().await, SessionPhase::Disconnected);

        client.disconnect().await;
        assert_eq!(client.phase().await, SessionPhase::Idle);
    }

    #[tokio::test]
    async fn test_stale_generation_is_detected() {
        let (client, _server) = create_test_client().await;
        client.connect().await.expect("connect should succeed");
        let generation = client.connection_generation.load(Ordering::SeqCst);
        assert!(client.is_current(generation));

        client.disconnect().await;
        assert!(!client.is_current(generation));
    }

    #[tokio::test]
    async fn test_blank_credentials_are_rejected_before_network() {
        let (client, server) =
            create_test_client_with(Credentials::new(" ", " ", " "), Default::default()).await;
        assert!(matches!(
            client.connect().await,
            Err(SessionError::InvalidCredentials)
        ));
        assert_eq!(server.connect_attempts(), 0);
        assert_eq!(client.phase().await, SessionPhase::Idle);
    }
}
