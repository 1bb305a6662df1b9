use crate::Client;
use crate::config::SessionConfig;
use crate::context::SessionContext;
use crate::store::MemoryPreferenceStore;
use crate::transport::{
    ConnectOptions, ConnectionEvent, TransportError, TransportFactory, XmppConnection,
};
use async_trait::async_trait;
use dashmap::DashMap;
use influcore::credentials::Credentials;
use influcore::jid::BareJid;
use influcore::types::archive::{ArchiveQuery, ArchivedMessage};
use influcore::types::message::ChatMessage;
use influcore::types::presence::Presence;
use influcore::types::roster::RosterEntry;
use influcore::types::vcard::VCard;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Scriptable stand-in for an XMPP server shared by every connection the
/// [`MockTransportFactory`] opens.
#[derive(Default)]
pub struct MockServer {
    connect_attempts: AtomicU32,
    disconnects: AtomicU32,
    pub fail_connect: AtomicBool,
    pub reject_login: AtomicBool,
    /// Accept the login but never report the stream as authenticated.
    pub withhold_auth: AtomicBool,
    pub fail_sends: AtomicBool,
    pub fail_roster: AtomicBool,
    pub archive_supported: AtomicBool,
    connect_delay: Mutex<Duration>,
    roster_delay: Mutex<Duration>,
    roster: Mutex<Vec<RosterEntry>>,
    vcards: DashMap<BareJid, VCard>,
    archive: Mutex<Vec<ArchivedMessage>>,
    sent_messages: Mutex<Vec<ChatMessage>>,
    sent_presences: Mutex<Vec<Presence>>,
    events: Mutex<Option<mpsc::Sender<ConnectionEvent>>>,
    last_options: Mutex<Option<ConnectOptions>>,
}

impl MockServer {
    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> u32 {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().expect("lock") = delay;
    }

    pub fn set_roster(&self, entries: Vec<RosterEntry>) {
        *self.roster.lock().expect("lock") = entries;
    }

    pub fn set_roster_delay(&self, delay: Duration) {
        *self.roster_delay.lock().expect("lock") = delay;
    }

    pub fn set_vcard(&self, jid: BareJid, vcard: VCard) {
        self.vcards.insert(jid, vcard);
    }

    pub fn set_archive(&self, messages: Vec<ArchivedMessage>) {
        *self.archive.lock().expect("lock") = messages;
    }

    pub fn sent_messages(&self) -> Vec<ChatMessage> {
        self.sent_messages.lock().expect("lock").clone()
    }

    pub fn sent_presences(&self) -> Vec<Presence> {
        self.sent_presences.lock().expect("lock").clone()
    }

    pub fn last_options(&self) -> Option<ConnectOptions> {
        self.last_options.lock().expect("lock").clone()
    }

    /// Pushes an event on the most recently opened connection.
    pub async fn emit(&self, event: ConnectionEvent) -> bool {
        let sender = self.events.lock().expect("lock").clone();
        match sender {
            Some(sender) => sender.send(event).await.is_ok(),
            None => false,
        }
    }
}

#[derive(Default, Clone)]
pub struct MockTransportFactory {
    server: Arc<MockServer>,
}

impl MockTransportFactory {
    pub fn new(server: Arc<MockServer>) -> Self {
        Self { server }
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn connect(
        &self,
        options: &ConnectOptions,
    ) -> Result<(Arc<dyn XmppConnection>, mpsc::Receiver<ConnectionEvent>), TransportError> {
        self.server.connect_attempts.fetch_add(1, Ordering::SeqCst);
        *self.server.last_options.lock().expect("lock") = Some(options.clone());

        let delay = *self.server.connect_delay.lock().expect("lock");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.server.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Io("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::channel(64);
        tx.send(ConnectionEvent::Connected)
            .await
            .map_err(|_| TransportError::Interrupted)?;
        *self.server.events.lock().expect("lock") = Some(tx.clone());

        let connection = MockConnection {
            server: self.server.clone(),
            events: tx,
            closed: AtomicBool::new(false),
        };
        Ok((Arc::new(connection), rx))
    }
}

pub struct MockConnection {
    server: Arc<MockServer>,
    events: mpsc::Sender<ConnectionEvent>,
    closed: AtomicBool,
}

impl MockConnection {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        if self.server.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Io("broken pipe".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl XmppConnection for MockConnection {
    async fn login(&self, _username: &str, _password: &str) -> Result<(), TransportError> {
        if self.server.reject_login.load(Ordering::SeqCst) {
            return Err(TransportError::Protocol {
                condition: "not-authorized".to_string(),
            });
        }
        if !self.server.withhold_auth.load(Ordering::SeqCst) {
            let _ = self
                .events
                .send(ConnectionEvent::Authenticated { resumed: false })
                .await;
        }
        Ok(())
    }

    async fn send_message(&self, message: &ChatMessage) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.server
            .sent_messages
            .lock()
            .expect("lock")
            .push(message.clone());
        Ok(())
    }

    async fn send_presence(&self, presence: &Presence) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.server
            .sent_presences
            .lock()
            .expect("lock")
            .push(presence.clone());
        Ok(())
    }

    async fn fetch_roster(&self) -> Result<Vec<RosterEntry>, TransportError> {
        let delay = *self.server.roster_delay.lock().expect("lock");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.server.fail_roster.load(Ordering::SeqCst) {
            return Err(TransportError::Protocol {
                condition: "service-unavailable".to_string(),
            });
        }
        Ok(self.server.roster.lock().expect("lock").clone())
    }

    async fn load_vcard(&self, jid: &BareJid) -> Result<VCard, TransportError> {
        self.server
            .vcards
            .get(jid)
            .map(|v| v.value().clone())
            .ok_or_else(|| TransportError::Protocol {
                condition: "item-not-found".to_string(),
            })
    }

    async fn supports_archive(&self) -> Result<bool, TransportError> {
        Ok(self.server.archive_supported.load(Ordering::SeqCst))
    }

    async fn enable_archiving(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn query_archive(
        &self,
        query: &ArchiveQuery,
    ) -> Result<Vec<ArchivedMessage>, TransportError> {
        self.ensure_open()?;
        let messages = self.server.archive.lock().expect("lock").clone();
        Ok(messages
            .into_iter()
            .filter(|m| match &query.with {
                Some(peer) => {
                    m.message.to.to_bare() == *peer
                        || m.message.from.as_ref().map(|f| f.to_bare()).as_ref() == Some(peer)
                }
                None => true,
            })
            .take(query.max)
            .collect())
    }

    async fn disconnect(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.server.disconnects.fetch_add(1, Ordering::SeqCst);
        let _ = self.events.send(ConnectionEvent::ConnectionClosed).await;
    }
}

pub fn test_credentials() -> Credentials {
    Credentials::new("alice", "example.org", "hunter2")
}

/// Short timeouts and near-immediate reconnects.
pub fn test_config() -> SessionConfig {
    SessionConfig {
        auth_timeout: Duration::from_secs(2),
        roster_timeout: Duration::from_secs(2),
        reconnect_initial_delay: Duration::from_millis(10),
        reconnect_max_delay: Duration::from_millis(50),
        reconnect_jitter: 0.0,
        ..Default::default()
    }
}

/// A context over an in-memory preference store holding `credentials`
/// (nothing is stored when they are empty). The main screen is reported as
/// present.
pub async fn create_test_context(credentials: &Credentials) -> Arc<SessionContext> {
    let context = SessionContext::new(Arc::new(MemoryPreferenceStore::new()))
        .await
        .expect("test context should initialize");
    if !credentials.is_empty() {
        context
            .credentials()
            .store(credentials)
            .await
            .expect("credentials should be stored");
    }
    context.set_foreground_torn_down(false);
    Arc::new(context)
}

pub async fn create_test_client() -> (Arc<Client>, Arc<MockServer>) {
    create_test_client_with(test_credentials(), MockServer::default()).await
}

pub async fn create_test_client_with(
    credentials: Credentials,
    server: MockServer,
) -> (Arc<Client>, Arc<MockServer>) {
    let server = Arc::new(server);
    let context = create_test_context(&credentials).await;
    let client = Client::new(
        context,
        Arc::new(MockTransportFactory::new(server.clone())),
        test_config(),
    );
    (client, server)
}
