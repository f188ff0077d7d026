//! The public client: ties the store, transport, router, pairing, and
//! event bus together behind one handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use wavelet_codec::{Jid, Node};
use wavelet_store::{DeviceData, Store};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::events::{EventBus, EventStream};
use crate::pair::PrePairCallback;
use crate::request::{parse_iq_response, InfoQuery, Router};
use crate::sender::StanzaSender;
use crate::supervisor::{self, SessionState};

/// A linked-device protocol client.
///
/// ```rust,no_run
/// use wavelet::{Client, ClientConfig, Event};
/// use wavelet_store::Store;
///
/// #[tokio::main]
/// async fn main() -> wavelet::Result<()> {
///     let store = Store::open("device.db").await?;
///     let client = Client::new(store, ClientConfig::default()).await?;
///     let mut events = client.subscribe();
///     client.connect().await?;
///     while let Some(event) = events.recv().await {
///         match event {
///             Event::Qr { codes } => println!("scan: {}", codes[0]),
///             Event::PairSuccess { id, .. } => println!("paired as {id}"),
///             Event::Message { from, id, .. } => println!("message {id} from {from}"),
///             _ => {}
///         }
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub config: ClientConfig,
    pub store: Store,
    pub device: Arc<RwLock<DeviceData>>,
    pub events: EventBus,
    pub router: Arc<Router>,
    pub sender_slot: RwLock<Option<StanzaSender>>,
    pub expect_disconnect: Arc<AtomicBool>,
    pub auth_fatal: Arc<AtomicBool>,
    pub callback: Arc<RwLock<Option<PrePairCallback>>>,
    shutdown: RwLock<CancellationToken>,
    state: Mutex<SessionState>,
    supervisor_running: AtomicBool,
}

impl Client {
    /// Build a client over an opened store, generating identity material on
    /// first run.
    pub async fn new(store: Store, config: ClientConfig) -> Result<Self> {
        let device = store.load_or_init_device().await?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                config,
                store,
                device: Arc::new(RwLock::new(device)),
                events: EventBus::new(),
                router: Arc::new(Router::new()),
                sender_slot: RwLock::new(None),
                expect_disconnect: Arc::new(AtomicBool::new(false)),
                auth_fatal: Arc::new(AtomicBool::new(false)),
                callback: Arc::new(RwLock::new(None)),
                shutdown: RwLock::new(CancellationToken::new()),
                state: Mutex::new(SessionState::Idle),
                supervisor_running: AtomicBool::new(false),
            }),
        })
    }

    /// Subscribe to the event stream. Subscriptions made before
    /// [`connect`](Self::connect) see every event.
    pub fn subscribe(&self) -> EventStream {
        self.inner.events.subscribe()
    }

    /// Install the synchronous pre-pair veto hook. Returning `false` from
    /// it refuses the pairing before anything is persisted.
    pub async fn set_pre_pair_callback(&self, callback: PrePairCallback) {
        *self.inner.callback.write().await = Some(callback);
    }

    /// Spawn the session supervisor. Returns immediately; progress and
    /// failures arrive on the event stream.
    pub async fn connect(&self) -> Result<()> {
        if self.inner.supervisor_running.swap(true, Ordering::SeqCst) {
            tracing::debug!("connect() called while already running");
            return Ok(());
        }
        self.inner.auth_fatal.store(false, Ordering::SeqCst);
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            supervisor::run(Arc::clone(&inner)).await;
            inner.supervisor_running.store(false, Ordering::SeqCst);
        });
        Ok(())
    }

    /// Tear the session down and stop reconnecting. The client can
    /// [`connect`](Self::connect) again afterwards.
    pub async fn disconnect(&self) {
        self.inner.shutdown_token().await.cancel();
        while self.inner.supervisor_running.load(Ordering::SeqCst) {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        // A fresh token so a later connect() starts clean.
        *self.inner.shutdown.write().await = CancellationToken::new();
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> SessionState {
        *self.inner.state.lock().await
    }

    /// Whether the device has a committed pairing.
    pub async fn is_paired(&self) -> bool {
        self.inner.device.read().await.is_paired()
    }

    /// Our account JID, once paired.
    pub async fn device_jid(&self) -> Option<Jid> {
        self.inner.device.read().await.id.clone()
    }

    /// Send a request stanza and await the correlated response.
    pub async fn send_iq(&self, query: InfoQuery) -> Result<Node> {
        self.inner.send_iq(query).await
    }

    /// Queue a raw stanza without awaiting any response.
    pub async fn send_node(&self, node: Node) -> Result<()> {
        self.inner.sender().await?.send_node(node).await
    }

    /// Unlink this device from the account: ask the server to remove the
    /// companion, wipe the store, and disconnect. The client is left
    /// unpaired and ready for a fresh QR enrollment.
    pub async fn logout(&self) -> Result<()> {
        let Some(jid) = self.device_jid().await else {
            return Err(ClientError::NotConnected);
        };
        let query = InfoQuery {
            namespace: "md",
            query_type: crate::request::IqType::Set,
            to: Jid::server_jid(),
            content: Some(wavelet_codec::NodeContent::Nodes(vec![Node::new(
                "remove-companion-device",
            )
            .attr("jid", jid)
            .attr("reason", "user_initiated")])),
            timeout: None,
        };
        self.send_iq(query).await?;

        self.inner.store.delete_store().await?;
        self.disconnect().await;
        *self.inner.device.write().await = self.inner.store.load_or_init_device().await?;
        tracing::info!("Logged out and reset to an unpaired device");
        Ok(())
    }
}

impl ClientInner {
    pub(crate) async fn sender(&self) -> Result<StanzaSender> {
        self.sender_slot
            .read()
            .await
            .clone()
            .ok_or(ClientError::NotConnected)
    }

    pub(crate) async fn set_state(&self, next: SessionState) {
        let mut state = self.state.lock().await;
        if *state != next {
            tracing::debug!(from = ?*state, to = ?next, "Session state");
            *state = next;
        }
    }

    /// The current shutdown token. Replaced wholesale by `disconnect`, so
    /// callers clone rather than hold the lock.
    pub(crate) async fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.read().await.clone()
    }

    pub(crate) async fn send_iq(&self, query: InfoQuery) -> Result<Node> {
        let sender = self.sender().await?;
        let timeout = query.timeout.unwrap_or(self.config.iq_timeout);
        let id = self.router.next_id().await;
        let response = self.router.register(id.clone()).await;

        let node = query.into_node(id.clone());
        if let Err(e) = sender.send_node(node).await {
            self.router.remove(&id).await;
            return Err(e);
        }

        let shutdown = self.shutdown_token().await;
        tokio::select! {
            result = response => match result {
                Ok(node) => parse_iq_response(node),
                // Slot dropped by fail_all: the connection went away.
                Err(_) => Err(ClientError::Disconnected),
            },
            () = tokio::time::sleep(timeout) => {
                self.router.remove(&id).await;
                Err(ClientError::Timeout)
            }
            () = shutdown.cancelled() => {
                self.router.remove(&id).await;
                Err(ClientError::Canceled)
            }
        }
    }
}
