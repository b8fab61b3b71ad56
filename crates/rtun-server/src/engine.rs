//! The rendezvous engine: the two-listener state machine described in the
//! core design. Owns the pending-pairing table and the single control
//! registration behind one mutex, and the monotonic correlation-ID counter.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, BufReader, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, error, info, warn};

use rtun_core::protocol::{read_message, write_message};
use rtun_core::{IdGenerator, Message, RtunError, RtunResult};

use crate::config::ServerConfig;

/// Bound on how long the client-facing accept path waits for the hello line.
/// Exists only to bound resource use against a silent peer during handshake.
const HELLO_DEADLINE: Duration = Duration::from_secs(10);

struct ControlHandle {
    writer: BufWriter<OwnedWriteHalf>,
    /// Distinguishes this registration from a later one at the same address,
    /// so the close-detect worker only clears the slot it itself installed.
    generation: u64,
    peer_addr: SocketAddr,
}

struct Inner {
    pending: HashMap<String, oneshot::Sender<TcpStream>>,
    control: Option<ControlHandle>,
}

/// The server's rendezvous engine: two listeners, one pending table, one
/// control registration.
pub struct RendezvousEngine {
    config: ServerConfig,
    ids: IdGenerator,
    inner: Mutex<Inner>,
    next_control_gen: AtomicU64,
}

impl RendezvousEngine {
    pub fn new(config: ServerConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            ids: IdGenerator::new(),
            inner: Mutex::new(Inner {
                pending: HashMap::new(),
                control: None,
            }),
            next_control_gen: AtomicU64::new(0),
        })
    }

    /// Start both listeners and run forever. Blocks until the public
    /// listener fails to bind or to accept — that failure is fatal and is
    /// returned to the caller. A failure on the client-facing listener only
    /// terminates that listener's accept loop (logged, not returned).
    pub async fn run(self: Arc<Self>) -> RtunResult<()> {
        let public_listener = TcpListener::bind(&self.config.public_listen)
            .await
            .map_err(|e| {
                RtunError::Listen(format!(
                    "bind public {}: {e}",
                    self.config.public_listen
                ))
            })?;
        let client_listener = TcpListener::bind(&self.config.client_listen)
            .await
            .map_err(|e| {
                RtunError::Listen(format!(
                    "bind client {}: {e}",
                    self.config.client_listen
                ))
            })?;

        info!(
            public = %self.config.public_listen,
            client = %self.config.client_listen,
            "server listening"
        );

        {
            let engine = self.clone();
            tokio::spawn(async move {
                engine.accept_client_side(client_listener).await;
            });
        }

        self.accept_public(public_listener).await
    }

    async fn accept_public(self: &Arc<Self>, listener: TcpListener) -> RtunResult<()> {
        loop {
            let (stream, addr) = listener
                .accept()
                .await
                .map_err(|e| RtunError::Listen(format!("accept public: {e}")))?;

            let engine = self.clone();
            tokio::spawn(async move {
                engine.handle_public_conn(stream, addr).await;
            });
        }
    }

    async fn accept_client_side(self: Arc<Self>, listener: TcpListener) {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let engine = self.clone();
                    tokio::spawn(async move {
                        engine.handle_client_conn(stream, addr).await;
                    });
                }
                Err(err) => {
                    error!(error = %err, "accept client side failed, client listener stopped");
                    return;
                }
            }
        }
    }

    async fn handle_public_conn(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let id = self.ids.next();
        let (tx, rx) = oneshot::channel::<TcpStream>();

        {
            let mut inner = self.inner.lock().await;
            inner.pending.insert(id.clone(), tx);
        }

        if let Err(err) = self.notify_new(&id).await {
            let mut inner = self.inner.lock().await;
            inner.pending.remove(&id);
            drop(inner);
            warn!(remote = %addr, conn_id = %id, error = %err, "notify client failed");
            return;
        }

        info!(remote = %addr, conn_id = %id, "public accepted");

        match tokio::time::timeout(self.config.pair_timeout, rx).await {
            Ok(Ok(data_stream)) => {
                // The data-match path already removed the pending entry
                // before offering the stream; this is a no-op in the happy
                // case and only matters if some future caller reaches here
                // without having gone through that path.
                let mut inner = self.inner.lock().await;
                inner.pending.remove(&id);
                drop(inner);

                info!(conn_id = %id, "pair success");
                rtun_core::relay::splice(stream, data_stream).await;
                info!(conn_id = %id, "relay closed");
            }
            Ok(Err(_)) => {
                // The sender was dropped without sending. The only path that
                // drops a pending sender without sending is our own timeout
                // branch below, so reaching this arm would mean someone else
                // already gave up on our behalf; nothing left to clean up.
                warn!(conn_id = %id, "pairing slot dropped without delivery");
            }
            Err(_elapsed) => {
                let mut inner = self.inner.lock().await;
                inner.pending.remove(&id);
                drop(inner);
                info!(conn_id = %id, "pair timeout");
            }
        }
    }

    /// Send `NEW <id>` on the registered control channel, holding the shared
    /// lock for the duration of the buffered write-and-flush. Clears the
    /// control registration if the write fails, since a dead connection left
    /// registered would permanently starve future public callers.
    async fn notify_new(&self, id: &str) -> RtunResult<()> {
        let mut inner = self.inner.lock().await;
        let result = match inner.control.as_mut() {
            Some(handle) => write_message(&mut handle.writer, &Message::New(id.to_string())).await,
            None => Err(RtunError::Protocol("no control client registered".into())),
        };
        if result.is_err() {
            inner.control = None;
        }
        result
    }

    async fn handle_client_conn(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let mut reader = BufReader::new(stream);
        let hello = match tokio::time::timeout(HELLO_DEADLINE, read_message(&mut reader)).await {
            Ok(Ok(msg)) => msg,
            Ok(Err(err)) => {
                warn!(remote = %addr, error = %err, "invalid hello on client port");
                return;
            }
            Err(_) => {
                warn!(remote = %addr, "hello read deadline exceeded");
                return;
            }
        };

        // The hello is a standalone line; nothing else is expected to have
        // arrived ahead of it, so recovering the raw stream for whatever
        // comes next is safe.
        let stream = reader.into_inner();

        match hello {
            Message::Control => self.handle_control(stream, addr).await,
            Message::Data(id) => self.handle_data(stream, addr, id).await,
            Message::New(_) => {
                warn!(remote = %addr, "unexpected NEW hello on client port");
            }
        }
    }

    async fn handle_control(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let (mut read_half, write_half) = stream.into_split();

        let generation = {
            let mut inner = self.inner.lock().await;
            if inner.control.is_some() {
                warn!(remote = %addr, "reject extra control client");
                return;
            }
            let generation = self.next_control_gen.fetch_add(1, Ordering::SeqCst);
            inner.control = Some(ControlHandle {
                writer: BufWriter::new(write_half),
                generation,
                peer_addr: addr,
            });
            generation
        };

        info!(remote = %addr, "control client online");

        // Liveness is inferred from TCP: any inbound byte, EOF, or error is
        // treated identically as "the peer is gone". No heartbeat protocol
        // is defined.
        let mut probe = [0u8; 1];
        let _ = read_half.read(&mut probe).await;

        let mut inner = self.inner.lock().await;
        let still_current = matches!(&inner.control, Some(h) if h.generation == generation);
        if still_current {
            inner.control = None;
        }
        drop(inner);

        info!(remote = %addr, "control client offline");
    }

    async fn handle_data(self: Arc<Self>, stream: TcpStream, addr: SocketAddr, id: String) {
        let sender = {
            let mut inner = self.inner.lock().await;
            inner.pending.remove(&id)
        };

        let Some(sender) = sender else {
            warn!(remote = %addr, conn_id = %id, "unknown connID");
            return;
        };

        if sender.send(stream).is_err() {
            debug!(
                remote = %addr,
                conn_id = %id,
                "data stream arrived after its pairing already timed out"
            );
        }
    }

    /// Number of correlation IDs currently awaiting a data stream. Exposed
    /// for tests asserting the pending-table-empty invariant.
    #[cfg(test)]
    pub(crate) async fn pending_count(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    #[cfg(test)]
    pub(crate) async fn has_control(&self) -> bool {
        self.inner.lock().await.control.is_some()
    }
}
