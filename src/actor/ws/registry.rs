use std::io::{Read, Write};
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tungstenite::WebSocket;
use tungstenite::protocol::CloseFrame;
use tungstenite::protocol::Message;
use tungstenite::protocol::frame::coding::CloseCode;

use super::connection::{ClientHandle, Outgoing, QueueError};

pub type ClientId = u64;

/// How long shutdown waits for close frames to go out.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Live clients, keyed by a per-connection id.
///
/// Each client runs on its own I/O thread. Threads that exit (peer closed,
/// reset, write failure) report their id through [`Self::closed`].
pub struct SocketRegistry {
    next_id: ClientId,
    clients: FxHashMap<ClientId, ClientHandle>,
    heartbeat: Duration,
    gone_tx: mpsc::UnboundedSender<ClientId>,
    gone_rx: mpsc::UnboundedReceiver<ClientId>,
}

impl SocketRegistry {
    pub fn new(heartbeat: Duration) -> Self {
        let (gone_tx, gone_rx) = mpsc::unbounded_channel();
        Self {
            next_id: 0,
            clients: FxHashMap::default(),
            heartbeat,
            gone_tx,
            gone_rx,
        }
    }

    pub fn register<S>(&mut self, ws: WebSocket<S>) -> Option<ClientId>
    where
        S: Read + Write + Send + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        match ClientHandle::spawn(id, ws, self.heartbeat, self.gone_tx.clone()) {
            Ok(handle) => {
                self.clients.insert(id, handle);
                crate::debug!("ws"; "client {} connected (total: {})", id, self.clients.len());
                Some(id)
            }
            Err(e) => {
                crate::log!("ws"; "cannot start client thread: {}", e);
                None
            }
        }
    }

    /// Drop a client. Unknown ids are ignored.
    pub fn unregister(&mut self, id: ClientId) {
        if self.clients.remove(&id).is_some() {
            crate::debug!("ws"; "client {} removed (total: {})", id, self.clients.len());
        }
    }

    /// Next client whose connection ended.
    pub async fn closed(&mut self) -> ClientId {
        match self.gone_rx.recv().await {
            Some(id) => id,
            // The registry holds a sender, so the channel never closes
            None => std::future::pending().await,
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Queue `msg` for every client. Returns how many accepted it.
    ///
    /// Clients whose thread is gone or whose queue is full are dropped.
    pub fn broadcast(&mut self, msg: &Message) -> usize {
        if self.clients.is_empty() {
            crate::debug!("ws"; "no clients connected");
            return 0;
        }

        let mut sent = 0;
        self.clients.retain(|id, client| {
            match client.queue(Outgoing::Frame(msg.clone())) {
                Ok(()) => {
                    sent += 1;
                    true
                }
                Err(QueueError::Stalled) => {
                    crate::debug!("ws"; "client {} stalled", id);
                    false
                }
                Err(QueueError::Gone) => {
                    crate::debug!("ws"; "client {} disconnected", id);
                    false
                }
            }
        });
        crate::debug!("ws"; "broadcast to {} clients", sent);
        sent
    }

    /// Close every client with 1001 "server shutting down" and empty the registry.
    ///
    /// Waits up to [`CLOSE_GRACE`] for the close frames to be written.
    pub async fn close_all(&mut self) {
        let clients: Vec<_> = self.clients.drain().collect();
        for (id, client) in &clients {
            let frame = CloseFrame {
                code: CloseCode::Away,
                reason: "server shutting down".into(),
            };
            if client.queue(Outgoing::Close(frame)).is_err() {
                crate::debug!("ws"; "client {} already gone", id);
            }
        }

        let deadline = Instant::now() + CLOSE_GRACE;
        while clients.iter().any(|(_, c)| !c.is_finished()) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
