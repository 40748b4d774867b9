//! Per-client I/O thread.
//!
//! An upgraded stream is one blocking duplex that cannot be split, so each
//! client gets a thread that owns its socket. Outgoing frames arrive over a
//! bounded channel. When the channel stays quiet for a heartbeat the thread
//! pings and reads until the pong, which is where a close frame, EOF or reset
//! from the peer is observed. The id is reported back once the thread exits.

use std::io::{Read, Write};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use tokio::sync::mpsc;
use tungstenite::protocol::{CloseFrame, Message};
use tungstenite::{Error as WsError, WebSocket};

use super::registry::ClientId;

/// Frames queued for one client before it counts as stalled.
const QUEUE_DEPTH: usize = 8;

pub enum Outgoing {
    Frame(Message),
    Close(CloseFrame),
}

/// Why a frame could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// Client stopped draining its queue
    Stalled,
    /// I/O thread already exited
    Gone,
}

pub struct ClientHandle {
    tx: Sender<Outgoing>,
    thread: JoinHandle<()>,
}

impl ClientHandle {
    pub fn spawn<S>(
        id: ClientId,
        ws: WebSocket<S>,
        heartbeat: Duration,
        gone: mpsc::UnboundedSender<ClientId>,
    ) -> std::io::Result<Self>
    where
        S: Read + Write + Send + 'static,
    {
        let (tx, rx) = channel::bounded(QUEUE_DEPTH);
        let thread = std::thread::Builder::new()
            .name(format!("ws-client-{id}"))
            .spawn(move || {
                serve_client(id, ws, rx, heartbeat);
                // The registry may already be gone during shutdown
                let _ = gone.send(id);
            })?;
        Ok(Self { tx, thread })
    }

    pub fn queue(&self, frame: Outgoing) -> Result<(), QueueError> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Stalled,
            TrySendError::Disconnected(_) => QueueError::Gone,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

fn serve_client<S: Read + Write>(
    id: ClientId,
    mut ws: WebSocket<S>,
    rx: Receiver<Outgoing>,
    heartbeat: Duration,
) {
    loop {
        let result = match rx.recv_timeout(heartbeat) {
            Ok(Outgoing::Frame(msg)) => ws.send(msg),
            Ok(Outgoing::Close(frame)) => {
                if let Err(e) = ws.close(Some(frame)).and_then(|()| ws.flush()) {
                    crate::debug!("ws"; "client {} close failed: {}", id, e);
                }
                return;
            }
            Err(RecvTimeoutError::Timeout) => check_alive(&mut ws),
            // Registry dropped the handle
            Err(RecvTimeoutError::Disconnected) => return,
        };

        if let Err(e) = result {
            match e {
                WsError::ConnectionClosed | WsError::AlreadyClosed => {
                    crate::debug!("ws"; "client {} closed", id);
                }
                e => crate::debug!("ws"; "client {} disconnected: {}", id, e),
            }
            return;
        }
    }
}

/// Ping and read until the pong. A close frame from the peer ends the session.
fn check_alive<S: Read + Write>(ws: &mut WebSocket<S>) -> Result<(), WsError> {
    ws.send(Message::Ping(Default::default()))?;
    loop {
        match ws.read()? {
            Message::Pong(_) => return Ok(()),
            Message::Close(_) => {
                // Flush the close reply tungstenite queued
                let _ = ws.flush();
                return Err(WsError::ConnectionClosed);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    use tungstenite::protocol::Role;

    fn socket_pair() -> (WebSocket<TcpStream>, WebSocket<TcpStream>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (server, _) = listener.accept().unwrap();
        (
            WebSocket::from_raw_socket(server, Role::Server, None),
            WebSocket::from_raw_socket(client.join().unwrap(), Role::Client, None),
        )
    }

    #[tokio::test]
    async fn test_client_close_is_reported() {
        let (server, mut client) = socket_pair();
        let (gone_tx, mut gone_rx) = mpsc::unbounded_channel();
        let handle = ClientHandle::spawn(7, server, Duration::from_millis(20), gone_tx).unwrap();

        client.close(None).unwrap();
        client.flush().unwrap();

        let id = tokio::time::timeout(Duration::from_secs(2), gone_rx.recv())
            .await
            .unwrap();
        assert_eq!(id, Some(7));
        assert!(handle.queue(Outgoing::Frame(Message::text("reload"))).is_err());
    }

    #[tokio::test]
    async fn test_dropped_peer_is_reported() {
        let (server, client) = socket_pair();
        let (gone_tx, mut gone_rx) = mpsc::unbounded_channel();
        let _handle = ClientHandle::spawn(3, server, Duration::from_millis(20), gone_tx).unwrap();

        drop(client);

        let id = tokio::time::timeout(Duration::from_secs(2), gone_rx.recv())
            .await
            .unwrap();
        assert_eq!(id, Some(3));
    }

    #[tokio::test]
    async fn test_live_client_answers_heartbeat() {
        let (server, mut client) = socket_pair();
        let (gone_tx, mut gone_rx) = mpsc::unbounded_channel();
        let handle = ClientHandle::spawn(1, server, Duration::from_millis(20), gone_tx).unwrap();

        // Reading answers pings automatically
        let reader = thread::spawn(move || {
            loop {
                if let Message::Text(text) = client.read().unwrap() {
                    return (text.to_string(), client);
                }
            }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.queue(Outgoing::Frame(Message::text("reload"))).unwrap();

        let (text, _client) = reader.join().unwrap();
        assert_eq!(text, "reload");
        assert!(gone_rx.try_recv().is_err());
    }
}
