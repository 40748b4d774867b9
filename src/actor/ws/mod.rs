//! WebSocket Actor - live reload broadcast
//!
//! ```text
//! HTTP thread --Register--> WsActor <--Reload-- BuildActor
//!                              │
//!                              └── "reload" --> every client
//! ```
//!
//! The protocol is one-way: clients never send anything we care about.
//! Each client socket is driven by its own thread (see `connection`), which
//! reports closed or failed clients back so the registry can drop them.

mod connection;
mod registry;

use std::io::{Read, Write};
use std::time::Duration;

use tokio::sync::mpsc;
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

use registry::SocketRegistry;

use super::messages::WsMsg;

/// Anything a client connection can be carried over.
pub trait Duplex: Read + Write + Send {}

impl<T: Read + Write + Send> Duplex for T {}

pub type ClientStream = Box<dyn Duplex>;
pub type ClientSocket = WebSocket<ClientStream>;

/// Literal payload clients react to.
pub const RELOAD: &str = "reload";

pub struct WsActor {
    rx: mpsc::Receiver<WsMsg>,
    registry: SocketRegistry,
    reload_delay: Duration,
}

impl WsActor {
    pub fn new(rx: mpsc::Receiver<WsMsg>, reload_delay: Duration, heartbeat: Duration) -> Self {
        Self {
            rx,
            registry: SocketRegistry::new(heartbeat),
            reload_delay,
        }
    }

    /// Run until `Shutdown` or every sender is gone.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(WsMsg::Register(ws)) => {
                        self.registry.register(ws);
                    }
                    Some(WsMsg::Reload) => {
                        tokio::time::sleep(self.reload_delay).await;
                        let sent = self.registry.broadcast(&Message::text(RELOAD));
                        if sent > 0 {
                            crate::log!("ws"; "reload sent to {} clients", sent);
                        }
                    }
                    Some(WsMsg::Shutdown) | None => {
                        if !self.registry.is_empty() {
                            crate::debug!("ws"; "shutting down {} clients", self.registry.len());
                        }
                        self.registry.close_all().await;
                        break;
                    }
                },
                id = self.registry.closed() => {
                    self.registry.unregister(id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    use tungstenite::protocol::Role;
    use tungstenite::protocol::frame::coding::CloseCode;

    /// A connected server socket plus the client end of it.
    fn socket_pair() -> (ClientSocket, WebSocket<TcpStream>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (server, _) = listener.accept().unwrap();
        let client = client.join().unwrap();

        let server: ClientStream = Box::new(server);
        (
            WebSocket::from_raw_socket(server, Role::Server, None),
            WebSocket::from_raw_socket(client, Role::Client, None),
        )
    }

    fn spawn_actor(reload_delay: Duration) -> (mpsc::Sender<WsMsg>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(8);
        let actor = WsActor::new(rx, reload_delay, Duration::from_secs(30));
        (tx, tokio::spawn(actor.run()))
    }

    #[tokio::test]
    async fn test_reload_reaches_client_after_delay() {
        let (server, mut client) = socket_pair();
        let (tx, task) = spawn_actor(Duration::from_millis(100));

        tx.send(WsMsg::Register(server)).await.unwrap();
        let sent_at = std::time::Instant::now();
        tx.send(WsMsg::Reload).await.unwrap();

        let (msg, waited) = tokio::task::spawn_blocking(move || {
            let msg = client.read().unwrap();
            (msg, sent_at.elapsed())
        })
        .await
        .unwrap();

        assert_eq!(msg, Message::text(RELOAD));
        assert!(waited >= Duration::from_millis(100));

        tx.send(WsMsg::Shutdown).await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_clients_going_away() {
        let (server, mut client) = socket_pair();
        let (tx, task) = spawn_actor(Duration::ZERO);

        tx.send(WsMsg::Register(server)).await.unwrap();
        tx.send(WsMsg::Shutdown).await.unwrap();
        task.await.unwrap();

        let msg = tokio::task::spawn_blocking(move || client.read().unwrap())
            .await
            .unwrap();
        match msg {
            Message::Close(Some(frame)) => {
                assert_eq!(frame.code, CloseCode::Away);
                assert_eq!(frame.reason.as_str(), "server shutting down");
            }
            other => panic!("expected close frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_actor_stops_when_senders_drop() {
        let (tx, task) = spawn_actor(Duration::ZERO);
        drop(tx);
        task.await.unwrap();
    }
}
