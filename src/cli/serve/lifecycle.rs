//! Server lifecycle management.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Result, anyhow};
use tiny_http::Server;
use tokio::sync::mpsc;

use super::run_request_loop;
use crate::actor::messages::WsMsg;
use crate::log;
use crate::utils::port;

/// What each request handler needs.
pub struct ServeContext {
    pub output_root: PathBuf,
    pub ws_tx: mpsc::Sender<WsMsg>,
}

struct Running {
    server: Arc<Server>,
    addr: SocketAddr,
    thread: JoinHandle<()>,
}

/// The dev HTTP server. At most one listener is live at a time.
pub struct DevServer {
    interface: IpAddr,
    base_port: u16,
    context: Arc<ServeContext>,
    running: Option<Running>,
}

impl DevServer {
    pub fn new(interface: IpAddr, base_port: u16, context: ServeContext) -> Self {
        Self {
            interface,
            base_port,
            context: Arc::new(context),
            running: None,
        }
    }

    /// Bind the first free port at or after the base port and start serving.
    pub fn start(&mut self) -> Result<SocketAddr> {
        if let Some(running) = &self.running {
            return Ok(running.addr);
        }

        let (server, addr) = self.bind()?;
        let server = Arc::new(server);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(4)
            .thread_name(|i| format!("http-{i}"))
            .build()?;

        let thread = {
            let server = Arc::clone(&server);
            let context = Arc::clone(&self.context);
            thread::Builder::new()
                .name("http".into())
                .spawn(move || run_request_loop(&server, &pool, &context))?
        };

        log!("serve"; "http://{}", addr);
        self.running = Some(Running {
            server,
            addr,
            thread,
        });
        Ok(addr)
    }

    fn bind(&self) -> Result<(Server, SocketAddr)> {
        let mut candidate = self.base_port;
        loop {
            let port = port::allocate(self.interface, candidate)?;
            let addr = SocketAddr::new(self.interface, port);
            match Server::http(addr) {
                Ok(server) => return Ok((server, addr)),
                // Taken between the check and the bind
                Err(e) if e.downcast_ref::<io::Error>().is_some_and(|e| e.kind() == io::ErrorKind::AddrInUse) => {
                    candidate = port
                        .checked_add(1)
                        .ok_or_else(|| anyhow!("no free port at or above {}", self.base_port))?;
                }
                Err(e) => return Err(anyhow!("Failed to bind {addr}: {e}")),
            }
        }
    }

    /// Unblock the listener and wait for its thread. No-op when stopped.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.server.unblock();
        if running.thread.join().is_err() {
            log!("error"; "http thread panicked");
        }
        crate::debug!("serve"; "stopped {}", running.addr);
    }

    /// Stop the current listener, then bind a new one.
    pub fn restart(&mut self) -> Result<SocketAddr> {
        self.stop();
        self.start()
    }

    /// Restart if the listener thread exited on its own. Returns the new address.
    pub fn recover(&mut self) -> Result<Option<SocketAddr>> {
        let exited = self
            .running
            .as_ref()
            .is_some_and(|running| running.thread.is_finished());
        if !exited {
            return Ok(None);
        }
        if let Some(addr) = self.addr() {
            log!("serve"; "listener on {} stopped unexpectedly, restarting", addr);
        }
        self.restart().map(Some)
    }

    pub fn addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|running| running.addr)
    }
}

impl Drop for DevServer {
    fn drop(&mut self) {
        self.stop();
    }
}
