//! `/ws` upgrade on the HTTP port.
//!
//! The 101 handshake is answered by tiny_http; the raw stream it hands back
//! is wrapped as a server-side tungstenite socket and sent to the WsActor.

use anyhow::{Result, anyhow};
use tiny_http::{Request, Response, StatusCode};
use tokio::sync::mpsc;
use tungstenite::WebSocket;
use tungstenite::handshake::derive_accept_key;
use tungstenite::protocol::Role;

use super::response::{get_header, header, respond_bad_request};
use crate::actor::messages::WsMsg;
use crate::actor::ws::ClientStream;

/// Well-known live reload endpoint.
pub const WS_PATH: &str = "/ws";

pub fn respond_upgrade(request: Request, ws_tx: &mpsc::Sender<WsMsg>) -> Result<()> {
    let is_websocket = get_header(&request, "Upgrade")
        .is_some_and(|value| value.trim().eq_ignore_ascii_case("websocket"));
    let key = get_header(&request, "Sec-WebSocket-Key");

    let (true, Some(key)) = (is_websocket, key) else {
        return respond_bad_request(request, "Expected websocket");
    };

    let response = Response::empty(StatusCode(101))
        .with_header(header("Upgrade", "websocket")?)
        .with_header(header("Connection", "Upgrade")?)
        .with_header(header("Sec-WebSocket-Accept", &derive_accept_key(key.trim().as_bytes()))?);

    let stream: ClientStream = Box::new(request.upgrade("websocket", response));
    let ws = WebSocket::from_raw_socket(stream, Role::Server, None);

    ws_tx
        .blocking_send(WsMsg::Register(ws))
        .map_err(|_| anyhow!("live reload is not running"))
}
