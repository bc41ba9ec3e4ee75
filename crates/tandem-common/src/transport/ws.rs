//! WebSocket relay client.
//!
//! One tokio task per client id owns the socket. The session side talks to
//! it through an outbound channel and a close signal; everything the relay
//! says comes back through the client's [`EventSink`]. With a session key,
//! updates are sealed before they leave and opened as they arrive, so the
//! relay only ever stores ciphertext.

use std::collections::HashMap;

use futures_util::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use super::{
    ClientId, ConnectTarget, EventSink, OutboundMessage, RelayClientMsg, RelayServerMsg,
    Transport, TransportError, TransportEvent, TransportMode,
};
use crate::auth::{anonymous_token, with_token};
use crate::crypto::SessionKey;

struct ClientHandle {
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    /// Dropping this closes the socket.
    _close: oneshot::Sender<()>,
}

/// Relay transport over tokio-tungstenite.
pub struct WsRelayTransport {
    runtime: Handle,
    clients: HashMap<ClientId, ClientHandle>,
    /// Mint an anonymous token under this name for every connection.
    anonymous_user: Option<String>,
}

impl WsRelayTransport {
    /// Spawn client tasks on `runtime`.
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            clients: HashMap::new(),
            anonymous_user: None,
        }
    }

    /// Authenticate against anonymous-mode relays as `username`.
    pub fn with_anonymous_auth(mut self, username: impl Into<String>) -> Self {
        self.anonymous_user = Some(username.into());
        self
    }

    fn connect_url(&self, url: &str) -> Result<String, TransportError> {
        let Some(user) = &self.anonymous_user else {
            return Ok(url.to_owned());
        };
        let token =
            anonymous_token(user, web_time::SystemTime::now()).map_err(|e| TransportError::Connect {
                target: url.to_owned(),
                reason: e.to_string(),
            })?;
        Ok(with_token(url, &token))
    }

    /// Use the runtime the caller is running in.
    pub fn from_current() -> Result<Self, TransportError> {
        let runtime = Handle::try_current().map_err(|e| TransportError::Connect {
            target: "tokio runtime".into(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(runtime))
    }
}

impl Transport for WsRelayTransport {
    fn mode(&self) -> TransportMode {
        TransportMode::Relay
    }

    fn connect(
        &mut self,
        client: &ClientId,
        target: &ConnectTarget,
        key: Option<&SessionKey>,
        events: EventSink,
    ) -> Result<(), TransportError> {
        let ConnectTarget::Relay { url } = target else {
            return Err(TransportError::Unsupported(target.mode()));
        };
        let connect_url = self.connect_url(url)?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();
        self.runtime.spawn(run_client(
            connect_url,
            key.cloned(),
            events,
            outbound_rx,
            close_rx,
        ));
        self.clients.insert(
            client.clone(),
            ClientHandle {
                outbound: outbound_tx,
                _close: close_tx,
            },
        );
        info!(
            client = %client,
            url = %url,
            encrypted = key.is_some(),
            anonymous = self.anonymous_user.is_some(),
            "relay client spawned"
        );
        Ok(())
    }

    fn disconnect(&mut self, client: &ClientId) {
        if self.clients.remove(client).is_some() {
            debug!(client = %client, "relay client closed");
        }
    }

    fn send(&mut self, client: &ClientId, message: OutboundMessage) -> Result<(), TransportError> {
        let handle = self
            .clients
            .get(client)
            .ok_or_else(|| TransportError::UnknownClient(client.clone()))?;
        handle
            .outbound
            .send(message)
            .map_err(|_| TransportError::Closed)
    }
}

async fn run_client(
    url: String,
    key: Option<SessionKey>,
    events: EventSink,
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
    mut close_rx: oneshot::Receiver<()>,
) {
    let client = events.client().clone();
    let ws_stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            let endpoint = url.split('?').next().unwrap_or_default();
            warn!(client = %client, url = %endpoint, error = %e, "relay connection failed");
            events.emit(TransportEvent::Error(format!("connection failed: {e}")));
            return;
        }
    };
    info!(client = %client, "relay connected");
    events.emit(TransportEvent::Connected);

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    loop {
        tokio::select! {
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Binary(data))) => {
                    if let Some(event) = decode_inbound(&data, key.as_ref()) {
                        events.emit(event);
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!(client = %client, "relay closed connection");
                    events.emit(TransportEvent::Disconnected);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(client = %client, error = %e, "relay receive error");
                    events.emit(TransportEvent::Error(format!("receive error: {e}")));
                    break;
                }
            },

            out = outbound_rx.recv() => {
                let Some(out) = out else { break };
                let bytes = match encode_outbound(out, key.as_ref()) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(client = %client, error = %e, "dropping unencodable message");
                        continue;
                    }
                };
                if let Err(e) = ws_tx.send(Message::Binary(bytes.into())).await {
                    warn!(client = %client, error = %e, "relay send error");
                    events.emit(TransportEvent::Error(format!("send error: {e}")));
                    break;
                }
            }

            _ = &mut close_rx => {
                debug!(client = %client, "close requested");
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }
}

/// Frame an outbound message, sealing document bytes when a key is set.
fn encode_outbound(
    message: OutboundMessage,
    key: Option<&SessionKey>,
) -> Result<Vec<u8>, TransportError> {
    let msg = match message {
        OutboundMessage::SyncRequest => RelayClientMsg::SyncRequest,
        OutboundMessage::Update(data) | OutboundMessage::FullState(data) => match key {
            Some(key) => RelayClientMsg::EncryptedUpdate(key.seal(&data)?),
            None => RelayClientMsg::Update(data),
        },
    };
    Ok(msg.to_bytes()?)
}

/// Turn a relay frame into a session event. Undecodable frames are dropped.
fn decode_inbound(data: &[u8], key: Option<&SessionKey>) -> Option<TransportEvent> {
    let msg = match RelayServerMsg::from_bytes(data) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(bytes = data.len(), error = %e, "failed to parse relay message");
            return None;
        }
    };

    match msg {
        RelayServerMsg::SyncResponse(state) => Some(TransportEvent::SyncResponse(state)),
        RelayServerMsg::Update(update) => Some(TransportEvent::Update(update)),
        RelayServerMsg::EncryptedUpdate(sealed) => {
            let Some(key) = key else {
                warn!(bytes = sealed.len(), "encrypted update but no session key");
                return None;
            };
            match key.open(&sealed) {
                Ok(update) => Some(TransportEvent::Update(update)),
                Err(e) => {
                    warn!(bytes = sealed.len(), error = %e, "failed to open encrypted update");
                    None
                }
            }
        }
        RelayServerMsg::Error { code, message } => {
            Some(TransportEvent::Error(format!("{code}: {message}")))
        }
    }
}
