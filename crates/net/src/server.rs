use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use log::{debug, info, trace, warn};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};

use crate::connection::{ConnectionId, ConnectionRegistry, EndpointEvent, MessageSender, Outbound};
use crate::error::NetError;

const OUTBOUND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 1024;

/// A listening text-message endpoint.
///
/// Accepts HTTP-upgrade connections on one request path, pumps each
/// connection's frames, and surfaces everything as [`EndpointEvent`]s
/// on a single channel. The service layer never touches sockets.
pub struct WsServer {
    local_addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
}

impl WsServer {
    /// Bind and start accepting upgrade requests for `path`.
    pub async fn bind(
        addr: SocketAddr,
        path: &str,
    ) -> Result<(WsServer, mpsc::Receiver<EndpointEvent>), NetError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let registry = Arc::new(ConnectionRegistry::new());
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

        let accept_registry = Arc::clone(&registry);
        let path = path.to_string();
        tokio::spawn(async move {
            info!("endpoint listening on {} path {}", local_addr, path);
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let registry = Arc::clone(&accept_registry);
                        let event_tx = event_tx.clone();
                        let path = path.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, peer, path, registry, event_tx).await;
                        });
                    }
                    Err(e) => {
                        warn!("accept failed: {}", e);
                    }
                }
            }
        });

        Ok((
            WsServer {
                local_addr,
                registry,
            },
            event_rx,
        ))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    path: String,
    registry: Arc<ConnectionRegistry>,
    event_tx: mpsc::Sender<EndpointEvent>,
) {
    let check_path = |request: &Request, response: Response| {
        if request.uri().path() == path {
            Ok(response)
        } else {
            debug!("rejecting upgrade for path {}", request.uri().path());
            let mut reject = ErrorResponse::new(Some("not found".to_string()));
            *reject.status_mut() = tokio_tungstenite::tungstenite::http::StatusCode::NOT_FOUND;
            Err(reject)
        }
    };

    let ws_stream = match tokio_tungstenite::accept_hdr_async(stream, check_path).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!("handshake with {} failed: {}", peer, e);
            return;
        }
    };

    let id = ConnectionId::new();
    debug!("connection {} accepted from {}", id, peer);

    let (mut write, mut read) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Outbound>(OUTBOUND_BUFFER);
    let sender = MessageSender::new(outbound_tx);

    registry.register(id, sender.clone());
    if event_tx
        .send(EndpointEvent::Connected(id, sender))
        .await
        .is_err()
    {
        registry.deregister(id);
        return;
    }

    // Write pump: serialises all outbound frames for this connection.
    let writer = tokio::spawn(async move {
        while let Some(outbound) = outbound_rx.recv().await {
            match outbound {
                Outbound::Text(text) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        debug!("write failed: {}", e);
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    // Read loop: owns the tear-down for this connection.
    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if event_tx
                    .send(EndpointEvent::Message(id, text.to_string()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                debug!("connection {} closed by peer", id);
                break;
            }
            Ok(Message::Ping(payload)) => {
                trace!("ping from {}: {} bytes", id, payload.len());
            }
            Ok(_) => {}
            Err(e) => {
                debug!("connection {} errored: {}", id, e);
                break;
            }
        }
    }

    writer.abort();
    // Token-style close: only the remover emits the lifecycle event, so
    // a racing shutdown cannot double-report.
    if registry.deregister(id) {
        let _ = event_tx.send(EndpointEvent::Disconnected(id)).await;
    }
}
