use futures_util::{SinkExt, StreamExt};
use log::{debug, trace};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use crate::connection::{MessageSender, Outbound};
use crate::error::NetError;

const OUTBOUND_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 1024;

/// Events received on a dialled connection.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// A text frame arrived.
    Message(String),
    /// The server closed the connection.
    Disconnected,
    /// Transport error; the connection is gone.
    Error(String),
}

/// Dial a text-message endpoint.
///
/// Returns a sender for outbound frames and the inbound event stream.
/// Dropping the receiver tears the connection down.
pub async fn connect_text(
    url: &str,
) -> Result<(MessageSender, mpsc::Receiver<ClientEvent>), NetError> {
    let parsed = Url::parse(url)?;
    let (ws_stream, _) = connect_async(parsed.as_str()).await?;
    debug!("connected to {}", url);

    let (mut write, mut read) = ws_stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Outbound>(OUTBOUND_BUFFER);
    let (event_tx, event_rx) = mpsc::channel::<ClientEvent>(EVENT_BUFFER);

    // Outbound pump.
    let write_events = event_tx.clone();
    tokio::spawn(async move {
        while let Some(outbound) = outbound_rx.recv().await {
            match outbound {
                Outbound::Text(text) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        let _ = write_events.send(ClientEvent::Error(e.to_string())).await;
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

    // Inbound pump.
    tokio::spawn(async move {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if event_tx
                        .send(ClientEvent::Message(text.to_string()))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    let _ = event_tx.send(ClientEvent::Disconnected).await;
                    break;
                }
                Ok(Message::Ping(payload)) => {
                    trace!("ping: {} bytes", payload.len());
                }
                Ok(_) => {}
                Err(e) => {
                    let _ = event_tx.send(ClientEvent::Error(e.to_string())).await;
                    break;
                }
            }
        }
    });

    Ok((MessageSender::new(outbound_tx), event_rx))
}
