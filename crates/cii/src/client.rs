use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;
use tandem_net::{ClientEvent, MessageSender, NetError, connect_text};
use tandem_protocol::{CII_PROTOCOL_VERSION, Cii};
use tokio::sync::mpsc;

const EVENT_BUFFER: usize = 64;

/// Change notifications from a [`CiiClient`].
#[derive(Debug, Clone)]
pub enum CiiClientEvent {
    /// An inbound message was applied; at most one per message.
    Updated {
        /// Wire names of the fields whose value changed.
        changed: Vec<&'static str>,
        /// The cumulative state after applying the message.
        state: Cii,
    },
    /// The connection is gone.
    Disconnected,
}

/// Client side of the content-identification channel.
///
/// Maintains the cumulative state record: fields absent from an
/// inbound message keep their previous value, present fields
/// overwrite. A protocol-version mismatch is logged but is not a
/// reason to disconnect.
pub struct CiiClient {
    state: Arc<Mutex<Cii>>,
    sender: MessageSender,
}

impl CiiClient {
    pub async fn connect(url: &str) -> Result<(Self, mpsc::Receiver<CiiClientEvent>), NetError> {
        let (sender, mut net_events) = connect_text(url).await?;
        let state = Arc::new(Mutex::new(Cii::default()));
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

        let pump_state = Arc::clone(&state);
        tokio::spawn(async move {
            while let Some(event) = net_events.recv().await {
                match event {
                    ClientEvent::Message(frame) => {
                        let patch = match Cii::from_json(&frame) {
                            Ok(patch) => patch,
                            Err(e) => {
                                warn!("dropping malformed cii message: {}", e);
                                continue;
                            }
                        };
                        if let Some(version) = patch.protocol_version.value() {
                            if version != CII_PROTOCOL_VERSION {
                                warn!(
                                    "server speaks protocol version {:?}, expected {}",
                                    version, CII_PROTOCOL_VERSION
                                );
                            }
                        }

                        let (changed, snapshot) = {
                            let mut state = pump_state.lock();
                            let changed = state.merge(&patch);
                            (changed, state.clone())
                        };
                        debug!("cii update changed fields: {:?}", changed);
                        if event_tx
                            .send(CiiClientEvent::Updated {
                                changed,
                                state: snapshot,
                            })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    ClientEvent::Disconnected | ClientEvent::Error(_) => {
                        let _ = event_tx.send(CiiClientEvent::Disconnected).await;
                        break;
                    }
                }
            }
        });

        Ok((Self { state, sender }, event_rx))
    }

    /// The cumulative state as of the last applied message.
    pub fn current(&self) -> Cii {
        self.state.lock().clone()
    }

    pub fn close(&self) {
        self.sender.close();
    }
}
