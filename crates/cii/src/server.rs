use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use tandem_net::{ConnectionRegistry, EndpointEvent, NetError, WsServer};
use tandem_protocol::{CII_PROTOCOL_VERSION, Cii, Field};
use tokio::sync::mpsc;

use crate::config::CiiServerConfig;

/// Content-identification server.
///
/// Holds the single current state record and the connection set.
/// `update` applies a patch as one atomic change; `transaction` batches
/// several edits into one commit. Each commit broadcasts the diff of
/// current-vs-previous to every connection; inbound client frames are
/// ignored per protocol.
pub struct CiiServer {
    state: Mutex<Cii>,
    registry: Arc<ConnectionRegistry>,
    local_addr: SocketAddr,
}

impl CiiServer {
    /// Bind the endpoint and start serving `initial` (stamped with the
    /// protocol version if the caller left it unset).
    pub async fn bind(
        addr: SocketAddr,
        config: CiiServerConfig,
        initial: Cii,
    ) -> Result<Arc<Self>, NetError> {
        let (endpoint, events) = WsServer::bind(addr, &config.path).await?;

        let mut state = initial;
        if state.protocol_version.is_omitted() {
            state.protocol_version = Field::Value(CII_PROTOCOL_VERSION.to_string());
        }

        let server = Arc::new(Self {
            state: Mutex::new(state),
            registry: endpoint.registry(),
            local_addr: endpoint.local_addr(),
        });

        let event_server = Arc::clone(&server);
        tokio::spawn(async move {
            event_server.run_events(events).await;
        });
        Ok(server)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn connection_count(&self) -> usize {
        self.registry.active_count()
    }

    pub fn connection_high_water_mark(&self) -> usize {
        self.registry.high_water_mark()
    }

    /// Snapshot of the current state record.
    pub fn current(&self) -> Cii {
        self.state.lock().clone()
    }

    /// Apply a patch: non-omitted fields overwrite. One broadcast if
    /// anything actually changed.
    pub fn update(&self, patch: &Cii) {
        self.transaction(|state| {
            state.merge(patch);
        });
    }

    /// Batched mutation: edits inside the closure commit as one change
    /// and broadcast at most one diff.
    pub fn transaction<F>(&self, mutate: F)
    where
        F: FnOnce(&mut Cii),
    {
        let diff = {
            let mut state = self.state.lock();
            let before = state.clone();
            mutate(&mut state);
            before.diff(&state)
        };
        if diff.is_empty() {
            return;
        }
        self.broadcast(&diff);
    }

    pub fn set_content_id(&self, content_id: Option<String>) {
        self.transaction(|state| {
            state.content_id = match content_id {
                Some(id) => Field::Value(id),
                None => Field::Null,
            };
        });
    }

    fn broadcast(&self, diff: &Cii) {
        let json = match diff.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!("failed to serialise state diff: {}", e);
                return;
            }
        };
        let delivered = self.registry.broadcast(&json);
        debug!("state diff delivered to {} connections", delivered);
    }

    async fn run_events(self: Arc<Self>, mut events: mpsc::Receiver<EndpointEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                EndpointEvent::Connected(id, sender) => {
                    info!("cii connection {} established", id);
                    // First frame is always the full non-omitted state.
                    let full = self.current();
                    match full.to_json() {
                        Ok(json) => {
                            if sender.send_text(json).await.is_err() {
                                debug!("connection {} went away before initial state", id);
                            }
                        }
                        Err(e) => warn!("failed to serialise initial state: {}", e),
                    }
                }
                EndpointEvent::Message(id, _frame) => {
                    // Server side of this protocol never consumes
                    // client frames.
                    debug!("ignoring client frame on cii connection {}", id);
                }
                EndpointEvent::Disconnected(id) => {
                    info!("cii connection {} closed", id);
                }
            }
        }
    }
}
