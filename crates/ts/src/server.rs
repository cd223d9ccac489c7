use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use tandem_clocks::Clock;
use tandem_net::{ConnectionId, EndpointEvent, MessageSender, NetError, WsServer};
use tandem_ports::{TimelineSource, TimelineState};
use tandem_protocol::{AptEptLpt, ControlTimestamp, SetupData};
use tokio::sync::{Notify, mpsc};

use crate::config::TsServerConfig;
use crate::stem::ci_matches_stem;

const EVENT_BUFFER: usize = 64;

/// Events a timeline-synchronisation server surfaces to its owner.
#[derive(Debug, Clone)]
pub enum TsServerEvent {
    /// A client reported its achievable presentation timing.
    TimingReport {
        connection: ConnectionId,
        report: AptEptLpt,
    },
}

enum SessionState {
    AwaitingSetup,
    Active {
        setup: SetupData,
        /// Timeline state behind the last timestamp actually sent;
        /// meaningful-change tests compare against this, not against
        /// states that were observed but judged not worth emitting.
        last_sent_state: Option<TimelineState>,
        last_sent: Option<ControlTimestamp>,
    },
}

struct Session {
    sender: MessageSender,
    state: SessionState,
}

/// Timeline-synchronisation server.
///
/// Holds the current content id and the set of timeline sources. Each
/// connection negotiates its interest with a `SetupData` frame and then
/// receives a fresh `ControlTimestamp` whenever its availability flips
/// or its timeline moves meaningfully. Timestamps to one client are
/// emitted in order.
pub struct TsServer {
    inner: Arc<TsInner>,
    local_addr: SocketAddr,
}

struct TsInner {
    wall_clock: Clock,
    content_id: Mutex<Option<String>>,
    sources: Mutex<Vec<Arc<dyn TimelineSource>>>,
    sessions: Mutex<HashMap<ConnectionId, Session>>,
    wake: Arc<Notify>,
    events: mpsc::Sender<TsServerEvent>,
}

impl TsServer {
    /// Bind the endpoint. `wall_clock` stamps the wall-clock time on
    /// unavailability timestamps and is the reference timestamps are
    /// expressed against.
    pub async fn bind(
        addr: SocketAddr,
        config: TsServerConfig,
        wall_clock: &Clock,
    ) -> Result<(Arc<Self>, mpsc::Receiver<TsServerEvent>), NetError> {
        let (endpoint, endpoint_events) = WsServer::bind(addr, &config.path).await?;
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

        let server = Arc::new(Self {
            inner: Arc::new(TsInner {
                wall_clock: wall_clock.clone(),
                content_id: Mutex::new(None),
                sources: Mutex::new(Vec::new()),
                sessions: Mutex::new(HashMap::new()),
                wake: Arc::new(Notify::new()),
                events: event_tx,
            }),
            local_addr: endpoint.local_addr(),
        });

        let inner = Arc::clone(&server.inner);
        tokio::spawn(async move {
            inner.run(endpoint_events).await;
        });
        Ok((server, event_rx))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Replace the advertised content id; sessions re-evaluate at once.
    pub fn set_content_id(&self, content_id: Option<String>) {
        *self.inner.content_id.lock() = content_id;
        self.inner.wake.notify_one();
    }

    pub fn content_id(&self) -> Option<String> {
        self.inner.content_id.lock().clone()
    }

    /// Register a timeline source. Its change notifications are wired
    /// into the server's re-evaluation loop.
    pub fn add_source(&self, source: Arc<dyn TimelineSource>) {
        source.bind_change_notification(Arc::clone(&self.inner.wake));
        self.inner.sources.lock().push(source);
        self.inner.wake.notify_one();
    }
}

impl TsInner {
    async fn run(self: Arc<Self>, mut endpoint_events: mpsc::Receiver<EndpointEvent>) {
        info!("timeline-synchronisation server running");
        loop {
            tokio::select! {
                event = endpoint_events.recv() => {
                    let Some(event) = event else { break };
                    self.handle_endpoint_event(event).await;
                }
                _ = self.wake.notified() => {
                    self.evaluate_all();
                }
            }
        }
    }

    async fn handle_endpoint_event(&self, event: EndpointEvent) {
        match event {
            EndpointEvent::Connected(id, sender) => {
                info!("ts connection {} established, awaiting setup", id);
                self.sessions.lock().insert(
                    id,
                    Session {
                        sender,
                        state: SessionState::AwaitingSetup,
                    },
                );
            }
            EndpointEvent::Message(id, frame) => {
                self.handle_frame(id, &frame).await;
            }
            EndpointEvent::Disconnected(id) => {
                info!("ts connection {} closed", id);
                self.sessions.lock().remove(&id);
            }
        }
    }

    async fn handle_frame(&self, id: ConnectionId, frame: &str) {
        // Decide under the session lock; deliver reports outside it.
        let report = {
            let mut sessions = self.sessions.lock();
            let Some(session) = sessions.get_mut(&id) else {
                return;
            };

            if matches!(session.state, SessionState::AwaitingSetup) {
                match SetupData::from_json(frame) {
                    Ok(setup) => {
                        debug!(
                            "ts connection {} set up: stem {:?}, selector {:?}",
                            id, setup.content_id_stem, setup.timeline_selector
                        );
                        session.state = SessionState::Active {
                            setup,
                            last_sent_state: None,
                            last_sent: None,
                        };
                        // First timestamp goes out immediately,
                        // available or not.
                        self.evaluate_session(session);
                    }
                    Err(e) => {
                        warn!("dropping malformed setup from {}: {}", id, e);
                    }
                }
                None
            } else {
                match AptEptLpt::from_json(frame) {
                    Ok(report) => Some(report),
                    Err(e) => {
                        warn!("dropping malformed timing report from {}: {}", id, e);
                        None
                    }
                }
            }
        };

        if let Some(report) = report {
            let _ = self
                .events
                .send(TsServerEvent::TimingReport {
                    connection: id,
                    report,
                })
                .await;
        }
    }

    fn evaluate_all(&self) {
        let mut sessions = self.sessions.lock();
        for session in sessions.values_mut() {
            self.evaluate_session(session);
        }
    }

    /// Re-derive one session's timestamp and push it if it moved.
    fn evaluate_session(&self, session: &mut Session) {
        let SessionState::Active {
            setup,
            last_sent_state,
            last_sent,
        } = &mut session.state
        else {
            return;
        };

        let content_id = self.content_id.lock().clone();
        let stem_matches = content_id
            .as_deref()
            .is_some_and(|ci| ci_matches_stem(ci, &setup.content_id_stem));

        let source = self
            .sources
            .lock()
            .iter()
            .find(|source| source.recognises_timeline_selector(&setup.timeline_selector))
            .cloned();

        let state = if stem_matches {
            source
                .as_ref()
                .map(|source| source.timeline_state(&setup.timeline_selector))
                .unwrap_or(TimelineState::Unavailable)
        } else {
            TimelineState::Unavailable
        };

        let timestamp = match state {
            TimelineState::Available {
                content_ticks,
                wall_nanos,
                speed,
                ..
            } => ControlTimestamp {
                content_time: Some(content_ticks.round() as i64),
                wall_clock_time: Some(wall_nanos),
                timeline_speed_multiplier: Some(speed),
            },
            TimelineState::Unavailable => {
                ControlTimestamp::unavailable(self.wall_clock.nanos() as i64)
            }
        };

        let should_send = match last_sent.as_ref() {
            None => true,
            Some(prev) => {
                let availability_flipped = prev.is_available() != timestamp.is_available();
                let moved = match (last_sent_state.as_ref(), &state) {
                    (Some(old), new @ TimelineState::Available { .. }) => source
                        .as_ref()
                        .map(|source| source.is_meaningful_change(new, old))
                        .unwrap_or(false),
                    _ => false,
                };
                availability_flipped || moved
            }
        };

        if !should_send {
            return;
        }

        match timestamp.to_json() {
            Ok(json) => {
                if session.sender.try_send_text(json).is_err() {
                    debug!("timestamp dropped: connection outbox unavailable");
                    return;
                }
                *last_sent = Some(timestamp);
                *last_sent_state = Some(state);
            }
            Err(e) => warn!("failed to serialise control timestamp: {}", e),
        }
    }
}
