use std::time::Duration;

use log::{debug, info, warn};
use tandem_clocks::CorrelatedClock;
use tandem_core::{Correlation, ticks_from_nanos};
use tandem_net::{ClientEvent, MessageSender, NetError, connect_text};
use tandem_protocol::{AptEptLpt, ControlTimestamp, SetupData};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

const EVENT_BUFFER: usize = 64;

/// Notifications from a [`TsClient`].
#[derive(Debug, Clone)]
pub enum TsClientEvent {
    /// A control timestamp arrived and was applied to the clock.
    TimestampApplied(ControlTimestamp),
    /// The connection is gone; the clock was marked unavailable.
    Disconnected,
}

/// Client side of the timeline-synchronisation channel.
///
/// Sends the `SetupData` on connect, then steers the given correlated
/// clock: each available timestamp installs a correlation mapping the
/// wall clock (the clock's parent) to content ticks, with the timeline
/// speed; a null timestamp marks the clock unavailable.
pub struct TsClient {
    sender: MessageSender,
    clock: CorrelatedClock,
}

impl TsClient {
    pub async fn connect(
        url: &str,
        setup: SetupData,
        clock: &CorrelatedClock,
    ) -> Result<(Self, mpsc::Receiver<TsClientEvent>), NetError> {
        let (sender, mut net_events) = connect_text(url).await?;

        // Nothing is known about the timeline until the first
        // timestamp lands.
        clock.set_availability(false);
        sender
            .send_text(setup.to_json().map_err(|_| NetError::ChannelClosed)?)
            .await?;
        info!(
            "timeline session opened: stem {:?}, selector {:?}",
            setup.content_id_stem, setup.timeline_selector
        );

        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let pump_clock = clock.clone();
        tokio::spawn(async move {
            while let Some(event) = net_events.recv().await {
                match event {
                    ClientEvent::Message(frame) => {
                        let timestamp = match ControlTimestamp::from_json(&frame) {
                            Ok(ts) => ts,
                            Err(e) => {
                                warn!("dropping malformed control timestamp: {}", e);
                                continue;
                            }
                        };
                        apply_timestamp(&pump_clock, &timestamp);
                        if event_tx
                            .send(TsClientEvent::TimestampApplied(timestamp))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    ClientEvent::Disconnected | ClientEvent::Error(_) => {
                        pump_clock.set_availability(false);
                        let _ = event_tx.send(TsClientEvent::Disconnected).await;
                        break;
                    }
                }
            }
        });

        Ok((
            Self {
                sender,
                clock: clock.clone(),
            },
            event_rx,
        ))
    }

    /// Report achievable presentation timing upstream.
    pub async fn send_timing_report(&self, report: &AptEptLpt) -> Result<(), NetError> {
        let json = report.to_json().map_err(|_| NetError::ChannelClosed)?;
        self.sender.send_text(json).await
    }

    /// Send a timing report built by `build` every `interval` until the
    /// returned task is aborted or the connection goes away.
    pub fn spawn_periodic_reports<F>(&self, interval: Duration, build: F) -> JoinHandle<()>
    where
        F: Fn() -> AptEptLpt + Send + 'static,
    {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let report = build();
                let json = match report.to_json() {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("failed to serialise timing report: {}", e);
                        continue;
                    }
                };
                if sender.send_text(json).await.is_err() {
                    debug!("timing report channel closed, stopping reports");
                    break;
                }
            }
        })
    }

    pub fn clock(&self) -> &CorrelatedClock {
        &self.clock
    }

    pub fn close(&self) {
        self.sender.close();
    }
}

fn apply_timestamp(clock: &CorrelatedClock, timestamp: &ControlTimestamp) {
    let (Some(content_time), Some(wall_nanos), Some(speed)) = (
        timestamp.content_time,
        timestamp.wall_clock_time,
        timestamp.timeline_speed_multiplier,
    ) else {
        debug!("timeline unavailable");
        clock.set_availability(false);
        return;
    };

    let parent = clock.parent().expect("timeline clock has a wall-clock parent");
    let correlation = Correlation::new(
        ticks_from_nanos(wall_nanos, parent.tick_rate()),
        content_time as f64,
    );
    clock.set_correlation_and_speed(correlation, speed);
    clock.set_availability(true);
    debug!(
        "timeline correlation installed: wall {} ns -> content {} ticks at speed {}",
        wall_nanos, content_time, speed
    );
}
