use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use tandem_clocks::CorrelatedClock;
use tandem_core::Nanos;
use tandem_ports::Datagram;
use tandem_protocol::{Candidate, WallClockMessage, WallClockMessageType};
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::algorithm::WallClockAlgorithm;
use crate::config::WallClockClientConfig;

/// Pending type-2 responses still waiting for their follow-up.
const MAX_PENDING_FOLLOW_UPS: usize = 4;

/// Periodic wall-clock requester.
///
/// Bound to the clock it steers; timestamps are measured on that
/// clock's parent, so the correlations the algorithm emits slot
/// straight in. Start with [`WallClockClient::start`], halt with
/// [`WallClockClientHandle::stop`].
pub struct WallClockClient {
    clock: CorrelatedClock,
    config: WallClockClientConfig,
    algorithm: Box<dyn WallClockAlgorithm>,
}

/// Stops the request loop; responses still in flight are discarded on
/// arrival.
pub struct WallClockClientHandle {
    stop: Arc<Notify>,
    stopped: Arc<AtomicBool>,
}

impl WallClockClientHandle {
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.stop.notify_waiters();
        self.stop.notify_one();
    }
}

impl WallClockClient {
    pub fn new(
        clock: &CorrelatedClock,
        config: WallClockClientConfig,
        algorithm: Box<dyn WallClockAlgorithm>,
    ) -> Self {
        Self {
            clock: clock.clone(),
            config,
            algorithm,
        }
    }

    /// Spawn the request loop on the given datagram transport.
    pub fn start(self, transport: Arc<dyn Datagram>) -> WallClockClientHandle {
        let stop = Arc::new(Notify::new());
        let stopped = Arc::new(AtomicBool::new(false));
        let handle = WallClockClientHandle {
            stop: Arc::clone(&stop),
            stopped: Arc::clone(&stopped),
        };
        tokio::spawn(async move {
            self.run(transport, stop, stopped).await;
        });
        handle
    }

    fn measurement_nanos(&self) -> Nanos {
        let parent = self
            .clock
            .parent()
            .expect("wall clock has a measurement parent");
        parent.nanos() as Nanos
    }

    async fn run(
        mut self,
        transport: Arc<dyn Datagram>,
        stop: Arc<Notify>,
        stopped: Arc<AtomicBool>,
    ) {
        info!("wall-clock client started against {}", self.config.server);
        let mut pending_follow_ups: Vec<(WallClockMessage, Nanos)> = Vec::new();
        let mut buf = [0u8; 512];

        loop {
            if stopped.load(Ordering::SeqCst) {
                break;
            }

            let round_start = Instant::now();
            let t1 = self.measurement_nanos();
            let request = WallClockMessage::request(t1);
            if let Err(e) = transport.send_to(&request.encode(), self.config.server).await {
                warn!("request send failed: {}", e);
            }

            let deadline = round_start + self.config.timeout;
            let mut answered = false;
            while !answered && !stopped.load(Ordering::SeqCst) {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    debug!("round timed out waiting for {}", self.config.server);
                    break;
                }

                let received = tokio::select! {
                    _ = stop.notified() => return,
                    received = tokio::time::timeout(
                        remaining,
                        transport.recv_from(&mut buf),
                    ) => received,
                };

                let (len, from) = match received {
                    Err(_) => {
                        debug!("round timed out waiting for {}", self.config.server);
                        break;
                    }
                    Ok(Err(e)) => {
                        warn!("receive failed: {}", e);
                        break;
                    }
                    Ok(Ok(ok)) => ok,
                };

                let t4 = self.measurement_nanos();
                if from != self.config.server {
                    debug!("ignoring datagram from unexpected sender {}", from);
                    continue;
                }
                let msg = match WallClockMessage::decode(&buf[..len]) {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!("dropping malformed wall-clock message: {}", e);
                        continue;
                    }
                };

                match msg.msg_type {
                    WallClockMessageType::Request => {}
                    WallClockMessageType::FollowUp => {
                        self.handle_follow_up(&msg, &mut pending_follow_ups);
                    }
                    WallClockMessageType::Response
                    | WallClockMessageType::ResponseWithFollowUp => {
                        if msg.originate != t1 {
                            debug!("discarding stale response (originate mismatch)");
                            continue;
                        }
                        if let Some(candidate) = Candidate::from_response(&msg, t4) {
                            self.feed(&candidate);
                        }
                        if msg.msg_type == WallClockMessageType::ResponseWithFollowUp {
                            if pending_follow_ups.len() >= MAX_PENDING_FOLLOW_UPS {
                                pending_follow_ups.remove(0);
                            }
                            pending_follow_ups.push((msg, t4));
                        }
                        answered = true;
                    }
                }
            }

            let interval = self.algorithm.current_interval();
            let rest = interval.saturating_sub(round_start.elapsed());
            tokio::select! {
                _ = stop.notified() => return,
                _ = tokio::time::sleep(rest) => {}
            }
        }
        info!("wall-clock client stopped");
    }

    fn handle_follow_up(
        &mut self,
        msg: &WallClockMessage,
        pending: &mut Vec<(WallClockMessage, Nanos)>,
    ) {
        let Some(index) = pending
            .iter()
            .position(|(response, _)| msg.is_follow_up_of(response))
        else {
            debug!("follow-up with no matching response, dropping");
            return;
        };
        let (response, t4) = pending.remove(index);
        if let Some(candidate) = Candidate::from_response(&response, t4) {
            self.feed(&candidate.with_follow_up(msg));
        }
    }

    fn feed(&mut self, candidate: &Candidate) {
        if let Some(correlation) = self.algorithm.on_candidate(candidate) {
            self.clock.set_correlation(correlation);
        }
    }
}
