use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, info, warn};
use tandem_clocks::Clock;
use tandem_core::Nanos;
use tandem_ports::Datagram;
use tandem_protocol::{WallClockMessage, WallClockMessageType};

use crate::config::WallClockServerConfig;

/// Wall-clock request handler.
///
/// Stamps the receive timestamp as soon as the datagram surfaces and
/// the transmit timestamp as late as possible before the reply goes
/// out. In follow-up mode the reply is type 2, chased by a type-3
/// follow-up carrying a post-transmission measurement of `t3`.
pub struct WallClockServer {
    clock: Clock,
    config: WallClockServerConfig,
    precision_exp: i8,
}

impl WallClockServer {
    pub fn new(clock: &Clock, config: WallClockServerConfig) -> Self {
        let precision_secs = config
            .precision_secs
            .unwrap_or_else(|| clock.root_precision_secs());
        Self {
            clock: clock.clone(),
            precision_exp: WallClockMessage::precision_exponent_for(precision_secs),
            config,
        }
    }

    fn clock_nanos(&self) -> Nanos {
        self.clock.nanos() as Nanos
    }

    /// Serve requests until the task is dropped. One unconnected socket
    /// serves any number of clients.
    pub async fn run(&self, transport: Arc<dyn Datagram>) {
        info!("wall-clock server running");
        let mut buf = [0u8; 512];
        loop {
            match transport.recv_from(&mut buf).await {
                Ok((len, from)) => {
                    let t2 = self.clock_nanos();
                    self.handle_datagram(&buf[..len], t2, from, transport.as_ref())
                        .await;
                }
                Err(e) => {
                    warn!("receive failed: {}", e);
                }
            }
        }
    }

    pub(crate) async fn handle_datagram(
        &self,
        data: &[u8],
        t2: Nanos,
        from: SocketAddr,
        transport: &dyn Datagram,
    ) {
        let msg = match WallClockMessage::decode(data) {
            Ok(msg) => msg,
            Err(e) => {
                warn!("dropping malformed datagram from {}: {}", from, e);
                return;
            }
        };
        if msg.msg_type != WallClockMessageType::Request {
            debug!("ignoring non-request message type from {}", from);
            return;
        }

        let reply_type = if self.config.follow_up {
            WallClockMessageType::ResponseWithFollowUp
        } else {
            WallClockMessageType::Response
        };

        // Transmit timestamp as close to the send as we can manage.
        let t3 = self.clock_nanos();
        let response = WallClockMessage::response(
            &msg,
            reply_type,
            self.precision_exp,
            self.config.max_freq_error_ppm,
            t2,
            t3,
        );
        if let Err(e) = transport.send_to(&response.encode(), from).await {
            warn!("response send to {} failed: {}", from, e);
            return;
        }

        if self.config.follow_up {
            // Authoritative post-transmission measurement.
            let follow_up = WallClockMessage {
                msg_type: WallClockMessageType::FollowUp,
                transmit: self.clock_nanos(),
                ..response
            };
            if let Err(e) = transport.send_to(&follow_up.encode(), from).await {
                warn!("follow-up send to {} failed: {}", from, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use tandem_clocks::{ClockGraph, SystemClock};

    use super::*;

    struct CapturingDatagram {
        sent: StdMutex<Vec<(Vec<u8>, SocketAddr)>>,
    }

    impl CapturingDatagram {
        fn new() -> Self {
            Self {
                sent: StdMutex::new(Vec::new()),
            }
        }

        fn sent(&self) -> Vec<(Vec<u8>, SocketAddr)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Datagram for CapturingDatagram {
        async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
            self.sent.lock().unwrap().push((buf.to_vec(), target));
            Ok(buf.len())
        }

        async fn recv_from(&self, _buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            std::future::pending().await
        }
    }

    fn server(follow_up: bool) -> WallClockServer {
        let graph = ClockGraph::new();
        let sys = SystemClock::with_precision(&graph, 1e9, 500.0, 1e-7);
        WallClockServer::new(
            sys.as_clock(),
            WallClockServerConfig {
                max_freq_error_ppm: 250.0,
                precision_secs: Some(1e-6),
                follow_up,
            },
        )
    }

    fn client_addr() -> SocketAddr {
        "192.0.2.10:50000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_response_echoes_originate_and_orders_timestamps() {
        let server = server(false);
        let transport = CapturingDatagram::new();

        let request = WallClockMessage::request(116_012_000_000).encode();
        let t2 = server.clock_nanos();
        server
            .handle_datagram(&request, t2, client_addr(), &transport)
            .await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, client_addr());

        let response = WallClockMessage::decode(&sent[0].0).unwrap();
        assert_eq!(response.msg_type, WallClockMessageType::Response);
        assert_eq!(response.originate, 116_012_000_000);
        assert_eq!(response.receive, t2);
        assert!(response.transmit >= response.receive);
        assert_eq!(response.max_freq_error_ppm, 250.0);
        // Advertised precision is the covering power of two.
        assert!(response.precision_secs() >= 1e-6);
        assert!(response.precision_secs() < 2e-6);
    }

    #[tokio::test]
    async fn test_follow_up_mode_sends_both_frames() {
        let server = server(true);
        let transport = CapturingDatagram::new();

        let request = WallClockMessage::request(42).encode();
        let t2 = server.clock_nanos();
        server
            .handle_datagram(&request, t2, client_addr(), &transport)
            .await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);

        let response = WallClockMessage::decode(&sent[0].0).unwrap();
        let follow_up = WallClockMessage::decode(&sent[1].0).unwrap();
        assert_eq!(
            response.msg_type,
            WallClockMessageType::ResponseWithFollowUp
        );
        assert_eq!(follow_up.msg_type, WallClockMessageType::FollowUp);
        assert!(follow_up.is_follow_up_of(&response));
        assert!(follow_up.transmit >= response.transmit);
    }

    #[tokio::test]
    async fn test_non_request_and_garbage_dropped() {
        let server = server(false);
        let transport = CapturingDatagram::new();

        let response_in = WallClockMessage {
            msg_type: WallClockMessageType::Response,
            ..WallClockMessage::request(1)
        }
        .encode();
        server
            .handle_datagram(&response_in, 0, client_addr(), &transport)
            .await;
        server
            .handle_datagram(&[0u8; 8], 0, client_addr(), &transport)
            .await;

        assert!(transport.sent().is_empty());
    }
}
