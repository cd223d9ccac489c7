//! Client/server round trips over loopback UDP.

use std::sync::Arc;
use std::time::Duration;

use tandem_clocks::{ClockGraph, CorrelatedClock, SystemClock};
use tandem_core::Correlation;
use tandem_wallclock::{
    FilterAndPredict, LowestDispersion, MostRecent, RttThreshold, WallClockClient,
    WallClockClientConfig, WallClockServer, WallClockServerConfig,
};
use tokio::net::UdpSocket;

async fn run_exchange(server_config: WallClockServerConfig) -> CorrelatedClock {
    // Server side: its own graph reading the shared monotonic source.
    let server_graph = ClockGraph::new();
    let server_sys = SystemClock::with_precision(&server_graph, 1e9, 500.0, 1e-7);
    let server_socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
    let server_addr = server_socket.local_addr().unwrap();
    let server = WallClockServer::new(server_sys.as_clock(), server_config);
    tokio::spawn(async move {
        server.run(server_socket).await;
    });

    // Client side: wall clock starts wildly wrong on purpose.
    let client_graph = ClockGraph::new();
    let client_sys = SystemClock::with_precision(&client_graph, 1e9, 500.0, 1e-7);
    let wall = CorrelatedClock::new(&client_sys, 1e9, Correlation::new(0.0, -5_000_000_000.0));

    let mut config = WallClockClientConfig::new(server_addr);
    config.repeat = Duration::from_millis(50);
    config.timeout = Duration::from_millis(200);
    let algorithm = LowestDispersion::new(&wall, config.repeat);
    let client = WallClockClient::new(&wall, config, Box::new(algorithm));

    let client_socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
    let handle = client.start(client_socket);

    tokio::time::sleep(Duration::from_millis(500)).await;
    handle.stop();
    wall
}

#[tokio::test]
async fn client_converges_to_server_clock() {
    let wall = run_exchange(WallClockServerConfig::default()).await;

    // Same host, same monotonic source: after sync the wall clock reads
    // the shared time to well under the loopback round trip.
    let skew = (wall.nanos() - wall.parent().unwrap().nanos()).abs();
    assert!(
        skew < 50_000_000.0,
        "wall clock still {} ns from the measurement clock",
        skew
    );

    // The installed correlation carries real error bounds.
    let correlation = wall.correlation();
    assert!(correlation.initial_error > 0.0);
    assert!(correlation.error_growth_rate > 0.0);
    assert!(wall.dispersion_at_ticks(wall.ticks()).is_finite());
}

#[tokio::test]
async fn client_converges_with_follow_up_server() {
    let config = WallClockServerConfig {
        follow_up: true,
        ..WallClockServerConfig::default()
    };
    let wall = run_exchange(config).await;

    let skew = (wall.nanos() - wall.parent().unwrap().nanos()).abs();
    assert!(
        skew < 50_000_000.0,
        "wall clock still {} ns off in follow-up mode",
        skew
    );
}

#[tokio::test]
async fn filter_and_predict_pipeline_syncs() {
    let server_graph = ClockGraph::new();
    let server_sys = SystemClock::with_precision(&server_graph, 1e9, 500.0, 1e-7);
    let server_socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
    let server_addr = server_socket.local_addr().unwrap();
    let server = WallClockServer::new(server_sys.as_clock(), WallClockServerConfig::default());
    tokio::spawn(async move {
        server.run(server_socket).await;
    });

    let client_graph = ClockGraph::new();
    let client_sys = SystemClock::with_precision(&client_graph, 1e9, 500.0, 1e-7);
    let wall = CorrelatedClock::new(&client_sys, 1e9, Correlation::new(0.0, 3_000_000_000.0));

    let mut config = WallClockClientConfig::new(server_addr);
    config.repeat = Duration::from_millis(50);
    let algorithm = FilterAndPredict::new(
        &wall,
        config.repeat,
        vec![Box::new(RttThreshold::new(Duration::from_millis(100)))],
        Box::new(MostRecent),
    );
    let client = WallClockClient::new(&wall, config, Box::new(algorithm));
    let client_socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
    let handle = client.start(client_socket);

    tokio::time::sleep(Duration::from_millis(500)).await;
    handle.stop();

    let skew = (wall.nanos() - wall.parent().unwrap().nanos()).abs();
    assert!(skew < 50_000_000.0, "skew {} ns", skew);
}
