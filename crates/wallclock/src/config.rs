use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default UDP port for the wall-clock protocol.
pub const DEFAULT_WALL_CLOCK_PORT: u16 = 6677;

/// Client-side timing knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallClockClientConfig {
    /// Server to query.
    pub server: SocketAddr,
    /// Interval between request rounds.
    #[serde(default = "default_repeat")]
    pub repeat: Duration,
    /// How long to wait for a response before writing the round off.
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
}

impl WallClockClientConfig {
    pub fn new(server: SocketAddr) -> Self {
        Self {
            server,
            repeat: default_repeat(),
            timeout: default_timeout(),
        }
    }
}

fn default_repeat() -> Duration {
    Duration::from_secs(1)
}

fn default_timeout() -> Duration {
    Duration::from_millis(200)
}

/// Server-side configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WallClockServerConfig {
    /// Advertised maximum frequency error of the server clock, ppm.
    #[serde(default = "default_max_freq_error_ppm")]
    pub max_freq_error_ppm: f64,
    /// Override the measured precision (seconds).
    #[serde(default)]
    pub precision_secs: Option<f64>,
    /// Send type-2 responses followed by a type-3 follow-up carrying
    /// the post-transmission timestamp.
    #[serde(default)]
    pub follow_up: bool,
}

impl Default for WallClockServerConfig {
    fn default() -> Self {
        Self {
            max_freq_error_ppm: default_max_freq_error_ppm(),
            precision_secs: None,
            follow_up: false,
        }
    }
}

fn default_max_freq_error_ppm() -> f64 {
    500.0
}
