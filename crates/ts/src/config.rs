use serde::{Deserialize, Serialize};

/// Default request path for the timeline-synchronisation endpoint.
pub const DEFAULT_TS_PATH: &str = "/ts";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TsServerConfig {
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for TsServerConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
        }
    }
}

fn default_path() -> String {
    DEFAULT_TS_PATH.to_string()
}
