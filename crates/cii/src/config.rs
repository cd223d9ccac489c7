use serde::{Deserialize, Serialize};

/// Default request path for the content-identification endpoint.
pub const DEFAULT_CII_PATH: &str = "/cii";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CiiServerConfig {
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for CiiServerConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
        }
    }
}

fn default_path() -> String {
    DEFAULT_CII_PATH.to_string()
}
