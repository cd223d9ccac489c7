use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// The first frame a timeline-synchronisation client sends: which
/// content it cares about and which timeline it wants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupData {
    /// Leftmost-prefix match against the server's current content id,
    /// respecting URI component boundaries.
    pub content_id_stem: String,
    pub timeline_selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<Vec<serde_json::Value>>,
}

impl SetupData {
    pub fn new(content_id_stem: impl Into<String>, timeline_selector: impl Into<String>) -> Self {
        Self {
            content_id_stem: content_id_stem.into(),
            timeline_selector: timeline_selector.into(),
            private: None,
        }
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
