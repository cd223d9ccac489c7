use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ProtocolError;
use crate::field::Field;

/// Protocol version this implementation speaks on the CII channel.
pub const CII_PROTOCOL_VERSION: &str = "1.1";

/// Whether the advertised content id is settled or still resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentIdStatus {
    Partial,
    Final,
}

/// Presentation status: a primary token plus free-form extensions.
///
/// Serialised as a single space-separated string; the first token must
/// be one of `okay`, `transitioning`, `fault`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationStatus {
    tokens: Vec<String>,
}

impl PresentationStatus {
    const PRIMARY: [&'static str; 3] = ["okay", "transitioning", "fault"];

    pub fn new(tokens: Vec<String>) -> Result<Self, ProtocolError> {
        match tokens.first() {
            Some(first) if Self::PRIMARY.contains(&first.as_str()) => Ok(Self { tokens }),
            Some(first) => Err(ProtocolError::SchemaViolation(format!(
                "presentation status must begin with okay/transitioning/fault, got {:?}",
                first
            ))),
            None => Err(ProtocolError::SchemaViolation(
                "presentation status must not be empty".to_string(),
            )),
        }
    }

    pub fn okay() -> Self {
        Self {
            tokens: vec!["okay".to_string()],
        }
    }

    pub fn transitioning() -> Self {
        Self {
            tokens: vec!["transitioning".to_string()],
        }
    }

    pub fn fault() -> Self {
        Self {
            tokens: vec!["fault".to_string()],
        }
    }

    pub fn primary(&self) -> &str {
        &self.tokens[0]
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

impl Serialize for PresentationStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.tokens.join(" "))
    }
}

impl<'de> Deserialize<'de> for PresentationStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        let tokens: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        Self::new(tokens).map_err(D::Error::custom)
    }
}

/// One timeline the server offers for synchronisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineOption {
    pub timeline_selector: String,
    pub units_per_tick: u64,
    pub units_per_second: u64,
    /// Achievable accuracy in seconds, if the server knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private: Option<Vec<serde_json::Value>>,
}

impl TimelineOption {
    pub fn new(timeline_selector: impl Into<String>, units_per_tick: u64, units_per_second: u64) -> Self {
        Self {
            timeline_selector: timeline_selector.into(),
            units_per_tick,
            units_per_second,
            accuracy: None,
            private: None,
        }
    }
}

/// Content identification and other information: the state record the
/// CII server pushes.
///
/// Every field is optional on the wire; a field absent from a message
/// leaves the client's cumulative state untouched, which is what makes
/// differential updates work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cii {
    #[serde(default, skip_serializing_if = "Field::is_omitted")]
    pub protocol_version: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_omitted")]
    pub content_id: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_omitted")]
    pub content_id_status: Field<ContentIdStatus>,

    #[serde(default, skip_serializing_if = "Field::is_omitted")]
    pub presentation_status: Field<PresentationStatus>,

    #[serde(default, skip_serializing_if = "Field::is_omitted")]
    pub mrs_url: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_omitted")]
    pub ts_url: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_omitted")]
    pub wc_url: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_omitted")]
    pub te_url: Field<String>,

    #[serde(default, skip_serializing_if = "Field::is_omitted")]
    pub timelines: Field<Vec<TimelineOption>>,

    #[serde(default, skip_serializing_if = "Field::is_omitted")]
    pub private: Field<Vec<serde_json::Value>>,
}

impl Cii {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Fields set in `newer` that differ from this record, as a new
    /// record with everything else omitted. Broadcasting the diff after
    /// each state commit is what keeps client traffic small.
    pub fn diff(&self, newer: &Cii) -> Cii {
        fn pick<T: Clone + PartialEq>(old: &Field<T>, new: &Field<T>) -> Field<T> {
            if !new.is_omitted() && new != old {
                new.clone()
            } else {
                Field::Omitted
            }
        }

        Cii {
            protocol_version: pick(&self.protocol_version, &newer.protocol_version),
            content_id: pick(&self.content_id, &newer.content_id),
            content_id_status: pick(&self.content_id_status, &newer.content_id_status),
            presentation_status: pick(&self.presentation_status, &newer.presentation_status),
            mrs_url: pick(&self.mrs_url, &newer.mrs_url),
            ts_url: pick(&self.ts_url, &newer.ts_url),
            wc_url: pick(&self.wc_url, &newer.wc_url),
            te_url: pick(&self.te_url, &newer.te_url),
            timelines: pick(&self.timelines, &newer.timelines),
            private: pick(&self.private, &newer.private),
        }
    }

    /// Apply a patch: non-omitted fields overwrite, omitted fields
    /// leave the current value alone. Returns the wire names of the
    /// fields whose value actually changed.
    pub fn merge(&mut self, patch: &Cii) -> Vec<&'static str> {
        fn apply<T: Clone + PartialEq>(
            current: &mut Field<T>,
            incoming: &Field<T>,
            name: &'static str,
            changed: &mut Vec<&'static str>,
        ) {
            if !incoming.is_omitted() && incoming != current {
                *current = incoming.clone();
                changed.push(name);
            }
        }

        let mut changed = Vec::new();
        apply(&mut self.protocol_version, &patch.protocol_version, "protocolVersion", &mut changed);
        apply(&mut self.content_id, &patch.content_id, "contentId", &mut changed);
        apply(&mut self.content_id_status, &patch.content_id_status, "contentIdStatus", &mut changed);
        apply(&mut self.presentation_status, &patch.presentation_status, "presentationStatus", &mut changed);
        apply(&mut self.mrs_url, &patch.mrs_url, "mrsUrl", &mut changed);
        apply(&mut self.ts_url, &patch.ts_url, "tsUrl", &mut changed);
        apply(&mut self.wc_url, &patch.wc_url, "wcUrl", &mut changed);
        apply(&mut self.te_url, &patch.te_url, "teUrl", &mut changed);
        apply(&mut self.timelines, &patch.timelines, "timelines", &mut changed);
        apply(&mut self.private, &patch.private, "private", &mut changed);
        changed
    }

    /// Whether nothing is set: the serialisation would be `{}`.
    pub fn is_empty(&self) -> bool {
        self.protocol_version.is_omitted()
            && self.content_id.is_omitted()
            && self.content_id_status.is_omitted()
            && self.presentation_status.is_omitted()
            && self.mrs_url.is_omitted()
            && self.ts_url.is_omitted()
            && self.wc_url.is_omitted()
            && self.te_url.is_omitted()
            && self.timelines.is_omitted()
            && self.private.is_omitted()
    }
}
