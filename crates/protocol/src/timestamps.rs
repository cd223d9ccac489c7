use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use tandem_core::Nanos;

use crate::error::ProtocolError;
use crate::field::opt_decimal_string;

/// A wall-clock time that may be open-ended.
///
/// The literal tokens `"plusinfinity"` and `"minusinfinity"` are legal
/// only in the earliest/latest slots of an [`AptEptLpt`] report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallTime {
    Nanos(Nanos),
    PlusInfinity,
    MinusInfinity,
}

impl Serialize for WallTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            WallTime::Nanos(n) => serializer.collect_str(n),
            WallTime::PlusInfinity => serializer.serialize_str("plusinfinity"),
            WallTime::MinusInfinity => serializer.serialize_str("minusinfinity"),
        }
    }
}

impl<'de> Deserialize<'de> for WallTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        match text.as_str() {
            "plusinfinity" => Ok(WallTime::PlusInfinity),
            "minusinfinity" => Ok(WallTime::MinusInfinity),
            other => other
                .parse::<i64>()
                .map(WallTime::Nanos)
                .map_err(|_| D::Error::custom(format!("not a wall-clock time: {:?}", other))),
        }
    }
}

/// A (content time, wall-clock time) pair, both nullable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timestamp {
    #[serde(with = "opt_decimal_string")]
    pub content_time: Option<i64>,
    #[serde(with = "opt_decimal_string")]
    pub wall_clock_time: Option<Nanos>,
}

impl Timestamp {
    pub fn new(content_time: Option<i64>, wall_clock_time: Option<Nanos>) -> Self {
        Self {
            content_time,
            wall_clock_time,
        }
    }
}

/// A timestamp whose wall-clock side may be open-ended; used for the
/// earliest/latest slots of an [`AptEptLpt`] report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenEndedTimestamp {
    #[serde(with = "opt_decimal_string")]
    pub content_time: Option<i64>,
    pub wall_clock_time: WallTime,
}

/// The timestamp the timeline-synchronisation server pushes: a
/// correlation between content time and wall-clock time plus the
/// current timeline speed.
///
/// `content_time` and `timeline_speed_multiplier` are `null` while the
/// requested timeline is unavailable; `wall_clock_time` always carries
/// the emission time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlTimestamp {
    #[serde(with = "opt_decimal_string")]
    pub content_time: Option<i64>,
    #[serde(with = "opt_decimal_string")]
    pub wall_clock_time: Option<Nanos>,
    #[serde(deserialize_with = "finite_or_null")]
    pub timeline_speed_multiplier: Option<f64>,
}

impl ControlTimestamp {
    pub fn new(
        content_time: Option<i64>,
        wall_clock_time: Option<Nanos>,
        timeline_speed_multiplier: Option<f64>,
    ) -> Result<Self, ProtocolError> {
        if let Some(speed) = timeline_speed_multiplier {
            if !speed.is_finite() {
                return Err(ProtocolError::SchemaViolation(format!(
                    "timeline speed multiplier must be finite, got {}",
                    speed
                )));
            }
        }
        Ok(Self {
            content_time,
            wall_clock_time,
            timeline_speed_multiplier,
        })
    }

    /// The "timeline unavailable" shape: null content time and speed,
    /// stamped with the current wall-clock time.
    pub fn unavailable(wall_clock_time: Nanos) -> Self {
        Self {
            content_time: None,
            wall_clock_time: Some(wall_clock_time),
            timeline_speed_multiplier: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.content_time.is_some() && self.timeline_speed_multiplier.is_some()
    }

    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

fn finite_or_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<f64>::deserialize(deserializer)?;
    if let Some(speed) = value {
        if !speed.is_finite() {
            return Err(D::Error::custom("timeline speed multiplier must be finite"));
        }
    }
    Ok(value)
}

/// Whether two control timestamps differ in any field.
pub fn is_control_timestamp_changed(new: &ControlTimestamp, old: &ControlTimestamp) -> bool {
    new != old
}

/// Client-side presentation timing report: actual, earliest and latest
/// presentation timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AptEptLpt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual: Option<Timestamp>,
    pub earliest: OpenEndedTimestamp,
    pub latest: OpenEndedTimestamp,
}

impl AptEptLpt {
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
