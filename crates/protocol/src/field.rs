use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Three-state optional field for JSON messages.
///
/// Wire-absent differs semantically from wire-`null` in these
/// protocols: an absent field in a state diff means "unchanged", while
/// `null` is a real value (e.g. "no content id right now"). A plain
/// `Option` cannot carry that distinction, so every optional message
/// field is a `Field`.
///
/// Use with `#[serde(default, skip_serializing_if = "Field::is_omitted")]`:
/// a missing key deserialises to `Omitted`, JSON `null` to `Null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Field<T> {
    #[default]
    Omitted,
    Null,
    Value(T),
}

impl<T> Field<T> {
    pub fn is_omitted(&self) -> bool {
        matches!(self, Field::Omitted)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Field::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Field::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Field::Value(value)
    }
}

impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            // Omitted fields are skipped by the container's
            // skip_serializing_if; reaching here is a schema bug.
            Field::Omitted => Err(serde::ser::Error::custom(
                "omitted field reached the serializer",
            )),
            Field::Null => serializer.serialize_none(),
            Field::Value(v) => v.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            None => Field::Null,
            Some(v) => Field::Value(v),
        })
    }
}

/// Serde adapters for nullable decimal-string integers.
///
/// Tick values and wall-clock nanoseconds travel as decimal ASCII
/// strings (`"834190"`), signed, 64-bit; `null` stays `null`.
pub mod opt_decimal_string {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.collect_str(v),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<i64>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(text) => text
                .parse::<i64>()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("not a decimal integer: {:?}", text))),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize, Default)]
    struct Probe {
        #[serde(default, skip_serializing_if = "Field::is_omitted")]
        name: Field<String>,
    }

    #[test]
    fn test_omitted_is_absent_on_the_wire() {
        let json = serde_json::to_string(&Probe {
            name: Field::Omitted,
        })
        .unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn test_null_and_value_round_trip() {
        let null_probe: Probe = serde_json::from_str(r#"{"name":null}"#).unwrap();
        assert_eq!(null_probe.name, Field::Null);
        assert_eq!(serde_json::to_string(&null_probe).unwrap(), r#"{"name":null}"#);

        let value_probe: Probe = serde_json::from_str(r#"{"name":"x"}"#).unwrap();
        assert_eq!(value_probe.name, Field::Value("x".to_string()));
    }

    #[test]
    fn test_absent_deserialises_to_omitted() {
        let probe: Probe = serde_json::from_str("{}").unwrap();
        assert!(probe.name.is_omitted());
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Ticks {
        #[serde(with = "opt_decimal_string")]
        t: Option<i64>,
    }

    #[test]
    fn test_decimal_string_round_trip() {
        let ticks: Ticks = serde_json::from_str(r#"{"t":"-834190"}"#).unwrap();
        assert_eq!(ticks.t, Some(-834190));
        assert_eq!(serde_json::to_string(&ticks).unwrap(), r#"{"t":"-834190"}"#);

        let null: Ticks = serde_json::from_str(r#"{"t":null}"#).unwrap();
        assert_eq!(null.t, None);
    }

    #[test]
    fn test_non_numeric_string_rejected() {
        assert!(serde_json::from_str::<Ticks>(r#"{"t":"12x"}"#).is_err());
    }
}
