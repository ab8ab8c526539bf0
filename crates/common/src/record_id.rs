use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifier assigned by the stream broker to a record.
///
/// The broker encodes the append time as a millisecond timestamp plus a
/// per-millisecond sequence number (`"1700000000000-0"`). Because the
/// timestamp is fixed at append time, event ordering derived from it is
/// reproducible under reprocessing or delayed consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId {
    millis: i64,
    sequence: u64,
}

/// Error returned when a record id string does not have the
/// `<millis>-<sequence>` shape.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid record id: {raw}")]
pub struct RecordIdError {
    pub raw: String,
}

impl RecordId {
    /// Creates a record id from its timestamp and sequence parts.
    pub fn new(millis: i64, sequence: u64) -> Self {
        Self { millis, sequence }
    }

    /// Parses a broker-formatted id string (`"<millis>-<sequence>"`).
    pub fn parse(raw: &str) -> Result<Self, RecordIdError> {
        let err = || RecordIdError {
            raw: raw.to_string(),
        };

        let (millis, sequence) = raw.split_once('-').ok_or_else(err)?;
        Ok(Self {
            millis: millis.parse().map_err(|_| err())?,
            sequence: sequence.parse().map_err(|_| err())?,
        })
    }

    /// Returns the millisecond timestamp embedded in the id.
    pub fn millis(&self) -> i64 {
        self.millis
    }

    /// Returns the per-millisecond sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns the event time encoded in the id.
    ///
    /// This is the broker's append time, independent of when the record
    /// is actually processed.
    pub fn event_time(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.millis)
            .single()
            .unwrap_or_default()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.millis, self.sequence)
    }
}

impl std::str::FromStr for RecordId {
    type Err = RecordIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RecordId {
    type Error = RecordIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrips_through_display() {
        let id = RecordId::parse("1700000000000-7").unwrap();
        assert_eq!(id.millis(), 1_700_000_000_000);
        assert_eq!(id.sequence(), 7);
        assert_eq!(id.to_string(), "1700000000000-7");
    }

    #[test]
    fn parse_rejects_malformed_ids() {
        assert!(RecordId::parse("1700000000000").is_err());
        assert!(RecordId::parse("abc-0").is_err());
        assert!(RecordId::parse("1700000000000-x").is_err());
        assert!(RecordId::parse("").is_err());
    }

    #[test]
    fn event_time_comes_from_the_millisecond_prefix() {
        let id = RecordId::parse("1700000000000-0").unwrap();
        let expected = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        assert_eq!(id.event_time(), expected);
    }

    #[test]
    fn ordering_follows_millis_then_sequence() {
        let a = RecordId::new(1_700_000_000_000, 0);
        let b = RecordId::new(1_700_000_000_000, 1);
        let c = RecordId::new(1_700_000_000_001, 0);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn serde_uses_the_string_form() {
        let id = RecordId::new(1_700_000_000_000, 3);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"1700000000000-3\"");
        let back: RecordId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
