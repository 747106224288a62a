//! Snapshot (de)serialization.
//!
//! The whole collection is stored as a single JSON array of notes, each
//! embedding its version history. Timestamps are written as RFC 3339
//! strings with millisecond precision and revived into `DateTime<Utc>`.

use log::{debug, trace};

use crate::{NotesError, Note, Result};

/// Serializes the full collection into one snapshot string.
pub fn encode_notes(notes: &[Note]) -> Result<String> {
    trace!("Encoding snapshot of {} notes", notes.len());
    Ok(serde_json::to_string(notes)?)
}

/// Parses a snapshot string back into notes.
pub fn decode_notes(raw: &str) -> Result<Vec<Note>> {
    let notes: Vec<Note> = serde_json::from_str(raw)?;

    if let Some(note) = notes.iter().find(|n| n.id.is_empty()) {
        return Err(NotesError::InvalidFormat {
            message: format!("snapshot contains a note with an empty ID (title {:?})", note.title),
        });
    }

    debug!("Decoded snapshot of {} notes", notes.len());
    Ok(notes)
}

/// `serde(with)` adapter storing timestamps the way `Date.toISOString` does,
/// e.g. `2024-03-01T12:30:05.123Z`. Integer epoch milliseconds are accepted
/// on read as well.
pub mod iso_millis {
    use std::fmt;

    use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
    use serde::{de, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        deserializer.deserialize_any(TimestampVisitor)
    }

    struct TimestampVisitor;

    impl<'de> de::Visitor<'de> for TimestampVisitor {
        type Value = DateTime<Utc>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an RFC 3339 timestamp string or epoch milliseconds")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            DateTime::parse_from_rfc3339(value)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| E::custom(format!("invalid timestamp {:?}: {}", value, e)))
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
            Utc.timestamp_millis_opt(value)
                .single()
                .ok_or_else(|| E::custom(format!("timestamp out of range: {}", value)))
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
            let millis = i64::try_from(value)
                .map_err(|_| E::custom(format!("timestamp out of range: {}", value)))?;
            self.visit_i64(millis)
        }
    }
}
