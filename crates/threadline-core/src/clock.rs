//! Display times, server timestamp parsing, and temporary message ids.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Timelike, Utc};

use crate::model::MessageId;

/// Format a time as `H:MM`: hour unpadded, minute padded to two digits.
pub fn display_time<Tz: TimeZone>(at: &DateTime<Tz>) -> String {
    format!("{}:{:02}", at.hour(), at.minute())
}

/// Display time for an instant, in the local timezone.
pub fn local_display_time(at: DateTime<Utc>) -> String {
    display_time(&at.with_timezone(&Local))
}

/// Display time for "now".
pub fn now_display_time() -> String {
    display_time(&Local::now())
}

/// Parse a server `createdAt` value.
///
/// Accepts RFC 3339 and the offset-less ISO form the backend emits
/// (`2024-03-01T14:05:09.123456`), which is read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Issues temporary message ids.
///
/// Ids are wall-clock milliseconds, bumped to stay strictly increasing, so
/// they never repeat within a session and sort in creation order.
#[derive(Debug, Default, Clone)]
pub struct TempIdGenerator {
    last: i64,
}

impl TempIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> MessageId {
        let now = Utc::now().timestamp_millis();
        self.last = now.max(self.last + 1);
        MessageId::from(self.last)
    }
}
