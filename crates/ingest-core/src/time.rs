use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use time::{Duration, OffsetDateTime};

/// A UTC instant carried end-to-end through the pipeline, serialized as
/// RFC 3339 at every boundary (MQTT payload fields, history documents,
/// FHIR `effectiveDateTime`/`issued`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant(pub OffsetDateTime);

impl Instant {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    pub fn from_unix(seconds: i64) -> Option<Self> {
        OffsetDateTime::from_unix_timestamp(seconds).ok().map(Self)
    }

    pub fn inner(&self) -> OffsetDateTime {
        self.0
    }

    /// Clamps `self` into `[received - max_past, received + max_future]`,
    /// returning whether clamping occurred (spec §3.1 effective_time invariant).
    pub fn clamp_to_window(&self, received: Instant, max_past: Duration, max_future: Duration) -> (Instant, bool) {
        let earliest = received.0 - max_past;
        let latest = received.0 + max_future;
        if self.0 < earliest {
            (Instant(earliest), true)
        } else if self.0 > latest {
            (Instant(latest), true)
        } else {
            (*self, false)
        }
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = self
            .0
            .format(&time::format_description::well_known::Rfc3339)
            .map_err(|_| fmt::Error)?;
        write!(f, "{formatted}")
    }
}

impl FromStr for Instant {
    type Err = time::error::Parse;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339).map(Instant)
    }
}

impl Serialize for Instant {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let formatted = self
            .0
            .format(&time::format_description::well_known::Rfc3339)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&formatted)
    }
}

impl<'de> Deserialize<'de> for Instant {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Instant::from_str(&s).map_err(serde::de::Error::custom)
    }
}

pub fn now_utc() -> Instant {
    Instant::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_future_drift_beyond_24h() {
        let received = Instant::now();
        let far_future = Instant(received.0 + Duration::hours(25));
        let (clamped, warned) = far_future.clamp_to_window(received, Duration::days(30), Duration::hours(24));
        assert!(warned);
        assert_eq!(clamped.0, received.0 + Duration::hours(24));
    }

    #[test]
    fn clamps_past_drift_beyond_30d() {
        let received = Instant::now();
        let far_past = Instant(received.0 - Duration::days(31));
        let (clamped, warned) = far_past.clamp_to_window(received, Duration::days(30), Duration::hours(24));
        assert!(warned);
        assert_eq!(clamped.0, received.0 - Duration::days(30));
    }

    #[test]
    fn within_window_is_unchanged() {
        let received = Instant::now();
        let effective = Instant(received.0 - Duration::days(29));
        let (clamped, warned) = effective.clamp_to_window(received, Duration::days(30), Duration::hours(24));
        assert!(!warned);
        assert_eq!(clamped.0, effective.0);
    }

    #[test]
    fn round_trips_through_rfc3339() {
        let i = Instant::now();
        let s = i.to_string();
        let parsed: Instant = s.parse().unwrap();
        assert_eq!(i.0.unix_timestamp(), parsed.0.unix_timestamp());
    }
}
