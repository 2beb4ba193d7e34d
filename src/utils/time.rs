use chrono::Duration;

/// Converts a monotonic duration into the signed duration used for accounting. Saturates on
/// values chrono can't represent, which only happens for nonsensical clocks.
pub fn to_delta(duration: std::time::Duration) -> Duration {
    Duration::from_std(duration).unwrap_or(Duration::MAX)
}

/// Seconds with millisecond precision, for display and serialization.
pub fn as_seconds(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / 1000.
}

pub fn format_duration(v: Duration) -> String {
    if v.num_hours() > 0 {
        format!(
            "{}h{}m{}s",
            v.num_hours(),
            v.num_minutes() % 60,
            v.num_seconds() % 60
        )
    } else if v.num_minutes() > 0 {
        format!("{}m{}s", v.num_minutes() % 60, v.num_seconds() % 60)
    } else {
        format!("{}s", v.num_seconds() % 60)
    }
}

/// Serializes a [Duration] as fractional seconds.
pub mod seconds_ser {
    use chrono::Duration;
    use serde::Serializer;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(super::as_seconds(*duration))
    }
}
