use chrono::{DateTime, DurationRound, TimeDelta, Utc};

/// Drop seconds and sub-second precision
pub fn floor_to_minute(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.duration_trunc(TimeDelta::minutes(1)).unwrap_or(dt)
}

/// Discord timestamp markup, rendered in each reader's own timezone.
///
/// `style` is one of Discord's format letters (`t`, `T`, `d`, `D`, `f`, `F`, `R`).
pub fn discord_timestamp(dt: DateTime<Utc>, style: char) -> String {
    format!("<t:{}:{}>", dt.timestamp(), style)
}

/// Human readable length of a pass, e.g. "2m 05s"
pub fn format_elapsed(elapsed: std::time::Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}.{:03}s", secs, elapsed.subsec_millis())
    }
}
