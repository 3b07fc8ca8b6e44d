use chrono::Utc;
use mw_types::ObsTime;

const VERSION_TS_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";
const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

pub trait Clock: Send + Sync {
    /// Current UTC wall time.
    fn now(&self) -> ObsTime;

    /// Path-safe version stamp, e.g. `2024-03-05T14-30-00`.
    fn version_ts(&self) -> String {
        format_version_ts(self.now())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> ObsTime {
        Utc::now().naive_utc()
    }
}

/// Always reports the same instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub ObsTime);

impl Clock for FixedClock {
    fn now(&self) -> ObsTime {
        self.0
    }
}

#[must_use]
pub fn format_version_ts(at: ObsTime) -> String {
    at.format(VERSION_TS_FORMAT).to_string()
}

/// ISO-8601 with a trailing `Z`.
#[must_use]
pub fn iso_utc(at: ObsTime) -> String {
    format!("{}Z", at.format(ISO_FORMAT))
}

#[cfg(test)]
mod tests {
    use mw_types::parse_obs_time;

    use super::{Clock, FixedClock, format_version_ts, iso_utc};

    #[test]
    fn fixed_clock_formats() {
        let at = parse_obs_time("2024-03-05T14:30:00").expect("ts");
        let clock = FixedClock(at);
        assert_eq!(clock.version_ts(), "2024-03-05T14-30-00");
        assert_eq!(format_version_ts(at), clock.version_ts());
        assert_eq!(iso_utc(at), "2024-03-05T14:30:00Z");
    }
}
