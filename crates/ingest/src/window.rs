use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use skytrack_core::config::WindowMode;
use skytrack_core::Window;

/// How each attempt chooses the window it targets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WindowPolicy {
    /// Point-in-time snapshot: `start == end == now`.
    #[default]
    Snapshot,
    /// `end` is `now` rounded down to a multiple of `interval` since the
    /// epoch, `start = end - span`.
    Aligned { interval: Duration, span: Duration },
}

impl WindowPolicy {
    pub fn from_mode(mode: WindowMode, interval_secs: u64) -> Self {
        match mode {
            WindowMode::Snapshot => WindowPolicy::Snapshot,
            WindowMode::Aligned { span_secs } => WindowPolicy::Aligned {
                interval: Duration::from_secs(interval_secs.max(1)),
                span: Duration::from_secs(span_secs),
            },
        }
    }

    pub fn current(&self) -> Window {
        self.window_at(Utc::now())
    }

    pub fn window_at(&self, now: DateTime<Utc>) -> Window {
        match *self {
            WindowPolicy::Snapshot => Window::instant(now),
            WindowPolicy::Aligned { interval, span } => {
                let step = interval.as_secs().max(1) as i64;
                let aligned = now.timestamp().div_euclid(step) * step;
                let end = Utc.timestamp_opt(aligned, 0).single().unwrap_or(now);
                let span = chrono::Duration::from_std(span).unwrap_or_else(|_| chrono::Duration::zero());
                let start = end.checked_sub_signed(span).unwrap_or(end);
                Window::new(start, end).unwrap_or_else(|_| Window::instant(end))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_zero_width() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 42).unwrap();
        let w = WindowPolicy::Snapshot.window_at(now);
        assert_eq!(w.start(), now);
        assert_eq!(w.end(), now);
    }

    #[test]
    fn aligned_rounds_down_to_interval() {
        let policy = WindowPolicy::Aligned {
            interval: Duration::from_secs(300),
            span: Duration::from_secs(300),
        };
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 7, 42).unwrap();
        let w = policy.window_at(now);
        assert_eq!(w.end(), Utc.with_ymd_and_hms(2025, 3, 1, 12, 5, 0).unwrap());
        assert_eq!(w.start(), Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn from_mode_maps_config() {
        assert_eq!(WindowPolicy::from_mode(WindowMode::Snapshot, 60), WindowPolicy::Snapshot);
        assert_eq!(
            WindowPolicy::from_mode(WindowMode::Aligned { span_secs: 120 }, 60),
            WindowPolicy::Aligned {
                interval: Duration::from_secs(60),
                span: Duration::from_secs(120),
            }
        );
    }
}
