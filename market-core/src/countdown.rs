use crate::model::TimestampMs;

/// Remaining-time breakdown for a fixed end timestamp. Once the remaining
/// duration reaches zero the breakdown freezes at zero and `ended` is set;
/// the authoritative end state still comes from the backend's status field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Countdown {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    pub ended: bool,
}

pub fn remaining(end_ms: TimestampMs, now_ms: TimestampMs) -> Countdown {
    let left_ms = end_ms - now_ms;
    if left_ms <= 0 {
        return Countdown {
            ended: true,
            ..Countdown::default()
        };
    }
    let total_secs = left_ms / 1_000;
    Countdown {
        days: total_secs / 86_400,
        hours: (total_secs % 86_400) / 3_600,
        minutes: (total_secs % 3_600) / 60,
        seconds: total_secs % 60,
        ended: false,
    }
}

impl Countdown {
    /// Compact render used by the views, dropping leading zero fields.
    pub fn display(&self) -> String {
        if self.ended {
            return "ended".to_string();
        }
        if self.days > 0 {
            format!("{}d {:02}:{:02}:{:02}", self.days, self.hours, self.minutes, self.seconds)
        } else if self.hours > 0 {
            format!("{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
        } else {
            format!("{:02}:{:02}", self.minutes, self.seconds)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_remaining_is_ended() {
        let c = remaining(5_000, 5_000);
        assert!(c.ended);
        assert_eq!((c.days, c.hours, c.minutes, c.seconds), (0, 0, 0, 0));
    }

    #[test]
    fn past_end_stays_at_zero() {
        let c = remaining(5_000, 90_000);
        assert!(c.ended);
        assert_eq!((c.days, c.hours, c.minutes, c.seconds), (0, 0, 0, 0));
    }

    #[test]
    fn ninety_seconds_out() {
        let c = remaining(100_000, 10_000);
        assert!(!c.ended);
        assert_eq!(c.minutes, 1);
        assert_eq!(c.seconds, 30);
        assert_eq!(c.hours, 0);
        assert_eq!(c.days, 0);
    }

    #[test]
    fn breakdown_normalizes_days() {
        // 2 days, 3 hours, 4 minutes, 5 seconds
        let total = ((2 * 86_400) + (3 * 3_600) + (4 * 60) + 5) * 1_000;
        let c = remaining(total, 0);
        assert_eq!((c.days, c.hours, c.minutes, c.seconds), (2, 3, 4, 5));
    }

    #[test]
    fn display_drops_leading_fields() {
        assert_eq!(remaining(90_000, 0).display(), "01:30");
        assert_eq!(remaining(0, 0).display(), "ended");
    }
}
