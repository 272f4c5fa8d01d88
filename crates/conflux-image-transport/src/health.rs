//! Synchronization health check of a camera subscription.

use std::time::Duration;

/// A channel is reported as skewed when it received more than this many
/// messages per matched pair during one interval.
pub const SKEW_FACTOR: u64 = 3;

/// Arrival counters accumulated over one check interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncCounters {
    pub images: u64,
    pub infos: u64,
    pub pairs: u64,
}

impl SyncCounters {
    /// Return the current counts and reset all of them to zero.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    pub fn is_idle(&self) -> bool {
        *self == Self::default()
    }
}

/// A skew diagnostic for one interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkewReport {
    pub image_topic: String,
    pub info_topic: String,
    pub counters: SyncCounters,
    pub interval: Duration,
}

impl SkewReport {
    /// Human readable warning text.
    pub fn message(&self) -> String {
        format!(
            "The time synchronizer on topics '{}' and '{}' was unable to pair many messages \
             over the last {:?}: images received {}, camera infos received {}, pairs matched {}. \
             Check that both topics are published by co-timed sources.",
            self.image_topic,
            self.info_topic,
            self.interval,
            self.counters.images,
            self.counters.infos,
            self.counters.pairs,
        )
    }
}

/// Decides whether an interval's counters indicate that the two channels
/// are not co-timed.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    image_topic: String,
    info_topic: String,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(image_topic: impl Into<String>, info_topic: impl Into<String>, interval: Duration) -> Self {
        Self {
            image_topic: image_topic.into(),
            info_topic: info_topic.into(),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Inspect one interval's counters. Idle channels never warn since the
    /// threshold is zero and no count exceeds it.
    pub fn check(&self, counters: &SyncCounters) -> Option<SkewReport> {
        let threshold = SKEW_FACTOR.saturating_mul(counters.pairs);

        if counters.images > threshold || counters.infos > threshold {
            Some(SkewReport {
                image_topic: self.image_topic.clone(),
                info_topic: self.info_topic.clone(),
                counters: *counters,
                interval: self.interval,
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> HealthMonitor {
        HealthMonitor::new("/camera/image", "/camera/camera_info", Duration::from_secs(1))
    }

    fn counters(images: u64, infos: u64, pairs: u64) -> SyncCounters {
        SyncCounters {
            images,
            infos,
            pairs,
        }
    }

    #[test]
    fn test_warns_when_both_channels_exceed_threshold() {
        let report = monitor().check(&counters(100, 100, 10)).unwrap();

        assert_eq!(report.counters, counters(100, 100, 10));
        let message = report.message();
        assert!(message.contains("/camera/image"));
        assert!(message.contains("/camera/camera_info"));
        assert!(message.contains("images received 100"));
        assert!(message.contains("camera infos received 100"));
        assert!(message.contains("pairs matched 10"));
    }

    #[test]
    fn test_warns_when_one_channel_exceeds_threshold() {
        assert!(monitor().check(&counters(31, 10, 10)).is_some());
        assert!(monitor().check(&counters(10, 31, 10)).is_some());
    }

    #[test]
    fn test_quiet_below_threshold() {
        assert!(monitor().check(&counters(20, 22, 10)).is_none());
        assert!(monitor().check(&counters(30, 30, 10)).is_none());
    }

    #[test]
    fn test_quiet_when_idle() {
        let idle = SyncCounters::default();
        assert!(idle.is_idle());
        assert!(monitor().check(&idle).is_none());
    }

    #[test]
    fn test_unpaired_traffic_warns() {
        assert!(monitor().check(&counters(1, 0, 0)).is_some());
    }

    #[test]
    fn test_take_resets_counters() {
        let mut current = counters(5, 6, 2);

        let snapshot = current.take();
        assert_eq!(snapshot, counters(5, 6, 2));
        assert!(current.is_idle());

        current.images += 1;
        assert_eq!(current.take(), counters(1, 0, 0));
    }
}
