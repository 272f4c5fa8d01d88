//! Approximate-time matching of two independently arriving channels.

use std::time::Duration;
use tracing::debug;

use crate::{buffer::Buffer, types::WithTimestamp};

/// Which side of a [`PairSynchronizer`] a message belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    First,
    Second,
}

/// Matches messages of two channels whose timestamps lie within a
/// tolerance of each other.
///
/// # Algorithm
///
/// After every push the synchronizer looks at all queued candidates:
/// 1. Among every (first, second) combination within `tolerance`, pick the
///    one with the smallest stamp difference (the earliest on ties). Such a
///    pair has no better partner queued on either side.
/// 2. Remove both messages and advance the commit timestamp to the earlier
///    stamp of the pair. Queued messages before the commit timestamp can no
///    longer be paired and are dropped.
/// 3. Messages arriving with a stamp before the commit timestamp are late
///    and rejected.
///
/// Each queue holds at most `queue_size` messages; overflow evicts the
/// oldest one.
#[derive(Debug)]
pub struct PairSynchronizer<A, B>
where
    A: WithTimestamp,
    B: WithTimestamp,
{
    first: Buffer<A>,
    second: Buffer<B>,
    tolerance: Duration,
    commit_ts: Option<Duration>,
    pairs_emitted: u64,
    late_rejected: u64,
    dropped: u64,
}

impl<A, B> PairSynchronizer<A, B>
where
    A: WithTimestamp,
    B: WithTimestamp,
{
    pub fn new(queue_size: usize, tolerance: Duration) -> Self {
        Self {
            first: Buffer::with_capacity(queue_size),
            second: Buffer::with_capacity(queue_size),
            tolerance,
            commit_ts: None,
            pairs_emitted: 0,
            late_rejected: 0,
            dropped: 0,
        }
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Queue a message of the first channel. A rejected message is handed
    /// back.
    pub fn push_first(&mut self, item: A) -> Result<(), A> {
        if self.is_late(item.timestamp(), Side::First) {
            return Err(item);
        }
        match self.first.try_push(item) {
            Ok(evicted) => {
                self.record_eviction(evicted.is_some(), Side::First);
                Ok(())
            }
            Err(item) => {
                self.record_out_of_order(item.timestamp(), Side::First);
                Err(item)
            }
        }
    }

    /// Queue a message of the second channel. A rejected message is handed
    /// back.
    pub fn push_second(&mut self, item: B) -> Result<(), B> {
        if self.is_late(item.timestamp(), Side::Second) {
            return Err(item);
        }
        match self.second.try_push(item) {
            Ok(evicted) => {
                self.record_eviction(evicted.is_some(), Side::Second);
                Ok(())
            }
            Err(item) => {
                self.record_out_of_order(item.timestamp(), Side::Second);
                Err(item)
            }
        }
    }

    /// Try to form the best pair among the queued messages.
    pub fn try_match(&mut self) -> Option<(A, B)> {
        let (first_idx, second_idx) = self.best_candidate()?;

        let first = self.first.remove(first_idx)?;
        let second = self.second.remove(second_idx)?;

        let commit_ts = first.timestamp().min(second.timestamp());
        self.commit_ts = Some(commit_ts);

        let stale = self.first.drop_before(commit_ts) + self.second.drop_before(commit_ts);
        if stale > 0 {
            debug!(count = stale, commit_ts = ?commit_ts, "Dropped messages older than the matched pair");
        }
        self.dropped += stale as u64;
        self.pairs_emitted += 1;

        debug!(
            pair_num = self.pairs_emitted,
            first_ts = ?first.timestamp(),
            second_ts = ?second.timestamp(),
            "Emitting synchronized pair"
        );

        Some((first, second))
    }

    /// Drain every pair that can currently be formed, in match order.
    pub fn drain_matches(&mut self) -> Vec<(A, B)> {
        std::iter::from_fn(|| self.try_match()).collect()
    }

    /// Indices of the closest (first, second) combination within tolerance.
    fn best_candidate(&self) -> Option<(usize, usize)> {
        self.first
            .iter()
            .enumerate()
            .flat_map(|(i, a)| {
                self.second.iter().enumerate().map(move |(j, b)| {
                    let (ta, tb) = (a.timestamp(), b.timestamp());
                    (ta.abs_diff(tb), ta.min(tb), i, j)
                })
            })
            .filter(|&(diff, ..)| diff <= self.tolerance)
            .min_by_key(|&(diff, earliest, ..)| (diff, earliest))
            .map(|(.., i, j)| (i, j))
    }

    fn is_late(&mut self, timestamp: Duration, side: Side) -> bool {
        match self.commit_ts {
            Some(commit_ts) if timestamp < commit_ts => {
                self.late_rejected += 1;
                debug!(?side, msg_ts = ?timestamp, commit_ts = ?commit_ts, "Rejected late message");
                true
            }
            _ => false,
        }
    }

    fn record_out_of_order(&mut self, timestamp: Duration, side: Side) {
        self.late_rejected += 1;
        debug!(?side, msg_ts = ?timestamp, "Rejected message not newer than its predecessor");
    }

    fn record_eviction(&mut self, evicted: bool, side: Side) {
        if evicted {
            self.dropped += 1;
            debug!(?side, "Dropped oldest message due to queue overflow");
        }
    }

    /// Get synchronization statistics.
    pub fn stats(&self) -> SyncStats {
        SyncStats {
            pairs_emitted: self.pairs_emitted,
            late_rejected: self.late_rejected,
            dropped: self.dropped,
            commit_ts: self.commit_ts,
            queued_first: self.first.len(),
            queued_second: self.second.len(),
        }
    }
}

/// Lifetime statistics of a [`PairSynchronizer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Number of synchronized pairs emitted.
    pub pairs_emitted: u64,

    /// Number of late or out-of-order messages rejected.
    pub late_rejected: u64,

    /// Number of messages dropped on overflow or left behind by a match.
    pub dropped: u64,

    /// Stamp below which messages are rejected.
    pub commit_ts: Option<Duration>,

    pub queued_first: usize,
    pub queued_second: usize,
}
