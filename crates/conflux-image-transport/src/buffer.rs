use crate::types::WithTimestamp;
use std::{collections::VecDeque, time::Duration};

/// A bounded queue of messages with monotonically increasing timestamps.
///
/// Pushing onto a full buffer evicts the oldest message.
#[derive(Debug)]
pub struct Buffer<T>
where
    T: WithTimestamp,
{
    buffer: VecDeque<T>,
    capacity: usize,
    last_ts: Option<Duration>,
}

impl<T> Buffer<T>
where
    T: WithTimestamp,
{
    /// Create a buffer holding at most `capacity` messages (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            last_ts: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn front(&self) -> Option<&T> {
        self.buffer.front()
    }

    pub fn back(&self) -> Option<&T> {
        self.buffer.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buffer.iter()
    }

    pub fn remove(&mut self, index: usize) -> Option<T> {
        self.buffer.remove(index)
    }

    /// Drops messages before a specific timestamp and returns the
    /// number of dropped messages.
    pub fn drop_before(&mut self, ts: Duration) -> usize {
        let mut count = 0;

        while let Some(front) = self.buffer.front() {
            if front.timestamp() >= ts {
                break;
            }
            self.buffer.pop_front();
            count += 1;
        }

        count
    }

    /// Try to push a message into the buffer.
    ///
    /// A message whose timestamp is not above that of the previously
    /// inserted message is handed back in `Err`. Otherwise the message is
    /// stored, and if the buffer overflowed the evicted oldest message is
    /// returned in `Ok(Some(_))`.
    pub fn try_push(&mut self, item: T) -> Result<Option<T>, T> {
        let timestamp = item.timestamp();

        match self.last_ts {
            Some(last_ts) if last_ts >= timestamp => return Err(item),
            _ => {}
        }

        let evicted = if self.buffer.len() >= self.capacity {
            self.buffer.pop_front()
        } else {
            None
        };

        self.last_ts = Some(timestamp);
        self.buffer.push_back(item);
        Ok(evicted)
    }
}
