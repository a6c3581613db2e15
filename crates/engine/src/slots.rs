use std::collections::VecDeque;

use chrono::{DateTime, Datelike, NaiveDate, Offset, TimeZone, Timelike};

/// Identifies one half-hour evaluation slot in local time.
///
/// The UTC offset is part of the key: a wall-clock hour repeated when
/// daylight saving ends is two distinct slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DedupKey {
    date: NaiveDate,
    hour: u32,
    /// 0 for `:00..:29`, 1 for `:30..:59`.
    half: u32,
    offset_secs: i32,
}

impl DedupKey {
    pub fn from_local<Tz: TimeZone>(at: &DateTime<Tz>) -> Self {
        Self {
            date: at.date_naive(),
            hour: at.hour(),
            half: at.minute() / 30,
            offset_secs: at.offset().fix().local_minus_utc(),
        }
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}",
            self.date.year(),
            self.date.month(),
            self.date.day(),
            self.hour,
            self.half * 30
        )
    }
}

/// Bounded, insertion-ordered record of slots already evaluated.
/// The oldest entries are evicted first once `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct ProcessedSlots {
    keys: VecDeque<DedupKey>,
    capacity: usize,
}

impl ProcessedSlots {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            keys: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn contains(&self, key: &DedupKey) -> bool {
        self.keys.contains(key)
    }

    /// Record `key`. Returns `false` if it was already present.
    pub fn insert(&mut self, key: DedupKey) -> bool {
        if self.contains(&key) {
            return false;
        }
        self.keys.push_back(key);
        while self.keys.len() > self.capacity {
            self.keys.pop_front();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&DedupKey> {
        self.keys.back()
    }
}
