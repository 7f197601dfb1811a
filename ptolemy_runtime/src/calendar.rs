//! A calendar queue of timestamped entries.
//!
//! Entries are hashed by timestamp into a ring of buckets ("days"), each bucket kept sorted. Dequeue
//! walks the ring from the current position and only accepts an entry belonging to the current
//! "year"; after a full lap without a hit it falls back to a direct search. The number of buckets
//! doubles/halves with the queue size, and the bucket width is re-estimated from the separation of
//! the entries at the head of the queue.
//!
//! Ordering is by `(tag, depth)` with insertion order as the final tie-break, so repeated
//! extraction is fully deterministic.

use std::collections::VecDeque;

use crate::{Priority, Tag};

/// Bucket width used before enough entries are known, in nanoseconds (one second).
const DEFAULT_WIDTH: u128 = 1_000_000_000;

const MIN_BUCKETS: usize = 2;

/// Maximum number of head entries sampled to estimate a new bucket width.
const MAX_SAMPLES: usize = 25;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Failed to allocate room for {len} queued entries")]
    Allocation { len: usize },
}

/// Items stored in a [`CalendarQueue`] expose their scheduling priority.
pub trait Prioritized {
    fn priority(&self) -> Priority;
}

impl<T: Prioritized> Prioritized for Box<T> {
    fn priority(&self) -> Priority {
        (**self).priority()
    }
}

#[derive(Debug)]
struct Entry<T> {
    priority: Priority,
    seq: u64,
    item: T,
}

impl<T> Entry<T> {
    #[inline]
    fn key(&self) -> (Priority, u64) {
        (self.priority, self.seq)
    }
}

#[derive(Debug)]
pub struct CalendarQueue<T> {
    buckets: Vec<VecDeque<Entry<T>>>,
    /// Width of one bucket in nanoseconds, always >= 1
    width: u128,
    len: usize,
    next_seq: u64,
    /// Bucket index of the last known minimum
    min_bucket: usize,
    /// Virtual bucket number (timestamp / width) of the last known minimum
    min_virtual: u128,
    top_threshold: usize,
    bot_threshold: usize,
}

impl<T> Default for CalendarQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> CalendarQueue<T> {
    pub fn new() -> Self {
        let mut queue = Self {
            buckets: Vec::new(),
            width: DEFAULT_WIDTH,
            len: 0,
            next_seq: 0,
            min_bucket: 0,
            min_virtual: 0,
            top_threshold: 0,
            bot_threshold: 0,
        };
        queue.local_init(MIN_BUCKETS, DEFAULT_WIDTH, 0);
        queue
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of buckets currently in the calendar.
    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Current bucket width.
    pub fn bucket_width(&self) -> std::time::Duration {
        let nanos = u64::try_from(self.width).unwrap_or(u64::MAX);
        std::time::Duration::from_nanos(nanos)
    }

    /// Remove every entry and reset the calendar to its initial shape. The insertion sequence keeps
    /// counting so FIFO order is preserved across clears.
    pub fn clear(&mut self) {
        self.local_init(MIN_BUCKETS, DEFAULT_WIDTH, 0);
        self.len = 0;
    }

    /// Iterate over all entries in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buckets
            .iter()
            .flat_map(|bucket| bucket.iter().map(|entry| &entry.item))
    }

    /// Iterate over all entries in dequeue order.
    pub fn iter_sorted(&self) -> impl Iterator<Item = &T> {
        let mut entries: Vec<&Entry<T>> = self.buckets.iter().flatten().collect();
        entries.sort_by_key(|entry| entry.key());
        entries.into_iter().map(|entry| &entry.item)
    }

    /// Return the entry that [`CalendarQueue::extract_min`] would return, without removing it.
    pub fn peek_min(&self) -> Option<&T> {
        self.find_min()
            .and_then(|(bucket, _)| self.buckets[bucket].front())
            .map(|entry| &entry.item)
    }

    /// Remove and return the entry with the smallest `(tag, depth, insertion)` key.
    pub fn extract_min(&mut self) -> Option<T> {
        let (bucket, virtual_bucket) = self.find_min()?;
        let entry = self.buckets[bucket].pop_front()?;
        self.min_bucket = bucket;
        self.min_virtual = virtual_bucket;
        self.len -= 1;

        if self.len < self.bot_threshold {
            self.resize(self.buckets.len() / 2);
        }
        Some(entry.item)
    }

    /// Remove all entries matching `predicate`, returning them in dequeue order.
    pub fn remove_matching<F>(&mut self, mut predicate: F) -> Vec<T>
    where
        F: FnMut(&T) -> bool,
    {
        let mut removed = Vec::new();
        for bucket in self.buckets.iter_mut() {
            let mut kept = VecDeque::with_capacity(bucket.len());
            for entry in bucket.drain(..) {
                if predicate(&entry.item) {
                    removed.push(entry);
                } else {
                    kept.push_back(entry);
                }
            }
            *bucket = kept;
        }
        self.len -= removed.len();
        removed.sort_by_key(|entry| entry.key());
        removed.into_iter().map(|entry| entry.item).collect()
    }

    #[inline]
    fn virtual_bucket(&self, tag: &Tag) -> u128 {
        tag_nanos(tag) / self.width
    }

    /// Locate the bucket holding the minimum entry and its virtual bucket number.
    fn find_min(&self) -> Option<(usize, u128)> {
        if self.len == 0 {
            return None;
        }

        let num_buckets = self.buckets.len();
        let mut bucket = self.min_bucket;
        let mut virtual_bucket = self.min_virtual;
        for _ in 0..num_buckets {
            if let Some(front) = self.buckets[bucket].front() {
                if self.virtual_bucket(&front.priority.tag) == virtual_bucket {
                    return Some((bucket, virtual_bucket));
                }
            }
            bucket = (bucket + 1) % num_buckets;
            virtual_bucket += 1;
        }

        // Nothing in the current year: compare the heads of all buckets directly.
        self.buckets
            .iter()
            .enumerate()
            .filter_map(|(idx, bucket)| bucket.front().map(|entry| (idx, entry)))
            .min_by_key(|(_, entry)| entry.key())
            .map(|(idx, entry)| (idx, self.virtual_bucket(&entry.priority.tag)))
    }

    fn local_init(&mut self, num_buckets: usize, width: u128, start_virtual: u128) {
        let num_buckets = num_buckets.max(MIN_BUCKETS);
        self.width = width.max(1);
        self.buckets = std::iter::repeat_with(VecDeque::new)
            .take(num_buckets)
            .collect();
        self.min_virtual = start_virtual;
        self.min_bucket = (start_virtual % num_buckets as u128) as usize;
        // The bottom threshold is biased low so the calendar tends towards more buckets.
        self.bot_threshold = (num_buckets / 2).saturating_sub(2);
        self.top_threshold = 2 * num_buckets;
    }

    fn place(&mut self, entry: Entry<T>) -> Result<(), QueueError> {
        let virtual_bucket = self.virtual_bucket(&entry.priority.tag);
        let idx = (virtual_bucket % self.buckets.len() as u128) as usize;

        if self.len == 0 || virtual_bucket < self.min_virtual {
            self.min_virtual = virtual_bucket;
            self.min_bucket = idx;
        }

        let bucket = &mut self.buckets[idx];
        bucket
            .try_reserve(1)
            .map_err(|_| QueueError::Allocation { len: self.len })?;
        let key = entry.key();
        let pos = bucket.partition_point(|other| other.key() <= key);
        bucket.insert(pos, entry);
        self.len += 1;
        Ok(())
    }

    /// Copy the queue onto a calendar with `num_buckets` buckets and a freshly estimated width.
    fn resize(&mut self, num_buckets: usize) {
        let num_buckets = num_buckets.max(MIN_BUCKETS);
        if num_buckets == self.buckets.len() {
            return;
        }

        let width = self.compute_new_width();
        let mut entries: Vec<Entry<T>> = std::mem::take(&mut self.buckets)
            .into_iter()
            .flatten()
            .collect();
        entries.sort_by_key(|entry| entry.key());

        let start_virtual = entries
            .first()
            .map(|entry| tag_nanos(&entry.priority.tag) / width.max(1))
            .unwrap_or(0);
        self.local_init(num_buckets, width, start_virtual);
        self.len = 0;

        for entry in entries {
            // Re-inserting entries that were already resident cannot need more memory than the
            // calendar held before; a failure here leaves the entry dropped, which is unreachable
            // in practice.
            if let Err(err) = self.place(entry) {
                tracing::error!(error = %err, "Calendar resize lost an entry");
            }
        }

        tracing::trace!(
            buckets = num_buckets,
            width = ?self.bucket_width(),
            len = self.len,
            "Calendar resized"
        );
    }

    /// Estimate the bucket width as three times the average separation of the head entries,
    /// ignoring separations larger than twice the plain average.
    fn compute_new_width(&self) -> u128 {
        if self.len < 2 {
            return DEFAULT_WIDTH;
        }
        let num_samples = if self.len <= 5 {
            self.len
        } else {
            (5 + self.len / 10).min(MAX_SAMPLES)
        };

        let mut stamps: Vec<u128> = self
            .buckets
            .iter()
            .flatten()
            .map(|entry| tag_nanos(&entry.priority.tag))
            .collect();
        stamps.sort_unstable();
        stamps.truncate(num_samples);

        let diffs: Vec<u128> = stamps.windows(2).map(|w| w[1] - w[0]).collect();
        let average = diffs.iter().sum::<u128>() / diffs.len() as u128;
        let effective: Vec<u128> = diffs
            .iter()
            .copied()
            .filter(|&diff| diff <= 2 * average)
            .collect();
        let effective_average = if effective.is_empty() {
            0
        } else {
            effective.iter().sum::<u128>() / effective.len() as u128
        };

        if effective_average == 0 {
            // All sampled entries are simultaneous; keep the current width.
            self.width
        } else {
            3 * effective_average
        }
    }
}

impl<T: Prioritized> CalendarQueue<T> {
    /// Insert an entry. Fails only if memory for the entry cannot be allocated.
    pub fn insert(&mut self, item: T) -> Result<(), QueueError> {
        let entry = Entry {
            priority: item.priority(),
            seq: self.next_seq,
            item,
        };
        self.next_seq += 1;
        self.place(entry)?;

        if self.len > self.top_threshold {
            self.resize(2 * self.buckets.len());
        }
        Ok(())
    }
}

#[inline]
fn tag_nanos(tag: &Tag) -> u128 {
    tag.get_offset().as_nanos()
}
