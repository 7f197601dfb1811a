use std::{fmt::Display, time::Duration};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Errors raised by model-time arithmetic.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeError {
    #[error("Adding {delta} to {timestamp} would produce a negative timestamp")]
    Negative {
        timestamp: Timestamp,
        delta: time::Duration,
    },

    #[error("Time arithmetic on {timestamp} overflowed")]
    Overflow { timestamp: Timestamp },
}

/// Model timestamps are represented as the non-negative duration since the model origin.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Timestamp(Duration);

impl Timestamp {
    pub const ZERO: Self = Self(Duration::ZERO);
    pub const MAX: Self = Self(Duration::MAX);

    /// Create a timestamp from seconds and nanoseconds. Nanoseconds beyond one second are
    /// carried into the seconds.
    ///
    /// # Panics
    ///
    /// Panics if the carry overflows the seconds counter, like [`Duration::new`].
    pub fn new(secs: u64, nsecs: u32) -> Self {
        Self(Duration::new(secs, nsecs))
    }

    /// Create a timestamp from fractional seconds.
    ///
    /// # Panics
    ///
    /// Panics if `secs` is negative, not finite or overflows, like [`Duration::from_secs_f64`].
    pub fn from_secs_f64(secs: f64) -> Self {
        Self(Duration::from_secs_f64(secs))
    }

    /// Whole seconds of this timestamp.
    pub fn secs(&self) -> u64 {
        self.0.as_secs()
    }

    /// Sub-second nanoseconds of this timestamp, always below `1_000_000_000`.
    pub fn nsecs(&self) -> u32 {
        self.0.subsec_nanos()
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0.as_secs_f64()
    }

    /// Offset this timestamp by an unsigned duration, saturating at [`Timestamp::MAX`].
    pub fn offset(&self, offset: Duration) -> Self {
        Self(self.0.saturating_add(offset))
    }

    /// Add a signed delta to this timestamp.
    ///
    /// Fails with [`TimeError::Negative`] if a negative delta exceeds the timestamp.
    pub fn checked_add(&self, delta: time::Duration) -> Result<Self, TimeError> {
        let overflow = TimeError::Overflow { timestamp: *self };
        let base = time::Duration::try_from(self.0).map_err(|_| overflow)?;
        let sum = base.checked_add(delta).ok_or(overflow)?;
        if sum.is_negative() {
            return Err(TimeError::Negative {
                timestamp: *self,
                delta,
            });
        }
        Duration::try_from(sum).map(Self).map_err(|_| overflow)
    }

    pub fn checked_duration_since(&self, earlier: Self) -> Option<Duration> {
        self.0.checked_sub(earlier.0)
    }
}

impl From<Duration> for Timestamp {
    fn from(duration: Duration) -> Self {
        Self(duration)
    }
}

impl From<Timestamp> for Duration {
    fn from(timestamp: Timestamp) -> Self {
        timestamp.0
    }
}

impl std::ops::Sub for Timestamp {
    type Output = Duration;

    /// Saturates at zero when `rhs` is later than `self`.
    fn sub(self, rhs: Self) -> Self::Output {
        self.0.saturating_sub(rhs.0)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:09}s", self.secs(), self.nsecs())
    }
}

/// A superdense time tag: a model timestamp and a microstep that orders simultaneous events.
///
/// Tags are totally ordered, lexicographically on `(timestamp, microstep)`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Tag {
    /// Offset from the origin of model time
    pub timestamp: Timestamp,
    /// Superdense-timestep.
    pub microstep: usize,
}

impl Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}+{}]", self.timestamp, self.microstep)
    }
}

impl Tag {
    pub const ZERO: Self = Self {
        timestamp: Timestamp::ZERO,
        microstep: 0,
    };

    pub const FOREVER: Self = Self {
        timestamp: Timestamp::MAX,
        microstep: usize::MAX,
    };

    /// Create a new Tag given an offset from the origin, and a microstep
    pub fn new(timestamp: impl Into<Timestamp>, microstep: usize) -> Tag {
        Self {
            timestamp: timestamp.into(),
            microstep,
        }
    }

    /// Add a signed duration to the timestamp of this tag, keeping the microstep.
    pub fn add(&self, delta: time::Duration) -> Result<Self, TimeError> {
        Ok(Self {
            timestamp: self.timestamp.checked_add(delta)?,
            microstep: self.microstep,
        })
    }

    /// The tag at the same timestamp and the next microstep.
    pub fn advance_microstep(&self) -> Self {
        Self {
            timestamp: self.timestamp,
            microstep: self.microstep.saturating_add(1),
        }
    }

    /// Create a new Tag offset from the current.
    ///
    /// A strictly positive offset moves to a new timestamp at microstep 0; a missing or zero offset
    /// stays at the current timestamp and advances the microstep.
    pub fn delay(&self, offset: Option<impl Into<Duration>>) -> Self {
        match offset.map(Into::into) {
            Some(offset) if !offset.is_zero() => Self {
                timestamp: self.timestamp.offset(offset),
                microstep: 0,
            },
            _ => self.advance_microstep(),
        }
    }

    pub fn get_offset(&self) -> Duration {
        self.timestamp.into()
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Ordering;

    use super::*;

    #[test]
    fn test_tag_total_order() {
        let a = Tag::new(Timestamp::from_secs_f64(1.0), 0);
        let b = Tag::new(Timestamp::from_secs_f64(1.0), 1);
        let c = Tag::new(Timestamp::from_secs_f64(0.5), 7);

        assert_eq!(a.cmp(&a), Ordering::Equal);
        assert_eq!(a.cmp(&b), Ordering::Less);
        assert_eq!(b.cmp(&a), Ordering::Greater);
        assert_eq!(c.cmp(&a), Ordering::Less);
        // transitivity
        assert!(c < a && a < b && c < b);
        assert_ne!(a, b);
    }

    #[test]
    fn test_add_normalizes_nanoseconds() {
        let tag = Tag::new(Timestamp::new(0, 0), 3);
        let delta = time::Duration::new(1, 1_500_000_000);
        let sum = tag.add(delta).unwrap();
        assert_eq!(sum.timestamp, Timestamp::new(2, 500_000_000));
        assert_eq!(sum.timestamp.secs(), 2);
        assert_eq!(sum.timestamp.nsecs(), 500_000_000);
        assert_eq!(sum.microstep, 3);
    }

    #[test]
    fn test_add_negative() {
        let tag = Tag::new(Timestamp::new(2, 0), 0);
        let back = tag.add(time::Duration::seconds(-1)).unwrap();
        assert_eq!(back.timestamp, Timestamp::new(1, 0));

        let err = tag.add(time::Duration::milliseconds(-2001)).unwrap_err();
        assert!(matches!(err, TimeError::Negative { .. }));
    }

    #[test]
    fn test_add_overflow() {
        let tag = Tag::new(Timestamp::MAX, 0);
        assert!(matches!(
            tag.add(time::Duration::seconds(1)),
            Err(TimeError::Overflow { .. })
        ));
    }

    #[test]
    fn test_delay() {
        let tag = Tag::new(Timestamp::new(1, 0), 4);
        assert_eq!(tag.delay(None::<Duration>), Tag::new(Timestamp::new(1, 0), 5));
        assert_eq!(
            tag.delay(Some(Duration::ZERO)),
            Tag::new(Timestamp::new(1, 0), 5)
        );
        assert_eq!(
            tag.delay(Some(Duration::from_millis(250))),
            Tag::new(Timestamp::new(1, 250_000_000), 0)
        );
    }

    #[test]
    fn test_display() {
        let tag = Tag::new(Timestamp::new(3, 42), 1);
        assert_eq!(tag.to_string(), "[3.000000042s+1]");
    }
}
