//! Definition of counters, used for retry attempts, and message IDs.
use crate::SpecificationRevision;

/// Counter errors.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The counter wrapped around after exceeding its maximum.
    Overrun,
}

/// A counter that wraps around after exceeding its maximum value.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Counter {
    value: u8,
    max_value: u8,
}

/// Types of counters, each with its own maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CounterType {
    /// Counts Source_Capabilities messages that were not answered with GoodCRC.
    Caps,
    /// Counts Discover Identity attempts towards a cable plug.
    DiscoverIdentity,
    /// Counts DR_Swap attempts that were answered with Wait.
    DrSwapAttempt,
    /// Counts consecutive hard resets.
    ///
    /// Holds up to `N_HARD_RESET_COUNT + 1`, so that exceeding the limit can be observed.
    HardReset,
    /// The three bit message ID.
    MessageId,
    /// Counts transmission retries.
    Retry,
    /// Counts VCONN_Swap attempts.
    VconnSwap,
}

impl Counter {
    /// Create a new counter, starting at zero.
    pub fn new(counter_type: CounterType) -> Self {
        let max_value = match counter_type {
            CounterType::Caps => 25,
            CounterType::DiscoverIdentity => 6,
            CounterType::DrSwapAttempt => 5,
            CounterType::HardReset => 3,
            CounterType::MessageId => 7,
            CounterType::Retry => 3,
            CounterType::VconnSwap => 3,
        };

        Self { value: 0, max_value }
    }

    /// Create a new counter with a start value, wrapped to the counter's range.
    pub fn new_from_value(counter_type: CounterType, value: u8) -> Self {
        let mut counter = Self::new(counter_type);
        counter.set(value);
        counter
    }

    /// Set the counter value, wrapped to the counter's range.
    pub fn set(&mut self, value: u8) {
        self.value = value % (self.max_value + 1);
    }

    /// The current value.
    pub fn value(&self) -> u8 {
        self.value
    }

    /// The largest value before wrapping.
    pub fn max_value(&self) -> u8 {
        self.max_value
    }

    /// Increment the counter.
    ///
    /// Returns an error if the counter wrapped around to zero.
    pub fn increment(&mut self) -> Result<(), Error> {
        self.set(self.value.wrapping_add(1));

        if self.value == 0 { Err(Error::Overrun) } else { Ok(()) }
    }

    /// Count an attempt, unless no attempts are left.
    ///
    /// Unlike [`Counter::increment`], the counter stays at its maximum once exhausted.
    pub fn attempt(&mut self) -> Result<(), Error> {
        if self.value >= self.max_value {
            return Err(Error::Overrun);
        }

        self.value += 1;
        Ok(())
    }

    /// Reset to zero.
    pub fn reset(&mut self) {
        self.value = 0;
    }
}

/// The number of hard resets after which the port partner is considered unresponsive (nHardResetCount).
pub const N_HARD_RESET_COUNT: u8 = 2;

/// The number of transmission retries (nRetryCount) for a revision.
///
/// Hard Reset, Cable Reset and BIST carrier signalling are never retried.
pub const fn retry_count(revision: SpecificationRevision) -> u8 {
    match revision {
        SpecificationRevision::R1_0 | SpecificationRevision::R2_0 => 3,
        SpecificationRevision::R3_X => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_id_wraps() {
        let mut counter = Counter::new_from_value(CounterType::MessageId, 6);
        assert!(counter.increment().is_ok());
        assert_eq!(counter.value(), 7);
        assert_eq!(counter.increment(), Err(Error::Overrun));
        assert_eq!(counter.value(), 0);
    }

    #[test]
    fn test_hard_reset_limit() {
        let mut counter = Counter::new(CounterType::HardReset);
        assert!(counter.increment().is_ok());
        assert!(counter.increment().is_ok());
        assert!(counter.increment().is_ok());
        assert!(counter.value() > N_HARD_RESET_COUNT);
        assert!(counter.increment().is_err());
    }

    #[test]
    fn test_attempts_stay_exhausted() {
        let mut counter = Counter::new(CounterType::VconnSwap);
        for _ in 0..3 {
            assert!(counter.attempt().is_ok());
        }

        assert_eq!(counter.attempt(), Err(Error::Overrun));
        assert_eq!(counter.attempt(), Err(Error::Overrun));
        assert_eq!(counter.value(), counter.max_value());

        counter.reset();
        assert!(counter.attempt().is_ok());
    }

    #[test]
    fn test_retry_count_per_revision() {
        assert_eq!(retry_count(SpecificationRevision::R2_0), 3);
        assert_eq!(retry_count(SpecificationRevision::R3_X), 2);
    }
}
