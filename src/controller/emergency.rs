//! # Emergency Escalation
//!
//! The emergency stop cuts the motors mid-air, so a single stray key press must
//! not trigger it. The counter arms the stop after a number of signals.

use crate::config::EmergencyResetPolicy;

/// Counts emergency signals and decides when the stop fires.
///
/// # Examples
///
/// ```
/// use midi_pilot::config::EmergencyResetPolicy;
/// use midi_pilot::controller::emergency::EmergencyCounter;
///
/// let mut counter = EmergencyCounter::new(3, EmergencyResetPolicy::Never);
/// assert!(!counter.signal());
/// assert!(!counter.signal());
/// assert!(counter.signal());
/// assert!(!counter.signal()); // latched, never fires again
/// ```
#[derive(Debug, Clone)]
pub struct EmergencyCounter {
    count: u32,
    threshold: u32,
    policy: EmergencyResetPolicy,
    fired: u32,
}

impl EmergencyCounter {
    #[must_use]
    pub fn new(threshold: u32, policy: EmergencyResetPolicy) -> Self {
        Self {
            count: 0,
            threshold: threshold.max(1),
            policy,
            fired: 0,
        }
    }

    /// Record one emergency signal. Returns `true` when the stop must fire.
    pub fn signal(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        if self.count != self.threshold {
            return false;
        }

        self.fired += 1;
        if self.policy == EmergencyResetPolicy::AfterFire {
            self.count = 0;
        }
        true
    }

    /// Signals counted so far.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// How many times the stop has fired.
    pub fn fired(&self) -> u32 {
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fire_count(counter: &mut EmergencyCounter, signals: usize) -> usize {
        (0..signals).filter(|_| counter.signal()).count()
    }

    #[test]
    fn test_two_signals_do_not_fire() {
        let mut counter = EmergencyCounter::new(3, EmergencyResetPolicy::Never);
        assert_eq!(fire_count(&mut counter, 2), 0);
        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn test_third_signal_fires() {
        let mut counter = EmergencyCounter::new(3, EmergencyResetPolicy::Never);
        assert!(!counter.signal());
        assert!(!counter.signal());
        assert!(counter.signal());
        assert_eq!(counter.fired(), 1);
    }

    #[test]
    fn test_latched_counter_never_refires() {
        let mut counter = EmergencyCounter::new(3, EmergencyResetPolicy::Never);
        assert_eq!(fire_count(&mut counter, 100), 1);
        assert_eq!(counter.count(), 100);
    }

    #[test]
    fn test_after_fire_rearms() {
        let mut counter = EmergencyCounter::new(3, EmergencyResetPolicy::AfterFire);
        assert_eq!(fire_count(&mut counter, 4), 1);
        assert_eq!(counter.count(), 1);
        assert_eq!(fire_count(&mut counter, 2), 1);
        assert_eq!(counter.fired(), 2);
    }

    #[test]
    fn test_threshold_of_one() {
        let mut counter = EmergencyCounter::new(1, EmergencyResetPolicy::Never);
        assert!(counter.signal());
        assert!(!counter.signal());
    }

    #[test]
    fn test_zero_threshold_treated_as_one() {
        let mut counter = EmergencyCounter::new(0, EmergencyResetPolicy::Never);
        assert_eq!(counter.threshold(), 1);
        assert!(counter.signal());
    }

    #[test]
    fn test_count_saturates() {
        let mut counter = EmergencyCounter::new(3, EmergencyResetPolicy::Never);
        counter.count = u32::MAX;
        assert!(!counter.signal());
        assert_eq!(counter.count(), u32::MAX);
    }
}
