//! Failure-streak accounting: alarm on the first failure, re-assert every
//! Nth while the outage continues.

/// Whether a failing cycle should put an alarm on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmDecision {
    Emit,
    Suppress,
}

/// Consecutive-failure counter with edge-triggered alarming.
///
/// The first failure emits immediately; afterwards only every
/// `reassert_every`th consecutive failure emits again, bounding alarm volume
/// during long outages. Any success resets the streak, so the next failure
/// is an edge again.
#[derive(Debug, Clone)]
pub struct FailureStreak {
    consecutive: u32,
    reassert_every: u32,
}

impl FailureStreak {
    /// Default re-assert cadence: with one probe a minute, a standing
    /// outage re-alarms every half hour.
    pub const DEFAULT_REASSERT: u32 = 30;

    #[must_use]
    pub fn new(reassert_every: u32) -> Self {
        Self {
            consecutive: 0,
            // zero would mean division by zero below; treat it as "every cycle"
            reassert_every: reassert_every.max(1),
        }
    }

    /// Record one failed cycle and decide whether to alarm.
    pub fn failure(&mut self) -> AlarmDecision {
        self.consecutive = self.consecutive.saturating_add(1);
        if self.consecutive == 1 || self.consecutive % self.reassert_every == 0 {
            AlarmDecision::Emit
        } else {
            AlarmDecision::Suppress
        }
    }

    /// Record one successful cycle. Returns `true` when this success ends a
    /// streak, the recovery edge callers log.
    pub fn success(&mut self) -> bool {
        let recovered = self.consecutive > 0;
        self.consecutive = 0;
        recovered
    }

    #[must_use]
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    #[must_use]
    pub fn is_failing(&self) -> bool {
        self.consecutive > 0
    }
}

impl Default for FailureStreak {
    fn default() -> Self {
        Self::new(Self::DEFAULT_REASSERT)
    }
}
