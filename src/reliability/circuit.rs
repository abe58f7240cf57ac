use serde::{Deserialize, Serialize};

/// Consecutive-failure tracker for one service on one cell.
///
/// Trips once `streak` reaches `trip_after`; the next committed run of the
/// same service clears it. A `trip_after` of zero never trips. The scheduler
/// only records outcomes here; the death service acts on a tripped breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureBreaker {
    pub streak: u32,
    pub trip_after: u32,
    pub tripped: bool,
}

impl FailureBreaker {
    pub fn new(trip_after: u32) -> Self {
        Self { streak: 0, trip_after, tripped: false }
    }

    pub fn record_failure(&mut self) {
        self.streak = self.streak.saturating_add(1);
        self.tripped = self.trip_after > 0 && self.streak >= self.trip_after;
    }

    pub fn record_success(&mut self) {
        *self = Self::new(self.trip_after);
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped
    }
}
