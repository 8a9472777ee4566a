// Copyright (c) 2026 bkgate contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Command Budget
//!
//! Soft daily quota guarding a metered shared store. Every counted store
//! command moves the day's usage toward `threshold × daily_limit`; once the
//! threshold is crossed the circuit opens and stays open for the remainder
//! of that calendar day. The counter and the circuit reset together on day
//! rollover.
//!
//! The current day is always passed in by the caller rather than read from
//! the wall clock, so tests can simulate rollover deterministically. Counts
//! are allowed to be approximate under races: this is a protective
//! threshold, not a hard quota enforcer.

use chrono::NaiveDate;
use parking_lot::Mutex;

#[derive(Debug)]
struct BudgetState {
    day: NaiveDate,
    used: u64,
    open: bool,
}

/// Process-wide daily command counter with a circuit flag.
#[derive(Debug)]
pub struct CommandBudget {
    daily_limit: u64,
    threshold: f64,
    state: Mutex<BudgetState>,
}

impl CommandBudget {
    pub fn new(daily_limit: u64, threshold: f64, today: NaiveDate) -> Self {
        Self {
            daily_limit,
            threshold,
            state: Mutex::new(BudgetState {
                day: today,
                used: 0,
                open: false,
            }),
        }
    }

    /// Count `n` store commands against `today`'s budget.
    pub fn record(&self, n: u64, today: NaiveDate) {
        let mut state = self.state.lock();
        Self::roll(&mut state, today);
        state.used = state.used.saturating_add(n);
        if (state.used as f64) >= self.threshold * self.daily_limit as f64 {
            if !state.open {
                tracing::warn!(
                    used = state.used,
                    limit = self.daily_limit,
                    "command budget threshold crossed, opening circuit for the day"
                );
            }
            state.open = true;
        }
    }

    /// Whether cache operations should bypass the store.
    pub fn is_open(&self, today: NaiveDate) -> bool {
        let mut state = self.state.lock();
        Self::roll(&mut state, today);
        state.open
    }

    /// Commands counted so far today.
    pub fn used(&self, today: NaiveDate) -> u64 {
        let mut state = self.state.lock();
        Self::roll(&mut state, today);
        state.used
    }

    /// Reset the counter and close the circuit as of `day`.
    pub fn reset(&self, day: NaiveDate) {
        let mut state = self.state.lock();
        *state = BudgetState {
            day,
            used: 0,
            open: false,
        };
    }

    fn roll(state: &mut BudgetState, today: NaiveDate) {
        if state.day != today {
            *state = BudgetState {
                day: today,
                used: 0,
                open: false,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn circuit_stays_closed_below_threshold() {
        let today = day("2026-03-02");
        let budget = CommandBudget::new(100, 0.8, today);
        budget.record(79, today);
        assert!(!budget.is_open(today));
    }

    #[test]
    fn circuit_opens_at_threshold_fraction() {
        let today = day("2026-03-02");
        let budget = CommandBudget::new(100, 0.8, today);
        budget.record(80, today);
        assert!(budget.is_open(today));
        // Further usage keeps it open.
        budget.record(1, today);
        assert!(budget.is_open(today));
    }

    #[test]
    fn day_rollover_closes_circuit_and_resets_count() {
        let today = day("2026-03-02");
        let tomorrow = day("2026-03-03");
        let budget = CommandBudget::new(100, 0.8, today);
        budget.record(100, today);
        assert!(budget.is_open(today));

        assert!(!budget.is_open(tomorrow));
        assert_eq!(budget.used(tomorrow), 0);
    }

    #[test]
    fn explicit_reset_closes_circuit() {
        let today = day("2026-03-02");
        let budget = CommandBudget::new(10, 0.5, today);
        budget.record(10, today);
        assert!(budget.is_open(today));
        budget.reset(today);
        assert!(!budget.is_open(today));
        assert_eq!(budget.used(today), 0);
    }
}
