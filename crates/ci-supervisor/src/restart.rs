//! Auto-restart backoff bookkeeping (spec.md §4.5 "Failure semantics").
//!
//! Capped at five attempts within five minutes; past that the supervisor
//! abandons the instance and records it `unhealthy`.

use std::time::{Duration, Instant};

const MAX_ATTEMPTS: u32 = 5;
const WINDOW: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone)]
pub struct RestartState {
    attempts: Vec<Instant>,
}

impl Default for RestartState {
    fn default() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }
}

impl RestartState {
    /// Record an attempt now and report whether another retry is still
    /// permitted within the rolling five-minute window.
    pub fn record_attempt(&mut self) -> bool {
        let now = Instant::now();
        self.attempts.retain(|t| now.duration_since(*t) < WINDOW);
        self.attempts.push(now);
        self.attempts.len() <= MAX_ATTEMPTS as usize
    }

    /// Exponential backoff delay for the attempt about to be made (1-indexed
    /// by attempts already recorded): 1s, 2s, 4s, 8s, 16s.
    #[must_use]
    pub fn next_delay(&self) -> Duration {
        let exponent = self.attempts.len().min(MAX_ATTEMPTS as usize).saturating_sub(1);
        Duration::from_secs(1u64 << exponent)
    }

    pub fn reset(&mut self) {
        self.attempts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_five_attempts_then_abandons() {
        let mut state = RestartState::default();
        for _ in 0..5 {
            assert!(state.record_attempt());
        }
        assert!(!state.record_attempt());
    }

    #[test]
    fn backoff_doubles_each_attempt() {
        let mut state = RestartState::default();
        state.record_attempt();
        assert_eq!(state.next_delay(), Duration::from_secs(1));
        state.record_attempt();
        assert_eq!(state.next_delay(), Duration::from_secs(2));
        state.record_attempt();
        assert_eq!(state.next_delay(), Duration::from_secs(4));
    }
}
