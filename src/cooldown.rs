//! Cool-down governor (CG, §4.4): per-host request spacing plus a
//! fractional-credit timeout-burst circuit breaker.
//!
//! Grounded on `original_source/src/saim/culture_link/private/cool_down.py`.
//! Only the await-based policy is implemented, per SPEC_FULL §C (Open
//! Question 3).

use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Mutex;
use tokio::time::{sleep, Duration};

pub const COOL_DOWN: f64 = 3.0;
pub const T_RESET: f64 = 259_200.0;
pub const T_LIMIT: f64 = 3.0;
pub const MAX_DELAY: f64 = 5.0;

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

struct State {
    last_request: f64,
    timeout_count: f64,
}

/// Per-host cool-down + circuit-breaker state, behind a lock (§4.4:
/// "State ... behind a lock").
pub struct CoolDown {
    state: Mutex<State>,
}

impl Default for CoolDown {
    fn default() -> Self {
        CoolDown {
            state: Mutex::new(State {
                last_request: 0.0,
                timeout_count: 0.0,
            }),
        }
    }
}

impl CoolDown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loops until `now >= last_request + spacing`, then claims the slot.
    /// `delay` is clamped to `(0, MAX_DELAY)`, falling back to
    /// `COOL_DOWN` outside that range.
    pub async fn await_cool_down(&self, delay: f64) {
        let spacing = if delay > 0.0 && delay < MAX_DELAY {
            delay
        } else {
            COOL_DOWN
        };
        loop {
            let wait = {
                let mut guard = self.state.lock().await;
                let next_allowed = guard.last_request + spacing;
                let now = now_secs();
                if now >= next_allowed {
                    guard.last_request = now;
                    None
                } else {
                    Some(next_allowed - now + 0.010)
                }
            };
            match wait {
                None => return,
                Some(secs) => sleep(Duration::from_secs_f64(secs.max(0.0))).await,
            }
        }
    }

    /// True iff the circuit is open: `timeout_count >= T_LIMIT` and the
    /// last request was within `T_RESET`. Resets the counter (and returns
    /// false) once `T_RESET` has elapsed.
    pub async fn skip_request(&self) -> bool {
        let mut guard = self.state.lock().await;
        if guard.timeout_count >= T_LIMIT {
            if now_secs() - guard.last_request < T_RESET {
                return true;
            }
            guard.timeout_count = 0.0;
        }
        false
    }

    /// `tasks_in_package` fractionally discounts a single timeout so that
    /// one flaky URL in a large package doesn't trip the breaker alone.
    pub async fn finished_request(&self, was_timeout: bool, tasks_in_package: usize) {
        let mut guard = self.state.lock().await;
        if was_timeout {
            if guard.timeout_count < T_LIMIT {
                let credit = 1.0 / (tasks_in_package.max(1) as f64);
                guard.timeout_count += credit;
            }
        } else if guard.timeout_count > 0.0 {
            guard.timeout_count = 0.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn await_cool_down_spaces_successive_calls() {
        let cd = CoolDown::new();
        let start = std::time::Instant::now();
        cd.await_cool_down(0.05).await;
        cd.await_cool_down(0.05).await;
        assert!(start.elapsed().as_secs_f64() >= 0.04);
    }

    #[tokio::test]
    async fn circuit_opens_after_enough_fractional_timeouts() {
        let cd = CoolDown::new();
        for _ in 0..3 {
            cd.finished_request(true, 1).await;
        }
        assert!(cd.skip_request().await);
    }

    #[tokio::test]
    async fn fractional_credit_does_not_trip_breaker_for_large_packages() {
        let cd = CoolDown::new();
        for _ in 0..3 {
            cd.finished_request(true, 10).await;
        }
        assert!(!cd.skip_request().await);
    }

    #[tokio::test]
    async fn success_resets_timeout_count() {
        let cd = CoolDown::new();
        cd.finished_request(true, 1).await;
        cd.finished_request(true, 1).await;
        cd.finished_request(false, 1).await;
        for _ in 0..2 {
            cd.finished_request(true, 1).await;
        }
        assert!(!cd.skip_request().await);
    }
}
