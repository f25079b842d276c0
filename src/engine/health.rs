//! Primary-store health tracking: a rolling-failure-rate circuit breaker
//!
//! One instance is shared process-wide so a failing request opens the
//! breaker for every concurrent caller. CLOSED admits all calls; OPEN fails
//! fast without touching the primary; after the cooldown a single HALF_OPEN
//! probe is admitted, and its outcome decides the next state.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }
}

/// Breaker tuning. Defaults come from `constants`, overridable per deploy.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Rolling window over which outcomes are counted.
    pub window: Duration,
    /// Failure rate within the window that trips CLOSED -> OPEN.
    pub failure_rate_threshold: f64,
    /// Outcomes required in the window before the rate is evaluated.
    pub min_samples: usize,
    /// How long OPEN lasts before one probe is admitted.
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(crate::constants::DEFAULT_BREAKER_WINDOW_SECS),
            failure_rate_threshold: crate::constants::DEFAULT_BREAKER_FAILURE_RATE,
            min_samples: crate::constants::DEFAULT_BREAKER_MIN_SAMPLES,
            cooldown: Duration::from_secs(crate::constants::DEFAULT_BREAKER_COOLDOWN_SECS),
        }
    }
}

struct Inner {
    state: BreakerState,
    /// (timestamp, success) outcomes inside the rolling window.
    window: VecDeque<(Instant, bool)>,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Shared, thread-safe health state machine for the primary store.
pub struct HealthTracker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl HealthTracker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                window: VecDeque::new(),
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Whether the primary is currently considered healthy (breaker CLOSED).
    pub fn is_healthy(&self) -> bool {
        self.inner.lock().state == BreakerState::Closed
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().state
    }

    /// Failures currently inside the rolling window.
    pub fn failure_count(&self) -> usize {
        self.inner.lock().window.iter().filter(|(_, ok)| !ok).count()
    }

    /// Ask permission to attempt a primary-store call.
    ///
    /// CLOSED always grants. OPEN grants nothing until the cooldown elapses,
    /// then transitions to HALF_OPEN and grants exactly one probe; further
    /// callers are refused until that probe reports an outcome.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let cooled = inner
                    .opened_at
                    .map(|t| t.elapsed() >= self.config.cooldown)
                    .unwrap_or(true);
                if cooled {
                    self.transition(&mut inner, BreakerState::HalfOpen);
                    inner.probe_in_flight = true;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record a successful primary-store call. One probe success closes an
    /// OPEN/HALF_OPEN breaker.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.window.push_back((now, true));
        self.prune(&mut inner, now);

        match inner.state {
            BreakerState::HalfOpen | BreakerState::Open => {
                inner.probe_in_flight = false;
                inner.opened_at = None;
                inner.window.clear();
                self.transition(&mut inner, BreakerState::Closed);
                info!("primary store recovered, breaker closed");
            }
            BreakerState::Closed => {}
        }
    }

    /// Record a failed or timed-out primary-store call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        inner.window.push_back((now, false));
        self.prune(&mut inner, now);

        match inner.state {
            BreakerState::HalfOpen => {
                inner.probe_in_flight = false;
                inner.opened_at = Some(now);
                self.transition(&mut inner, BreakerState::Open);
                warn!("probe failed, breaker reopened");
            }
            BreakerState::Closed => {
                let total = inner.window.len();
                if total >= self.config.min_samples {
                    let failures = inner.window.iter().filter(|(_, ok)| !ok).count();
                    let rate = failures as f64 / total as f64;
                    if rate >= self.config.failure_rate_threshold {
                        inner.opened_at = Some(now);
                        self.transition(&mut inner, BreakerState::Open);
                        warn!(
                            failure_rate = rate,
                            samples = total,
                            "failure rate over threshold, breaker opened"
                        );
                    }
                }
            }
            BreakerState::Open => {}
        }
    }

    fn prune(&self, inner: &mut Inner, now: Instant) {
        while let Some(&(ts, _)) = inner.window.front() {
            if now.duration_since(ts) > self.config.window {
                inner.window.pop_front();
            } else {
                break;
            }
        }
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState) {
        if inner.state != to {
            inner.state = to;
            metrics::BREAKER_TRANSITIONS_TOTAL
                .with_label_values(&[to.as_str()])
                .inc();
            metrics::BREAKER_STATE.set(match to {
                BreakerState::Closed => 0,
                BreakerState::HalfOpen => 1,
                BreakerState::Open => 2,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(min_samples: usize, cooldown_ms: u64) -> HealthTracker {
        HealthTracker::new(BreakerConfig {
            window: Duration::from_secs(10),
            failure_rate_threshold: 0.5,
            min_samples,
            cooldown: Duration::from_millis(cooldown_ms),
        })
    }

    #[test]
    fn starts_closed_and_granting() {
        let t = tracker(4, 100);
        assert!(t.is_healthy());
        assert!(t.try_acquire());
    }

    #[test]
    fn opens_after_failure_rate_threshold() {
        let t = tracker(4, 100);
        for _ in 0..4 {
            t.record_failure();
        }
        assert_eq!(t.state(), BreakerState::Open);
        assert!(!t.try_acquire());
        assert!(!t.is_healthy());
    }

    #[test]
    fn below_min_samples_never_opens() {
        let t = tracker(4, 100);
        t.record_failure();
        t.record_failure();
        t.record_failure();
        assert_eq!(t.state(), BreakerState::Closed);
    }

    #[test]
    fn successes_keep_rate_below_threshold() {
        let t = tracker(4, 100);
        t.record_success();
        t.record_success();
        t.record_success();
        t.record_failure();
        assert_eq!(t.state(), BreakerState::Closed);
    }

    #[test]
    fn cooldown_admits_exactly_one_probe() {
        let t = tracker(2, 10);
        t.record_failure();
        t.record_failure();
        assert_eq!(t.state(), BreakerState::Open);

        std::thread::sleep(Duration::from_millis(20));
        assert!(t.try_acquire(), "first caller after cooldown gets the probe");
        assert_eq!(t.state(), BreakerState::HalfOpen);
        assert!(!t.try_acquire(), "second caller is refused while probe is out");
    }

    #[test]
    fn probe_success_closes_breaker() {
        let t = tracker(2, 10);
        t.record_failure();
        t.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert!(t.try_acquire());
        t.record_success();
        assert_eq!(t.state(), BreakerState::Closed);
        assert!(t.try_acquire());
    }

    #[test]
    fn probe_failure_reopens_breaker() {
        let t = tracker(2, 10);
        t.record_failure();
        t.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert!(t.try_acquire());
        t.record_failure();
        assert_eq!(t.state(), BreakerState::Open);
        assert!(!t.try_acquire(), "cooldown restarts after a failed probe");
    }
}
