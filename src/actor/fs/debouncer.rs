use std::time::{Duration, Instant};

/// Idle sleep when nothing is pending.
const IDLE: Duration = Duration::from_secs(86400);

/// Time source, injectable for tests.
pub trait Clock {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock. Clones share the same time.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct ManualClock(std::sync::Arc<parking_lot::Mutex<Instant>>);

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        Self(std::sync::Arc::new(parking_lot::Mutex::new(Instant::now())))
    }

    pub fn advance(&self, by: Duration) {
        *self.0.lock() += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.0.lock()
    }
}

/// Pure trailing-edge debouncer: no I/O, no business logic.
///
/// Every `trigger` replaces the pending arguments and pushes the deadline to
/// `now + quiet`. Once the deadline passes, `take_if_ready` yields the most
/// recent arguments exactly once.
pub struct Debouncer<T, C = SystemClock> {
    quiet: Duration,
    clock: C,
    pending: Option<T>,
    deadline: Option<Instant>,
}

impl<T> Debouncer<T> {
    pub fn new(quiet: Duration) -> Self {
        Self::with_clock(quiet, SystemClock)
    }
}

impl<T, C: Clock> Debouncer<T, C> {
    pub fn with_clock(quiet: Duration, clock: C) -> Self {
        Self {
            quiet,
            clock,
            pending: None,
            deadline: None,
        }
    }

    pub fn trigger(&mut self, args: T) {
        self.pending = Some(args);
        self.deadline = Some(self.clock.now() + self.quiet);
    }

    pub fn is_ready(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| self.clock.now() >= deadline)
    }

    /// Last arguments, if the quiet period has elapsed.
    pub fn take_if_ready(&mut self) -> Option<T> {
        if !self.is_ready() {
            return None;
        }
        self.deadline = None;
        self.pending.take()
    }

    /// Precise sleep duration until the pending call is due.
    pub fn sleep_duration(&self) -> Duration {
        match self.deadline {
            Some(deadline) => deadline
                .saturating_duration_since(self.clock.now())
                .max(Duration::from_millis(1)),
            None => IDLE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIET: Duration = Duration::from_millis(300);

    fn debouncer() -> (Debouncer<Vec<&'static str>, ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        (Debouncer::with_clock(QUIET, clock.clone()), clock)
    }

    #[test]
    fn test_idle() {
        let (mut debouncer, _) = debouncer();
        assert!(!debouncer.is_ready());
        assert!(debouncer.take_if_ready().is_none());
        assert_eq!(debouncer.sleep_duration(), IDLE);
    }

    #[test]
    fn test_burst_fires_once_with_last_args() {
        let (mut debouncer, clock) = debouncer();

        debouncer.trigger(vec!["a"]);
        clock.advance(Duration::from_millis(100));
        debouncer.trigger(vec!["a", "b"]);
        clock.advance(Duration::from_millis(100));
        debouncer.trigger(vec!["a", "b", "c"]);

        // 299ms after the last trigger: still quiet
        clock.advance(Duration::from_millis(299));
        assert!(debouncer.take_if_ready().is_none());
        assert_eq!(debouncer.sleep_duration(), Duration::from_millis(1));

        clock.advance(Duration::from_millis(1));
        assert_eq!(debouncer.take_if_ready(), Some(vec!["a", "b", "c"]));
        assert!(debouncer.take_if_ready().is_none());
        assert_eq!(debouncer.sleep_duration(), IDLE);
    }

    #[test]
    fn test_trigger_resets_deadline() {
        let (mut debouncer, clock) = debouncer();
        debouncer.trigger(vec!["a"]);
        clock.advance(Duration::from_millis(250));
        debouncer.trigger(vec!["b"]);
        clock.advance(Duration::from_millis(250));

        assert!(!debouncer.is_ready());
        assert_eq!(debouncer.sleep_duration(), Duration::from_millis(50));
    }

    #[test]
    fn test_separate_bursts_fire_separately() {
        let (mut debouncer, clock) = debouncer();
        debouncer.trigger(vec!["first"]);
        clock.advance(QUIET);
        assert_eq!(debouncer.take_if_ready(), Some(vec!["first"]));

        debouncer.trigger(vec!["second"]);
        clock.advance(QUIET);
        assert_eq!(debouncer.take_if_ready(), Some(vec!["second"]));
    }
}
