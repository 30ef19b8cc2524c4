//! MAC timer subsystem.
//!
//! [`Clock`] provides read-only monotonic time: the surrounding
//! discrete-event scheduler owns time, the MAC only observes it.
//! [`ProtocolTimer`] is the single suspendable timer type used for
//! every protocol role; role-specific behaviour on expiry lives in the
//! state machine, which polls its timers on `tick()`.

use crate::Ts;

/// Access to monotonic simulated time.
///
/// All values are relative to the same unknown epoch.
pub trait Clock {
    /// Returns the number of microsecond ticks since the epoch
    fn now(&self) -> Ts;
}

/// Lifecycle of a [`ProtocolTimer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running,
    Frozen,
    Expired,
}

/// Protocol role a timer is armed for.
///
/// One timer per role is created with the node and rearmed over its
/// whole lifetime; roles replace the per-role subclassing found in
/// classic simulator MACs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerRole {
    /// Periodic occupancy-table slot rotation
    SlotAdvance,
    /// Validity window of the carriers granted by the last CTS
    ReservationValid,
    /// Waiting for the ACK of a sent DATA frame
    Ack,
    /// Exponential backoff after a timeout or collision
    Backoff,
    /// Bounded wait for a CTS after sending an RTS
    CtsWait,
    /// Retry delay when no free carriers were available for an RTS
    RtsRetry,
    /// Waiting for DATA after sending a CTS
    DataWait,
}

/// Minimum remaining duration after a freeze, so an unfreeze always
/// re-arms with a strictly positive delay.
const MIN_REMAINING: Ts = 1;

/// A suspendable one-shot timer.
///
/// `freeze`/`unfreeze` pause a running timer without losing its
/// remaining duration; this models "waiting while the channel is
/// occupied by an incoming frame". Expiry is detected by polling
/// [`ProtocolTimer::take_expired`] with the current time, which fits
/// the cooperative tick-driven execution model.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolTimer {
    role: TimerRole,
    state: TimerState,
    start_time: Ts,
    duration: Ts,
    counter: u16,
}

impl ProtocolTimer {
    pub fn new(role: TimerRole) -> Self {
        Self {
            role,
            state: TimerState::Idle,
            start_time: 0,
            duration: 0,
            counter: 0,
        }
    }

    pub fn role(&self) -> TimerRole {
        self.role
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    /// Arm the timer for `duration` from `now`.
    pub fn schedule(&mut self, now: Ts, duration: Ts) {
        self.start_time = now;
        self.duration = duration;
        self.state = TimerState::Running;
    }

    /// Suspend a running timer, keeping the unexpired remainder.
    ///
    /// Calling this on a non-running timer is a contract violation:
    /// fatal in debug builds, a no-op in release.
    pub fn freeze(&mut self, now: Ts) {
        debug_assert_eq!(self.state, TimerState::Running, "freeze on non-running timer");
        if self.state != TimerState::Running {
            return;
        }
        let elapsed = now.saturating_sub(self.start_time);
        self.duration = self.duration.saturating_sub(elapsed).max(MIN_REMAINING);
        self.state = TimerState::Frozen;
    }

    /// Resume a frozen timer with its remaining duration.
    ///
    /// Calling this on a non-frozen timer is a contract violation:
    /// fatal in debug builds, a no-op in release.
    pub fn unfreeze(&mut self, now: Ts) {
        debug_assert_eq!(self.state, TimerState::Frozen, "unfreeze on non-frozen timer");
        if self.state != TimerState::Frozen {
            return;
        }
        self.start_time = now;
        self.state = TimerState::Running;
    }

    /// Cancel the timer unconditionally. Idempotent.
    pub fn stop(&mut self) {
        self.state = TimerState::Idle;
    }

    /// Poll for expiry: a running timer whose deadline has passed
    /// moves to `Expired` and reports `true` exactly once.
    pub fn take_expired(&mut self, now: Ts) -> bool {
        if self.state == TimerState::Running && now >= self.start_time + self.duration {
            self.state = TimerState::Expired;
            true
        } else {
            false
        }
    }

    /// Remaining duration of a running timer, or the scheduled
    /// remainder of a frozen one.
    pub fn remaining(&self, now: Ts) -> Ts {
        match self.state {
            TimerState::Running => (self.start_time + self.duration).saturating_sub(now),
            TimerState::Frozen => self.duration,
            _ => 0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == TimerState::Idle
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    pub fn is_frozen(&self) -> bool {
        self.state == TimerState::Frozen
    }

    pub fn is_expired(&self) -> bool {
        self.state == TimerState::Expired
    }

    /// Running or frozen: the timer still has a pending deadline.
    pub fn is_active(&self) -> bool {
        self.state == TimerState::Running || self.state == TimerState::Frozen
    }

    /// Retry counter, read by the backoff-time computation.
    pub fn counter(&self) -> u16 {
        self.counter
    }

    pub fn incr_counter(&mut self) {
        self.counter = self.counter.saturating_add(1);
    }

    pub fn reset_counter(&mut self) {
        self.counter = 0;
    }
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use std::sync::{Arc, Mutex};

    use crate::Ts;

    /// Mock clock implementation to assist with testing
    #[derive(Clone, Debug)]
    pub struct MockClock(Arc<Mutex<Ts>>);

    impl MockClock {
        pub fn new() -> Self {
            Self(Arc::new(Mutex::new(0)))
        }

        pub fn set_us(&mut self, val: Ts) {
            *self.0.lock().unwrap() = val;
        }

        pub fn set_ms(&mut self, val: Ts) {
            *self.0.lock().unwrap() = val * 1000;
        }

        pub fn advance(&mut self, delta: Ts) {
            let mut v = self.0.lock().unwrap();
            *v += delta;
        }
    }

    impl super::Clock for MockClock {
        fn now(&self) -> Ts {
            *self.0.lock().unwrap()
        }
    }
}

#[cfg(test)]
mod test {
    use super::mock::MockClock;
    use super::*;
    use crate::timer::Clock;

    #[test]
    fn schedule_and_expire() {
        let mut t = ProtocolTimer::new(TimerRole::Ack);
        assert!(t.is_idle());

        t.schedule(100, 50);
        assert!(t.is_running());
        assert!(!t.take_expired(120));
        assert!(t.take_expired(150));
        assert!(t.is_expired());

        // Expiry reports exactly once
        assert!(!t.take_expired(200));
    }

    #[test]
    fn freeze_unfreeze_round_trip() {
        let mut t = ProtocolTimer::new(TimerRole::Backoff);

        // Scheduled for 100 us at t=0, frozen at t=30 with 70 left,
        // resumed at t=90: total elapsed wall time is 90 + 70 = 160.
        t.schedule(0, 100);
        t.freeze(30);
        assert!(t.is_frozen());
        assert_eq!(t.remaining(30), 70);

        t.unfreeze(90);
        assert!(t.is_running());
        assert!(!t.take_expired(159));
        assert!(t.take_expired(160));
    }

    #[test]
    fn freeze_clamps_to_minimum_remainder() {
        let mut t = ProtocolTimer::new(TimerRole::CtsWait);
        t.schedule(0, 10);

        // Frozen after the nominal deadline: remainder clamps to the
        // minimum positive epsilon instead of zero.
        t.freeze(25);
        assert_eq!(t.remaining(25), 1);

        t.unfreeze(30);
        assert!(t.take_expired(31));
    }

    #[test]
    fn stop_is_idempotent() {
        let mut t = ProtocolTimer::new(TimerRole::RtsRetry);
        t.schedule(0, 10);
        t.stop();
        assert!(t.is_idle());
        t.stop();
        assert!(t.is_idle());
        assert!(!t.take_expired(1000));
    }

    #[test]
    fn counter_tracks_retries() {
        let mut t = ProtocolTimer::new(TimerRole::Backoff);
        assert_eq!(t.counter(), 0);
        t.incr_counter();
        t.incr_counter();
        assert_eq!(t.counter(), 2);
        t.reset_counter();
        assert_eq!(t.counter(), 0);
    }

    #[test]
    fn mock_clock_advances() {
        let mut clock = MockClock::new();
        assert_eq!(clock.now(), 0);
        clock.set_ms(2);
        assert_eq!(clock.now(), 2000);
        clock.advance(500);
        assert_eq!(clock.now(), 2500);
    }
}
