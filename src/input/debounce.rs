//! Edge-triggered interrupt → debounce → stable transition.
//!
//! The interrupt half ([`EdgeLatch`]) only records that an edge happened
//! and when. Everything else (re-sampling the pin, deciding whether the
//! level really changed, re-arming) runs in the scheduler through
//! [`DebouncedInput::poll_and_consume`].

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embedded_hal::digital::InputPin;

use crate::Millis;

/// Which pin edges the interrupt is configured for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EdgeTrigger {
    Falling,
    Rising,
    Both,
}

/// Logical switch state after applying the pin's active level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SwitchState {
    Pressed,
    Released,
}

/// A debounced change reported to the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Transition {
    pub to: SwitchState,
    /// Time of the interrupt that started the debounce window.
    pub at: Millis,
}

/// Interrupt-side capability of one debounced input.
///
/// `pending` has a single writer (the handler) and a single clearer (the
/// scheduler). While a window is open the latch is disarmed, so bounces
/// cannot set the flag again.
pub struct EdgeLatch {
    pending: AtomicBool,
    armed: AtomicBool,
    stamp: AtomicU32,
}

impl EdgeLatch {
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
            armed: AtomicBool::new(true),
            stamp: AtomicU32::new(0),
        }
    }

    /// Call from the pin interrupt. O(1), no allocation, no side effects
    /// beyond the latch itself.
    pub fn on_edge_interrupt(&self, now: Millis) {
        if self.armed.swap(false, Ordering::AcqRel) {
            self.stamp.store(now as u32, Ordering::Relaxed);
            self.pending.store(true, Ordering::Release);
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Milliseconds since the latched edge, or `None` if nothing is pending.
    pub(crate) fn elapsed(&self, now: Millis) -> Option<u32> {
        if !self.is_pending() {
            return None;
        }
        let stamp = self.stamp.load(Ordering::Relaxed);
        Some((now as u32).wrapping_sub(stamp))
    }

    /// Clear the pending flag and accept the next edge.
    pub(crate) fn consume(&self) {
        self.pending.store(false, Ordering::Release);
        self.armed.store(true, Ordering::Release);
    }
}

impl Default for EdgeLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Scheduler-side half: owns the pin and the stable state.
pub struct DebouncedInput<'a, P> {
    pin: P,
    latch: &'a EdgeLatch,
    trigger: EdgeTrigger,
    active_low: bool,
    window_ms: u32,
    stable: SwitchState,
    last_transition: Option<Millis>,
}

impl<'a, P: InputPin> DebouncedInput<'a, P> {
    /// `active_low` is true for switches to ground with a pull-up.
    pub fn new(
        mut pin: P,
        latch: &'a EdgeLatch,
        trigger: EdgeTrigger,
        active_low: bool,
        window_ms: u32,
    ) -> Self {
        let stable = match pin.is_high() {
            Ok(high) => Self::state_for(high, active_low),
            Err(_) => SwitchState::Released,
        };
        Self {
            pin,
            latch,
            trigger,
            active_low,
            window_ms,
            stable,
            last_transition: None,
        }
    }

    fn state_for(high: bool, active_low: bool) -> SwitchState {
        if high != active_low {
            SwitchState::Pressed
        } else {
            SwitchState::Released
        }
    }

    /// Call from the scheduler only.
    ///
    /// Once the window has elapsed, samples the pin, clears the pending
    /// flag, re-arms the latch and reports the transition if the sampled
    /// level is one this input reports. Bounces inside the window are
    /// invisible; only the level at consume time counts.
    pub fn poll_and_consume(&mut self, now: Millis) -> Option<Transition> {
        let elapsed = self.latch.elapsed(now)?;
        if elapsed < self.window_ms {
            return None;
        }

        let sampled = self.pin.is_high();
        self.latch.consume();

        let high = match sampled {
            Ok(high) => high,
            Err(_) => {
                debug!("debounce: pin read failed, re-armed");
                return None;
            }
        };
        let to = Self::state_for(high, self.active_low);

        let edge_high = high;
        let report = match self.trigger {
            EdgeTrigger::Both => to != self.stable,
            EdgeTrigger::Falling => !edge_high,
            EdgeTrigger::Rising => edge_high,
        };
        self.stable = to;

        if !report {
            return None;
        }

        let at = now.saturating_sub(elapsed as Millis);
        self.last_transition = Some(at);
        Some(Transition { to, at })
    }

    pub fn state(&self) -> SwitchState {
        self.stable
    }

    pub fn last_transition(&self) -> Option<Millis> {
        self.last_transition
    }

    pub fn window_ms(&self) -> u32 {
        self.window_ms
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use core::cell::Cell;
    use core::convert::Infallible;
    use std::rc::Rc;

    /// Pin whose level the test controls.
    #[derive(Clone)]
    pub(crate) struct FakePin(pub Rc<Cell<bool>>);

    impl FakePin {
        pub(crate) fn new(high: bool) -> (Self, Rc<Cell<bool>>) {
            let level = Rc::new(Cell::new(high));
            (Self(level.clone()), level)
        }
    }

    impl embedded_hal::digital::ErrorType for FakePin {
        type Error = Infallible;
    }

    impl InputPin for FakePin {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(self.0.get())
        }
        fn is_low(&mut self) -> Result<bool, Infallible> {
            Ok(!self.0.get())
        }
    }

    #[test]
    fn nothing_pending_yields_nothing() {
        let latch = EdgeLatch::new();
        let (pin, _) = FakePin::new(true);
        let mut input = DebouncedInput::new(pin, &latch, EdgeTrigger::Falling, true, 50);
        assert_eq!(input.poll_and_consume(1_000), None);
    }

    #[test]
    fn waits_for_the_window() {
        let latch = EdgeLatch::new();
        let (pin, level) = FakePin::new(true);
        let mut input = DebouncedInput::new(pin, &latch, EdgeTrigger::Falling, true, 50);

        level.set(false);
        latch.on_edge_interrupt(100);
        assert_eq!(input.poll_and_consume(120), None);
        assert!(latch.is_pending());

        let t = input.poll_and_consume(150).unwrap();
        assert_eq!(t.to, SwitchState::Pressed);
        assert_eq!(t.at, 100);
        assert!(!latch.is_pending());
        assert_eq!(input.state(), SwitchState::Pressed);
        assert_eq!(input.last_transition(), Some(100));
    }

    #[test]
    fn rapid_double_fire_reports_once() {
        let latch = EdgeLatch::new();
        let (pin, level) = FakePin::new(true);
        let mut input = DebouncedInput::new(pin, &latch, EdgeTrigger::Falling, true, 50);

        level.set(false);
        latch.on_edge_interrupt(10);
        // Bounces while the window is open do not move the stamp.
        latch.on_edge_interrupt(12);
        latch.on_edge_interrupt(30);

        assert!(input.poll_and_consume(60).is_some());
        assert_eq!(input.poll_and_consume(61), None);
        assert_eq!(input.poll_and_consume(500), None);
    }

    #[test]
    fn only_consume_time_level_counts() {
        let latch = EdgeLatch::new();
        let (pin, level) = FakePin::new(false);
        let mut input = DebouncedInput::new(pin, &latch, EdgeTrigger::Both, false, 20);
        assert_eq!(input.state(), SwitchState::Released);

        // Glitch high then back low before the window closes.
        level.set(true);
        latch.on_edge_interrupt(0);
        level.set(false);
        assert_eq!(input.poll_and_consume(25), None);
        assert_eq!(input.state(), SwitchState::Released);

        // Latch was re-armed: a real press is reported.
        level.set(true);
        latch.on_edge_interrupt(100);
        let t = input.poll_and_consume(130).unwrap();
        assert_eq!(t.to, SwitchState::Pressed);

        level.set(false);
        latch.on_edge_interrupt(200);
        let t = input.poll_and_consume(230).unwrap();
        assert_eq!(t.to, SwitchState::Released);
    }

    #[test]
    fn falling_trigger_reports_each_press() {
        let latch = EdgeLatch::new();
        let (pin, level) = FakePin::new(true);
        let mut input = DebouncedInput::new(pin, &latch, EdgeTrigger::Falling, true, 50);

        for t0 in [0u64, 1_000, 2_000] {
            level.set(false);
            latch.on_edge_interrupt(t0);
            assert!(input.poll_and_consume(t0 + 50).is_some());
            // Release: no interrupt for a falling-only input.
            level.set(true);
        }
    }

    #[test]
    fn timestamp_survives_u32_wrap() {
        let latch = EdgeLatch::new();
        let (pin, level) = FakePin::new(true);
        let mut input = DebouncedInput::new(pin, &latch, EdgeTrigger::Falling, true, 50);

        let start = u32::MAX as Millis - 10;
        level.set(false);
        latch.on_edge_interrupt(start);
        assert_eq!(input.poll_and_consume(start + 20), None);
        let t = input.poll_and_consume(start + 60).unwrap();
        assert_eq!(t.at, start);
    }
}
