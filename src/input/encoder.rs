//! Rotary encoder (knob) with bounded full-step detents.
//!
//! The CLK/DT edge handler calls [`EncoderLatch::on_pins`], which decodes
//! the quadrature transition with a lookup table and updates a handful of
//! atomics. The scheduler reads the new value through [`Encoder`].

use core::sync::atomic::{AtomicBool, AtomicI32, AtomicI8, AtomicU8, Ordering};

use crate::input::{InputEvent, InputSource};
use crate::Millis;

/// Quarter-step delta indexed by `(previous << 2) | current`.
const TRANSITIONS: [i8; 16] = [0, -1, 1, 0, 1, 0, 0, -1, -1, 0, 0, 1, 0, 1, -1, 0];

/// Quadrature transitions per mechanical detent.
const STEPS_PER_DETENT: i8 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Clockwise, value went up.
    Cw,
    /// Counter-clockwise, value went down.
    Ccw,
    /// Changed flag raised but the value is where it was.
    Still,
}

impl Direction {
    /// The single-character marker shown on the display.
    pub fn marker(self) -> char {
        match self {
            Direction::Cw => '+',
            Direction::Ccw => '-',
            Direction::Still => '.',
        }
    }
}

pub struct EncoderLatch {
    pins: AtomicU8,
    quarter: AtomicI8,
    value: AtomicI32,
    changed: AtomicBool,
    min: i32,
    max: i32,
}

impl EncoderLatch {
    /// Both pins idle high (pull-ups), value starts at `min`.
    pub const fn new(min: i32, max: i32) -> Self {
        Self {
            pins: AtomicU8::new(0b11),
            quarter: AtomicI8::new(0),
            value: AtomicI32::new(min),
            changed: AtomicBool::new(false),
            min,
            max,
        }
    }

    /// Interrupt side: feed the current CLK and DT levels.
    pub fn on_pins(&self, clk: bool, dt: bool) {
        let current = ((clk as u8) << 1) | dt as u8;
        let previous = self.pins.swap(current, Ordering::Relaxed);
        let delta = TRANSITIONS[((previous << 2) | current) as usize];
        if delta == 0 {
            return;
        }

        let quarter = self.quarter.load(Ordering::Relaxed) + delta;
        let step = if quarter >= STEPS_PER_DETENT {
            1
        } else if quarter <= -STEPS_PER_DETENT {
            -1
        } else {
            self.quarter.store(quarter, Ordering::Relaxed);
            return;
        };
        self.quarter.store(0, Ordering::Relaxed);

        let old = self.value.load(Ordering::Relaxed);
        let new = (old + step).clamp(self.min, self.max);
        if new != old {
            self.value.store(new, Ordering::Relaxed);
            self.changed.store(true, Ordering::Release);
        }
    }

    pub fn value(&self) -> i32 {
        self.value.load(Ordering::Relaxed)
    }

    /// Scheduler side: `Some(value)` once per change burst.
    pub fn take_change(&self) -> Option<i32> {
        if self.changed.swap(false, Ordering::AcqRel) {
            Some(self.value())
        } else {
            None
        }
    }
}

/// Scheduler-side reader producing [`InputEvent::Knob`].
pub struct Encoder<'a> {
    latch: &'a EncoderLatch,
    previous: i32,
}

impl<'a> Encoder<'a> {
    pub fn new(latch: &'a EncoderLatch) -> Self {
        Self {
            latch,
            previous: latch.value(),
        }
    }
}

impl InputSource for Encoder<'_> {
    fn poll(&mut self, _now: Millis) -> Option<InputEvent> {
        let value = self.latch.take_change()?;
        let direction = if value > self.previous {
            Direction::Cw
        } else if value < self.previous {
            Direction::Ccw
        } else {
            Direction::Still
        };
        self.previous = value;
        Some(InputEvent::Knob { value, direction })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One clockwise detent starting from rest (both high).
    const CW: [(bool, bool); 4] = [(false, true), (false, false), (true, false), (true, true)];
    const CCW: [(bool, bool); 4] = [(true, false), (false, false), (false, true), (true, true)];

    fn turn(latch: &EncoderLatch, seq: &[(bool, bool)], detents: usize) {
        for _ in 0..detents {
            for &(clk, dt) in seq {
                latch.on_pins(clk, dt);
            }
        }
    }

    #[test]
    fn directions_are_opposite() {
        let a = EncoderLatch::new(0, 10);
        turn(&a, &CW, 1);
        let b = EncoderLatch::new(0, 10);
        turn(&b, &CCW, 1);
        turn(&b, &CW, 2);
        assert_eq!(a.value(), 1);
        assert_eq!(b.value(), 2);
    }

    #[test]
    fn half_a_detent_does_not_count() {
        let latch = EncoderLatch::new(0, 10);
        latch.on_pins(false, true);
        latch.on_pins(false, false);
        assert_eq!(latch.take_change(), None);
        assert_eq!(latch.value(), 0);
    }

    #[test]
    fn value_is_bounded() {
        let latch = EncoderLatch::new(0, 10);
        turn(&latch, &CW, 15);
        assert_eq!(latch.value(), 10);
        turn(&latch, &CCW, 25);
        assert_eq!(latch.value(), 0);
    }

    #[test]
    fn repeated_level_is_ignored() {
        let latch = EncoderLatch::new(0, 10);
        latch.on_pins(true, true);
        latch.on_pins(true, true);
        assert_eq!(latch.take_change(), None);
    }

    #[test]
    fn reader_reports_direction_once() {
        let latch = EncoderLatch::new(0, 10);
        let mut knob = Encoder::new(&latch);
        assert_eq!(knob.poll(0), None);

        turn(&latch, &CW, 2);
        assert_eq!(
            knob.poll(0),
            Some(InputEvent::Knob {
                value: 2,
                direction: Direction::Cw
            })
        );
        assert_eq!(knob.poll(0), None);

        turn(&latch, &CCW, 1);
        match knob.poll(0) {
            Some(InputEvent::Knob { value, direction }) => {
                assert_eq!(value, 1);
                assert_eq!(direction.marker(), '-');
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
