//! Physical inputs: debounced buttons, the keypad matrix and the knob.
//!
//! Every input splits into an interrupt-side latch (atomics only) and a
//! scheduler-side reader implementing [`InputSource`].

pub mod debounce;
pub mod encoder;
pub mod keypad;

use embedded_hal::digital::{InputPin, OutputPin};

use crate::Millis;
use debounce::{DebouncedInput, EdgeLatch, EdgeTrigger, Transition};
use encoder::Direction;
use keypad::KeypadMatrix;

/// Which push button a transition came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonId {
    /// Push switch on the rotary encoder.
    Knob,
    /// Boot button on the beacon board.
    Boot,
    /// Lighted power switch on the console.
    Power,
}

/// A debounced input as seen by the application.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InputEvent {
    Button { id: ButtonId, transition: Transition },
    Key(char),
    Knob { value: i32, direction: Direction },
}

/// Something the scheduler drains at the start of every tick.
pub trait InputSource {
    /// Return at most one event. Must not block.
    fn poll(&mut self, now: Millis) -> Option<InputEvent>;
}

/// A named debounced push button.
pub struct Button<'a, P> {
    id: ButtonId,
    input: DebouncedInput<'a, P>,
}

impl<'a, P: InputPin> Button<'a, P> {
    pub fn new(
        id: ButtonId,
        pin: P,
        latch: &'a EdgeLatch,
        trigger: EdgeTrigger,
        active_low: bool,
        window_ms: u32,
    ) -> Self {
        Self {
            id,
            input: DebouncedInput::new(pin, latch, trigger, active_low, window_ms),
        }
    }

    pub fn id(&self) -> ButtonId {
        self.id
    }

    pub fn input(&self) -> &DebouncedInput<'a, P> {
        &self.input
    }
}

impl<P: InputPin> InputSource for Button<'_, P> {
    fn poll(&mut self, now: Millis) -> Option<InputEvent> {
        let transition = self.input.poll_and_consume(now)?;
        Some(InputEvent::Button {
            id: self.id,
            transition,
        })
    }
}

impl<R, C, L> InputSource for KeypadMatrix<'_, R, C, L>
where
    R: OutputPin,
    C: InputPin,
    L: OutputPin,
{
    fn poll(&mut self, now: Millis) -> Option<InputEvent> {
        self.service(now);
        self.get_button().map(|(_, symbol)| InputEvent::Key(symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::debounce::tests::FakePin;
    use super::debounce::SwitchState;
    use super::*;

    #[test]
    fn button_tags_transition_with_id() {
        let latch = EdgeLatch::new();
        let (pin, level) = FakePin::new(true);
        let mut knob = Button::new(ButtonId::Knob, pin, &latch, EdgeTrigger::Falling, true, 50);

        level.set(false);
        latch.on_edge_interrupt(10);
        assert_eq!(knob.poll(30), None);
        match knob.poll(60) {
            Some(InputEvent::Button { id, transition }) => {
                assert_eq!(id, ButtonId::Knob);
                assert_eq!(transition.to, SwitchState::Pressed);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn keypad_source_yields_symbol() {
        let latch = EdgeLatch::new();
        let (mut kp, m, _) = keypad::tests::keypad(&latch);
        m.press(1, 3);
        latch.on_edge_interrupt(0);
        assert_eq!(kp.poll(10), None);
        assert_eq!(kp.poll(50), Some(InputEvent::Key('B')));
        assert_eq!(kp.poll(60), None);
    }
}
