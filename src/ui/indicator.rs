//! Blinking output driven from a scheduler timer.

use embedded_hal::digital::OutputPin;

pub struct Blinker<P> {
    pin: P,
    running: bool,
    lit: bool,
}

impl<P: OutputPin> Blinker<P> {
    /// Wrap `pin` and drive it low.
    pub fn new(mut pin: P) -> Self {
        let _ = pin.set_low();
        Self {
            pin,
            running: false,
            lit: false,
        }
    }

    /// Start blinking. The first toggle turns the output on.
    pub fn start(&mut self) {
        self.running = true;
    }

    /// Stop and force the output low. Safe when not running.
    pub fn stop(&mut self) {
        self.running = false;
        self.set(false);
    }

    /// Timer tick. Does nothing while stopped.
    pub fn toggle(&mut self) {
        if self.running {
            self.set(!self.lit);
        }
    }

    /// Drive the output directly.
    pub fn set(&mut self, on: bool) {
        let result = if on {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if result.is_err() {
            debug!("blinker: pin write failed");
        }
        self.lit = on;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use core::convert::Infallible;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Clone)]
    pub(crate) struct FakeLed(pub Rc<Cell<bool>>);

    impl FakeLed {
        pub(crate) fn new() -> (Self, Rc<Cell<bool>>) {
            let level = Rc::new(Cell::new(true));
            (Self(level.clone()), level)
        }
    }

    impl embedded_hal::digital::ErrorType for FakeLed {
        type Error = Infallible;
    }

    impl OutputPin for FakeLed {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.0.set(false);
            Ok(())
        }
        fn set_high(&mut self) -> Result<(), Infallible> {
            self.0.set(true);
            Ok(())
        }
    }

    #[test]
    fn starts_low_and_toggles_while_running() {
        let (led, level) = FakeLed::new();
        let mut b = Blinker::new(led);
        assert!(!level.get());
        b.toggle();
        assert!(!level.get());

        b.start();
        b.toggle();
        assert!(level.get());
        b.toggle();
        assert!(!level.get());
    }

    #[test]
    fn stop_forces_low_and_is_idempotent() {
        let (led, level) = FakeLed::new();
        let mut b = Blinker::new(led);
        b.stop();
        assert!(!level.get());

        b.start();
        b.toggle();
        b.stop();
        b.stop();
        assert!(!level.get());
        assert!(!b.is_running());
        b.toggle();
        assert!(!level.get());
    }
}
