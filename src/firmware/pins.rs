//! Edge watchers: the "interrupt side" of every input.
//!
//! Each watcher owns a GPIOTE-backed [`Input`] and does nothing but stamp
//! a latch when its edge fires. The scheduler-side readers never touch
//! these pins; they sample the port through [`PortPin`].

use core::convert::Infallible;

use embassy_futures::select::{select, select4};
use embassy_nrf::gpio::Input;
use embassy_nrf::pac;

use crate::firmware::now_ms;
use crate::input::debounce::{EdgeLatch, EdgeTrigger};
use crate::input::encoder::EncoderLatch;
use crate::input::keypad::COLS;

/// Read-only view of one P0 pin, sampled from the port `IN` register.
///
/// The pin itself must already be configured as an input (by the watcher
/// that owns it).
#[derive(Clone, Copy)]
pub struct PortPin {
    pin: usize,
}

impl PortPin {
    pub const fn new(pin: usize) -> Self {
        Self { pin }
    }
}

impl embedded_hal::digital::ErrorType for PortPin {
    type Error = Infallible;
}

impl embedded_hal::digital::InputPin for PortPin {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(pac::P0.in_().read().pin(self.pin))
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        self.is_high().map(|high| !high)
    }
}

/// Stamp `latch` on every `trigger` edge of `pin`.
pub async fn watch_edges(mut pin: Input<'static>, trigger: EdgeTrigger, latch: &EdgeLatch) -> ! {
    loop {
        match trigger {
            EdgeTrigger::Falling => pin.wait_for_falling_edge().await,
            EdgeTrigger::Rising => pin.wait_for_rising_edge().await,
            EdgeTrigger::Both => pin.wait_for_any_edge().await,
        }
        latch.on_edge_interrupt(now_ms());
    }
}

/// Stamp `latch` once per key press on the keypad columns.
///
/// The row sweep itself makes the held column toggle, so after each latch
/// the watcher waits for every column to go low before arming again.
pub async fn watch_columns(mut cols: [Input<'static>; COLS], latch: &EdgeLatch) -> ! {
    loop {
        {
            let [c0, c1, c2, c3] = &mut cols;
            select4(
                c0.wait_for_rising_edge(),
                c1.wait_for_rising_edge(),
                c2.wait_for_rising_edge(),
                c3.wait_for_rising_edge(),
            )
            .await;
        }
        latch.on_edge_interrupt(now_ms());

        for col in cols.iter_mut() {
            col.wait_for_low().await;
        }
    }
}

/// Feed knob CLK/DT levels to the encoder decoder on every change.
pub async fn watch_knob(mut clk: Input<'static>, mut dt: Input<'static>, latch: &EncoderLatch) -> ! {
    latch.on_pins(clk.is_high(), dt.is_high());
    loop {
        select(clk.wait_for_any_edge(), dt.wait_for_any_edge()).await;
        latch.on_pins(clk.is_high(), dt.is_high());
    }
}
