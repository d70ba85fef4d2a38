//! Target bindings (feature `embedded`).
//!
//! Maps the host-testable library onto the nRF52840:
//!
//! 1. **Radio** - SoftDevice S140 behind [`Radio`](crate::ble::radio::Radio) ([`radio`]).
//! 2. **Inputs** - GPIOTE edge watchers feeding the input latches ([`pins`]).
//! 3. **Outputs** - SSD1306 OLED ([`display`]), HD44780 LCD ([`lcd`]) and
//!    the light-strip controller ([`lights`]).
//! 4. **GPS** - UART line reader posting into a mailbox ([`gps`]).
//! 5. **Main loop** - timed scheduler ticks plus radio event delivery ([`run`]).

pub mod display;
pub mod gps;
pub mod lcd;
pub mod lights;
pub mod pins;
pub mod radio;
pub mod run;

use embassy_nrf::interrupt::Priority;
use embassy_time::Instant;

use crate::Millis;

/// Milliseconds since boot, from the RTC1 time driver.
pub fn now_ms() -> Millis {
    Instant::now().as_millis()
}

/// Embassy HAL configuration compatible with the SoftDevice, which
/// reserves interrupt priorities 0, 1 and 4.
pub fn hal_config() -> embassy_nrf::config::Config {
    let mut config = embassy_nrf::config::Config::default();
    config.gpiote_interrupt_priority = Priority::P2;
    config.time_interrupt_priority = Priority::P2;
    config
}
