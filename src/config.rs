//! Application-wide constants and compile-time configuration.
//!
//! All pin assignments, timing parameters, and protocol constants live
//! here so they can be tuned in one place.

use crate::Millis;

// Timing

/// Debounce window for the knob, boot and power buttons (ms).
pub const BUTTON_DEBOUNCE_MS: u32 = 50;

/// Debounce window for the keypad column interrupt (ms).
pub const KEYPAD_DEBOUNCE_MS: u32 = 50;

/// Scheduler yield between ticks on the handheld (ms).
pub const QUADCORDER_LOOP_MS: u64 = 10;

/// Scheduler yield between ticks on the beacon and console (ms).
pub const COMPANION_LOOP_MS: u64 = 100;

/// Period of the handheld display refresh tick (ms).
pub const DISPLAY_REFRESH_MS: Millis = 5_000;

/// Delay between the "find me" write and the disconnect (ms).
pub const SETTLE_DELAY_MS: Millis = 250;

/// Give up on a connect attempt after this long (ms).
pub const CONNECT_TIMEOUT_MS: Millis = 5_000;

/// How long a triggered beacon keeps flashing (ms). 5 minutes.
pub const BEACON_ALARM_MS: Millis = 300_000;

/// Beacon flasher toggle period (ms).
pub const BEACON_FLASH_MS: Millis = 200;

/// Flash shown once at beacon boot (ms).
pub const BEACON_BOOT_FLASH_MS: Millis = 500;

/// Status LED toggle period while disconnected (ms).
pub const INDICATOR_BLINK_MS: Millis = 200;

/// Console display page period (ms).
pub const CONSOLE_PAGE_MS: Millis = 3_000;

/// How long the console holds the "NEW FREQUENCY!" banner (ms).
pub const CONSOLE_BANNER_MS: Millis = 3_000;

// BLE

/// Scan interval (µs). Scans run until stopped.
pub const SCAN_INTERVAL_US: u32 = 1_000_000;

/// Scan window (µs).
pub const SCAN_WINDOW_US: u32 = 500_000;

/// Advertising interval requested from the stack (µs).
pub const ADV_INTERVAL_US: u32 = 100;

/// Substring every game beacon carries in its advertised name.
pub const BEACON_KEY: &[u8] = b"67D7A2D5";

/// Advertised names.
pub const QUADCORDER_NAME: &str = "QuadCorder1";
pub const CONSOLE_NAME: &str = "CentralComputer";
pub const BEACON_NAME: &str = "67D7A2D5A08D#6CDD";

/// Largest NUS message we accept or send (bytes, before the trailing newline).
pub const MAX_MESSAGE_LEN: usize = 20;

// Peripherals on the I2C bus

/// SSD1306 128x64 OLED.
pub const OLED_ADDR: u8 = 0x3C;

/// HD44780 character LCD behind a PCF8574 expander.
pub const LCD_ADDR: u8 = 0x27;
pub const LCD_ROWS: u8 = 2;
pub const LCD_COLUMNS: u8 = 16;

/// Microcontroller driving the NeoPixel strip.
pub const LIGHTS_ADDR: u8 = 0x07;

// GPS

/// GPS UART baud rate.
pub const GPS_BAUD: u32 = 9_600;

/// Longest NMEA sentence we buffer (bytes).
pub const GPS_LINE_LEN: usize = 96;

// GPIO pin assignments (nRF52840)
//
// These are logical names; actual `embassy_nrf::peripherals::*` types are
// selected in the binaries.  Adjust for your board.
//
// Quadcorder
//   OLED SDA / SCL      → P0.26 / P0.27
//   Knob button         → P0.11
//   Knob CLK / DT       → P0.12 / P0.24
//   GPS RX / TX         → P0.08 / P0.06
//   Keypad rows R1..R4  → P0.02 P0.03 P0.04 P0.05
//   Keypad cols C1..C4  → P0.28 P0.29 P0.30 P0.31
//   Keypad ack LED      → P0.13
//
// Beacon
//   Status LED          → P0.13
//   Flasher             → P0.14
//   Boot button         → P0.11
//
// Console
//   LCD / lights SDA/SCL → P0.26 / P0.27
//   Power switch        → P0.11
//   Power switch LED    → P0.15

/// Knob detent range.
pub const KNOB_MIN: i32 = 0;
pub const KNOB_MAX: i32 = 10;

/// Handheld tunables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QuadcorderConfig {
    pub refresh_ms: Millis,
    pub settle_ms: Millis,
    pub connect_timeout_ms: Millis,
}

impl Default for QuadcorderConfig {
    fn default() -> Self {
        Self {
            refresh_ms: DISPLAY_REFRESH_MS,
            settle_ms: SETTLE_DELAY_MS,
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
        }
    }
}

/// Beacon tunables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BeaconConfig {
    pub alarm_ms: Millis,
    pub flash_ms: Millis,
    pub boot_flash_ms: Millis,
    pub indicator_ms: Millis,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            alarm_ms: BEACON_ALARM_MS,
            flash_ms: BEACON_FLASH_MS,
            boot_flash_ms: BEACON_BOOT_FLASH_MS,
            indicator_ms: INDICATOR_BLINK_MS,
        }
    }
}

/// Console tunables.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConsoleConfig {
    pub page_ms: Millis,
    pub banner_ms: Millis,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            page_ms: CONSOLE_PAGE_MS,
            banner_ms: CONSOLE_BANNER_MS,
        }
    }
}
