//! HD44780 character LCD behind a PCF8574 I²C expander, 4-bit mode.
//!
//! Expander bit layout: P0 = RS, P1 = RW, P2 = EN, P3 = backlight,
//! P4..P7 = D4..D7.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::ui::CharLcd;

const RS: u8 = 0x01;
const EN: u8 = 0x04;
const BACKLIGHT: u8 = 0x08;

const CMD_CLEAR: u8 = 0x01;
const CMD_ENTRY_MODE: u8 = 0x06;
const CMD_DISPLAY_ON: u8 = 0x0C;
const CMD_FUNCTION_4BIT_2LINE: u8 = 0x28;
const CMD_SET_DDRAM: u8 = 0x80;

/// DDRAM address of column 0 per row.
const ROW_OFFSETS: [u8; 4] = [0x00, 0x40, 0x14, 0x54];

pub struct I2cLcd<I2C, D> {
    i2c: I2C,
    delay: D,
    addr: u8,
    rows: u8,
    columns: u8,
    backlight: u8,
}

impl<I2C: I2c, D: DelayNs> I2cLcd<I2C, D> {
    /// Run the power-on initialisation sequence and clear the screen.
    pub fn new(i2c: I2C, delay: D, addr: u8, rows: u8, columns: u8) -> Self {
        let mut lcd = Self {
            i2c,
            delay,
            addr,
            rows,
            columns,
            backlight: BACKLIGHT,
        };
        lcd.delay.delay_ms(50);
        // Force 8-bit mode three times, then switch to 4-bit.
        for wait in [5, 1, 1] {
            lcd.write_nibble(0x30, 0);
            lcd.delay.delay_ms(wait);
        }
        lcd.write_nibble(0x20, 0);
        lcd.delay.delay_ms(1);
        lcd.command(CMD_FUNCTION_4BIT_2LINE);
        lcd.command(CMD_DISPLAY_ON);
        lcd.command(CMD_ENTRY_MODE);
        CharLcd::clear(&mut lcd);
        lcd
    }

    fn expander(&mut self, bits: u8) {
        if self.i2c.write(self.addr, &[bits | self.backlight]).is_err() {
            debug!("lcd: i2c write failed");
        }
    }

    fn write_nibble(&mut self, nibble: u8, mode: u8) {
        let bits = (nibble & 0xF0) | mode;
        self.expander(bits | EN);
        self.delay.delay_us(1);
        self.expander(bits);
        self.delay.delay_us(50);
    }

    fn send(&mut self, byte: u8, mode: u8) {
        self.write_nibble(byte & 0xF0, mode);
        self.write_nibble(byte << 4, mode);
    }

    fn command(&mut self, cmd: u8) {
        self.send(cmd, 0);
    }
}

impl<I2C: I2c, D: DelayNs> CharLcd for I2cLcd<I2C, D> {
    fn clear(&mut self) {
        self.command(CMD_CLEAR);
        self.delay.delay_ms(2);
    }

    fn set_cursor(&mut self, row: u8, col: u8) {
        let row = row.min(self.rows.saturating_sub(1)) as usize;
        let col = col.min(self.columns.saturating_sub(1));
        self.command(CMD_SET_DDRAM | (ROW_OFFSETS[row.min(3)] + col));
    }

    fn write_str(&mut self, text: &str) {
        for byte in text.bytes() {
            self.send(byte, RS);
        }
    }

    fn backlight(&mut self, on: bool) {
        self.backlight = if on { BACKLIGHT } else { 0 };
        self.expander(0);
    }
}
