//! SSD1306 OLED as a [`Surface`].

use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::mono_font::{MonoTextStyle, MonoTextStyleBuilder};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Circle, Line, PrimitiveStyle, Rectangle};
use embedded_graphics::text::{Baseline, Text};
use ssd1306::mode::BufferedGraphicsMode;
use ssd1306::prelude::*;
use ssd1306::I2CDisplayInterface;
use ssd1306::Ssd1306;

use crate::ui::{Color, Surface};

/// Concrete driver type, generic over the HAL's I²C peripheral.
pub type Display<I2C> =
    Ssd1306<I2CInterface<I2C>, DisplaySize128x64, BufferedGraphicsMode<DisplaySize128x64>>;

pub struct Oled<I2C> {
    display: Display<I2C>,
}

impl<I2C> Oled<I2C>
where
    I2C: embedded_hal::i2c::I2c,
{
    /// Initialise the panel and clear it.
    pub fn new(i2c: I2C) -> Self {
        let interface = I2CDisplayInterface::new(i2c);
        let mut display = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
        if display.init().is_err() {
            warn!("oled: init failed");
        }
        display.clear_buffer();
        let _ = display.flush();
        Self { display }
    }
}

fn binary(color: Color) -> BinaryColor {
    match color {
        Color::On => BinaryColor::On,
        Color::Off => BinaryColor::Off,
    }
}

fn text_style(color: Color) -> MonoTextStyle<'static, BinaryColor> {
    MonoTextStyleBuilder::new()
        .font(&FONT_6X10)
        .text_color(binary(color))
        .build()
}

impl<I2C> Surface for Oled<I2C>
where
    I2C: embedded_hal::i2c::I2c,
{
    fn clear(&mut self) {
        self.display.clear_buffer();
    }

    fn draw_text(&mut self, text: &str, x: i32, y: i32, color: Color) {
        let _ = Text::with_baseline(text, Point::new(x, y), text_style(color), Baseline::Top)
            .draw(&mut self.display);
    }

    fn draw_line(&mut self, from: (i32, i32), to: (i32, i32), color: Color) {
        let _ = Line::new(Point::new(from.0, from.1), Point::new(to.0, to.1))
            .into_styled(PrimitiveStyle::with_stroke(binary(color), 1))
            .draw(&mut self.display);
    }

    fn draw_circle(&mut self, center: (i32, i32), radius: u32, color: Color) {
        let _ = Circle::with_center(Point::new(center.0, center.1), radius * 2 + 1)
            .into_styled(PrimitiveStyle::with_stroke(binary(color), 1))
            .draw(&mut self.display);
    }

    fn draw_rect(&mut self, origin: (i32, i32), size: (u32, u32), color: Color) {
        let _ = Rectangle::new(Point::new(origin.0, origin.1), Size::new(size.0, size.1))
            .into_styled(PrimitiveStyle::with_stroke(binary(color), 1))
            .draw(&mut self.display);
    }

    fn fill_rect(&mut self, origin: (i32, i32), size: (u32, u32), color: Color) {
        let _ = Rectangle::new(Point::new(origin.0, origin.1), Size::new(size.0, size.1))
            .into_styled(PrimitiveStyle::with_fill(binary(color)))
            .draw(&mut self.display);
    }

    fn present(&mut self) {
        if self.display.flush().is_err() {
            warn!("oled: flush failed");
        }
    }
}
