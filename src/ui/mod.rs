//! Output collaborators: the OLED surface, the character LCD and the
//! light-effects controller.
//!
//! Applications render through these traits only; the SSD1306, HD44780
//! and I2C light link live in `firmware`.

pub mod indicator;

/// Monochrome pixel colour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Color {
    Off,
    On,
}

/// A buffered pixel display. Nothing is visible until [`Surface::present`].
pub trait Surface {
    fn clear(&mut self);
    /// Text with its top-left corner at `(x, y)`.
    fn draw_text(&mut self, text: &str, x: i32, y: i32, color: Color);
    fn draw_line(&mut self, from: (i32, i32), to: (i32, i32), color: Color);
    fn draw_circle(&mut self, center: (i32, i32), radius: u32, color: Color);
    fn draw_rect(&mut self, origin: (i32, i32), size: (u32, u32), color: Color);
    fn fill_rect(&mut self, origin: (i32, i32), size: (u32, u32), color: Color);
    fn present(&mut self);
}

/// A character LCD.
pub trait CharLcd {
    fn clear(&mut self);
    fn set_cursor(&mut self, row: u8, col: u8);
    fn write_str(&mut self, text: &str);
    fn backlight(&mut self, on: bool);
}

/// Fire-and-forget light strip effects. `effect` and `mode` are single
/// ASCII digits understood by the strip controller.
pub trait LightEffects {
    fn request(&mut self, effect: u8, mode: u8);
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::string::String;
    use std::vec::Vec;

    /// Keeps the text of the last presented frame.
    #[derive(Default)]
    pub(crate) struct FakeSurface {
        frame: Vec<(i32, String)>,
        pub presented: Vec<Vec<String>>,
        pub lines: usize,
        pub circles: usize,
    }

    impl FakeSurface {
        /// Text of the last presented frame, top to bottom.
        pub(crate) fn last(&self) -> Vec<String> {
            self.presented.last().cloned().unwrap_or_default()
        }

        pub(crate) fn shows(&self, needle: &str) -> bool {
            self.last().iter().any(|l| l.contains(needle))
        }
    }

    impl Surface for FakeSurface {
        fn clear(&mut self) {
            self.frame.clear();
            self.lines = 0;
            self.circles = 0;
        }
        fn draw_text(&mut self, text: &str, _: i32, y: i32, _: Color) {
            self.frame.push((y, text.into()));
        }
        fn draw_line(&mut self, _: (i32, i32), _: (i32, i32), _: Color) {
            self.lines += 1;
        }
        fn draw_circle(&mut self, _: (i32, i32), _: u32, _: Color) {
            self.circles += 1;
        }
        fn draw_rect(&mut self, _: (i32, i32), _: (u32, u32), _: Color) {}
        fn fill_rect(&mut self, _: (i32, i32), _: (u32, u32), _: Color) {}
        fn present(&mut self) {
            let mut frame = self.frame.clone();
            frame.sort_by_key(|(y, _)| *y);
            self.presented.push(frame.into_iter().map(|(_, t)| t).collect());
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeLcd {
        pub rows: [String; 2],
        pub backlight: bool,
        row: usize,
    }

    impl CharLcd for FakeLcd {
        fn clear(&mut self) {
            self.rows = Default::default();
            self.row = 0;
        }
        fn set_cursor(&mut self, row: u8, _: u8) {
            self.row = (row as usize).min(1);
        }
        fn write_str(&mut self, text: &str) {
            self.rows[self.row].push_str(text);
        }
        fn backlight(&mut self, on: bool) {
            self.backlight = on;
        }
    }

    #[derive(Default)]
    pub(crate) struct FakeLights {
        pub requests: Vec<(u8, u8)>,
    }

    impl LightEffects for FakeLights {
        fn request(&mut self, effect: u8, mode: u8) {
            self.requests.push((effect, mode));
        }
    }
}
