//! 4x4 matrix keypad scanner.
//!
//! Rows are outputs held high while idle; columns are pulled-down inputs
//! whose rising edge feeds an [`EdgeLatch`]. Once the debounce window has
//! passed the scheduler sweeps the matrix, records the symbol and lights
//! the acknowledgement LED until the symbol is consumed.

use embedded_hal::digital::{InputPin, OutputPin};

use crate::input::debounce::EdgeLatch;
use crate::Millis;

pub const ROWS: usize = 4;
pub const COLS: usize = 4;

/// Symbols laid out row-major, top-left first.
pub const DEFAULT_SYMBOLS: [char; ROWS * COLS] = [
    '1', '2', '3', 'A', //
    '4', '5', '6', 'B', //
    '7', '8', '9', 'C', //
    '*', '0', '#', 'D',
];

/// Position in the matrix, `row * 4 + col`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyIndex(u8);

impl KeyIndex {
    pub fn new(row: usize, col: usize) -> Option<Self> {
        if row < ROWS && col < COLS {
            Some(Self((row * COLS + col) as u8))
        } else {
            None
        }
    }

    pub fn row(self) -> usize {
        self.0 as usize / COLS
    }

    pub fn col(self) -> usize {
        self.0 as usize % COLS
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanState {
    /// Waiting for a column interrupt.
    Idle,
    /// Interrupt seen, debounce window still open.
    Pending,
    /// Sweeping the rows.
    Scanning,
}

pub struct KeypadMatrix<'a, R, C, L> {
    rows: [R; ROWS],
    cols: [C; COLS],
    indicator: L,
    latch: &'a EdgeLatch,
    window_ms: u32,
    symbols: [char; ROWS * COLS],
    state: ScanState,
    pressed: Option<KeyIndex>,
    last_index: Option<KeyIndex>,
}

impl<'a, R, C, L> KeypadMatrix<'a, R, C, L>
where
    R: OutputPin,
    C: InputPin,
    L: OutputPin,
{
    pub fn new(
        rows: [R; ROWS],
        cols: [C; COLS],
        indicator: L,
        latch: &'a EdgeLatch,
        window_ms: u32,
    ) -> Self {
        let mut keypad = Self {
            rows,
            cols,
            indicator,
            latch,
            window_ms,
            symbols: DEFAULT_SYMBOLS,
            state: ScanState::Idle,
            pressed: None,
            last_index: None,
        };
        keypad.rows_idle();
        let _ = keypad.indicator.set_low();
        keypad
    }

    /// Replace the symbol table (row-major).
    pub fn with_symbols(mut self, symbols: [char; ROWS * COLS]) -> Self {
        self.symbols = symbols;
        self
    }

    fn rows_idle(&mut self) {
        for row in self.rows.iter_mut() {
            let _ = row.set_high();
        }
    }

    /// Sweep every row and return the last active position.
    ///
    /// Simultaneous presses resolve to the highest row/column seen; the
    /// sweep never stops early. Rows are left high afterwards so the next
    /// column edge can fire.
    pub fn scan(&mut self) -> Option<KeyIndex> {
        let mut found = None;

        for row in self.rows.iter_mut() {
            let _ = row.set_low();
        }

        for r in 0..ROWS {
            let _ = self.rows[r].set_high();
            for c in 0..COLS {
                if self.cols[c].is_high().unwrap_or(false) {
                    found = KeyIndex::new(r, c);
                }
            }
            let _ = self.rows[r].set_low();
        }

        self.rows_idle();
        found
    }

    /// Scheduler hook: advance the scan state machine.
    ///
    /// Returns `true` when a new symbol was latched.
    pub fn service(&mut self, now: Millis) -> bool {
        let elapsed = match self.latch.elapsed(now) {
            Some(elapsed) => elapsed,
            None => {
                self.state = ScanState::Idle;
                return false;
            }
        };
        if elapsed < self.window_ms {
            self.state = ScanState::Pending;
            return false;
        }

        self.state = ScanState::Scanning;
        let hit = self.scan();
        self.latch.consume();
        self.state = ScanState::Idle;

        match hit {
            Some(index) => {
                let symbol = self.symbols[index.index()];
                debug!("keypad: {} at ({}, {})", symbol, index.row(), index.col());
                self.pressed = Some(index);
                self.last_index = Some(index);
                let _ = self.indicator.set_high();
                true
            }
            None => {
                debug!("keypad: spurious edge");
                false
            }
        }
    }

    /// One-shot read of the last debounced key: its index (`row * 4 + col`)
    /// and symbol. Turns the LED off.
    pub fn get_button(&mut self) -> Option<(KeyIndex, char)> {
        let index = self.pressed.take()?;
        let _ = self.indicator.set_low();
        Some((index, self.symbols[index.index()]))
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn last_index(&self) -> Option<KeyIndex> {
        self.last_index
    }

    pub fn symbol_at(&self, index: KeyIndex) -> char {
        self.symbols[index.index()]
    }
}
