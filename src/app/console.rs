//! Central console: counts the beacons players have found.
//!
//! The console scans continuously and never connects. Each beacon's code
//! is recognised in its advertised name. Until the substation module is
//! found the LCD alternates between a fault message and a hint; after
//! that it pages through the beacon list. Once every beacon is found the
//! reactor comes online and scanning stops.

use embedded_hal::digital::OutputPin;

use crate::ble::adv;
use crate::ble::radio::Radio;
use crate::ble::session::BleSession;
use crate::ble::RadioEvent;
use crate::config::{ConsoleConfig, BEACON_KEY, LCD_COLUMNS};
use crate::input::debounce::SwitchState;
use crate::input::{ButtonId, InputEvent};
use crate::scheduler::{Application, Context};
use crate::timer::TimerMode;
use crate::ui::{CharLcd, LightEffects};
use crate::Millis;

/// Beacons in play. The first one unlocks the page display.
pub static CONSOLE_BEACONS: [&str; 6] = [
    "A08D#6CDD",
    "CB69#A409",
    "D694#734A",
    "B2A5#55BD",
    "60C3#6748",
    "5DC3#154D",
];

const BOOT_HOLD_MS: Millis = 2_000;
const PROGRESS_STEP_MS: Millis = 100;

// Light strip effects.
const EFFECT_FINALE: u8 = b'2';
const EFFECT_BOOT: u8 = b'3';
const EFFECT_ONLINE: u8 = b'4';
const EFFECT_COUNT: u8 = b'5';

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConsoleTimer {
    Page,
    Banner,
    BootHold,
    Progress,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// Waiting for the first power-on.
    Standby,
    /// "boot" splash.
    Booting,
    /// Progress bar, `n` cells drawn.
    Progress(u8),
    Playing,
    /// "NEW FREQUENCY!" for beacon index `n`.
    Banner(usize),
    Online,
}

pub struct ConsoleApp<L, X, P> {
    config: ConsoleConfig,
    lcd: L,
    lights: X,
    power_led: P,
    powered: bool,
    phase: Phase,
    found: [bool; 6],
    show_fault: bool,
    page: usize,
    last_count: usize,
}

impl<L: CharLcd, X: LightEffects, P: OutputPin> ConsoleApp<L, X, P> {
    pub fn new(config: ConsoleConfig, mut lcd: L, lights: X, mut power_led: P) -> Self {
        lcd.clear();
        lcd.backlight(false);
        let _ = power_led.set_low();
        Self {
            config,
            lcd,
            lights,
            power_led,
            powered: false,
            phase: Phase::Standby,
            found: [false; 6],
            show_fault: true,
            page: 0,
            last_count: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn found_count(&self) -> usize {
        self.found.iter().filter(|f| **f).count()
    }

    pub fn is_found(&self, code: &str) -> bool {
        CONSOLE_BEACONS
            .iter()
            .position(|c| *c == code)
            .is_some_and(|i| self.found[i])
    }

    pub fn lcd(&self) -> &L {
        &self.lcd
    }

    pub fn lights(&self) -> &X {
        &self.lights
    }

    fn substation_found(&self) -> bool {
        self.found[0]
    }

    fn power(&mut self, on: bool) {
        self.powered = on;
        let _ = if on {
            self.power_led.set_high()
        } else {
            self.power_led.set_low()
        };
        self.lcd.backlight(on);
    }

    fn begin_game<R: Radio>(&mut self, ctx: &mut Context<'_, ConsoleTimer, R>) {
        info!("console: boot");
        self.lights.request(EFFECT_BOOT, b'0');
        self.phase = Phase::Booting;
        ctx.start_timer(ConsoleTimer::BootHold, BOOT_HOLD_MS, TimerMode::OneShot);
        ctx.invalidate();
    }

    fn ensure_scanning<R: Radio>(ctx: &mut Context<'_, ConsoleTimer, R>) {
        if !ctx.ble.is_scanning() {
            if let Err(e) = ctx.ble.scan(ctx.radio) {
                warn!("console: scan failed: {}", e);
            }
        }
    }

    fn record(&mut self, data: &[u8]) -> Option<usize> {
        if !adv::contains_marker(data, BEACON_KEY) {
            return None;
        }
        let mut newest = None;
        for (i, code) in CONSOLE_BEACONS.iter().enumerate() {
            if adv::contains_marker(data, code.as_bytes()) && !self.found[i] {
                info!("console: saw {}", *code);
                self.found[i] = true;
                newest = Some(i);
            }
        }
        newest
    }

    /// Count effect and finale, checked whenever play resumes.
    fn settle<R: Radio>(&mut self, ctx: &mut Context<'_, ConsoleTimer, R>) {
        if !self.substation_found() {
            return;
        }
        let count = self.found_count();
        if count != self.last_count {
            self.last_count = count;
            self.lights.request(EFFECT_COUNT, b'0' + count as u8);
        }
        if count >= CONSOLE_BEACONS.len() {
            info!("console: reactor online");
            self.lights.request(EFFECT_FINALE, b'0');
            self.phase = Phase::Online;
            self.lights.request(EFFECT_ONLINE, b'0');
            ctx.stop_timer(ConsoleTimer::Page);
            if let Err(e) = ctx.ble.stop_scan(ctx.radio) {
                warn!("console: stop scan failed: {}", e);
            }
            ctx.invalidate();
        }
    }

    fn print(&mut self, row: u8, col: u8, text: &str) {
        self.lcd.set_cursor(row, col);
        self.lcd.write_str(text);
    }

    fn page_line(&mut self, row: u8, index: usize) {
        let mut line: heapless::String<16> = heapless::String::new();
        let _ = line.push_str(CONSOLE_BEACONS[index]);
        let _ = line.push_str(if self.found[index] { " +" } else { " -" });
        self.print(row, 3, &line);
    }
}

impl<L: CharLcd, X: LightEffects, P: OutputPin> Application for ConsoleApp<L, X, P> {
    type Timer = ConsoleTimer;

    fn start<R: Radio>(&mut self, ctx: &mut Context<'_, ConsoleTimer, R>) {
        if let Err(e) = ctx.ble.register(ctx.radio) {
            error!("console: gatt registration failed: {}", e);
        }
        if let Err(e) = ctx.ble.advertise(ctx.radio) {
            error!("console: advertising failed: {}", e);
        }
    }

    fn on_input<R: Radio>(&mut self, ctx: &mut Context<'_, ConsoleTimer, R>, event: InputEvent) {
        let InputEvent::Button {
            id: ButtonId::Power,
            transition,
        } = event
        else {
            return;
        };
        let on = transition.to == SwitchState::Pressed;
        self.power(on);
        if on && self.phase == Phase::Standby {
            self.begin_game(ctx);
        }
    }

    fn on_timer<R: Radio>(&mut self, ctx: &mut Context<'_, ConsoleTimer, R>, id: ConsoleTimer) {
        match (id, self.phase) {
            (ConsoleTimer::BootHold, Phase::Booting) => {
                self.phase = Phase::Progress(0);
                ctx.start_timer(ConsoleTimer::Progress, PROGRESS_STEP_MS, TimerMode::Periodic);
            }
            (ConsoleTimer::Progress, Phase::Progress(n)) => {
                if n + 1 >= LCD_COLUMNS {
                    ctx.stop_timer(ConsoleTimer::Progress);
                    self.phase = Phase::Playing;
                    Self::ensure_scanning(ctx);
                    ctx.start_timer(ConsoleTimer::Page, self.config.page_ms, TimerMode::Periodic);
                } else {
                    self.phase = Phase::Progress(n + 1);
                }
            }
            (ConsoleTimer::Page, Phase::Playing) => {
                if self.substation_found() {
                    self.page += 1;
                    if self.page > CONSOLE_BEACONS.len() - 2 {
                        self.page = 0;
                    }
                } else {
                    self.show_fault = !self.show_fault;
                }
                Self::ensure_scanning(ctx);
            }
            (ConsoleTimer::Banner, Phase::Banner(_)) => {
                self.phase = Phase::Playing;
                self.settle(ctx);
            }
            _ => return,
        }
        ctx.invalidate();
    }

    fn on_ble<R: Radio>(
        &mut self,
        ctx: &mut Context<'_, ConsoleTimer, R>,
        event: Option<RadioEvent>,
    ) {
        if let Some(RadioEvent::ScanDone) = event {
            debug!("console: scan complete");
        }
        if !matches!(self.phase, Phase::Playing | Phase::Banner(_)) {
            return;
        }
        let Some(report) = ctx.ble.take_scan_result() else {
            return;
        };
        if let Some(index) = self.record(&report.data) {
            self.phase = Phase::Banner(index);
            ctx.start_timer(ConsoleTimer::Banner, self.config.banner_ms, TimerMode::OneShot);
            ctx.invalidate();
        }
    }

    fn render(&mut self, _: &BleSession, _: Millis) {
        self.lcd.clear();
        match self.phase {
            Phase::Standby => {}
            Phase::Booting => self.print(0, 6, "boot"),
            Phase::Progress(n) => {
                let mut bar: heapless::String<16> = heapless::String::new();
                for _ in 0..=n.min(LCD_COLUMNS - 1) {
                    let _ = bar.push('o');
                }
                self.print(0, 0, &bar);
            }
            Phase::Playing if !self.substation_found() => {
                if self.show_fault {
                    self.print(0, 3, "CORE FAULT");
                    self.print(1, 0, "FREQUENCY NEEDED");
                } else {
                    self.print(0, 2, "LOCATE MODULE");
                    self.print(1, 4, CONSOLE_BEACONS[0]);
                }
            }
            Phase::Playing => {
                let page = self.page;
                self.page_line(0, page);
                self.page_line(1, page + 1);
            }
            Phase::Banner(index) => {
                self.print(0, 0, "NEW FREQUENCY!");
                self.print(1, 0, CONSOLE_BEACONS[index]);
            }
            Phase::Online => {
                self.print(0, 2, "REACTOR CORE");
                self.print(1, 5, "ONLINE!");
            }
        }
    }
}
