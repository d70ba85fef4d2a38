//! The handheld: enter a beacon code, navigate to it, make it flash.
//!
//! Screens: a splash until the first knob press, then navigation. A knob
//! press opens code entry; keypad symbols append, and a knob press or the
//! ninth symbol submits. A known code selects the target and starts a
//! scan; an unknown one shows "Invalid Code" until the next knob press.
//!
//! While a target is selected, any advertisement carrying the beacon key
//! starts the find-me chain against that beacon.

use core::fmt::Write as _;

use heapless::String;

use crate::ble::adv;
use crate::ble::client::{ClientOutcome, FindMeClient};
use crate::ble::radio::Radio;
use crate::ble::session::BleSession;
use crate::ble::RadioEvent;
use crate::config::{QuadcorderConfig, BEACON_KEY};
use crate::gps::{GpsSource, NmeaReader};
use crate::input::debounce::SwitchState;
use crate::input::encoder::Direction;
use crate::input::{ButtonId, InputEvent};
use crate::nav::{self, Target};
use crate::scheduler::{Application, Context};
use crate::timer::TimerMode;
use crate::ui::{Color, Surface};
use crate::Millis;

/// Length of a beacon code, `XXXX#XXXX`.
pub const CODE_LEN: usize = 9;

pub type Code = String<CODE_LEN>;

// Compass placement on the 128x64 panel.
const COMPASS_X: i32 = 106;
const COMPASS_Y: i32 = 30;
const COMPASS_R: i32 = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum QuadcorderTimer {
    Refresh,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Screen {
    Splash,
    Navigation,
    CodeEntry(Code),
    InvalidCode(Code),
}

pub struct QuadcorderApp<S, G> {
    config: QuadcorderConfig,
    surface: S,
    gps: G,
    nmea: NmeaReader,
    screen: Screen,
    target: Option<&'static Target>,
    /// A beacon answered the scan and the find-me chain ran.
    beacon_found: bool,
    client: FindMeClient,
    last_outcome: Option<ClientOutcome>,
    knob: i32,
    knob_direction: Direction,
}

impl<S: Surface, G: GpsSource> QuadcorderApp<S, G> {
    pub fn new(config: QuadcorderConfig, surface: S, gps: G) -> Self {
        Self {
            config,
            surface,
            gps,
            nmea: NmeaReader::new(),
            screen: Screen::Splash,
            target: None,
            beacon_found: false,
            client: FindMeClient::new(config.connect_timeout_ms),
            last_outcome: None,
            knob: 0,
            knob_direction: Direction::Still,
        }
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn target(&self) -> Option<&'static Target> {
        self.target
    }

    pub fn beacon_found(&self) -> bool {
        self.beacon_found
    }

    pub fn last_outcome(&self) -> Option<ClientOutcome> {
        self.last_outcome
    }

    pub fn client(&self) -> &FindMeClient {
        &self.client
    }

    pub fn knob(&self) -> (i32, Direction) {
        (self.knob, self.knob_direction)
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn nmea(&self) -> &NmeaReader {
        &self.nmea
    }

    fn knob_pressed<R: Radio>(&mut self, ctx: &mut Context<'_, QuadcorderTimer, R>) {
        let screen = core::mem::replace(&mut self.screen, Screen::Navigation);
        match screen {
            Screen::Splash | Screen::InvalidCode(_) => {}
            Screen::Navigation => self.screen = Screen::CodeEntry(Code::new()),
            Screen::CodeEntry(code) => self.submit(ctx, code),
        }
        ctx.invalidate();
    }

    fn key<R: Radio>(&mut self, ctx: &mut Context<'_, QuadcorderTimer, R>, symbol: char) {
        let Screen::CodeEntry(code) = &mut self.screen else {
            return;
        };
        let _ = code.push(symbol);
        if code.len() >= CODE_LEN {
            let code = core::mem::take(code);
            self.submit(ctx, code);
        }
        ctx.invalidate();
    }

    fn submit<R: Radio>(&mut self, ctx: &mut Context<'_, QuadcorderTimer, R>, code: Code) {
        self.beacon_found = false;
        match nav::find_target(&code) {
            Ok(target) => {
                info!("quadcorder: target {}", target.label);
                self.target = Some(target);
                self.screen = Screen::Navigation;
                if let Err(e) = ctx.ble.scan(ctx.radio) {
                    warn!("quadcorder: scan failed: {}", e);
                }
            }
            Err(_) => {
                info!("quadcorder: invalid code {}", code.as_str());
                self.target = None;
                self.screen = Screen::InvalidCode(code);
                if ctx.ble.is_scanning() {
                    if let Err(e) = ctx.ble.stop_scan(ctx.radio) {
                        warn!("quadcorder: stop scan failed: {}", e);
                    }
                }
            }
        }
    }

    fn resume_scan<R: Radio>(&mut self, ctx: &mut Context<'_, QuadcorderTimer, R>) {
        self.beacon_found = false;
        if self.target.is_some() && !ctx.ble.is_scanning() {
            if let Err(e) = ctx.ble.scan(ctx.radio) {
                warn!("quadcorder: rescan failed: {}", e);
            }
        }
    }

    fn draw_navigation(&mut self, ble: &BleSession) {
        let mut line: String<24> = String::new();

        if self.beacon_found {
            self.surface.draw_text("*BLINKING*", 0, 0, Color::On);
        } else if ble.is_scanning() {
            let _ = write!(line, "Scan for {}", ble.spinner());
            self.surface.draw_text(&line, 0, 0, Color::On);
        } else {
            self.surface.draw_text("Scan OFF", 0, 0, Color::On);
        }

        let here = self.nmea.position();
        let there = self.target.map(|t| t.position);

        if let Some(target) = self.target {
            self.surface.draw_text(target.code, 0, 10, Color::On);
            line.clear();
            let _ = write!(line, "^{:.6}", target.position.lat);
            self.surface.draw_text(&line, 0, 20, Color::On);
            line.clear();
            let _ = write!(line, ">{:.6}", target.position.lon);
            self.surface.draw_text(&line, 0, 30, Color::On);
        } else {
            self.surface.draw_text("   No", 0, 10, Color::On);
            self.surface.draw_text(" Target", 0, 20, Color::On);
            self.surface.draw_text("Selected", 0, 30, Color::On);
        }

        self.surface.draw_text("N", COMPASS_X - 4, 0, Color::On);
        self.surface
            .draw_circle((COMPASS_X, COMPASS_Y), COMPASS_R as u32, Color::On);
        match nav::bearing_deg(here, there) {
            Some(bearing) => {
                let tip = nav::needle_tip(COMPASS_X, COMPASS_Y, COMPASS_R, bearing);
                self.surface
                    .draw_line((COMPASS_X, COMPASS_Y), tip, Color::On);
            }
            None => {
                self.surface
                    .draw_text("No", COMPASS_X - 8, COMPASS_Y - 8, Color::On);
                self.surface
                    .draw_text("GPS", COMPASS_X - 12, COMPASS_Y + 8, Color::On);
            }
        }

        self.surface.draw_text("dist (km)", 0, 40, Color::On);
        line.clear();
        match nav::distance_m(here, there) {
            Some(d) => {
                let _ = write!(line, "{:.4}", d / 1000.0);
            }
            None => {
                let _ = line.push_str("--.----");
            }
        }
        self.surface.draw_text(&line, 0, 50, Color::On);
    }
}

impl<S: Surface, G: GpsSource> Application for QuadcorderApp<S, G> {
    type Timer = QuadcorderTimer;

    fn start<R: Radio>(&mut self, ctx: &mut Context<'_, QuadcorderTimer, R>) {
        if let Err(e) = ctx.ble.register(ctx.radio) {
            error!("quadcorder: gatt registration failed: {}", e);
        }
        if let Err(e) = ctx.ble.advertise(ctx.radio) {
            error!("quadcorder: advertising failed: {}", e);
        }
        ctx.start_timer(
            QuadcorderTimer::Refresh,
            self.config.refresh_ms,
            TimerMode::Periodic,
        );
    }

    fn on_input<R: Radio>(
        &mut self,
        ctx: &mut Context<'_, QuadcorderTimer, R>,
        event: InputEvent,
    ) {
        match event {
            InputEvent::Button {
                id: ButtonId::Knob,
                transition,
            } if transition.to == SwitchState::Pressed => self.knob_pressed(ctx),
            InputEvent::Key(symbol) => self.key(ctx, symbol),
            InputEvent::Knob { value, direction } => {
                self.knob = value;
                self.knob_direction = direction;
                ctx.invalidate();
            }
            _ => {}
        }
    }

    fn on_timer<R: Radio>(
        &mut self,
        ctx: &mut Context<'_, QuadcorderTimer, R>,
        id: QuadcorderTimer,
    ) {
        match id {
            QuadcorderTimer::Refresh => ctx.invalidate(),
        }
    }

    fn on_ble<R: Radio>(
        &mut self,
        ctx: &mut Context<'_, QuadcorderTimer, R>,
        event: Option<RadioEvent>,
    ) {
        if self.nmea.poll(&mut self.gps) {
            debug!("quadcorder: gps sentence");
        }

        if let Some(RadioEvent::ScanDone) = event {
            debug!("quadcorder: scan complete");
        }

        if let Some(report) = ctx.ble.take_scan_result() {
            let wanted = self.target.is_some() && !self.client.is_busy();
            if wanted && adv::contains_marker(&report.data, BEACON_KEY) {
                info!("quadcorder: found a beacon, connecting");
                self.beacon_found = true;
                if let Err(e) = self.client.start(ctx.ble, ctx.radio, report.addr, ctx.now) {
                    warn!("quadcorder: connect failed: {}", e);
                    self.resume_scan(ctx);
                }
                ctx.invalidate();
            }
        }

        let now = ctx.now;
        if let Some(outcome) = self
            .client
            .poll(ctx.ble, ctx.radio, now, self.config.settle_ms)
        {
            self.last_outcome = Some(outcome);
            if outcome != ClientOutcome::Delivered {
                self.resume_scan(ctx);
            }
            ctx.invalidate();
        }
    }

    fn render(&mut self, ble: &BleSession, _: Millis) {
        self.surface.clear();
        match &self.screen {
            Screen::Splash => {
                self.surface.draw_text("Quadcorder v1.00", 0, 0, Color::On);
                self.surface.draw_text("  press knob to ", 0, 20, Color::On);
                self.surface.draw_text("   initialize   ", 0, 30, Color::On);
            }
            Screen::CodeEntry(code) => {
                let cursor = (code.len() as i32 * 8, 20);
                self.surface.draw_text("Enter Code:", 0, 0, Color::On);
                self.surface.draw_text(code, 0, 20, Color::On);
                self.surface.fill_rect(cursor, (8, 8), Color::On);
            }
            Screen::InvalidCode(code) => {
                let x = (16 - code.len() as i32) / 2 * 8;
                self.surface.draw_text("Invalid Code", 16, 20, Color::On);
                self.surface.draw_text(code, x, 30, Color::On);
            }
            Screen::Navigation => self.draw_navigation(ble),
        }
        self.surface.present();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::session::tests::{FakeRadio, PEER};
    use crate::ble::{ConnHandle, ScanReport};
    use crate::gps::Line;
    use crate::input::debounce::Transition;
    use crate::mailbox::Mailbox;
    use crate::scheduler::Scheduler;
    use crate::ui::tests::FakeSurface;
    use std::cell::RefCell;
    use std::vec::Vec;

    type App = QuadcorderApp<FakeSurface, &'static Mailbox<Line>>;

    struct Script(&'static RefCell<Vec<InputEvent>>);

    impl crate::input::InputSource for Script {
        fn poll(&mut self, _: Millis) -> Option<InputEvent> {
            let mut q = self.0.borrow_mut();
            (!q.is_empty()).then(|| q.remove(0))
        }
    }

    struct Rig {
        sched: Scheduler<'static, App, FakeRadio>,
        inputs: &'static RefCell<Vec<InputEvent>>,
        gps: &'static Mailbox<Line>,
        now: Millis,
    }

    const KNOB: InputEvent = InputEvent::Button {
        id: ButtonId::Knob,
        transition: Transition {
            to: SwitchState::Pressed,
            at: 0,
        },
    };

    impl Rig {
        fn new() -> Self {
            let inputs: &'static RefCell<Vec<InputEvent>> = Box::leak(Box::default());
            let gps: &'static Mailbox<Line> = Box::leak(Box::new(Mailbox::new()));
            let mut sched = Scheduler::new(
                QuadcorderApp::new(QuadcorderConfig::default(), FakeSurface::default(), gps),
                BleSession::new("QuadCorder1"),
                FakeRadio::default(),
            );
            sched.add_input(Box::leak(Box::new(Script(inputs)))).unwrap();
            sched.start(0);
            Self {
                sched,
                inputs,
                gps,
                now: 0,
            }
        }

        fn push(&mut self, event: InputEvent) {
            self.inputs.borrow_mut().push(event);
        }

        fn tick(&mut self) {
            self.now += 10;
            self.sched.tick(self.now);
        }

        fn type_code(&mut self, code: &str) {
            for c in code.chars() {
                self.push(InputEvent::Key(c));
            }
        }

        fn app(&self) -> &App {
            self.sched.app()
        }

        fn shows(&self, text: &str) -> bool {
            self.app().surface().shows(text)
        }

        fn select(&mut self, code: &str) {
            self.push(KNOB);
            self.tick();
            self.push(KNOB);
            self.type_code(code);
            self.tick();
        }
    }

    fn beacon_seen() -> RadioEvent {
        RadioEvent::ScanResult(ScanReport {
            addr: PEER,
            adv_type: 0,
            rssi: -55,
            data: adv::build("67D7A2D5A08D#6CDD"),
        })
    }

    #[test]
    fn splash_until_knob() {
        let mut rig = Rig::new();
        assert!(rig.shows("Quadcorder v1.00"));
        rig.push(KNOB);
        rig.tick();
        assert_eq!(rig.app().screen(), &Screen::Navigation);
        assert!(rig.shows("Scan OFF"));
        assert!(rig.shows("Selected"));
        assert!(rig.shows("--.----"));
        assert!(rig.shows("GPS"));
    }

    #[test]
    fn ninth_symbol_submits_valid_code() {
        let mut rig = Rig::new();
        rig.select("A08D#6CDD");
        assert_eq!(rig.app().screen(), &Screen::Navigation);
        assert_eq!(rig.app().target().unwrap().label, "Substation");
        assert!(rig.sched.session().is_scanning());
        assert!(rig.shows("Scan for |"));
        assert!(rig.shows("A08D#6CDD"));
        assert!(rig.shows("^42.039323"));
        assert!(rig.shows(">-86.435976"));
    }

    #[test]
    fn knob_submits_short_code_as_invalid() {
        let mut rig = Rig::new();
        rig.push(KNOB);
        rig.tick();
        rig.push(KNOB);
        rig.type_code("12");
        rig.tick();
        assert!(rig.shows("Enter Code:"));
        assert!(rig.shows("12"));

        rig.push(KNOB);
        rig.tick();
        assert!(matches!(rig.app().screen(), Screen::InvalidCode(c) if c.as_str() == "12"));
        assert!(rig.shows("Invalid Code"));
        assert!(rig.app().target().is_none());

        rig.push(KNOB);
        rig.tick();
        assert_eq!(rig.app().screen(), &Screen::Navigation);
    }

    #[test]
    fn invalid_code_stops_scanning() {
        let mut rig = Rig::new();
        rig.select("A08D#6CDD");
        assert!(rig.sched.session().is_scanning());
        rig.push(KNOB);
        rig.type_code("FFFF#FFFF");
        rig.tick();
        assert!(matches!(rig.app().screen(), Screen::InvalidCode(_)));
        assert!(!rig.sched.session().is_scanning());
    }

    #[test]
    fn gps_fix_draws_needle_and_distance() {
        let mut rig = Rig::new();
        rig.select("A08D#6CDD");
        let body = "GPGGA,123519,4202.4327,N,08626.1501,W,1,08,0.9,190.0,M,-34.0,M,,";
        let sum = body.bytes().fold(0u8, |a, b| a ^ b);
        let text = format!("${}*{:02X}", body, sum);
        let mut line = Line::new();
        line.extend_from_slice(text.as_bytes()).unwrap();
        rig.gps.post(line);

        rig.now += 5_000;
        rig.sched.tick(rig.now);
        assert!(rig.app().nmea().position().is_some());
        assert!(rig.shows("0.13"));
        assert!(!rig.shows("GPS"));
        assert_eq!(rig.app().surface().lines, 1);
    }

    #[test]
    fn beacon_without_target_is_ignored() {
        let mut rig = Rig::new();
        rig.push(KNOB);
        rig.tick();
        rig.sched.deliver(beacon_seen());
        rig.tick();
        assert_eq!(rig.sched.radio().count("connect"), 0);
        assert!(!rig.app().beacon_found());
    }

    #[test]
    fn code_and_beacon_in_one_tick() {
        let mut rig = Rig::new();
        rig.push(KNOB);
        rig.tick();
        rig.push(KNOB);
        rig.tick();

        // The ninth symbol and a beacon advertisement land in the same tick.
        rig.type_code("A08D#6CDD");
        rig.sched.deliver(beacon_seen());
        let report = rig.sched.tick(rig.now + 10);
        assert_eq!(report.inputs, 9);
        assert!(report.rendered);
        assert_eq!(rig.app().target().unwrap().code, "A08D#6CDD");
        assert_eq!(rig.sched.radio().count("connect"), 1);
        assert!(rig.shows("*BLINKING*"));
        assert!(rig.shows("^42.039323"));
    }

    #[test]
    fn beacon_triggers_find_me() {
        let mut rig = Rig::new();
        rig.select("A08D#6CDD");
        rig.sched.deliver(beacon_seen());
        rig.tick();
        assert!(rig.app().beacon_found());
        assert!(rig.shows("*BLINKING*"));
        assert!(!rig.sched.session().is_scanning());

        let conn = ConnHandle(2);
        rig.sched.deliver(RadioEvent::PeripheralConnect { conn, peer: PEER });
        rig.tick();
        assert_eq!(rig.sched.radio().count("discover_services"), 1);

        rig.sched.deliver(RadioEvent::ServiceDone { conn, status: 0x0101 });
        rig.tick();
        assert!(matches!(
            rig.app().last_outcome(),
            Some(ClientOutcome::Aborted(_))
        ));
        assert_eq!(rig.sched.radio().count("disconnect"), 1);

        // Back to scanning for the target once the link is gone.
        rig.sched.deliver(RadioEvent::PeripheralDisconnect { conn, peer: PEER });
        rig.tick();
        assert!(!rig.app().client().is_busy());
        assert!(rig.sched.session().is_scanning());
        assert!(!rig.app().beacon_found());
    }
}
