//! Fixed beacon: advertises its code, flashes when asked to.
//!
//! A central writes `find me` to the UART service; the beacon replies
//! `lit up!` and flashes for the alarm period, then replies `not lit`.
//! The boot button cancels a running alarm.

use embedded_hal::digital::OutputPin;

use crate::ble::nus::{Command, NOT_LIT};
use crate::ble::radio::Radio;
use crate::ble::session::{BleSession, Indicator};
use crate::ble::RadioEvent;
use crate::config::BeaconConfig;
use crate::input::debounce::SwitchState;
use crate::input::{ButtonId, InputEvent};
use crate::scheduler::{Application, Context};
use crate::timer::TimerMode;
use crate::ui::indicator::Blinker;
use crate::Millis;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BeaconTimer {
    /// Flasher toggle.
    Flash,
    /// End of the alarm.
    Alarm,
    /// Status LED toggle.
    Status,
    /// End of the power-on flash.
    BootFlash,
}

pub struct BeaconApp<F, S> {
    config: BeaconConfig,
    flasher: Blinker<F>,
    status: Blinker<S>,
    alarm_active: bool,
}

impl<F: OutputPin, S: OutputPin> BeaconApp<F, S> {
    pub fn new(config: BeaconConfig, flasher: F, status: S) -> Self {
        Self {
            config,
            flasher: Blinker::new(flasher),
            status: Blinker::new(status),
            alarm_active: false,
        }
    }

    pub fn is_alarm_active(&self) -> bool {
        self.alarm_active
    }

    pub fn flasher(&self) -> &Blinker<F> {
        &self.flasher
    }

    pub fn status(&self) -> &Blinker<S> {
        &self.status
    }

    fn reply<R: Radio>(ctx: &mut Context<'_, BeaconTimer, R>, text: &str) {
        if let Err(e) = ctx.ble.send(ctx.radio, text) {
            warn!("beacon: reply failed: {}", e);
        }
    }

    fn raise_alarm<R: Radio>(&mut self, ctx: &mut Context<'_, BeaconTimer, R>) {
        info!("beacon: begin flashing");
        self.alarm_active = true;
        ctx.stop_timer(BeaconTimer::BootFlash);
        self.flasher.start();
        ctx.start_timer(BeaconTimer::Flash, self.config.flash_ms, TimerMode::Periodic);
        ctx.start_timer(BeaconTimer::Alarm, self.config.alarm_ms, TimerMode::OneShot);
    }

    /// Stop flashing. Safe when nothing is flashing.
    fn silence<R: Radio>(&mut self, ctx: &mut Context<'_, BeaconTimer, R>) {
        ctx.stop_timer(BeaconTimer::Flash);
        ctx.stop_timer(BeaconTimer::Alarm);
        self.flasher.stop();
        self.alarm_active = false;
    }

    fn follow_link(&mut self, ble: &BleSession) {
        match ble.indicator() {
            Indicator::Off => self.status.stop(),
            Indicator::Blinking => self.status.start(),
        }
    }
}

impl<F: OutputPin, S: OutputPin> Application for BeaconApp<F, S> {
    type Timer = BeaconTimer;

    fn start<R: Radio>(&mut self, ctx: &mut Context<'_, BeaconTimer, R>) {
        if let Err(e) = ctx.ble.register(ctx.radio) {
            error!("beacon: gatt registration failed: {}", e);
        }
        if let Err(e) = ctx.ble.advertise(ctx.radio) {
            error!("beacon: advertising failed: {}", e);
        }

        self.flasher.set(true);
        ctx.start_timer(
            BeaconTimer::BootFlash,
            self.config.boot_flash_ms,
            TimerMode::OneShot,
        );

        self.follow_link(ctx.ble);
        ctx.start_timer(
            BeaconTimer::Status,
            self.config.indicator_ms,
            TimerMode::Periodic,
        );
        info!("beacon: ready");
    }

    fn on_input<R: Radio>(&mut self, ctx: &mut Context<'_, BeaconTimer, R>, event: InputEvent) {
        if let InputEvent::Button {
            id: ButtonId::Boot,
            transition,
        } = event
        {
            if transition.to == SwitchState::Pressed {
                debug!("beacon: boot button");
                self.silence(ctx);
            }
        }
    }

    fn on_timer<R: Radio>(&mut self, ctx: &mut Context<'_, BeaconTimer, R>, id: BeaconTimer) {
        match id {
            BeaconTimer::Flash => self.flasher.toggle(),
            BeaconTimer::Alarm => {
                info!("beacon: stop flashing");
                self.silence(ctx);
                Self::reply(ctx, NOT_LIT);
            }
            BeaconTimer::Status => self.status.toggle(),
            BeaconTimer::BootFlash => {
                if !self.alarm_active {
                    self.flasher.set(false);
                }
            }
        }
    }

    fn on_ble<R: Radio>(
        &mut self,
        ctx: &mut Context<'_, BeaconTimer, R>,
        event: Option<RadioEvent>,
    ) {
        if let Some(event) = event {
            debug!("beacon: {}", event.id().name());
        }
        // Link state, not the lossy event, drives the status LED.
        self.follow_link(ctx.ble);

        if let Some(message) = ctx.ble.take_message() {
            let command = Command::parse(&message);
            if command == Command::FindMe {
                self.raise_alarm(ctx);
            } else {
                warn!("beacon: invalid message [{}]", message.as_str());
            }
            Self::reply(ctx, command.reply());
        }
    }

    fn render(&mut self, _: &BleSession, _: Millis) {}
}
