//! Console firmware.
//!
//! Lighted power switch, 16x2 LCD and the light-strip controller. Counts
//! the game beacons it hears and brings the "reactor" online once every
//! one has been found.

#![no_std]
#![no_main]

use core::cell::RefCell;

use defmt::{info, unwrap};
use embassy_executor::Spawner;
use embassy_nrf::gpio::{Input, Level, Output, OutputDrive, Pull};
use embassy_nrf::{bind_interrupts, peripherals, twim};
use embassy_time::Delay;
use embedded_hal_bus::i2c::RefCellDevice;
use nrf_softdevice::Softdevice;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use quadcorder::app::console::ConsoleApp;
use quadcorder::ble::session::BleSession;
use quadcorder::config::{
    ConsoleConfig, BUTTON_DEBOUNCE_MS, COMPANION_LOOP_MS, CONSOLE_NAME, LCD_ADDR, LCD_COLUMNS,
    LCD_ROWS, LIGHTS_ADDR,
};
use quadcorder::firmware::lcd::I2cLcd;
use quadcorder::firmware::lights::I2cLights;
use quadcorder::firmware::pins::{self, PortPin};
use quadcorder::firmware::radio::{self, RadioLink, Server};
use quadcorder::firmware::{hal_config, run};
use quadcorder::input::debounce::{EdgeLatch, EdgeTrigger};
use quadcorder::input::{Button, ButtonId};
use quadcorder::scheduler::Scheduler;

bind_interrupts!(struct Irqs {
    TWISPI0 => twim::InterruptHandler<peripherals::TWISPI0>;
});

type Bus = twim::Twim<'static, peripherals::TWISPI0>;

static RADIO: RadioLink = RadioLink::new();
static POWER_SWITCH: EdgeLatch = EdgeLatch::new();

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

#[embassy_executor::task]
async fn radio_task(sd: &'static Softdevice, server: &'static Server) -> ! {
    radio::run(sd, server, &RADIO).await
}

#[embassy_executor::task]
async fn power_switch_task(pin: Input<'static>) -> ! {
    pins::watch_edges(pin, EdgeTrigger::Both, &POWER_SWITCH).await
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("console: boot");
    let p = embassy_nrf::init(hal_config());

    let (sd, server) = radio::enable(CONSOLE_NAME);
    unwrap!(spawner.spawn(softdevice_task(sd)));
    unwrap!(spawner.spawn(radio_task(sd, server)));
    unwrap!(spawner.spawn(power_switch_task(Input::new(p.P0_11, Pull::Up))));

    // LCD and light controller share one bus.
    static TWIM_BUF: StaticCell<[u8; 64]> = StaticCell::new();
    static BUS: StaticCell<RefCell<Bus>> = StaticCell::new();
    let bus = BUS.init(RefCell::new(twim::Twim::new(
        p.TWISPI0,
        Irqs,
        p.P0_26,
        p.P0_27,
        twim::Config::default(),
        TWIM_BUF.init([0; 64]),
    )));
    let lcd = I2cLcd::new(
        RefCellDevice::new(bus),
        Delay,
        LCD_ADDR,
        LCD_ROWS,
        LCD_COLUMNS,
    );
    let lights = I2cLights::new(RefCellDevice::new(bus), LIGHTS_ADDR);
    let power_led = Output::new(p.P0_15, Level::Low, OutputDrive::Standard);

    let mut power_switch = Button::new(
        ButtonId::Power,
        PortPin::new(11),
        &POWER_SWITCH,
        EdgeTrigger::Both,
        true,
        BUTTON_DEBOUNCE_MS,
    );

    let app = ConsoleApp::new(ConsoleConfig::default(), lcd, lights, power_led);
    let mut scheduler = Scheduler::new(app, BleSession::new(CONSOLE_NAME), RADIO.radio(server));
    unwrap!(scheduler.add_input(&mut power_switch));

    run::drive(&mut scheduler, &RADIO, COMPANION_LOOP_MS).await
}
