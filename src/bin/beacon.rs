//! Beacon firmware.
//!
//! Advertises its code, blinks the status LED until a Quadcorder connects,
//! and runs the flasher for five minutes on "find me".

#![no_std]
#![no_main]

use defmt::{info, unwrap};
use embassy_executor::Spawner;
use embassy_nrf::gpio::{Input, Level, Output, OutputDrive, Pull};
use nrf_softdevice::Softdevice;
use {defmt_rtt as _, panic_probe as _};

use quadcorder::app::beacon::BeaconApp;
use quadcorder::ble::session::BleSession;
use quadcorder::config::{BeaconConfig, BEACON_NAME, BUTTON_DEBOUNCE_MS, COMPANION_LOOP_MS};
use quadcorder::firmware::pins::{self, PortPin};
use quadcorder::firmware::radio::{self, RadioLink, Server};
use quadcorder::firmware::{hal_config, run};
use quadcorder::input::debounce::{EdgeLatch, EdgeTrigger};
use quadcorder::input::{Button, ButtonId};
use quadcorder::scheduler::Scheduler;

static RADIO: RadioLink = RadioLink::new();
static BOOT_BUTTON: EdgeLatch = EdgeLatch::new();

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

#[embassy_executor::task]
async fn radio_task(sd: &'static Softdevice, server: &'static Server) -> ! {
    radio::run(sd, server, &RADIO).await
}

#[embassy_executor::task]
async fn boot_button_task(pin: Input<'static>) -> ! {
    pins::watch_edges(pin, EdgeTrigger::Falling, &BOOT_BUTTON).await
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("beacon: boot");
    let p = embassy_nrf::init(hal_config());

    let (sd, server) = radio::enable(BEACON_NAME);
    unwrap!(spawner.spawn(softdevice_task(sd)));
    unwrap!(spawner.spawn(radio_task(sd, server)));
    unwrap!(spawner.spawn(boot_button_task(Input::new(p.P0_11, Pull::Up))));

    let flasher = Output::new(p.P0_14, Level::Low, OutputDrive::HighDrive);
    let status = Output::new(p.P0_13, Level::Low, OutputDrive::Standard);
    let mut boot_button = Button::new(
        ButtonId::Boot,
        PortPin::new(11),
        &BOOT_BUTTON,
        EdgeTrigger::Falling,
        true,
        BUTTON_DEBOUNCE_MS,
    );

    let app = BeaconApp::new(BeaconConfig::default(), flasher, status);
    let mut scheduler = Scheduler::new(app, BleSession::new(BEACON_NAME), RADIO.radio(server));
    unwrap!(scheduler.add_input(&mut boot_button));

    run::drive(&mut scheduler, &RADIO, COMPANION_LOOP_MS).await
}
