//! Quadcorder handheld firmware.
//!
//! Keypad + knob + GPS + OLED. Enter a beacon code, follow the compass,
//! and the beacon flashes once the handheld gets close enough to see it.

#![no_std]
#![no_main]

use defmt::{info, unwrap};
use embassy_executor::Spawner;
use embassy_nrf::gpio::{Input, Level, Output, OutputDrive, Pull};
use embassy_nrf::{bind_interrupts, peripherals, twim, uarte};
use nrf_softdevice::Softdevice;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use quadcorder::app::quadcorder::QuadcorderApp;
use quadcorder::ble::session::BleSession;
use quadcorder::config::{
    QuadcorderConfig, BUTTON_DEBOUNCE_MS, GPS_BAUD, KEYPAD_DEBOUNCE_MS, KNOB_MAX, KNOB_MIN,
    QUADCORDER_LOOP_MS, QUADCORDER_NAME,
};
use quadcorder::firmware::display::Oled;
use quadcorder::firmware::pins::{self, PortPin};
use quadcorder::firmware::radio::{self, RadioLink, Server};
use quadcorder::firmware::{gps, hal_config, run};
use quadcorder::gps::Line;
use quadcorder::input::debounce::{EdgeLatch, EdgeTrigger};
use quadcorder::input::encoder::{Encoder, EncoderLatch};
use quadcorder::input::keypad::KeypadMatrix;
use quadcorder::input::{Button, ButtonId};
use quadcorder::mailbox::Mailbox;
use quadcorder::scheduler::Scheduler;

bind_interrupts!(struct Irqs {
    TWISPI0 => twim::InterruptHandler<peripherals::TWISPI0>;
    UARTE0 => uarte::InterruptHandler<peripherals::UARTE0>;
});

static RADIO: RadioLink = RadioLink::new();
static KNOB_BUTTON: EdgeLatch = EdgeLatch::new();
static KEYPAD: EdgeLatch = EdgeLatch::new();
static KNOB: EncoderLatch = EncoderLatch::new(KNOB_MIN, KNOB_MAX);
static GPS_LINES: Mailbox<Line> = Mailbox::new();

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

#[embassy_executor::task]
async fn radio_task(sd: &'static Softdevice, server: &'static Server) -> ! {
    radio::run(sd, server, &RADIO).await
}

#[embassy_executor::task]
async fn knob_button_task(pin: Input<'static>) -> ! {
    pins::watch_edges(pin, EdgeTrigger::Falling, &KNOB_BUTTON).await
}

#[embassy_executor::task]
async fn knob_task(clk: Input<'static>, dt: Input<'static>) -> ! {
    pins::watch_knob(clk, dt, &KNOB).await
}

#[embassy_executor::task]
async fn keypad_task(cols: [Input<'static>; 4]) -> ! {
    pins::watch_columns(cols, &KEYPAD).await
}

#[embassy_executor::task]
async fn gps_task(rx: uarte::UarteRx<'static, peripherals::UARTE0>) -> ! {
    gps::run(rx, &GPS_LINES).await
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("quadcorder: boot");
    let p = embassy_nrf::init(hal_config());

    let (sd, server) = radio::enable(QUADCORDER_NAME);
    unwrap!(spawner.spawn(softdevice_task(sd)));
    unwrap!(spawner.spawn(radio_task(sd, server)));

    // Interrupt side
    unwrap!(spawner.spawn(knob_button_task(Input::new(p.P0_11, Pull::Up))));
    unwrap!(spawner.spawn(knob_task(
        Input::new(p.P0_12, Pull::Up),
        Input::new(p.P0_24, Pull::Up),
    )));
    unwrap!(spawner.spawn(keypad_task([
        Input::new(p.P0_28, Pull::Down),
        Input::new(p.P0_29, Pull::Down),
        Input::new(p.P0_30, Pull::Down),
        Input::new(p.P0_31, Pull::Down),
    ])));

    let mut uart_config = uarte::Config::default();
    uart_config.baudrate = match GPS_BAUD {
        9_600 => uarte::Baudrate::BAUD9600,
        _ => uarte::Baudrate::BAUD115200,
    };
    let uart = uarte::Uarte::new(p.UARTE0, Irqs, p.P0_08, p.P0_06, uart_config);
    let (_tx, rx) = uart.split();
    unwrap!(spawner.spawn(gps_task(rx)));

    // Scheduler side
    static TWIM_BUF: StaticCell<[u8; 1024]> = StaticCell::new();
    let i2c = twim::Twim::new(
        p.TWISPI0,
        Irqs,
        p.P0_26,
        p.P0_27,
        twim::Config::default(),
        TWIM_BUF.init([0; 1024]),
    );
    let oled = Oled::new(i2c);

    let mut knob_button = Button::new(
        ButtonId::Knob,
        PortPin::new(11),
        &KNOB_BUTTON,
        EdgeTrigger::Falling,
        true,
        BUTTON_DEBOUNCE_MS,
    );
    let mut knob = Encoder::new(&KNOB);
    let mut keypad = KeypadMatrix::new(
        [
            Output::new(p.P0_02, Level::High, OutputDrive::Standard),
            Output::new(p.P0_03, Level::High, OutputDrive::Standard),
            Output::new(p.P0_04, Level::High, OutputDrive::Standard),
            Output::new(p.P0_05, Level::High, OutputDrive::Standard),
        ],
        [
            PortPin::new(28),
            PortPin::new(29),
            PortPin::new(30),
            PortPin::new(31),
        ],
        Output::new(p.P0_13, Level::Low, OutputDrive::Standard),
        &KEYPAD,
        KEYPAD_DEBOUNCE_MS,
    );

    let app = QuadcorderApp::new(QuadcorderConfig::default(), oled, &GPS_LINES);
    let mut scheduler = Scheduler::new(
        app,
        BleSession::new(QUADCORDER_NAME),
        RADIO.radio(server),
    );
    unwrap!(scheduler.add_input(&mut knob_button));
    unwrap!(scheduler.add_input(&mut knob));
    unwrap!(scheduler.add_input(&mut keypad));

    info!("quadcorder: running");
    run::drive(&mut scheduler, &RADIO, QUADCORDER_LOOP_MS).await
}
