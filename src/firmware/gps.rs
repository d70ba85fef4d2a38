//! GPS UART reader. Splits the byte stream into NMEA lines and posts each
//! complete line; the scheduler only ever sees the latest one.

use embassy_nrf::uarte::{Instance, UarteRx};

use crate::gps::Line;
use crate::mailbox::Mailbox;

pub async fn run<T: Instance>(mut rx: UarteRx<'static, T>, lines: &Mailbox<Line>) -> ! {
    let mut line = Line::new();
    let mut byte = [0u8; 1];
    loop {
        if rx.read(&mut byte).await.is_err() {
            warn!("gps: uart error");
            line.clear();
            continue;
        }
        match byte[0] {
            b'\r' => {}
            b'\n' => {
                if !line.is_empty() {
                    lines.post(core::mem::take(&mut line));
                }
            }
            b => {
                if line.push(b).is_err() {
                    debug!("gps: line overflow");
                    line.clear();
                }
            }
        }
    }
}
