//! Main loop: deliver radio events as they arrive, tick the scheduler on
//! a fixed period, sleep in between.

use embassy_futures::select::{select, Either};
use embassy_time::{Duration, Instant, Timer};

use crate::firmware::now_ms;
use crate::firmware::radio::{RadioLink, SoftdeviceRadio};
use crate::scheduler::{Application, Scheduler};

pub async fn drive<A: Application>(
    scheduler: &mut Scheduler<'_, A, SoftdeviceRadio>,
    link: &RadioLink,
    period_ms: u64,
) -> ! {
    let period = Duration::from_millis(period_ms);
    scheduler.start(now_ms());
    let mut next = Instant::now() + period;

    loop {
        match select(Timer::at(next), link.next_event()).await {
            Either::First(()) => {
                while let Some(event) = link.try_event() {
                    scheduler.deliver(event);
                }
                let report = scheduler.tick(now_ms());
                if let Some(id) = report.ble_event {
                    debug!("tick: {} inputs, {} timers, {}", report.inputs, report.timers, id.name());
                }
                // Never try to catch up on missed ticks.
                next = (next + period).max(Instant::now());
            }
            Either::Second(event) => scheduler.deliver(event),
        }
    }
}
