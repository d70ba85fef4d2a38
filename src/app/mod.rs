//! The three device roles, each an [`Application`](crate::scheduler::Application)
//! run by the cooperative scheduler.
//!
//! - [`quadcorder`]: handheld with keypad, knob, GPS and OLED.
//! - [`beacon`]: fixed beacon that flashes on request.
//! - [`console`]: central console that counts beacons on a character LCD.

pub mod beacon;
pub mod console;
pub mod quadcorder;
