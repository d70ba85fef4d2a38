//! Cooperative scheduler.
//!
//! One [`Scheduler::tick`] is one pass of the main loop. Within a tick the
//! order is fixed: inputs, expired timers, the buffered radio event, then
//! a render if anything asked for one. The caller sleeps between ticks.
//!
//! Radio callbacks enter through [`Scheduler::deliver`], which applies the
//! structural part of the event at once and leaves the rest for the next
//! tick.

use heapless::Vec;

use crate::ble::radio::Radio;
use crate::ble::session::BleSession;
use crate::ble::{EventId, RadioEvent};
use crate::error::{Error, Result};
use crate::input::{InputEvent, InputSource};
use crate::timer::{TimerBank, TimerMode};
use crate::Millis;

/// Maximum input sources per scheduler.
pub const MAX_INPUTS: usize = 4;

/// Everything a hook may touch during one tick.
pub struct Context<'c, T, R> {
    pub now: Millis,
    pub ble: &'c mut BleSession,
    pub radio: &'c mut R,
    timers: &'c mut TimerBank<T>,
    dirty: bool,
}

impl<T: Copy + PartialEq, R: Radio> Context<'_, T, R> {
    /// Ask for a render at the end of this tick.
    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    pub fn start_timer(&mut self, id: T, period: Millis, mode: TimerMode) {
        self.timers.start(id, period, mode, self.now);
    }

    /// Stop `id`. Safe when the timer is not running.
    pub fn stop_timer(&mut self, id: T) {
        self.timers.stop(id);
    }

    pub fn timer_running(&self, id: T) -> bool {
        self.timers.is_running(id)
    }
}

/// One device role.
pub trait Application {
    type Timer: Copy + PartialEq;

    /// Called once before the first tick.
    fn start<R: Radio>(&mut self, ctx: &mut Context<'_, Self::Timer, R>);

    fn on_input<R: Radio>(&mut self, ctx: &mut Context<'_, Self::Timer, R>, event: InputEvent);

    fn on_timer<R: Radio>(&mut self, ctx: &mut Context<'_, Self::Timer, R>, id: Self::Timer);

    /// Runs every tick after inputs and timers. `event` is the buffered
    /// radio event, if one arrived since the last tick; the session state
    /// in `ctx.ble` is always current.
    fn on_ble<R: Radio>(&mut self, ctx: &mut Context<'_, Self::Timer, R>, event: Option<RadioEvent>);

    /// Redraw from current state.
    fn render(&mut self, ble: &BleSession, now: Millis);
}

/// What one tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub inputs: u8,
    pub timers: u8,
    pub ble_event: Option<EventId>,
    pub rendered: bool,
}

pub struct Scheduler<'a, A: Application, R> {
    app: A,
    session: BleSession,
    radio: R,
    inputs: Vec<&'a mut dyn InputSource, MAX_INPUTS>,
    timers: TimerBank<A::Timer>,
    started: bool,
}

impl<'a, A: Application, R: Radio> Scheduler<'a, A, R> {
    pub fn new(app: A, session: BleSession, radio: R) -> Self {
        Self {
            app,
            session,
            radio,
            inputs: Vec::new(),
            timers: TimerBank::new(),
            started: false,
        }
    }

    /// Register an input source. Sources are drained in registration order.
    pub fn add_input(&mut self, source: &'a mut dyn InputSource) -> Result<()> {
        self.inputs.push(source).map_err(|_| Error::BufferOverflow)
    }

    /// Radio callback entry point.
    pub fn deliver(&mut self, event: RadioEvent) {
        self.session.on_radio_event(event, &mut self.radio);
    }

    /// Run the application's start hook and the first render.
    pub fn start(&mut self, now: Millis) {
        if self.started {
            return;
        }
        self.started = true;
        let mut ctx = Context {
            now,
            ble: &mut self.session,
            radio: &mut self.radio,
            timers: &mut self.timers,
            dirty: true,
        };
        self.app.start(&mut ctx);
        self.app.render(&self.session, now);
    }

    /// One pass of the main loop.
    pub fn tick(&mut self, now: Millis) -> TickReport {
        if !self.started {
            self.start(now);
        }

        let mut report = TickReport::default();
        let mut ctx = Context {
            now,
            ble: &mut self.session,
            radio: &mut self.radio,
            timers: &mut self.timers,
            dirty: false,
        };

        // 1. inputs
        for source in self.inputs.iter_mut() {
            while let Some(event) = source.poll(now) {
                report.inputs = report.inputs.saturating_add(1);
                self.app.on_input(&mut ctx, event);
            }
        }

        // 2. timers, then session deadlines
        for id in ctx.timers.expired(now) {
            report.timers = report.timers.saturating_add(1);
            self.app.on_timer(&mut ctx, id);
        }
        if ctx.ble.housekeeping(now, ctx.radio) {
            ctx.dirty = true;
        }

        // 3. buffered radio event
        let pending = ctx.ble.take_pending();
        if let Some(event) = &pending {
            info!("ble event: {}", event.id().name());
            report.ble_event = Some(event.id());
        }
        self.app.on_ble(&mut ctx, pending);

        // 4. render
        if ctx.dirty {
            self.app.render(&self.session, now);
            report.rendered = true;
        }
        report
    }

    pub fn app(&self) -> &A {
        &self.app
    }

    pub fn app_mut(&mut self) -> &mut A {
        &mut self.app
    }

    pub fn session(&self) -> &BleSession {
        &self.session
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn radio_mut(&mut self) -> &mut R {
        &mut self.radio
    }

    pub fn timer_running(&self, id: A::Timer) -> bool {
        self.timers.is_running(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::session::tests::{FakeRadio, PEER};
    use crate::ble::ConnHandle;
    use crate::input::encoder::Direction;
    use std::vec::Vec as StdVec;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Tick {
        Refresh,
    }

    #[derive(Default)]
    struct Recorder {
        calls: StdVec<&'static str>,
        knob: i32,
        /// Knob value seen by the radio hook.
        knob_at_ble: Option<i32>,
        renders: StdVec<Option<i32>>,
    }

    impl Application for Recorder {
        type Timer = Tick;

        fn start<R: Radio>(&mut self, ctx: &mut Context<'_, Tick, R>) {
            self.calls.push("start");
            ctx.start_timer(Tick::Refresh, 100, TimerMode::Periodic);
        }

        fn on_input<R: Radio>(&mut self, ctx: &mut Context<'_, Tick, R>, event: InputEvent) {
            self.calls.push("input");
            if let InputEvent::Knob { value, .. } = event {
                self.knob = value;
                ctx.invalidate();
            }
        }

        fn on_timer<R: Radio>(&mut self, ctx: &mut Context<'_, Tick, R>, _: Tick) {
            self.calls.push("timer");
            ctx.invalidate();
        }

        fn on_ble<R: Radio>(&mut self, ctx: &mut Context<'_, Tick, R>, event: Option<RadioEvent>) {
            if event.is_some() {
                self.calls.push("ble");
                self.knob_at_ble = Some(self.knob);
                ctx.invalidate();
            }
        }

        fn render(&mut self, _: &BleSession, _: Millis) {
            self.calls.push("render");
            self.renders.push(self.knob_at_ble);
        }
    }

    /// Yields the queued events one per poll.
    struct Queue(StdVec<InputEvent>);

    impl InputSource for Queue {
        fn poll(&mut self, _: Millis) -> Option<InputEvent> {
            if self.0.is_empty() {
                None
            } else {
                Some(self.0.remove(0))
            }
        }
    }

    fn knob(value: i32) -> InputEvent {
        InputEvent::Knob {
            value,
            direction: Direction::Cw,
        }
    }

    #[test]
    fn input_before_ble_before_render() {
        let mut queue = Queue(vec![knob(3)]);
        let mut sched = Scheduler::new(Recorder::default(), BleSession::new("qc"), FakeRadio::default());
        sched.add_input(&mut queue).unwrap();
        sched.start(0);

        // The callback lands between ticks, the knob interrupt too.
        sched.deliver(RadioEvent::PeripheralConnect {
            conn: ConnHandle(1),
            peer: PEER,
        });
        let report = sched.tick(10);

        assert_eq!(report.inputs, 1);
        assert_eq!(report.ble_event, Some(EventId::PeripheralConnect));
        assert!(report.rendered);
        assert_eq!(sched.app().calls, ["start", "render", "input", "ble", "render"]);
        assert_eq!(sched.app().knob_at_ble, Some(3));
        assert_eq!(sched.app().renders.last(), Some(&Some(3)));
    }

    #[test]
    fn pending_event_is_drained_once() {
        let mut sched = Scheduler::new(Recorder::default(), BleSession::new("qc"), FakeRadio::default());
        sched.start(0);
        sched.deliver(RadioEvent::ScanDone);
        assert_eq!(sched.tick(10).ble_event, Some(EventId::ScanDone));
        assert_eq!(sched.tick(20).ble_event, None);
    }

    #[test]
    fn timers_fire_in_tick_and_render() {
        let mut sched = Scheduler::new(Recorder::default(), BleSession::new("qc"), FakeRadio::default());
        sched.start(0);
        assert!(!sched.tick(50).rendered);
        let report = sched.tick(100);
        assert_eq!(report.timers, 1);
        assert!(report.rendered);
        assert!(sched.timer_running(Tick::Refresh));
    }

    #[test]
    fn quiet_tick_does_not_render() {
        let mut sched = Scheduler::new(Recorder::default(), BleSession::new("qc"), FakeRadio::default());
        let first = sched.tick(0);
        assert!(!first.rendered);
        assert_eq!(sched.app().calls, ["start", "render"]);
    }

    #[test]
    fn input_slots_are_bounded() {
        let mut queues: StdVec<Queue> = (0..MAX_INPUTS + 1).map(|_| Queue(StdVec::new())).collect();
        let mut sched = Scheduler::new(Recorder::default(), BleSession::new("qc"), FakeRadio::default());
        let mut results = StdVec::new();
        for q in queues.iter_mut() {
            results.push(sched.add_input(q));
        }
        assert_eq!(results.last(), Some(&Err(Error::BufferOverflow)));
        assert!(results[..MAX_INPUTS].iter().all(|r| r.is_ok()));
    }
}
