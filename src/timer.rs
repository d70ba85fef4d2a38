//! Soft timers drained by the scheduler.
//!
//! Expirations are computed against the tick's `now`, so every timer
//! callback runs in scheduler context in a fixed registration order.

use crate::Millis;
use heapless::Vec;

/// Maximum timers one application can register.
pub const MAX_TIMERS: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerMode {
    OneShot,
    Periodic,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SoftTimer {
    period: Millis,
    mode: TimerMode,
    due: Option<Millis>,
}

impl SoftTimer {
    pub const fn new(period: Millis, mode: TimerMode) -> Self {
        Self {
            period,
            mode,
            due: None,
        }
    }

    pub fn start(&mut self, now: Millis) {
        self.due = Some(now + self.period);
    }

    /// Stop the timer. Safe when not running.
    pub fn stop(&mut self) {
        self.due = None;
    }

    pub fn is_running(&self) -> bool {
        self.due.is_some()
    }

    pub fn period(&self) -> Millis {
        self.period
    }

    /// Returns `true` if the timer expired at or before `now`; periodic
    /// timers re-arm from their previous deadline, one-shots stop.
    pub fn poll(&mut self, now: Millis) -> bool {
        match self.due {
            Some(due) if now >= due => {
                self.due = match self.mode {
                    // Skip missed periods rather than bursting to catch up.
                    TimerMode::Periodic => {
                        let mut next = due + self.period.max(1);
                        while next <= now {
                            next += self.period.max(1);
                        }
                        Some(next)
                    }
                    TimerMode::OneShot => None,
                };
                true
            }
            _ => false,
        }
    }
}

/// A fixed set of named timers.
pub struct TimerBank<T> {
    timers: Vec<(T, SoftTimer), MAX_TIMERS>,
}

impl<T: Copy + PartialEq> TimerBank<T> {
    pub const fn new() -> Self {
        Self { timers: Vec::new() }
    }

    /// Start (or restart) `id` with the given period and mode.
    pub fn start(&mut self, id: T, period: Millis, mode: TimerMode, now: Millis) {
        if let Some((_, timer)) = self.timers.iter_mut().find(|(t, _)| *t == id) {
            *timer = SoftTimer::new(period, mode);
            timer.start(now);
            return;
        }
        let mut timer = SoftTimer::new(period, mode);
        timer.start(now);
        if self.timers.push((id, timer)).is_err() {
            warn!("timer bank full, dropping timer");
        }
    }

    /// Stop `id`. Idempotent.
    pub fn stop(&mut self, id: T) {
        if let Some((_, timer)) = self.timers.iter_mut().find(|(t, _)| *t == id) {
            timer.stop();
        }
    }

    pub fn is_running(&self, id: T) -> bool {
        self.timers
            .iter()
            .any(|(t, timer)| *t == id && timer.is_running())
    }

    /// Collect every timer due at `now`, in registration order.
    pub fn expired(&mut self, now: Millis) -> Vec<T, MAX_TIMERS> {
        let mut due = Vec::new();
        for (id, timer) in self.timers.iter_mut() {
            if timer.poll(now) {
                let _ = due.push(*id);
            }
        }
        due
    }
}

impl<T: Copy + PartialEq> Default for TimerBank<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Id {
        Refresh,
        Alarm,
    }

    #[test]
    fn one_shot_fires_once() {
        let mut t = SoftTimer::new(100, TimerMode::OneShot);
        t.start(0);
        assert!(!t.poll(99));
        assert!(t.poll(100));
        assert!(!t.poll(500));
        assert!(!t.is_running());
    }

    #[test]
    fn periodic_rearms_and_skips_missed_periods() {
        let mut t = SoftTimer::new(100, TimerMode::Periodic);
        t.start(0);
        assert!(t.poll(100));
        assert!(!t.poll(150));
        // Late by several periods: one expiry, next deadline in the future.
        assert!(t.poll(450));
        assert!(!t.poll(499));
        assert!(t.poll(500));
    }

    #[test]
    fn stop_is_idempotent() {
        let mut bank: TimerBank<Id> = TimerBank::new();
        bank.stop(Id::Alarm);
        bank.start(Id::Alarm, 10, TimerMode::OneShot, 0);
        bank.stop(Id::Alarm);
        bank.stop(Id::Alarm);
        assert!(!bank.is_running(Id::Alarm));
        assert!(bank.expired(1_000).is_empty());
    }

    #[test]
    fn expired_in_registration_order() {
        let mut bank: TimerBank<Id> = TimerBank::new();
        bank.start(Id::Refresh, 50, TimerMode::Periodic, 0);
        bank.start(Id::Alarm, 20, TimerMode::OneShot, 0);
        let due = bank.expired(60);
        assert_eq!(due.as_slice(), &[Id::Refresh, Id::Alarm]);
        assert!(bank.is_running(Id::Refresh));
        assert!(!bank.is_running(Id::Alarm));
    }

    #[test]
    fn restart_replaces_deadline() {
        let mut bank: TimerBank<Id> = TimerBank::new();
        bank.start(Id::Alarm, 100, TimerMode::OneShot, 0);
        bank.start(Id::Alarm, 100, TimerMode::OneShot, 80);
        assert!(bank.expired(150).is_empty());
        assert_eq!(bank.expired(180).as_slice(), &[Id::Alarm]);
    }
}
