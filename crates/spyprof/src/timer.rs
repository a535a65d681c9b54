//! Interval timers driving the two sampling clocks.

use crate::table::Clock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

fn timeval(d: Duration) -> libc::timeval {
    libc::timeval {
        tv_sec: d.as_secs() as libc::time_t,
        tv_usec: d.subsec_micros() as libc::suseconds_t,
    }
}

fn set_timer(clock: Clock, interval: Duration) -> bool {
    let timer = libc::itimerval {
        it_interval: timeval(interval),
        it_value: timeval(interval),
    };
    let rc = unsafe {
        match clock {
            Clock::Wall => libc::setitimer(libc::ITIMER_REAL, &timer, std::ptr::null_mut()),
            Clock::Cpu => libc::setitimer(libc::ITIMER_PROF, &timer, std::ptr::null_mut()),
        }
    };
    rc == 0
}

/// Arms and disarms both interval timers at a fixed rate.
///
/// A clock whose timer cannot be programmed is marked unavailable the first
/// time and never armed again; its table simply stays empty. Arming and
/// disarming only issue `setitimer` calls and are safe to use from a signal
/// handler.
pub struct TimerScheduler {
    interval: Duration,
    wall_available: AtomicBool,
    cpu_available: AtomicBool,
}

impl TimerScheduler {
    pub fn new(interval: Duration) -> Self {
        TimerScheduler {
            interval,
            wall_available: AtomicBool::new(true),
            cpu_available: AtomicBool::new(true),
        }
    }

    fn available(&self, clock: Clock) -> &AtomicBool {
        match clock {
            Clock::Wall => &self.wall_available,
            Clock::Cpu => &self.cpu_available,
        }
    }

    pub fn is_available(&self, clock: Clock) -> bool {
        self.available(clock).load(Ordering::Relaxed)
    }

    /// Start every available timer
    pub fn arm(&self) {
        for clock in Clock::ALL {
            let available = self.available(clock);
            if available.load(Ordering::Relaxed) && !set_timer(clock, self.interval) {
                available.store(false, Ordering::Relaxed);
            }
        }
    }

    /// Stop both timers. Idempotent.
    pub fn disarm(&self) {
        for clock in Clock::ALL {
            set_timer(clock, Duration::ZERO);
        }
    }
}
