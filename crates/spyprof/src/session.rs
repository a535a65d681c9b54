//! The process-wide profiling session.
//!
//! One `Session` is built by [`start`] and leaked for the rest of the
//! process. The signal handlers reach it through a pointer published before
//! they are installed.
//!
//! Handlers and the dump procedure coordinate without locks:
//! - a handler bumps `in_flight`, then records only if the arm `gate` is open;
//! - a dump closes the gate, disarms both timers and waits for `in_flight`
//!   to drain before touching the tables.
//!
//! When the wall clock reaches a dump boundary its handler closes the gate
//! and disarms right away, so the dump covers exactly the samples up to that
//! tick, then wakes the dump thread through a non-blocking pipe.

use crate::config::Config;
use crate::dump::{write_reports, write_snapshot};
use crate::error::{Error, Result};
use crate::report::Reporter;
use crate::signal::{ErrnoGuard, PreviousAction, SignalMask, install_handler};
use crate::storage::{Snapshot, SnapshotMeta};
use crate::symbols::{SymbolResolver, symbolize};
use crate::table::{Clock, ClockSamples, SampleAggregator};
use crate::timer::TimerScheduler;
use crate::walker::{FramePointerWalker, Registers};
use chrono::{DateTime, Utc};
use std::cell::UnsafeCell;
use std::fs::File;
use std::io::{self, Read};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::path::PathBuf;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;

static SESSION: AtomicPtr<Session> = AtomicPtr::new(ptr::null_mut());
static STARTED: AtomicBool = AtomicBool::new(false);

/// One clock's address table behind a spin flag.
///
/// The flag only matters when the same clock fires on two threads at once;
/// a thread never contends with itself because both signals are blocked
/// while a handler runs or while the samples are read.
struct ClockState {
    busy: AtomicBool,
    samples: UnsafeCell<ClockSamples<u64>>,
}

// Access to `samples` is serialised by `busy`
unsafe impl Sync for ClockState {}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ClockState {
    fn new(capacity: usize) -> Self {
        ClockState {
            busy: AtomicBool::new(false),
            samples: UnsafeCell::new(ClockSamples::bounded(capacity)),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut ClockSamples<u64>) -> R) -> R {
        while self
            .busy
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
        let _guard = BusyGuard(&self.busy);
        f(unsafe { &mut *self.samples.get() })
    }
}

/// State owned by whichever thread is dumping
struct DumpState {
    /// Loaded on the first dump
    symbols: Option<SymbolResolver>,
    /// Set by the final dump; later dumps do nothing
    finished: bool,
}

struct Session {
    config: Config,
    timers: TimerScheduler,
    reporter: Reporter,
    wall: ClockState,
    cpu: ClockState,
    /// Handlers record only while open
    gate: AtomicBool,
    /// Handlers between entry and exit
    in_flight: AtomicUsize,
    /// Wall-clock samples since start
    elapsed: AtomicU64,
    dump_every: u64,
    /// Write end of the dump thread's wake-up pipe (non-blocking)
    wake: OwnedFd,
    start_time: DateTime<Utc>,
    dumps: Mutex<DumpState>,
}

/// Re-opens the gate and re-arms the timers when dropped
struct Rearm<'a> {
    session: &'a Session,
    enabled: bool,
}

impl Drop for Rearm<'_> {
    fn drop(&mut self) {
        if self.enabled {
            self.session.resume();
        }
    }
}

extern "C" fn on_wall_tick(
    _sig: libc::c_int,
    _info: *mut libc::siginfo_t,
    ucontext: *mut libc::c_void,
) {
    handle_tick(Clock::Wall, ucontext);
}

extern "C" fn on_cpu_tick(
    _sig: libc::c_int,
    _info: *mut libc::siginfo_t,
    ucontext: *mut libc::c_void,
) {
    handle_tick(Clock::Cpu, ucontext);
}

fn handle_tick(clock: Clock, ucontext: *mut libc::c_void) {
    let _errno = ErrnoGuard::save();

    let session = SESSION.load(Ordering::Acquire);
    if session.is_null() {
        return;
    }
    let session = unsafe { &*session };

    session.in_flight.fetch_add(1, Ordering::SeqCst);
    if session.gate.load(Ordering::SeqCst) {
        session.sample(clock, ucontext);
    }
    session.in_flight.fetch_sub(1, Ordering::SeqCst);
}

extern "C" fn dump_at_exit() {
    let session = SESSION.load(Ordering::Acquire);
    if session.is_null() {
        return;
    }
    if let Err(e) = unsafe { &*session }.dump(false) {
        tracing::error!("Final dump failed: {}", e);
    }
}

impl Session {
    fn new(config: Config, wake: OwnedFd) -> Self {
        Session {
            timers: TimerScheduler::new(config.sample_interval()),
            reporter: Reporter::from_config(&config),
            wall: ClockState::new(config.address_capacity),
            cpu: ClockState::new(config.address_capacity),
            gate: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            elapsed: AtomicU64::new(0),
            dump_every: config.dump_every().max(1),
            wake,
            start_time: Utc::now(),
            dumps: Mutex::new(DumpState {
                symbols: None,
                finished: false,
            }),
            config,
        }
    }

    fn state(&self, clock: Clock) -> &ClockState {
        match clock {
            Clock::Wall => &self.wall,
            Clock::Cpu => &self.cpu,
        }
    }

    /// Record the interrupted stack. Runs in signal context.
    fn sample(&self, clock: Clock, ucontext: *mut libc::c_void) {
        let frames = match unsafe { Registers::from_ucontext(ucontext) } {
            Some(regs) => unsafe { FramePointerWalker::new(regs) },
            None => FramePointerWalker::empty(),
        };
        self.state(clock).with(|samples| samples.record(frames));

        if clock == Clock::Wall {
            let elapsed = self.elapsed.fetch_add(1, Ordering::Relaxed) + 1;
            if elapsed % self.dump_every == 0 {
                self.request_dump();
            }
        }
    }

    /// Stop sampling and wake the dump thread. Async-signal-safe.
    fn request_dump(&self) {
        self.gate.store(false, Ordering::SeqCst);
        self.timers.disarm();

        let byte = 1u8;
        // A full pipe means a dump is already pending
        unsafe {
            libc::write(
                self.wake.as_raw_fd(),
                &byte as *const u8 as *const libc::c_void,
                1,
            )
        };
    }

    /// Close the gate, disarm and wait for running handlers to finish
    fn quiesce(&self) {
        self.gate.store(false, Ordering::SeqCst);
        self.timers.disarm();
        while self.in_flight.load(Ordering::SeqCst) != 0 {
            thread::yield_now();
        }
    }

    fn resume(&self) {
        self.gate.store(true, Ordering::SeqCst);
        self.timers.arm();
        for clock in Clock::ALL {
            if !self.timers.is_available(clock) {
                tracing::debug!("{} clock unavailable, not sampling it", clock.name());
            }
        }
    }

    /// Write the reports for everything sampled so far.
    ///
    /// With `rearm` false this is the final dump: sampling stays off and
    /// every later dump is a no-op.
    fn dump(&self, rearm: bool) -> Result<Vec<PathBuf>> {
        let _mask = SignalMask::block();
        let mut state = self.dumps.lock().unwrap_or_else(PoisonError::into_inner);
        if state.finished {
            return Ok(Vec::new());
        }

        self.quiesce();
        let _rearm = Rearm {
            session: self,
            enabled: rearm,
        };
        if !rearm {
            state.finished = true;
        }

        let symbols = state.symbols.get_or_insert_with(load_symbols);
        let mut dropped = 0;
        let [wall, cpu] = Clock::ALL.map(|clock| {
            self.state(clock).with(|raw| {
                dropped += raw.table.dropped();
                symbolize(&mut *symbols, raw)
            })
        });
        if dropped > 0 {
            tracing::warn!(
                "{} frames dropped, address tables are full (capacity {})",
                dropped,
                self.config.address_capacity
            );
        }
        let samples = SampleAggregator::from_parts(wall, cpu);

        let output_dir = &self.config.output_dir;
        let written = write_reports(&samples, &self.reporter, output_dir, &mut io::stdout().lock())?;

        if self.config.snapshot {
            let snapshot = Snapshot {
                meta: SnapshotMeta::for_current_process(&self.config, self.start_time),
                samples,
            };
            write_snapshot(&snapshot, output_dir)?;
        }

        Ok(written)
    }

    /// Body of the dump thread: one dump per wake-up byte
    fn dump_loop(&self, mut wake: File) {
        let mut buf = [0u8; 64];
        loop {
            match wake.read(&mut buf) {
                Ok(0) => return,
                Ok(_) => {
                    if let Err(e) = self.dump(true) {
                        tracing::error!("Periodic dump failed: {}", e);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::error!("Dump thread stopped: {}", e);
                    return;
                }
            }
        }
    }
}

fn load_symbols() -> SymbolResolver {
    match SymbolResolver::for_current_process() {
        Ok(resolver) => {
            if resolver.range_count() == 0 {
                tracing::warn!("No line information in the executable, reports will be empty");
            }
            resolver
        }
        Err(e) => {
            tracing::warn!("Cannot load symbols, reports will be empty: {}", e);
            SymbolResolver::from_ranges(Vec::new(), 0)
        }
    }
}

/// Pipe whose write end never blocks. Returns (read end, write end).
fn wake_pipe() -> Result<(File, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } < 0 {
        return Err(io::Error::last_os_error().into());
    }

    let [read_fd, write_fd] = fds;
    let (read_end, write_end) = unsafe { (OwnedFd::from_raw_fd(read_fd), OwnedFd::from_raw_fd(write_fd)) };

    unsafe {
        let flags = libc::fcntl(write_fd, libc::F_GETFL);
        if flags < 0 || libc::fcntl(write_fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error().into());
        }
    }

    Ok((File::from(read_end), write_end))
}

/// Install both handlers, the exit hook and the dump thread.
///
/// Replaced dispositions are pushed to `previous` as they are installed.
fn install(
    session: &'static Session,
    wake: File,
    previous: &mut Vec<PreviousAction>,
) -> Result<()> {
    previous.push(install_handler(Clock::Wall, on_wall_tick)?);
    previous.push(install_handler(Clock::Cpu, on_cpu_tick)?);

    // A no-op while SESSION is null, so registering twice is harmless
    if unsafe { libc::atexit(dump_at_exit) } != 0 {
        return Err(Error::Signal("atexit registration failed".to_string()));
    }

    // The dump thread inherits the mask and is never sampled
    let _mask = SignalMask::block();
    thread::Builder::new()
        .name("spyprof-dump".to_string())
        .spawn(move || session.dump_loop(wake))?;
    Ok(())
}

/// Start profiling the whole process.
///
/// Installs the `SIGALRM` and `SIGPROF` handlers, starts the dump thread,
/// arms both timers and registers a final dump at process exit. Only one
/// session can ever exist per process.
pub fn start(config: Config) -> Result<Profiler> {
    config.validate()?;

    if !cfg!(all(
        target_os = "linux",
        any(target_arch = "x86_64", target_arch = "aarch64")
    )) {
        return Err(Error::UnsupportedPlatform(format!(
            "{}-{}",
            std::env::consts::ARCH,
            std::env::consts::OS
        )));
    }

    if STARTED.swap(true, Ordering::SeqCst) {
        return Err(Error::AlreadyRunning);
    }

    let (wake_read, wake_write) = match wake_pipe() {
        Ok(pipe) => pipe,
        Err(e) => {
            STARTED.store(false, Ordering::SeqCst);
            return Err(e);
        }
    };

    let session: &'static Session = Box::leak(Box::new(Session::new(config, wake_write)));
    SESSION.store(session as *const Session as *mut Session, Ordering::Release);

    let mut previous = Vec::with_capacity(Clock::ALL.len());
    if let Err(e) = install(session, wake_read, &mut previous) {
        for action in previous {
            if let Err(e) = action.restore() {
                tracing::warn!("Cannot restore signal disposition: {}", e);
            }
        }
        // Timers were never armed; the session stays leaked but unreachable
        SESSION.store(ptr::null_mut(), Ordering::Release);
        STARTED.store(false, Ordering::SeqCst);
        return Err(e);
    }

    session.resume();
    tracing::debug!(
        "Profiling at {} Hz, dumping to {} every {}s",
        session.config.samples_per_second,
        session.config.output_dir.display(),
        session.config.dump_interval.as_secs()
    );

    Ok(Profiler { session })
}

/// Handle to the running session
#[derive(Clone, Copy)]
pub struct Profiler {
    session: &'static Session,
}

impl Profiler {
    /// Write the reports now and keep sampling
    pub fn dump(&self) -> Result<Vec<PathBuf>> {
        self.session.dump(true)
    }

    /// Write the final reports and stop sampling for good.
    ///
    /// The exit-time dump becomes a no-op.
    pub fn stop(&self) -> Result<Vec<PathBuf>> {
        self.session.dump(false)
    }

    /// Samples delivered so far, as (wall clock, CPU time)
    pub fn totals(&self) -> (u64, u64) {
        let _mask = SignalMask::block();
        let [wall, cpu] = Clock::ALL.map(|clock| self.session.state(clock).with(|s| s.total));
        (wall, cpu)
    }

    /// Frames refused because an address table was full
    pub fn dropped(&self) -> u64 {
        let _mask = SignalMask::block();
        Clock::ALL
            .iter()
            .map(|&clock| self.session.state(clock).with(|s| s.table.dropped()))
            .sum()
    }

    pub fn config(&self) -> &Config {
        &self.session.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_clock_state_serialises_threads() {
        let state = Arc::new(ClockState::new(16));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        state.with(|s| s.record([t as u64, 99]));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        state.with(|s| {
            assert_eq!(s.total, 4000);
            assert_eq!(s.table.get(&99), 4000);
            assert_eq!(s.table.get(&0), 1000);
        });
    }

    #[test]
    fn test_clock_state_released_on_panic() {
        let state = ClockState::new(4);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            state.with(|_| panic!("boom"));
        }));
        assert!(result.is_err());
        assert_eq!(state.with(|s| s.total), 0);
    }

    #[test]
    fn test_wake_pipe_never_blocks() {
        let (mut read_end, write_end) = wake_pipe().unwrap();
        let byte = 1u8;
        // fill the pipe; further writes must fail with EAGAIN instead of blocking
        let mut written = 0usize;
        loop {
            let rc = unsafe {
                libc::write(
                    write_end.as_raw_fd(),
                    &byte as *const u8 as *const libc::c_void,
                    1,
                )
            };
            if rc < 0 {
                assert_eq!(io::Error::last_os_error().kind(), io::ErrorKind::WouldBlock);
                break;
            }
            written += 1;
        }
        assert!(written > 0);

        let mut buf = [0u8; 8];
        assert_eq!(read_end.read(&mut buf).unwrap(), 8);
    }
}
