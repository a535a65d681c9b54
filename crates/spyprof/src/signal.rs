//! Signal plumbing: the scoped critical section and handler installation.

use crate::error::{Error, Result};
use crate::table::Clock;

/// Signature of an `SA_SIGINFO` handler
pub type SigInfoHandler = extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut libc::c_void);

impl Clock {
    /// Signal delivered when this clock's timer expires
    pub fn signal(self) -> libc::c_int {
        match self {
            Clock::Wall => libc::SIGALRM,
            Clock::Cpu => libc::SIGPROF,
        }
    }
}

/// Set containing both profiling signals
fn profiling_sigset() -> libc::sigset_t {
    unsafe {
        let mut set: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut set);
        for clock in Clock::ALL {
            libc::sigaddset(&mut set, clock.signal());
        }
        set
    }
}

/// Blocks `SIGALRM` and `SIGPROF` on the current thread while alive.
///
/// Drop restores the mask that was in effect on entry, so nesting works and
/// a signal that was already blocked stays blocked.
pub struct SignalMask {
    previous: libc::sigset_t,
}

impl SignalMask {
    pub fn block() -> Self {
        let set = profiling_sigset();
        let mut previous: libc::sigset_t = unsafe { std::mem::zeroed() };
        // pthread_sigmask only fails on an invalid `how`
        unsafe { libc::pthread_sigmask(libc::SIG_BLOCK, &set, &mut previous) };
        SignalMask { previous }
    }
}

impl Drop for SignalMask {
    fn drop(&mut self) {
        unsafe { libc::pthread_sigmask(libc::SIG_SETMASK, &self.previous, std::ptr::null_mut()) };
    }
}

/// Disposition a signal had before [`install_handler`] replaced it
pub struct PreviousAction {
    signal: libc::c_int,
    action: libc::sigaction,
}

impl PreviousAction {
    /// Put the replaced disposition back
    pub fn restore(self) -> Result<()> {
        if unsafe { libc::sigaction(self.signal, &self.action, std::ptr::null_mut()) } < 0 {
            return Err(Error::last_os("sigaction"));
        }
        Ok(())
    }
}

/// Install `handler` for `clock`'s signal.
///
/// Both profiling signals are blocked while the handler runs, so neither
/// handler can interrupt the other on the same thread.
pub fn install_handler(clock: Clock, handler: SigInfoHandler) -> Result<PreviousAction> {
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = handler as usize;
        sa.sa_flags = libc::SA_RESTART | libc::SA_SIGINFO;
        sa.sa_mask = profiling_sigset();

        let mut previous: libc::sigaction = std::mem::zeroed();
        if libc::sigaction(clock.signal(), &sa, &mut previous) < 0 {
            return Err(Error::last_os("sigaction"));
        }
        Ok(PreviousAction {
            signal: clock.signal(),
            action: previous,
        })
    }
}

/// Restores `errno` on drop; handlers must not clobber the interrupted code's errno
pub struct ErrnoGuard(libc::c_int);

impl ErrnoGuard {
    pub fn save() -> Self {
        ErrnoGuard(unsafe { *libc::__errno_location() })
    }
}

impl Drop for ErrnoGuard {
    fn drop(&mut self) {
        unsafe { *libc::__errno_location() = self.0 };
    }
}
