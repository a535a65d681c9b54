//! Frame-pointer stack walking from an interrupted context.
//!
//! Runs inside the signal handlers: no allocation, no locks, bounded work.
//! Build the profiled program with `-C force-frame-pointers=yes`; frames
//! without a frame pointer end the walk early.

/// Maximum stack depth to capture
pub const MAX_STACK_DEPTH: usize = 64;

/// Lowest and highest plausible user-space frame pointer
const FP_RANGE: std::ops::RangeInclusive<usize> = 0x1000..=0x7fff_ffff_ffff;

/// Registers a frame-pointer walk starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registers {
    /// Interrupted program counter
    pub pc: u64,
    /// Interrupted frame pointer
    pub fp: usize,
}

impl Registers {
    /// Extract the interrupted registers from the `ucontext_t` a
    /// `SA_SIGINFO` handler receives.
    ///
    /// # Safety
    /// `ucontext` must be null or the context pointer passed to the handler.
    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    pub unsafe fn from_ucontext(ucontext: *mut libc::c_void) -> Option<Self> {
        const REG_RBP: usize = 10;
        const REG_RIP: usize = 16;

        if ucontext.is_null() {
            return None;
        }
        let uc = ucontext as *const libc::ucontext_t;
        let gregs = unsafe { &(*uc).uc_mcontext.gregs };
        Some(Registers {
            pc: gregs[REG_RIP] as u64,
            fp: gregs[REG_RBP] as usize,
        })
    }

    /// # Safety
    /// `ucontext` must be null or the context pointer passed to the handler.
    #[cfg(all(target_os = "linux", target_arch = "aarch64"))]
    pub unsafe fn from_ucontext(ucontext: *mut libc::c_void) -> Option<Self> {
        if ucontext.is_null() {
            return None;
        }
        let uc = ucontext as *const libc::ucontext_t;
        let mcontext = unsafe { &(*uc).uc_mcontext };
        Some(Registers {
            pc: mcontext.pc as u64,
            // x29 holds the frame pointer
            fp: mcontext.regs[29] as usize,
        })
    }

    /// # Safety
    /// Always safe; register extraction is unsupported on this target.
    #[cfg(not(all(
        target_os = "linux",
        any(target_arch = "x86_64", target_arch = "aarch64")
    )))]
    pub unsafe fn from_ucontext(_ucontext: *mut libc::c_void) -> Option<Self> {
        None
    }
}

/// Lazy innermost-to-outermost walk of a frame-pointer chain.
///
/// Yields the interrupted PC first, then each return address minus one so
/// that the lookup lands on the call instruction's line rather than the
/// line after it.
pub struct FramePointerWalker {
    pending_pc: Option<u64>,
    /// Current frame pointer (0 = walk finished)
    fp: usize,
    depth: usize,
}

impl FramePointerWalker {
    /// # Safety
    /// Every frame pointer reachable from `regs.fp` that passes the
    /// alignment, range and monotonicity checks must point to readable
    /// memory. This holds for the stack of the interrupted thread.
    pub unsafe fn new(regs: Registers) -> Self {
        FramePointerWalker {
            pending_pc: (regs.pc != 0).then_some(regs.pc),
            fp: regs.fp,
            depth: 0,
        }
    }

    /// A walker that yields nothing
    pub fn empty() -> Self {
        FramePointerWalker {
            pending_pc: None,
            fp: 0,
            depth: 0,
        }
    }
}

impl Iterator for FramePointerWalker {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.depth >= MAX_STACK_DEPTH {
            return None;
        }

        if let Some(pc) = self.pending_pc.take() {
            self.depth += 1;
            return Some(pc);
        }

        let fp = self.fp as *const usize;

        // Validate frame pointer alignment and range
        if fp.is_null() || (fp as usize) & 0x7 != 0 || !FP_RANGE.contains(&(fp as usize)) {
            self.fp = 0;
            return None;
        }

        // Return address at [fp + 8], saved frame pointer at [fp]
        let (ret_addr, next_fp) = unsafe { (*fp.add(1), *fp) };
        if ret_addr == 0 {
            self.fp = 0;
            return None;
        }

        // Stacks grow down, so callers' frames sit at higher addresses
        self.fp = if next_fp <= fp as usize { 0 } else { next_fp };
        self.depth += 1;
        Some(ret_addr as u64 - 1)
    }
}
