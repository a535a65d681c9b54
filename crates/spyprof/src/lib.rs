//! In-process sampling profiler with per-line HTML heat maps.
//!
//! Two interval timers interrupt the process: `ITIMER_REAL` (wall-clock
//! time) and `ITIMER_PROF` (CPU time). Each interrupt walks the frame
//! pointers of the interrupted thread and counts every return address. On a
//! fixed wall-clock cadence, and once more at exit, the counts are resolved
//! to source lines and written as one HTML document per clock:
//!
//! - `spyprof/real.html` for wall-clock samples
//! - `spyprof/prof.html` for CPU-time samples
//!
//! # Usage
//!
//! ```rust,ignore
//! fn main() -> spyprof::Result<()> {
//!     let profiler = spyprof::start(spyprof::Config::default())?;
//!     run_workload();
//!     profiler.stop()?;
//!     Ok(())
//! }
//! ```
//!
//! Build with frame pointers and debug info for useful stacks:
//! ```bash
//! RUSTFLAGS="-C force-frame-pointers=yes" cargo build --release
//! ```

pub mod config;
pub mod dump;
pub mod error;
pub mod report;
pub mod signal;
pub mod storage;
pub mod symbols;
pub mod table;
pub mod timer;
pub mod walker;

mod session;

pub use config::Config;
pub use error::{Error, Result};
pub use report::{Highlighter, LibraryRoots, Reporter, Weighting, heat};
pub use session::{Profiler, start};
pub use symbols::SourceLocation;
pub use table::{Clock, ClockSamples, HitTable, SampleAggregator};
