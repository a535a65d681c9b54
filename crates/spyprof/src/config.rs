use crate::error::{Error, Result};
use crate::report::{LibraryRoots, Weighting};
use std::path::PathBuf;
use std::time::Duration;

/// Seconds of wall-clock sampling between periodic dumps
pub const DUMP_INTERVAL_SECS: u64 = 10;

/// Default sampling rate of both clocks
pub const SAMPLES_PER_SECOND: u32 = 100;

/// Directory the reports are written to, relative to the working directory
pub const OUTPUT_DIR: &str = "spyprof";

/// Distinct instruction addresses each clock can hold before frames are dropped
pub const ADDRESS_CAPACITY: usize = 64 * 1024;

/// Profiler configuration. Fixed for the lifetime of a session.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interrupts per second, for both clocks
    pub samples_per_second: u32,
    /// Wall-clock time between periodic dumps (whole seconds)
    pub dump_interval: Duration,
    /// Where `real.html`, `prof.html` and the snapshot go
    pub output_dir: PathBuf,
    /// How line intensity is normalized in the HTML reports
    pub weighting: Weighting,
    /// Also write `profile.db` on every dump
    pub snapshot: bool,
    /// Installed-library directories whose files are never rendered
    pub library_roots: LibraryRoots,
    /// Per-clock bound on distinct addresses recorded by the signal handlers
    pub address_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            samples_per_second: SAMPLES_PER_SECOND,
            dump_interval: Duration::from_secs(DUMP_INTERVAL_SECS),
            output_dir: PathBuf::from(OUTPUT_DIR),
            weighting: Weighting::default(),
            snapshot: false,
            library_roots: LibraryRoots::detect(),
            address_capacity: ADDRESS_CAPACITY,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.samples_per_second == 0 || self.samples_per_second > 10_000 {
            return Err(Error::InvalidConfig(format!(
                "sampling rate must be between 1 and 10000 Hz, got {}",
                self.samples_per_second
            )));
        }

        if self.dump_interval.as_secs() == 0 {
            return Err(Error::InvalidConfig(format!(
                "dump interval must be at least 1s, got {:?}",
                self.dump_interval
            )));
        }

        if self.address_capacity == 0 {
            return Err(Error::InvalidConfig(
                "address capacity must be non-zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Period of both interval timers
    pub fn sample_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.samples_per_second.max(1) as u64)
    }

    /// Number of wall-clock samples between periodic dumps
    pub fn dump_every(&self) -> u64 {
        self.samples_per_second as u64 * self.dump_interval.as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dump_every(), 1000);
        assert_eq!(config.sample_interval(), Duration::from_millis(10));
        assert_eq!(config.output_dir, PathBuf::from("spyprof"));
    }

    #[test]
    fn test_rejects_bad_rate() {
        let config = Config {
            samples_per_second: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = Config {
            samples_per_second: 20_000,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_sub_second_interval() {
        let config = Config {
            dump_interval: Duration::from_millis(500),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }
}
