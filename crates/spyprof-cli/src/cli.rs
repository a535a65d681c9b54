use clap::{Parser, Subcommand, ValueEnum};
use spyprof::config::{DUMP_INTERVAL_SECS, OUTPUT_DIR, SAMPLES_PER_SECOND};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "spyprof")]
#[command(about = "Per-line heat maps from an in-process sampling profiler")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Regenerate the HTML reports from a snapshot
    Render {
        /// Snapshot database (profile.db)
        file: PathBuf,

        /// Output directory
        #[arg(long, short = 'o', default_value = OUTPUT_DIR)]
        output: PathBuf,

        /// How line intensity is normalized
        #[arg(long, short = 'w', value_enum, default_value = "percentage")]
        weighting: WeightingArg,
    },

    /// Show the hottest lines of a snapshot
    Top {
        /// Snapshot database (profile.db)
        file: PathBuf,

        /// Clock to rank by
        #[arg(long, short = 'c', value_enum, default_value = "wall")]
        clock: ClockArg,

        /// Number of entries to display
        #[arg(long, short = 'n', default_value = "20")]
        top: usize,

        /// Minimum percentage to display
        #[arg(long, short = 't', default_value = "0")]
        threshold: f64,

        /// Output as JSON
        #[arg(long, conflicts_with = "csv")]
        json: bool,

        /// Output as CSV
        #[arg(long)]
        csv: bool,
    },

    /// Profile a built-in workload and write its reports
    Demo {
        /// How long to run the workload (default: until Ctrl-C)
        #[arg(long, short = 'd', value_parser = parse_duration)]
        duration: Option<Duration>,

        /// Sampling frequency in Hz
        #[arg(long, short = 'r', default_value_t = SAMPLES_PER_SECOND)]
        rate: u32,

        /// Time between periodic dumps
        #[arg(long, short = 'i', default_value = "10s", value_parser = parse_duration)]
        interval: Duration,

        /// Output directory
        #[arg(long, short = 'o', default_value = OUTPUT_DIR)]
        output: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockArg {
    Wall,
    Cpu,
}

impl From<ClockArg> for spyprof::Clock {
    fn from(arg: ClockArg) -> Self {
        match arg {
            ClockArg::Wall => spyprof::Clock::Wall,
            ClockArg::Cpu => spyprof::Clock::Cpu,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum WeightingArg {
    Percentage,
    Duration,
}

impl From<WeightingArg> for spyprof::Weighting {
    fn from(arg: WeightingArg) -> Self {
        match arg {
            WeightingArg::Percentage => spyprof::Weighting::Percentage,
            WeightingArg::Duration => spyprof::Weighting::Duration,
        }
    }
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    // Try humantime first
    if let Ok(d) = humantime::parse_duration(s) {
        return Ok(d);
    }

    // Try bare number as seconds
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    Err(format!(
        "Invalid duration '{}'. Examples: 30s, 5m, 2h, 1h30m, 90",
        s
    ))
}

impl Cli {
    pub fn validate(&self) -> Result<(), String> {
        match &self.command {
            Command::Demo { rate, interval, .. } => {
                if *rate == 0 || *rate > 10_000 {
                    return Err(format!(
                        "Sampling rate must be between 1 and 10000 Hz, got {}",
                        rate
                    ));
                }
                if interval.as_secs() == 0 {
                    return Err("Dump interval must be at least 1s".to_string());
                }
            }
            Command::Top { threshold, .. } => {
                if !(0.0..=100.0).contains(threshold) {
                    return Err(format!(
                        "Threshold must be between 0 and 100, got {}",
                        threshold
                    ));
                }
            }
            Command::Render { .. } | Command::Completions { .. } => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("1m30s"), Ok(Duration::from_secs(90)));
        assert_eq!(parse_duration("90"), Ok(Duration::from_secs(90)));
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_demo_defaults() {
        let cli = Cli::try_parse_from(["spyprof", "demo"]).unwrap();
        match cli.command {
            Command::Demo {
                duration,
                rate,
                interval,
                output,
            } => {
                assert_eq!(duration, None);
                assert_eq!(rate, SAMPLES_PER_SECOND);
                assert_eq!(interval, Duration::from_secs(DUMP_INTERVAL_SECS));
                assert_eq!(output, PathBuf::from(OUTPUT_DIR));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cli = Cli::try_parse_from(["spyprof", "demo", "--rate", "0"]).unwrap();
        assert!(cli.validate().is_err());

        let cli = Cli::try_parse_from(["spyprof", "demo", "--interval", "500ms"]).unwrap();
        assert!(cli.validate().is_err());

        let cli = Cli::try_parse_from(["spyprof", "top", "p.db", "-t", "150"]).unwrap();
        assert!(cli.validate().is_err());

        let cli = Cli::try_parse_from(["spyprof", "top", "p.db", "--clock", "cpu"]).unwrap();
        assert!(cli.validate().is_ok());
    }

    #[test]
    fn test_json_and_csv_conflict() {
        assert!(Cli::try_parse_from(["spyprof", "top", "p.db", "--json", "--csv"]).is_err());
    }
}
