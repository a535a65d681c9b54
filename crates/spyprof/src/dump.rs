//! Writing reports for a set of symbolised samples.

use crate::error::Result;
use crate::report::Reporter;
use crate::storage::Snapshot;
use crate::symbols::SourceLocation;
use crate::table::{Clock, SampleAggregator};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Snapshot file name inside the output directory
pub const SNAPSHOT_FILE: &str = "profile.db";

/// Path of `clock`'s report inside `output_dir`
pub fn report_path(output_dir: &Path, clock: Clock) -> PathBuf {
    output_dir.join(clock.file_name())
}

/// Render and write one report per clock that has samples.
///
/// Creates `output_dir` if needed. Each written file is announced on
/// `console` with one line. A clock whose table is empty is skipped without
/// a file or a line.
pub fn write_reports(
    samples: &SampleAggregator<SourceLocation>,
    reporter: &Reporter,
    output_dir: &Path,
    console: &mut dyn Write,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(output_dir)?;

    let mut written = Vec::new();
    for clock in Clock::ALL {
        let clock_samples = samples.clock(clock);
        if clock_samples.table.is_empty() {
            continue;
        }

        let path = report_path(output_dir, clock);
        fs::write(&path, reporter.render(clock_samples))?;
        writeln!(console, "spyprof: profiling report written to {}", path.display())?;
        written.push(path);
    }

    Ok(written)
}

/// Write `snapshot` to `output_dir/profile.db`
pub fn write_snapshot(snapshot: &Snapshot, output_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output_dir)?;
    let path = output_dir.join(SNAPSHOT_FILE);
    snapshot.write(&path)?;
    tracing::debug!("Snapshot written to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{LibraryRoots, Weighting};
    use tempfile::TempDir;

    fn reporter() -> Reporter {
        Reporter::new(Weighting::Percentage, 100, LibraryRoots::none())
    }

    fn wall_only(source: &Path) -> SampleAggregator {
        let file = source.to_string_lossy().into_owned();
        let mut samples = SampleAggregator::new();
        samples.record(Clock::Wall, [SourceLocation::new(file.as_str(), 1)]);
        samples.record(Clock::Wall, [SourceLocation::new(file.as_str(), 2)]);
        samples
    }

    #[test]
    fn test_empty_cpu_table_writes_one_file() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("main.rs");
        fs::write(&source, "fn main() {\n}\n").unwrap();
        let out = dir.path().join("reports");

        let mut console = Vec::new();
        let written = write_reports(&wall_only(&source), &reporter(), &out, &mut console).unwrap();

        assert_eq!(written, vec![out.join("real.html")]);
        assert!(!out.join("prof.html").exists());
        let console = String::from_utf8(console).unwrap();
        assert_eq!(console.lines().count(), 1);
        assert_eq!(
            console.trim_end(),
            format!("spyprof: profiling report written to {}", out.join("real.html").display())
        );
    }

    #[test]
    fn test_repeated_dump_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("main.rs");
        fs::write(&source, "fn main() {\n    work();\n}\n").unwrap();
        let out = dir.path().join("reports");
        let samples = wall_only(&source);

        write_reports(&samples, &reporter(), &out, &mut std::io::sink()).unwrap();
        let first = fs::read(out.join("real.html")).unwrap();
        write_reports(&samples, &reporter(), &out, &mut std::io::sink()).unwrap();
        let second = fs::read(out.join("real.html")).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_tables_write_nothing() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("reports");
        let mut console = Vec::new();

        let written = write_reports(&SampleAggregator::new(), &reporter(), &out, &mut console).unwrap();
        assert!(written.is_empty());
        assert!(console.is_empty());
        // the directory is still created
        assert!(out.is_dir());
    }

    #[test]
    fn test_uncreatable_directory_fails() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "").unwrap();

        let result = write_reports(
            &wall_only(&blocker),
            &reporter(),
            &blocker.join("reports"),
            &mut std::io::sink(),
        );
        assert!(result.is_err());
    }
}
