use anyhow::Context;
use spyprof::dump::write_reports;
use spyprof::storage::Snapshot;
use spyprof::{LibraryRoots, Reporter, Weighting};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub fn run(file: &Path, output: &Path, weighting: Weighting) -> anyhow::Result<()> {
    let written = render(
        file,
        output,
        weighting,
        LibraryRoots::detect(),
        &mut io::stdout().lock(),
    )?;

    if written.is_empty() {
        eprintln!("No samples in {}, nothing written", file.display());
    }
    Ok(())
}

fn render(
    file: &Path,
    output: &Path,
    weighting: Weighting,
    roots: LibraryRoots,
    console: &mut dyn Write,
) -> anyhow::Result<Vec<PathBuf>> {
    let snapshot = Snapshot::load(file)
        .with_context(|| format!("Failed to read snapshot {}", file.display()))?;

    let reporter = Reporter::new(weighting, snapshot.meta.samples_per_second, roots);
    let written = write_reports(&snapshot.samples, &reporter, output, console)
        .with_context(|| format!("Failed to write reports to {}", output.display()))?;

    Ok(written)
}
