use anyhow::Context;
use spyprof::Clock;
use spyprof::storage::{self, SnapshotMeta, TopEntry};
use std::io::{self, Write};
use std::path::Path;

pub fn run(
    file: &Path,
    clock: Clock,
    limit: usize,
    threshold: f64,
    json: bool,
    csv: bool,
) -> anyhow::Result<()> {
    report(file, clock, limit, threshold, json, csv, &mut io::stdout().lock())
}

fn report(
    file: &Path,
    clock: Clock,
    limit: usize,
    threshold: f64,
    json: bool,
    csv: bool,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let conn = storage::open(file)
        .with_context(|| format!("Failed to read snapshot {}", file.display()))?;
    let meta = SnapshotMeta::read(&conn)?;
    let total = storage::clock_total(&conn, clock)?;
    let entries = storage::query_top(&conn, clock, limit, threshold)?;

    if json {
        print_json(out, file, clock, total, &entries)?;
    } else if csv {
        print_csv(out, &entries)?;
    } else {
        print_table(out, file, &meta, clock, total, &entries)?;
    }

    Ok(())
}

fn print_table(
    out: &mut dyn Write,
    file: &Path,
    meta: &SnapshotMeta,
    clock: Clock,
    total: u64,
    entries: &[TopEntry],
) -> io::Result<()> {
    // Header comment
    writeln!(out, "# {}", file.display())?;
    writeln!(
        out,
        "# Started: {} | Clock: {} | Samples: {} @ {} Hz",
        meta.start_time.to_rfc3339(),
        clock.name(),
        total,
        meta.samples_per_second
    )?;
    writeln!(out)?;

    writeln!(out, "{:>6}  {:>8}  LOCATION", "HITS%", "SAMPLES")?;
    writeln!(out, "{}", "-".repeat(80))?;

    for entry in entries {
        writeln!(
            out,
            "{:>5.1}%  {:>8}  {}",
            entry.percent,
            entry.samples,
            format_location(&entry.file, entry.line)
        )?;
    }
    Ok(())
}

fn print_json(
    out: &mut dyn Write,
    file: &Path,
    clock: Clock,
    total: u64,
    entries: &[TopEntry],
) -> io::Result<()> {
    writeln!(out, "{{")?;
    writeln!(out, "  \"file\": \"{}\",", escape_json(&file.display().to_string()))?;
    writeln!(out, "  \"clock\": \"{}\",", clock.name())?;
    writeln!(out, "  \"total_samples\": {},", total)?;
    writeln!(out, "  \"entries\": [")?;

    for (i, entry) in entries.iter().enumerate() {
        let comma = if i < entries.len() - 1 { "," } else { "" };
        writeln!(
            out,
            "    {{ \"pct\": {:.1}, \"samples\": {}, \"file\": \"{}\", \"line\": {} }}{}",
            entry.percent,
            entry.samples,
            escape_json(&entry.file),
            entry.line,
            comma
        )?;
    }

    writeln!(out, "  ]")?;
    writeln!(out, "}}")
}

fn print_csv(out: &mut dyn Write, entries: &[TopEntry]) -> io::Result<()> {
    writeln!(out, "pct,samples,file,line")?;
    for entry in entries {
        writeln!(
            out,
            "{:.1},{},\"{}\",{}",
            entry.percent,
            entry.samples,
            entry.file.replace('"', "\"\""),
            entry.line
        )?;
    }
    Ok(())
}

fn escape_json(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Format a file path for display - keep the most relevant parts
fn format_location(file: &str, line: u32) -> String {
    format!("{}:{}", simplify_path(file), line)
}

/// Simplify a file path - extract the most meaningful part
fn simplify_path(path: &str) -> String {
    // Extract just filename for stdlib paths
    if (path.contains("/rust/library/") || path.contains("/rustc/"))
        && let Some(filename) = path.rsplit('/').next()
    {
        return format!("<std>/{}", filename);
    }

    // For cargo dependencies, show the crate directory and the file in it
    if path.contains("/.cargo/")
        && let Some(idx) = path.rfind("/src/")
        && let Some(crate_start) = path[..idx].rfind('/')
    {
        return format!("<{}>/{}", &path[crate_start + 1..idx], &path[idx + 5..]);
    }

    // For local paths, keep "src/..."
    if let Some(idx) = path.find("/src/") {
        return path[idx + 1..].to_string();
    }

    path.to_string()
}
