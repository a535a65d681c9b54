//! End-to-end run of the in-process profiler.
//!
//! Only one session can exist per process, so this is a single
//! `harness = false` test with the steps in sequence.

use spyprof::storage::Snapshot;
use spyprof::{Clock, Config, Error, LibraryRoots};
use std::fs;
use std::time::{Duration, Instant};

fn spin(duration: Duration) -> u64 {
    let start = Instant::now();
    let mut x = 1u64;
    while start.elapsed() < duration {
        x = std::hint::black_box(x.wrapping_mul(6364136223846793005).wrapping_add(1));
    }
    x
}

/// 1-based line numbers of the statements inside `spin`
fn spin_body_lines() -> std::ops::RangeInclusive<usize> {
    let source: Vec<&str> = include_str!("sampling.rs").lines().collect();
    let start = source
        .iter()
        .position(|l| l.starts_with("fn spin("))
        .unwrap();
    let end = start + source[start..].iter().position(|&l| l == "}").unwrap();
    // `start` is the signature's 0-based index, `end` the closing brace's
    start + 2..=end
}

/// Rows of the report section whose heading ends with `suffix`
fn file_section<'a>(html: &'a str, suffix: &str) -> Option<&'a str> {
    let heading = format!("{}</h1>", suffix);
    let start = html.find(&heading)? + heading.len();
    let rest = &html[start..];
    let end = rest.find("<h1>").unwrap_or(rest.len());
    Some(&rest[..end])
}

fn main() {
    let dir = tempfile::tempdir().unwrap();
    let output_dir = dir.path().join("out");
    let config = Config {
        samples_per_second: 1000,
        dump_interval: Duration::from_secs(60),
        output_dir: output_dir.clone(),
        snapshot: true,
        library_roots: LibraryRoots::none(),
        ..Config::default()
    };

    let profiler = spyprof::start(config.clone()).unwrap();
    assert!(matches!(
        spyprof::start(config.clone()),
        Err(Error::AlreadyRunning)
    ));

    spin(Duration::from_millis(300));
    let (wall, _) = profiler.totals();
    assert!(wall > 0, "no wall-clock samples after 300ms at 1kHz");

    // an explicit dump keeps sampling
    profiler.dump().unwrap();
    spin(Duration::from_millis(100));
    let (wall_after, _) = profiler.totals();
    assert!(wall_after > wall, "sampling did not resume after a dump");

    let written = profiler.stop().unwrap();
    let report = output_dir.join("real.html");
    assert!(written.contains(&report), "no wall-clock report in {:?}", written);
    let html = fs::read_to_string(&report).unwrap();
    assert!(html.starts_with("<!doctype html>"));

    // the spin loop of this very file must show up as a hot line
    let section = file_section(&html, "tests/sampling.rs")
        .unwrap_or_else(|| panic!("tests/sampling.rs missing from the report"));
    let rows: Vec<&str> = section.lines().filter(|l| l.starts_with("<pre")).collect();
    assert!(
        spin_body_lines().any(|line| rows[line - 1].starts_with("<pre style=")),
        "no sampled line inside spin()"
    );

    // sampling is off for good
    let totals = profiler.totals();
    spin(Duration::from_millis(50));
    assert_eq!(profiler.totals(), totals);
    assert!(profiler.stop().unwrap().is_empty());

    let snapshot = Snapshot::load(&output_dir.join("profile.db")).unwrap();
    assert_eq!(snapshot.samples.total(Clock::Wall), totals.0);
    assert_eq!(snapshot.samples.total(Clock::Cpu), totals.1);
    assert_eq!(snapshot.meta.samples_per_second, 1000);
    assert_eq!(snapshot.meta.pid, std::process::id());

    println!("sampling: ok");
}
