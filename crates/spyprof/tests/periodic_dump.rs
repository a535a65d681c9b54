//! Wall-clock driven dumps, and sampling surviving a dump that fails.
//!
//! A separate `harness = false` binary, since a process holds one session.

use spyprof::storage::Snapshot;
use spyprof::{Clock, Config, LibraryRoots};
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

fn main() {
    let dir = tempfile::tempdir().unwrap();
    let output_dir = dir.path().join("out");
    let config = Config {
        samples_per_second: 100,
        dump_interval: Duration::from_secs(1),
        output_dir: output_dir.clone(),
        snapshot: true,
        library_roots: LibraryRoots::none(),
        ..Config::default()
    };
    let dump_every = config.dump_every();
    let profiler = spyprof::start(config).unwrap();

    // no explicit dump: the 100th wall tick triggers one
    let db = output_dir.join("profile.db");
    let start = Instant::now();
    let boundary = loop {
        if let Ok(snapshot) = Snapshot::load(&db) {
            break snapshot;
        }
        assert!(
            start.elapsed() < Duration::from_secs(20),
            "no periodic dump after {:?}",
            start.elapsed()
        );
        spin(Duration::from_millis(5));
    };

    assert!(output_dir.join("real.html").is_file());
    assert_eq!(boundary.samples.total(Clock::Wall), dump_every);
    assert_eq!(boundary.meta.dump_interval_secs, 1);

    // sampling goes on after the periodic dump
    let resumed = profiler.totals();
    spin(Duration::from_millis(300));
    assert!(profiler.totals().0 > resumed.0, "sampling stopped after the periodic dump");

    // a plain file where the output directory should be
    fs::remove_dir_all(&output_dir).unwrap();
    fs::write(&output_dir, "").unwrap();

    assert!(profiler.dump().is_err());
    let after_failure = profiler.totals();
    spin(Duration::from_millis(300));
    assert!(
        profiler.totals().0 > after_failure.0,
        "timers not re-armed after a failed dump"
    );

    // the final dump fails the same way and still ends the session
    assert!(profiler.stop().is_err());
    let stopped = profiler.totals();
    spin(Duration::from_millis(100));
    assert_eq!(profiler.totals(), stopped);

    println!("periodic_dump: ok");
}
