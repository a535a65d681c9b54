use anyhow::Context;
use spyprof::Config;
use std::hint::black_box;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Run the demo workload under the profiler.
///
/// The final reports are written by the exit-time dump once `main` returns.
pub fn run(
    duration: Option<Duration>,
    rate: u32,
    interval: Duration,
    output: PathBuf,
) -> anyhow::Result<()> {
    let config = Config {
        samples_per_second: rate,
        dump_interval: interval,
        output_dir: output,
        snapshot: true,
        ..Config::default()
    };

    let profiler = spyprof::start(config).context("Failed to start profiler")?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();

    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl-C handler")?;

    eprintln!(
        "Profiling demo workload at {} Hz, reports in {} (Ctrl-C to stop)...",
        rate,
        profiler.config().output_dir.display()
    );

    let start = Instant::now();
    let mut rounds = 0u64;
    while running.load(Ordering::SeqCst) {
        // Check duration limit
        if let Some(max_duration) = duration
            && start.elapsed() >= max_duration
        {
            break;
        }

        black_box(workload_round(rounds));
        rounds += 1;
    }

    let (wall, cpu) = profiler.totals();
    eprintln!(
        "Ran {} rounds in {:.1}s: {} wall-clock and {} CPU samples",
        rounds,
        start.elapsed().as_secs_f64(),
        wall,
        cpu
    );
    if profiler.dropped() > 0 {
        eprintln!("{} frames dropped (address tables full)", profiler.dropped());
    }

    Ok(())
}

/// One round: CPU-bound work, then a short sleep that only the wall clock sees
fn workload_round(round: u64) -> u64 {
    let primes = count_primes(50_000 + (round % 4) * 10_000);
    let data: Vec<u8> = (0..200_000u32).map(|i| (i ^ round as u32) as u8).collect();
    let sum = checksum(&data);
    idle(Duration::from_millis(15));
    primes as u64 ^ sum
}

/// Sieve of Eratosthenes
fn count_primes(limit: u64) -> usize {
    let limit = limit as usize;
    if limit < 2 {
        return 0;
    }
    let mut composite = vec![false; limit + 1];
    let mut i = 2;
    while i * i <= limit {
        if !composite[i] {
            let mut j = i * i;
            while j <= limit {
                composite[j] = true;
                j += i;
            }
        }
        i += 1;
    }
    (2..=limit).filter(|&n| !composite[n]).count()
}

/// FNV-1a
fn checksum(data: &[u8]) -> u64 {
    data.iter().fold(0xcbf2_9ce4_8422_2325, |hash, &byte| {
        (hash ^ byte as u64).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

fn idle(duration: Duration) {
    thread::sleep(duration);
}
