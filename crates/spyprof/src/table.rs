//! Hit-count tables and the per-clock sample aggregator.
//!
//! The same types back both ends of the pipeline: the signal handlers count
//! raw instruction addresses in bounded `u64` tables, and dump time folds
//! those into `SourceLocation` tables for the reporter.

use crate::symbols::SourceLocation;
use std::collections::hash_map;
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

/// Clock domain driving one interval timer and one set of counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Clock {
    /// Elapsed real time (`ITIMER_REAL` / `SIGALRM`)
    Wall,
    /// CPU time consumed by the process (`ITIMER_PROF` / `SIGPROF`)
    Cpu,
}

impl Clock {
    pub const ALL: [Clock; 2] = [Clock::Wall, Clock::Cpu];

    /// Report file written for this clock
    pub fn file_name(self) -> &'static str {
        match self {
            Clock::Wall => "real.html",
            Clock::Cpu => "prof.html",
        }
    }

    /// Short name used in snapshots and on the command line
    pub fn name(self) -> &'static str {
        match self {
            Clock::Wall => "wall",
            Clock::Cpu => "cpu",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "wall" => Some(Clock::Wall),
            "cpu" => Some(Clock::Cpu),
            _ => None,
        }
    }
}

/// Monotonically growing counter keyed by `K`
#[derive(Debug, Clone)]
pub struct HitTable<K> {
    counts: HashMap<K, u64>,
    /// Maximum number of distinct keys (None = unbounded)
    limit: Option<usize>,
    /// Increments refused because the table was full
    dropped: u64,
}

impl<K> Default for HitTable<K> {
    fn default() -> Self {
        HitTable {
            counts: HashMap::new(),
            limit: None,
            dropped: 0,
        }
    }
}

impl<K: Eq + Hash> HitTable<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table with room for `limit` keys reserved up front.
    ///
    /// Bumping never reallocates: once `limit` distinct keys are present,
    /// new keys are refused and counted in [`HitTable::dropped`].
    pub fn bounded(limit: usize) -> Self {
        HitTable {
            counts: HashMap::with_capacity(limit),
            limit: Some(limit),
            dropped: 0,
        }
    }

    /// Count one hit for `key`. Returns false if the key was refused.
    pub fn bump(&mut self, key: K) -> bool {
        if let Some(count) = self.counts.get_mut(&key) {
            *count += 1;
            return true;
        }
        if self.limit.is_some_and(|limit| self.counts.len() >= limit) {
            self.dropped += 1;
            return false;
        }
        self.counts.insert(key, 1);
        true
    }

    /// Add `n` hits for `key` (used when folding tables, never bounded)
    pub fn add(&mut self, key: K, n: u64) {
        *self.counts.entry(key).or_insert(0) += n;
    }

    pub fn get(&self, key: &K) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn iter(&self) -> hash_map::Iter<'_, K, u64> {
        self.counts.iter()
    }
}

impl<K: Eq + Hash> PartialEq for HitTable<K> {
    fn eq(&self, other: &Self) -> bool {
        self.counts == other.counts
    }
}

impl<K: Eq + Hash> FromIterator<(K, u64)> for HitTable<K> {
    fn from_iter<I: IntoIterator<Item = (K, u64)>>(iter: I) -> Self {
        let mut table = HitTable::new();
        for (key, n) in iter {
            table.add(key, n);
        }
        table
    }
}

impl HitTable<SourceLocation> {
    /// Distinct files referenced by the table, in path order
    pub fn files(&self) -> BTreeSet<&str> {
        self.counts.keys().map(|loc| loc.file.as_str()).collect()
    }

    /// Per-line counts of one file
    pub fn lines_of(&self, file: &str) -> HashMap<u32, u64> {
        self.counts
            .iter()
            .filter(|(loc, _)| loc.file == file)
            .map(|(loc, &count)| (loc.line, count))
            .collect()
    }
}

/// One clock's hit table and its sample total
#[derive(Debug, Clone)]
pub struct ClockSamples<K> {
    pub table: HitTable<K>,
    /// Delivered interrupts, one per sample regardless of stack depth
    pub total: u64,
}

impl<K> Default for ClockSamples<K> {
    fn default() -> Self {
        ClockSamples {
            table: HitTable::default(),
            total: 0,
        }
    }
}

impl<K: Eq + Hash> PartialEq for ClockSamples<K> {
    fn eq(&self, other: &Self) -> bool {
        self.total == other.total && self.table == other.table
    }
}

impl<K: Eq + Hash> ClockSamples<K> {
    pub fn bounded(limit: usize) -> Self {
        ClockSamples {
            table: HitTable::bounded(limit),
            total: 0,
        }
    }

    /// Account one sample: the total moves by one, every frame by one.
    ///
    /// A key that appears several times in `frames` is credited once per
    /// occurrence.
    pub fn record<I: IntoIterator<Item = K>>(&mut self, frames: I) {
        self.total += 1;
        for frame in frames {
            self.table.bump(frame);
        }
    }
}

/// Wall-clock and CPU-time samples side by side
#[derive(Debug, Clone)]
pub struct SampleAggregator<K = SourceLocation> {
    wall: ClockSamples<K>,
    cpu: ClockSamples<K>,
}

impl<K> Default for SampleAggregator<K> {
    fn default() -> Self {
        SampleAggregator {
            wall: ClockSamples::default(),
            cpu: ClockSamples::default(),
        }
    }
}

impl<K: Eq + Hash> PartialEq for SampleAggregator<K> {
    fn eq(&self, other: &Self) -> bool {
        self.wall == other.wall && self.cpu == other.cpu
    }
}

impl<K: Eq + Hash> SampleAggregator<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(wall: ClockSamples<K>, cpu: ClockSamples<K>) -> Self {
        SampleAggregator { wall, cpu }
    }

    pub fn record<I: IntoIterator<Item = K>>(&mut self, clock: Clock, frames: I) {
        self.clock_mut(clock).record(frames);
    }

    pub fn clock(&self, clock: Clock) -> &ClockSamples<K> {
        match clock {
            Clock::Wall => &self.wall,
            Clock::Cpu => &self.cpu,
        }
    }

    pub fn clock_mut(&mut self, clock: Clock) -> &mut ClockSamples<K> {
        match clock {
            Clock::Wall => &mut self.wall,
            Clock::Cpu => &mut self.cpu,
        }
    }

    pub fn total(&self, clock: Clock) -> u64 {
        self.clock(clock).total
    }
}
