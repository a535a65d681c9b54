use super::dwarf::{AddressRange, DwarfInfo};
use super::maps::MemoryMaps;
use crate::error::Result;
use crate::table::ClockSamples;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// A (file, line) pair, the key samples are aggregated under for reporting
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceLocation {
    pub file: String,
    /// 1-based
    pub line: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        SourceLocation {
            file: file.into(),
            line,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Maps instruction addresses to source locations
pub trait Symbolize {
    /// Location of the instruction at `addr`, or None if it has no line info
    fn locate(&mut self, addr: u64) -> Option<SourceLocation>;
}

/// Symbol resolver using the DWARF line tables of the running executable
pub struct SymbolResolver {
    /// DWARF address ranges (sorted by start address)
    ranges: Vec<AddressRange>,
    /// Load bias to subtract from runtime addresses
    load_bias: u64,
    /// Cache for repeated lookups
    cache: HashMap<u64, Option<SourceLocation>>,
}

impl SymbolResolver {
    /// Load line tables for the current process
    pub fn for_current_process() -> Result<Self> {
        // Resolve the link so the path matches the one in /proc/self/maps
        let exe_path = std::fs::read_link("/proc/self/exe")?;
        let dwarf = DwarfInfo::parse(Path::new("/proc/self/exe"))?;
        let load_bias = MemoryMaps::for_self()?.load_bias(&exe_path, dwarf.position_independent);

        Ok(Self::from_ranges(dwarf.ranges, load_bias))
    }

    pub fn from_ranges(mut ranges: Vec<AddressRange>, load_bias: u64) -> Self {
        ranges.sort_by_key(|r| r.start);
        SymbolResolver {
            ranges,
            load_bias,
            cache: HashMap::new(),
        }
    }

    /// Number of address ranges loaded
    pub fn range_count(&self) -> usize {
        self.ranges.len()
    }

    /// Resolve a runtime address to a source location
    pub fn resolve(&self, addr: u64) -> Option<SourceLocation> {
        let debug_addr = addr.checked_sub(self.load_bias)?;

        let idx = self
            .ranges
            .binary_search_by(|r| {
                if debug_addr < r.start {
                    std::cmp::Ordering::Greater
                } else if debug_addr >= r.end {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .ok()?;

        let range = &self.ranges[idx];
        Some(SourceLocation::new(range.file.as_str(), range.line))
    }
}

impl Symbolize for SymbolResolver {
    fn locate(&mut self, addr: u64) -> Option<SourceLocation> {
        if let Some(loc) = self.cache.get(&addr) {
            return loc.clone();
        }

        let location = self.resolve(addr);
        self.cache.insert(addr, location.clone());
        location
    }
}

/// Fold an address table into a location table.
///
/// Counts of all addresses on the same line are summed; addresses without
/// line info are discarded. The sample total carries over unchanged.
pub fn symbolize<S: Symbolize + ?Sized>(
    symbols: &mut S,
    raw: &ClockSamples<u64>,
) -> ClockSamples<SourceLocation> {
    let mut resolved = ClockSamples {
        total: raw.total,
        ..ClockSamples::default()
    };

    for (&addr, &count) in raw.table.iter() {
        if let Some(location) = symbols.locate(addr) {
            resolved.table.add(location, count);
        }
    }

    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u64, end: u64, file: &str, line: u32) -> AddressRange {
        AddressRange {
            start,
            end,
            file: file.to_string(),
            line,
        }
    }

    fn resolver() -> SymbolResolver {
        SymbolResolver::from_ranges(
            vec![
                range(0x2000, 0x2010, "/src/b.rs", 9),
                range(0x1000, 0x1008, "/src/a.rs", 3),
                range(0x1008, 0x1020, "/src/a.rs", 4),
            ],
            0x5000_0000,
        )
    }

    #[test]
    fn test_resolve_applies_load_bias() {
        let resolver = resolver();
        assert_eq!(
            resolver.resolve(0x5000_1004),
            Some(SourceLocation::new("/src/a.rs", 3))
        );
        assert_eq!(
            resolver.resolve(0x5000_1008),
            Some(SourceLocation::new("/src/a.rs", 4))
        );
        assert_eq!(resolver.resolve(0x5000_3000), None);
        // below the load base
        assert_eq!(resolver.resolve(0x1004), None);
    }

    #[test]
    fn test_symbolize_folds_addresses_on_same_line() {
        let mut raw = ClockSamples::default();
        raw.record([0x5000_1000u64, 0x5000_2000]);
        raw.record([0x5000_1004u64, 0x5000_9999]);

        let mut resolver = resolver();
        let resolved = symbolize(&mut resolver, &raw);

        assert_eq!(resolved.total, 2);
        assert_eq!(resolved.table.get(&SourceLocation::new("/src/a.rs", 3)), 2);
        assert_eq!(resolved.table.get(&SourceLocation::new("/src/b.rs", 9)), 1);
        assert_eq!(resolved.table.len(), 2);
    }

    #[test]
    fn test_display() {
        assert_eq!(SourceLocation::new("src/x.rs", 12).to_string(), "src/x.rs:12");
    }
}
