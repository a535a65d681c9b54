use crate::error::Result;
use std::fs;
use std::path::Path;

/// A parsed memory mapping from /proc/self/maps
#[derive(Debug, Clone)]
pub struct MemoryMapping {
    pub start: u64,
    pub end: u64,
    pub perms: String,
    pub offset: u64,
    pub pathname: Option<String>,
}

/// Collection of memory mappings of the current process
pub struct MemoryMaps {
    mappings: Vec<MemoryMapping>,
}

impl MemoryMaps {
    /// Parse /proc/self/maps
    pub fn for_self() -> Result<Self> {
        let content = fs::read_to_string("/proc/self/maps")?;
        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let mappings = content.lines().filter_map(Self::parse_line).collect();
        MemoryMaps { mappings }
    }

    fn parse_line(line: &str) -> Option<MemoryMapping> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 5 {
            return None;
        }

        // Parse address range "start-end"
        let (start, end) = parts[0].split_once('-')?;
        let start = u64::from_str_radix(start, 16).ok()?;
        let end = u64::from_str_radix(end, 16).ok()?;
        let perms = parts[1].to_string();
        let offset = u64::from_str_radix(parts[2], 16).ok()?;

        // Pathname is the last field (if present)
        let pathname = if parts.len() >= 6 {
            Some(parts[5..].join(" "))
        } else {
            None
        };

        Some(MemoryMapping {
            start,
            end,
            perms,
            offset,
            pathname,
        })
    }

    /// Load bias of the main executable: runtime address minus link-time address.
    ///
    /// A position-dependent executable runs at its link addresses, so its
    /// bias is 0. Otherwise the first mapping of the binary (file offset 0)
    /// gives the load base.
    pub fn load_bias(&self, exe_path: &Path, position_independent: bool) -> u64 {
        if !position_independent {
            return 0;
        }

        let exe_str = exe_path.to_string_lossy();
        self.mappings
            .iter()
            .find(|mapping| mapping.pathname.as_deref() == Some(exe_str.as_ref()))
            .map(|mapping| mapping.start - mapping.offset)
            .unwrap_or(0)
    }
}
