use crate::error::{Error, Result};
use gimli::{EndianSlice, RunTimeEndian};
use object::{Object, ObjectKind, ObjectSection};
use std::borrow::Cow;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Parsed DWARF line information
pub struct DwarfInfo {
    /// Address ranges mapped to source lines, sorted by start address
    pub ranges: Vec<AddressRange>,
    /// False for `ET_EXEC` binaries, which run at their link addresses
    pub position_independent: bool,
}

/// An address range mapped to a source line
#[derive(Debug, Clone, PartialEq)]
pub struct AddressRange {
    pub start: u64,
    pub end: u64,
    pub file: String,
    pub line: u32,
}

type Slice<'a> = EndianSlice<'a, RunTimeEndian>;

/// Section contents, inflated into an owned buffer when compressed
fn load_section<'data>(
    object: &object::File<'data>,
    id: gimli::SectionId,
) -> std::result::Result<Cow<'data, [u8]>, gimli::Error> {
    Ok(object
        .section_by_name(id.name())
        .and_then(|s| s.uncompressed_data().ok())
        .unwrap_or(Cow::Borrowed(&[])))
}

impl DwarfInfo {
    /// Parse DWARF line programs from an ELF file
    pub fn parse(path: &Path) -> Result<Self> {
        let file = File::open(path)?;

        let mmap = unsafe { memmap2::Mmap::map(&file) }?;

        let object = object::File::parse(&*mmap)
            .map_err(|e| Error::SymbolResolution(format!("Failed to parse ELF: {}", e)))?;

        if object.section_by_name(".debug_info").is_none() {
            return Err(Error::MissingDebugInfo {
                path: path.display().to_string(),
            });
        }

        let endian = if object.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        let ranges = Self::parse_line_info_from_object(&object, endian)?;
        Ok(DwarfInfo {
            ranges,
            position_independent: object.kind() != ObjectKind::Executable,
        })
    }

    fn parse_line_info_from_object(
        object: &object::File<'_>,
        endian: RunTimeEndian,
    ) -> Result<Vec<AddressRange>> {
        let sections = gimli::DwarfSections::load(|id| load_section(object, id))
            .map_err(|e| Error::SymbolResolution(format!("Failed to load DWARF: {}", e)))?;
        let dwarf = sections.borrow(|section| EndianSlice::new(section, endian));

        Self::parse_line_info(&dwarf)
    }

    fn parse_line_info(dwarf: &gimli::Dwarf<Slice<'_>>) -> Result<Vec<AddressRange>> {
        let mut ranges = Vec::new();
        let mut units = dwarf.units();

        while let Ok(Some(header)) = units.next() {
            let unit = dwarf
                .unit(header)
                .map_err(|e| Error::SymbolResolution(format!("Failed to parse unit: {}", e)))?;

            let comp_dir = unit
                .comp_dir
                .and_then(|dir| dir.to_string().ok())
                .map(PathBuf::from);

            let Some(program) = unit.line_program.clone() else {
                continue;
            };

            let mut rows = program.rows();
            let mut prev_row: Option<(u64, String, u32)> = None;

            while let Ok(Some((header, row))) = rows.next_row() {
                let addr = row.address();

                let file = row
                    .file(header)
                    .map(|f| Self::file_path(dwarf, &unit, header, f, comp_dir.as_deref()))
                    .unwrap_or_default();
                let line = row.line().map(|l| l.get() as u32).unwrap_or(0);

                // Create range from previous row to this one
                if let Some((prev_addr, prev_file, prev_line)) = prev_row.take()
                    && addr > prev_addr
                    && !prev_file.is_empty()
                    && prev_line > 0
                {
                    ranges.push(AddressRange {
                        start: prev_addr,
                        end: addr,
                        file: prev_file,
                        line: prev_line,
                    });
                }

                if !row.end_sequence() {
                    prev_row = Some((addr, file, line));
                }
            }
        }

        // Sort by start address for binary search
        ranges.sort_by_key(|r| r.start);
        Ok(ranges)
    }

    /// Absolute path of a line-program file entry.
    ///
    /// `name` may already be absolute; otherwise it is relative to its
    /// include directory, which may itself be relative to the unit's
    /// compilation directory.
    fn file_path(
        dwarf: &gimli::Dwarf<Slice<'_>>,
        unit: &gimli::Unit<Slice<'_>>,
        header: &gimli::LineProgramHeader<Slice<'_>>,
        entry: &gimli::FileEntry<Slice<'_>>,
        comp_dir: Option<&Path>,
    ) -> String {
        let attr_str = |attr| {
            dwarf
                .attr_string(unit, attr)
                .ok()
                .and_then(|s| s.to_string().ok().map(str::to_owned))
        };

        let Some(name) = attr_str(entry.path_name()) else {
            return String::new();
        };

        let mut path = PathBuf::new();
        if let Some(dir) = comp_dir {
            path.push(dir);
        }
        if let Some(dir) = entry.directory(header).and_then(attr_str) {
            path.push(dir);
        }
        path.push(name);
        path.to_string_lossy().into_owned()
    }
}
