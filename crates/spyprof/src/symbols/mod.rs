//! Address to source-line resolution for the running executable.
//!
//! Stacks are captured as raw instruction addresses inside the signal
//! handlers; they are only mapped to (file, line) at dump time, using the
//! DWARF line program of `/proc/self/exe`.

mod dwarf;
mod maps;
mod resolver;

pub use dwarf::{AddressRange, DwarfInfo};
pub use maps::{MemoryMapping, MemoryMaps};
pub use resolver::{SourceLocation, SymbolResolver, Symbolize, symbolize};
