//! Input sections carrying the relocations to scan and apply.

use crate::elf::ElfRela;

/// One input section after layout. The generic layout pass has already
/// assigned its output address and file offset; this crate only reads
/// them and fills in the dynamic-relocation bookkeeping.
#[derive(Debug)]
pub struct InputSection {
    pub name: String,
    /// Output virtual address of the section's first byte.
    pub addr: u64,
    /// Offset of the section's bytes in the output image buffer.
    pub out_offset: usize,
    pub size: usize,
    /// SHF_ALLOC was set on the input section header.
    pub alloc: bool,
    /// The GP value the defining object was compiled against, from the
    /// `.reginfo` / `.MIPS.options` section of its file.
    pub gp0: u64,
    pub rels: Vec<ElfRela>,
    /// Number of dynamic relocations the scan phase decided this section
    /// emits.
    pub num_dynrel: usize,
    /// Byte offset of this section's records within `.rel.dyn`, assigned
    /// by finalization.
    pub reldyn_offset: usize,
    /// Override for the value written over relocations against discarded
    /// symbols in non-allocated sections.
    pub tombstone: Option<u64>,
}

impl InputSection {
    pub fn new(name: &str, addr: u64, out_offset: usize, size: usize, alloc: bool) -> InputSection {
        InputSection {
            name: name.to_string(),
            addr,
            out_offset,
            size,
            alloc,
            gp0: 0,
            rels: Vec::new(),
            num_dynrel: 0,
            reldyn_offset: 0,
            tombstone: None,
        }
    }
}

/// Debug tools misread address 0 in `.debug_loc` and `.debug_ranges` as a
/// list terminator, so discarded references there resolve to 1 instead.
pub fn default_tombstone(name: &str) -> u64 {
    if name == ".debug_loc" || name == ".debug_ranges" {
        1
    } else {
        0
    }
}
