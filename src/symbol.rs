//! Symbol table entries as the relocation phases see them.
//!
//! Scanning runs over sections in parallel, so the per-symbol GOT needs
//! are an atomic bitset that workers OR into without coordination. The
//! slot indices those flags turn into are assigned later, on one thread,
//! by table finalization.

use crate::sync::{AtomicU8, Ordering};

/// The symbol needs a plain GOT slot holding its address.
pub const NEEDS_GOT: u8 = 1 << 0;
/// The symbol needs a GOT slot holding its TP-relative offset.
pub const NEEDS_GOTTP: u8 = 1 << 1;
/// The symbol needs a general-dynamic TLS slot pair.
pub const NEEDS_TLSGD: u8 = 1 << 2;

/// Index of a symbol in [`LinkContext::symbols`](crate::LinkContext).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(pub u32);

/// One resolved symbol. Resolution itself happens upstream; by the time a
/// `Symbol` reaches this crate its defining file, value and visibility
/// are settled.
#[derive(Debug)]
pub struct Symbol {
    pub name: String,
    /// Rank of the defining input file in link order. Part of the GOT
    /// sort key, so slot order is stable across runs.
    pub file_priority: u32,
    /// Index of the symbol within its defining file's symbol table.
    pub sym_idx: u32,
    /// Link-time address, or the TP/DTP-relative offset for TLS symbols.
    pub value: u64,
    /// OR-only bitset of `NEEDS_*` flags, written during the scan phase.
    pub flags: AtomicU8,
    /// Resolves at run time to a definition in another DSO.
    pub imported: bool,
    /// Not visible outside its defining file.
    pub local: bool,
    /// Address moves with the load bias of position-independent output.
    pub relative: bool,
    /// No input file defines it.
    pub undefined: bool,
    /// Defined in a section the linker dropped.
    pub discarded: bool,
    pub dynsym_idx: Option<u32>,
    pub got_idx: Option<u32>,
    pub gottp_idx: Option<u32>,
    pub tlsgd_idx: Option<u32>,
}

impl Symbol {
    pub fn new(name: &str, file_priority: u32, sym_idx: u32, value: u64) -> Symbol {
        Symbol {
            name: name.to_string(),
            file_priority,
            sym_idx,
            value,
            flags: AtomicU8::new(0),
            imported: false,
            local: true,
            relative: true,
            undefined: false,
            discarded: false,
            dynsym_idx: None,
            got_idx: None,
            gottp_idx: None,
            tlsgd_idx: None,
        }
    }

    /// OR a `NEEDS_*` flag in. Relaxed is enough: nothing orders on the
    /// flags until the single-threaded finalization barrier.
    pub fn set_flag(&self, flag: u8) {
        self.flags.fetch_or(flag, Ordering::Relaxed);
    }

    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags.load(Ordering::Relaxed) & flag != 0
    }

    /// Deterministic ordering key for GOT slot assignment.
    pub fn key(&self) -> (u32, u32) {
        (self.file_priority, self.sym_idx)
    }
}
