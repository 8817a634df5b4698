//! The MIPS global offset table.
//!
//! The table is the architecture's substitute for PC-relative addressing,
//! so its layout is an ABI contract with the loader, not an internal
//! detail. Slots, in order:
//!
//! ```text
//! 0                         reserved (lazy-resolution hook, unused here)
//! 1                         reserved, top bit set so old loaders can tell
//!                           this GOT from one laid out by their own linker
//! 2 .. 2+D                  one slot per .dynsym entry, in table order
//! 2+D .. 2+D+G              plain (symbol, addend) slots, sorted
//! 2+D+G .. 2+D+G+P          page (symbol, addend) slots, sorted
//! ```
//!
//! The D slots exist because the loader unconditionally applies the
//! Quickstart scheme at startup: it walks `.dynsym` and stores each
//! symbol's resolved address into the corresponding slot. We do not sort
//! `.dynsym` to exploit that, so the slots are reserved, pre-filled with
//! whatever resolves at link time, and never addressed by any relocation
//! we patch.
//!
//! Requests arrive from many scan workers at once and go into locked
//! lists; [`MipsGot::finalize`] sorts and dedups them exactly once on one
//! thread. Slot positions, and therefore every GOT-relative displacement,
//! are meaningless before that barrier and stable after it.

use crate::arch;
use crate::context::LinkContext;
use crate::elf::ElfRela;
use crate::image::{self, OutputImage};
use crate::symbol::{Symbol, SymbolId};
use crate::sync::Mutex;

pub const NUM_RESERVED: usize = 2;
pub const WORD_SIZE: usize = 8;

/// Written to slot 1. Loaders predating RELA-style MIPS GOTs check this
/// bit to decide how to interpret the table.
pub const LOADER_MARKER: u64 = 0x8000_0000_0000_0000;

/// Section header bits the output section for this table must carry.
pub const GOT_SECTION_TYPE: u32 = elf::abi::SHT_PROGBITS;
pub const GOT_SECTION_FLAGS: u64 = (elf::abi::SHF_ALLOC | elf::abi::SHF_WRITE) as u64;

/// One pending slot request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SymbolAddend {
    pub sym: SymbolId,
    pub addend: i64,
}

/// How a slot gets its final value at run time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DynRelKind {
    /// Link-time value plus the load bias; dynamic symbol index 0.
    Relative,
    /// Resolved by the loader against a named dynamic symbol.
    Symbolic,
}

/// One finalized slot, ready to serialize.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GotEntry {
    /// Link-time slot value.
    pub val: u64,
    /// Dynamic fixup the slot needs, if any.
    pub kind: Option<DynRelKind>,
    /// Dynamic symbol the fixup resolves, for `Symbolic`.
    pub sym: Option<SymbolId>,
    pub addend: i64,
}

#[derive(Debug)]
struct FinalizedGot {
    got_syms: Vec<SymbolAddend>,
    gotpage_syms: Vec<SymbolAddend>,
    dynsym_count: usize,
}

#[derive(Debug, Default)]
pub struct MipsGot {
    /// Output address of the table.
    pub shdr_addr: u64,
    /// Offset of the table's bytes in the output image.
    pub shdr_offset: usize,
    /// Byte offset of this table's records within `.rel.dyn`.
    pub reldyn_offset: usize,
    got_syms: Mutex<Vec<SymbolAddend>>,
    gotpage_syms: Mutex<Vec<SymbolAddend>>,
    finalized: Option<FinalizedGot>,
}

fn sort_key(symbols: &[Symbol], req: &SymbolAddend) -> (u32, u32, i64) {
    let (prio, idx) = symbols[req.sym.0 as usize].key();
    (prio, idx, req.addend)
}

impl MipsGot {
    /// Request a plain slot for `sym + addend`. Safe to call from any
    /// number of scan workers.
    pub fn add_got(&self, sym: SymbolId, addend: i64) {
        self.got_syms.lock().unwrap().push(SymbolAddend { sym, addend });
    }

    /// Request a page slot for `sym + addend`.
    pub fn add_gotpage(&self, sym: SymbolId, addend: i64) {
        self.gotpage_syms.lock().unwrap().push(SymbolAddend { sym, addend });
    }

    /// Single-threaded barrier between scanning and everything that asks
    /// for slot positions. Sorts and dedups the request lists; calling it
    /// again is a no-op, so layout code may invoke it defensively.
    pub fn finalize(&mut self, symbols: &[Symbol], dynsym_count: usize) {
        if self.finalized.is_some() {
            return;
        }
        let mut got_syms = core::mem::take(&mut *self.got_syms.lock().unwrap());
        let mut gotpage_syms = core::mem::take(&mut *self.gotpage_syms.lock().unwrap());
        for list in [&mut got_syms, &mut gotpage_syms] {
            list.sort_unstable_by_key(|req| sort_key(symbols, req));
            list.dedup_by_key(|req| sort_key(symbols, req));
        }
        log::debug!(
            "GOT: {dynsym_count} quickstart, {} plain, {} page slots",
            got_syms.len(),
            gotpage_syms.len()
        );
        self.finalized = Some(FinalizedGot {
            got_syms,
            gotpage_syms,
            dynsym_count,
        });
    }

    fn require_finalized(&self) -> &FinalizedGot {
        match &self.finalized {
            Some(fin) => fin,
            None => panic!("GOT queried before finalization"),
        }
    }

    pub fn num_slots(&self) -> usize {
        let fin = self.require_finalized();
        NUM_RESERVED + fin.dynsym_count + fin.got_syms.len() + fin.gotpage_syms.len()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.num_slots() * WORD_SIZE
    }

    /// Address of the plain slot finalization assigned to `sym + addend`.
    /// The request must have been registered during scanning.
    pub fn get_got_addr(&self, symbols: &[Symbol], sym: SymbolId, addend: i64) -> u64 {
        let fin = self.require_finalized();
        let key = sort_key(symbols, &SymbolAddend { sym, addend });
        match fin
            .got_syms
            .binary_search_by_key(&key, |req| sort_key(symbols, req))
        {
            Ok(pos) => {
                let idx = NUM_RESERVED + fin.dynsym_count + pos;
                self.shdr_addr + (idx * WORD_SIZE) as u64
            }
            Err(_) => panic!(
                "no GOT slot was allocated for {}+{addend:#x}",
                symbols[sym.0 as usize].name
            ),
        }
    }

    /// Address of the page slot assigned to `sym + addend`.
    pub fn get_gotpage_got_addr(&self, symbols: &[Symbol], sym: SymbolId, addend: i64) -> u64 {
        let fin = self.require_finalized();
        let key = sort_key(symbols, &SymbolAddend { sym, addend });
        match fin
            .gotpage_syms
            .binary_search_by_key(&key, |req| sort_key(symbols, req))
        {
            Ok(pos) => {
                let idx = NUM_RESERVED + fin.dynsym_count + fin.got_syms.len() + pos;
                self.shdr_addr + (idx * WORD_SIZE) as u64
            }
            Err(_) => panic!(
                "no GOT page slot was allocated for {}+{addend:#x}",
                symbols[sym.0 as usize].name
            ),
        }
    }

    /// The value the page slot assigned to `sym + addend` holds, for the
    /// paired offset relocation.
    pub fn get_gotpage_page_addr(&self, symbols: &[Symbol], sym: SymbolId, addend: i64) -> u64 {
        let fin = self.require_finalized();
        let key = sort_key(symbols, &SymbolAddend { sym, addend });
        match fin
            .gotpage_syms
            .binary_search_by_key(&key, |req| sort_key(symbols, req))
        {
            Ok(pos) => {
                let req = &fin.gotpage_syms[pos];
                symbols[req.sym.0 as usize].value.wrapping_add(req.addend as u64)
            }
            Err(_) => panic!(
                "no GOT page slot was allocated for {}+{addend:#x}",
                symbols[sym.0 as usize].name
            ),
        }
    }

    /// Finalized slot contents past the Quickstart region, in table order.
    pub fn entries(&self, ctx: &LinkContext) -> Vec<GotEntry> {
        let fin = self.require_finalized();
        let mut out = Vec::with_capacity(fin.got_syms.len() + fin.gotpage_syms.len());
        for req in &fin.got_syms {
            let sym = ctx.symbol(req.sym);
            if sym.imported {
                out.push(GotEntry {
                    val: 0,
                    kind: Some(DynRelKind::Symbolic),
                    sym: Some(req.sym),
                    addend: req.addend,
                });
            } else {
                let val = sym.value.wrapping_add(req.addend as u64);
                let kind = (ctx.pic && sym.relative).then_some(DynRelKind::Relative);
                out.push(GotEntry {
                    val,
                    kind,
                    sym: None,
                    addend: req.addend,
                });
            }
        }
        for req in &fin.gotpage_syms {
            // Page symbols are never imported, so the value is known at
            // link time; it only needs a fixup if the address moves with
            // the load bias.
            let sym = ctx.symbol(req.sym);
            let val = sym.value.wrapping_add(req.addend as u64);
            let kind = (ctx.pic && sym.relative).then_some(DynRelKind::Relative);
            out.push(GotEntry {
                val,
                kind,
                sym: None,
                addend: req.addend,
            });
        }
        out
    }

    /// Number of `.rel.dyn` records the table emits.
    pub fn reldyn_count(&self, ctx: &LinkContext) -> usize {
        self.entries(ctx).iter().filter(|e| e.kind.is_some()).count()
    }

    /// Serialize the table and its dynamic relocations into the image.
    pub fn copy_buf(&self, ctx: &LinkContext, image: &mut OutputImage) {
        let fin = self.require_finalized();
        let buf = &mut image.buf;
        image::fill_zero(buf, self.shdr_offset, self.size_in_bytes());
        image::write_u64(buf, self.shdr_offset + WORD_SIZE, LOADER_MARKER);

        // Quickstart slots. The loader overwrites all of them at startup;
        // filling in what resolves at link time just spares it work.
        for (i, &id) in ctx.dynsym.iter().enumerate() {
            let sym = ctx.symbol(id);
            if !sym.imported && !sym.undefined {
                let off = self.shdr_offset + (NUM_RESERVED + i) * WORD_SIZE;
                image::write_u64(buf, off, sym.value);
            }
        }

        let base = NUM_RESERVED + fin.dynsym_count;
        let mut rel_off = ctx.reldyn_offset + self.reldyn_offset;
        for (i, entry) in self.entries(ctx).iter().enumerate() {
            let slot_addr = self.shdr_addr + ((base + i) * WORD_SIZE) as u64;
            let slot_off = self.shdr_offset + (base + i) * WORD_SIZE;
            image::write_u64(buf, slot_off, entry.val);

            let Some(kind) = entry.kind else { continue };
            let (r_sym, r_addend) = match kind {
                DynRelKind::Relative => (0, entry.val as i64),
                DynRelKind::Symbolic => {
                    let sym = match entry.sym {
                        Some(id) => ctx.symbol(id),
                        None => panic!("symbolic GOT fixup without a symbol"),
                    };
                    match sym.dynsym_idx {
                        Some(idx) => (idx, entry.addend),
                        None => panic!("{} has a GOT fixup but no dynsym entry", sym.name),
                    }
                }
            };
            let rel = ElfRela {
                r_offset: slot_addr,
                r_sym,
                r_type: arch::R_DYN_REL,
                r_addend,
            };
            image::write_bytes(buf, rel_off, &rel.encode());
            rel_off += ElfRela::SIZE;
        }
    }
}
