//! Per-link shared state.
//!
//! A [`LinkContext`] is built once per link from the upstream passes
//! (symbol resolution, section layout, dynamic-table generation) and then
//! shared read-only by the parallel scan and apply phases. The only
//! mutable pieces are interior: the atomic symbol flags, the GOT request
//! lists and the diagnostics accumulator.

use crate::arch;
use crate::error::{Diagnostics, Error};
use crate::got::MipsGot;
use crate::symbol::{Symbol, SymbolId};
use crate::sync::AtomicBool;

pub struct LinkContext {
    pub symbols: Vec<Symbol>,
    /// `.dynsym` contents in table order, minus the null entry.
    pub dynsym: Vec<SymbolId>,
    pub got: MipsGot,
    /// Output address of the generic GOT region whose slot indices the
    /// upstream GOT builder assigned into `Symbol::{got,gottp,tlsgd}_idx`.
    pub got_addr: u64,
    /// Slot pair index for the shared local-dynamic TLS module id.
    pub tlsld_idx: Option<u32>,
    /// Image offset of the `.rel.dyn` section.
    pub reldyn_offset: usize,
    /// The virtual `_gp` symbol, appended by [`LinkContext::new`].
    pub gp: SymbolId,
    /// Address the thread pointer is biased against.
    pub tp_addr: u64,
    /// Address the dynamic thread pointer is biased against.
    pub dtp_addr: u64,
    /// Producing position-independent output.
    pub pic: bool,
    /// Some section used local-dynamic TLS; set during scanning.
    pub needs_tlsld: AtomicBool,
    pub diagnostics: Diagnostics,
}

impl LinkContext {
    pub fn new(mut symbols: Vec<Symbol>, dynsym: Vec<SymbolId>, pic: bool) -> LinkContext {
        let gp = SymbolId(symbols.len() as u32);
        let mut gp_sym = Symbol::new("_gp", u32::MAX, 0, 0);
        gp_sym.relative = pic;
        symbols.push(gp_sym);
        LinkContext {
            symbols,
            dynsym,
            got: MipsGot::default(),
            got_addr: 0,
            tlsld_idx: None,
            reldyn_offset: 0,
            gp,
            tp_addr: 0,
            dtp_addr: 0,
            pic,
            needs_tlsld: AtomicBool::new(false),
            diagnostics: Diagnostics::new(),
        }
    }

    /// Pin `_gp` to its ABI value once the GOT address is known. Must run
    /// before the apply phase.
    pub fn define_gp(&mut self) {
        let value = self.got_addr + arch::GP_OFFSET;
        self.symbols[self.gp.0 as usize].value = value;
        log::debug!("_gp = {value:#x}");
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn gp_value(&self) -> u64 {
        self.symbol(self.gp).value
    }

    /// Address of a symbol's plain generic GOT slot. Querying a symbol the
    /// scan phase never flagged is a bug in this crate, not bad input.
    pub fn got_addr_of(&self, id: SymbolId) -> u64 {
        match self.symbol(id).got_idx {
            Some(idx) => self.got_addr + idx as u64 * 8,
            None => panic!("no GOT slot was allocated for {}", self.symbol(id).name),
        }
    }

    /// Address of a symbol's TP-offset GOT slot.
    pub fn gottp_addr_of(&self, id: SymbolId) -> u64 {
        match self.symbol(id).gottp_idx {
            Some(idx) => self.got_addr + idx as u64 * 8,
            None => panic!("no GOTTP slot was allocated for {}", self.symbol(id).name),
        }
    }

    /// Address of a symbol's general-dynamic TLS slot pair.
    pub fn tlsgd_addr_of(&self, id: SymbolId) -> u64 {
        match self.symbol(id).tlsgd_idx {
            Some(idx) => self.got_addr + idx as u64 * 8,
            None => panic!("no TLSGD slot was allocated for {}", self.symbol(id).name),
        }
    }

    /// Address of the shared local-dynamic TLS slot pair.
    pub fn tlsld_addr(&self) -> u64 {
        match self.tlsld_idx {
            Some(idx) => self.got_addr + idx as u64 * 8,
            None => panic!("no TLSLD slot pair was allocated"),
        }
    }

    /// Report a relocation against a symbol nothing defines. Returns true
    /// if the relocation should be skipped. Each symbol is reported once
    /// no matter how many references it has.
    pub fn record_undef_error(&self, section: &str, sym_id: SymbolId) -> bool {
        let sym = self.symbol(sym_id);
        if !sym.undefined || sym.imported {
            return false;
        }
        if self.diagnostics.first_undef(sym_id) {
            self.diagnostics.report(Error::UndefinedSymbol {
                section: section.to_string(),
                symbol: sym.name.clone(),
            });
        }
        true
    }
}
