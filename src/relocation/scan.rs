//! The scan phase: one pass over each allocated section's relocations,
//! recording what the GOT and the dynamic-relocation region will need.
//!
//! Scanning writes nothing to the output. It only sets atomic symbol
//! flags, pushes (symbol, addend) requests into the GOT's locked lists
//! and counts the dynamic relocations each section will emit, which is
//! why sections can be scanned in parallel.

use crate::arch::RelocKind;
use crate::context::LinkContext;
use crate::error::Error;
use crate::section::InputSection;
use crate::symbol::{self, Symbol, SymbolId};
use crate::sync::Ordering;

/// Number of `.rel.dyn` records a 64-bit absolute word needs.
fn scan_abs(ctx: &LinkContext, sym: &Symbol) -> usize {
    if sym.imported || (ctx.pic && sym.relative) {
        1
    } else {
        0
    }
}

pub fn scan_relocations(ctx: &LinkContext, sect: &mut InputSection) {
    let mut num_dynrel = 0;

    for rel in &sect.rels {
        if rel.r_type == crate::arch::R_MIPS_NONE {
            continue;
        }
        let sym_id = SymbolId(rel.r_sym);
        if ctx.record_undef_error(&sect.name, sym_id) {
            continue;
        }
        let sym = ctx.symbol(sym_id);

        let Some(kind) = RelocKind::decode(rel.r_type) else {
            ctx.diagnostics.report(Error::UnknownRelocation {
                section: sect.name.clone(),
                r_type: rel.r_type,
                offset: rel.r_offset,
            });
            continue;
        };

        match kind {
            RelocKind::Abs64 => num_dynrel += scan_abs(ctx, sym),
            RelocKind::GotDisp => {
                // A zero addend shares the symbol's plain slot; any other
                // addend needs its own.
                if rel.r_addend == 0 {
                    sym.set_flag(symbol::NEEDS_GOT);
                } else {
                    ctx.got.add_got(sym_id, rel.r_addend);
                }
            }
            RelocKind::Call16
            | RelocKind::CallHi16
            | RelocKind::CallLo16
            | RelocKind::GotHi16
            | RelocKind::GotLo16 => {
                // The ABI defines these only for addend-less references.
                assert_eq!(rel.r_addend, 0);
                sym.set_flag(symbol::NEEDS_GOT);
            }
            RelocKind::GotPage | RelocKind::GotOfst => {
                ctx.got.add_gotpage(sym_id, rel.r_addend);
            }
            RelocKind::TlsGottprel => {
                assert_eq!(rel.r_addend, 0);
                sym.set_flag(symbol::NEEDS_GOTTP);
            }
            RelocKind::TlsTprelHi16 | RelocKind::TlsTprelLo16 => {
                if ctx.pic {
                    ctx.diagnostics.report(Error::TlsLocalExec {
                        section: sect.name.clone(),
                        symbol: sym.name.clone(),
                    });
                }
            }
            RelocKind::TlsGd => {
                assert_eq!(rel.r_addend, 0);
                sym.set_flag(symbol::NEEDS_TLSGD);
            }
            RelocKind::TlsLdm => ctx.needs_tlsld.store(true, Ordering::Relaxed),
            RelocKind::GprelSubHi16
            | RelocKind::GprelSubLo16
            | RelocKind::Gprel32
            | RelocKind::Jalr
            | RelocKind::TlsDtprelHi16
            | RelocKind::TlsDtprelLo16 => {}
            RelocKind::Abs32 => {
                // 32-bit absolute words cannot represent 64-bit load
                // addresses, so they are rejected in loaded sections.
                ctx.diagnostics.report(Error::UnknownRelocation {
                    section: sect.name.clone(),
                    r_type: rel.r_type,
                    offset: rel.r_offset,
                });
            }
        }
    }

    sect.num_dynrel = num_dynrel;
}
