//! The apply phase: patch instruction fields and data words with the
//! values the finalized GOT and symbol table determine.
//!
//! Each section is patched through its own disjoint slice of the output
//! image, so sections proceed in parallel. Dynamic relocations are
//! returned to the driver instead of written here, because all sections'
//! records interleave into the single `.rel.dyn` region.

use crate::arch::{self, RelocKind};
use crate::context::LinkContext;
use crate::elf::ElfRela;
use crate::error::Error;
use crate::image;
use crate::section::{default_tombstone, InputSection};
use crate::symbol::SymbolId;

const HI_RANGE: (i64, i64) = (-(1 << 31), 1 << 31);
const LO_RANGE: (i64, i64) = (-(1 << 15), 1 << 15);

fn check(
    ctx: &LinkContext,
    sect: &InputSection,
    rel: &ElfRela,
    sym_id: SymbolId,
    val: i64,
    (lo, hi): (i64, i64),
) -> bool {
    if (lo..hi).contains(&val) {
        return true;
    }
    ctx.diagnostics.report(Error::RelocOutOfRange {
        section: sect.name.clone(),
        rel: arch::rel_type_name(rel.r_type),
        symbol: ctx.symbol(sym_id).name.clone(),
        value: val,
        lo,
        hi,
    });
    false
}

/// Patch one allocated section. Returns the `.rel.dyn` records it emits,
/// in relocation order.
pub fn apply_reloc_alloc(
    ctx: &LinkContext,
    sect: &InputSection,
    buf: &mut [u8],
) -> Vec<ElfRela> {
    let gp = ctx.gp_value() as i64;
    let mut dynrels = Vec::with_capacity(sect.num_dynrel);

    for rel in &sect.rels {
        if rel.r_type == arch::R_MIPS_NONE {
            continue;
        }
        let sym_id = SymbolId(rel.r_sym);
        if ctx.record_undef_error(&sect.name, sym_id) {
            continue;
        }
        let sym = ctx.symbol(sym_id);
        let loc = rel.r_offset as usize;
        let p = sect.addr.wrapping_add(rel.r_offset);
        let s = sym.value as i64;
        let a = rel.r_addend;

        let Some(kind) = RelocKind::decode(rel.r_type) else {
            panic!(
                "{}: unscanned relocation {:#x} reached the apply phase",
                sect.name, rel.r_type
            );
        };

        match kind {
            RelocKind::Abs64 => {
                apply_abs(ctx, sym_id, p, rel.r_addend, buf, loc, &mut dynrels)
            }
            RelocKind::GprelSubHi16 | RelocKind::GprelSubLo16 => {
                // GP-relative references in merged sections must account
                // for the GP value their object was assembled against.
                let val = if sym.local {
                    s + a + sect.gp0 as i64 - gp
                } else {
                    s + a - gp
                };
                if let RelocKind::GprelSubHi16 = kind {
                    if check(ctx, sect, rel, sym_id, -val, HI_RANGE) {
                        image::or_u32(buf, loc, arch::hi16(-val));
                    }
                } else {
                    image::or_u32(buf, loc, arch::lo16(-val));
                }
            }
            RelocKind::Gprel32 => {
                let val = s + a + sect.gp0 as i64 - gp;
                image::write_u64(buf, loc, val as u64);
            }
            RelocKind::GotDisp => {
                let slot = if a == 0 {
                    ctx.got_addr_of(sym_id)
                } else {
                    ctx.got.get_got_addr(&ctx.symbols, sym_id, a)
                };
                let val = slot as i64 - gp;
                if check(ctx, sect, rel, sym_id, val, LO_RANGE) {
                    image::or_u32(buf, loc, arch::lo16(val));
                }
            }
            RelocKind::Call16 => {
                let val = ctx.got_addr_of(sym_id) as i64 - gp;
                if check(ctx, sect, rel, sym_id, val, LO_RANGE) {
                    image::or_u32(buf, loc, arch::lo16(val));
                }
            }
            RelocKind::CallHi16 | RelocKind::GotHi16 => {
                let val = ctx.got_addr_of(sym_id) as i64 - gp;
                if check(ctx, sect, rel, sym_id, val, HI_RANGE) {
                    image::or_u32(buf, loc, arch::hi16(val));
                }
            }
            RelocKind::CallLo16 | RelocKind::GotLo16 => {
                // These pair with a hi16 form, but the slot displacement
                // itself must still fit the 16-bit window.
                let val = ctx.got_addr_of(sym_id) as i64 - gp;
                if check(ctx, sect, rel, sym_id, val, LO_RANGE) {
                    image::or_u32(buf, loc, arch::lo16(val));
                }
            }
            RelocKind::GotPage => {
                let slot = ctx.got.get_gotpage_got_addr(&ctx.symbols, sym_id, a);
                let val = slot as i64 - gp;
                if check(ctx, sect, rel, sym_id, val, LO_RANGE) {
                    image::or_u32(buf, loc, arch::lo16(val));
                }
            }
            RelocKind::GotOfst => {
                // The paired page slot holds the full target address, so
                // the residual offset is always zero.
                let page = ctx.got.get_gotpage_page_addr(&ctx.symbols, sym_id, a);
                image::or_u32(buf, loc, arch::lo16(s + a - page as i64));
            }
            RelocKind::Jalr => {}
            RelocKind::TlsTprelHi16 => {
                let val = s + a - ctx.tp_addr as i64;
                if check(ctx, sect, rel, sym_id, val, HI_RANGE) {
                    image::or_u32(buf, loc, arch::hi16(val));
                }
            }
            RelocKind::TlsTprelLo16 => {
                let val = s + a - ctx.tp_addr as i64;
                image::or_u32(buf, loc, arch::lo16(val));
            }
            RelocKind::TlsGottprel => {
                let val = ctx.gottp_addr_of(sym_id) as i64 - gp;
                if check(ctx, sect, rel, sym_id, val, LO_RANGE) {
                    image::or_u32(buf, loc, arch::lo16(val));
                }
            }
            RelocKind::TlsGd => {
                let val = ctx.tlsgd_addr_of(sym_id) as i64 - gp;
                if check(ctx, sect, rel, sym_id, val, LO_RANGE) {
                    image::or_u32(buf, loc, arch::lo16(val));
                }
            }
            RelocKind::TlsLdm => {
                let val = ctx.tlsld_addr() as i64 - gp;
                if check(ctx, sect, rel, sym_id, val, LO_RANGE) {
                    image::or_u32(buf, loc, arch::lo16(val));
                }
            }
            RelocKind::TlsDtprelHi16 => {
                let val = s + a - ctx.dtp_addr as i64;
                if check(ctx, sect, rel, sym_id, val, HI_RANGE) {
                    image::or_u32(buf, loc, arch::hi16(val));
                }
            }
            RelocKind::TlsDtprelLo16 => {
                let val = s + a - ctx.dtp_addr as i64;
                image::or_u32(buf, loc, arch::lo16(val));
            }
            RelocKind::Abs32 => {
                panic!(
                    "{}: R_MIPS_32 in a loaded section reached the apply phase",
                    sect.name
                );
            }
        }
    }

    dynrels
}

fn apply_abs(
    ctx: &LinkContext,
    sym_id: SymbolId,
    p: u64,
    addend: i64,
    buf: &mut [u8],
    loc: usize,
    dynrels: &mut Vec<ElfRela>,
) {
    let sym = ctx.symbol(sym_id);
    if sym.imported {
        let r_sym = match sym.dynsym_idx {
            Some(idx) => idx,
            None => panic!("{} is imported but has no dynsym entry", sym.name),
        };
        dynrels.push(ElfRela {
            r_offset: p,
            r_sym,
            r_type: arch::R_DYN_REL,
            r_addend: addend,
        });
        image::write_u64(buf, loc, 0);
        return;
    }

    let val = sym.value.wrapping_add(addend as u64);
    image::write_u64(buf, loc, val);
    if ctx.pic && sym.relative {
        dynrels.push(ElfRela {
            r_offset: p,
            r_sym: 0,
            r_type: arch::R_DYN_REL,
            r_addend: val as i64,
        });
    }
}

/// Patch one non-allocated section (debug info and friends). Only plain
/// absolute words make sense here, and references into discarded sections
/// resolve to the tombstone value instead of a stale address.
pub fn apply_reloc_nonalloc(
    ctx: &LinkContext,
    sect: &InputSection,
    buf: &mut [u8],
) -> crate::Result<()> {
    for rel in &sect.rels {
        if rel.r_type == arch::R_MIPS_NONE {
            continue;
        }
        let sym_id = SymbolId(rel.r_sym);
        if ctx.record_undef_error(&sect.name, sym_id) {
            continue;
        }
        let sym = ctx.symbol(sym_id);
        let loc = rel.r_offset as usize;

        let val = if sym.discarded {
            sect.tombstone
                .unwrap_or_else(|| default_tombstone(&sect.name))
        } else {
            sym.value.wrapping_add(rel.r_addend as u64)
        };

        match RelocKind::decode(rel.r_type) {
            Some(RelocKind::Abs64) => image::write_u64(buf, loc, val),
            Some(RelocKind::Abs32) => image::write_u32(buf, loc, val as u32),
            _ => {
                return Err(Error::NonAllocRelocation {
                    section: sect.name.clone(),
                    r_type: rel.r_type,
                    offset: rel.r_offset,
                })
            }
        }
    }
    Ok(())
}
