//! Relocation processing: scan, finalize, apply.
//!
//! The three drivers here hold the phase discipline the rest of the crate
//! relies on. [`scan_all`] and [`apply_all`] fan out across sections with
//! rayon; [`finalize`] is the single-threaded barrier in between, and
//! nothing that asks for a GOT position may run before it.

mod apply;
mod ehframe;
mod scan;

pub use apply::{apply_reloc_alloc, apply_reloc_nonalloc};
pub use ehframe::{apply_eh_reloc, rewrite_all, rewrite_cie, CieRecord};
pub use scan::scan_relocations;

use crate::context::LinkContext;
use crate::elf::ElfRela;
use crate::image::{self, OutputImage};
use crate::section::InputSection;
use rayon::prelude::*;

/// Scan every allocated section's relocations in parallel.
pub fn scan_all(ctx: &LinkContext, sections: &mut [InputSection]) {
    sections
        .par_iter_mut()
        .filter(|sect| sect.alloc)
        .for_each(|sect| scan_relocations(ctx, sect));
}

/// The barrier between scanning and everything downstream. Freezes the
/// GOT and lays out the `.rel.dyn` region: the GOT's records first, then
/// each section's in section order.
pub fn finalize(ctx: &mut LinkContext, sections: &mut [InputSection]) {
    ctx.got.finalize(&ctx.symbols, ctx.dynsym.len());
    ctx.got.reldyn_offset = 0;

    let mut offset = ctx.got.reldyn_count(ctx) * ElfRela::SIZE;
    for sect in sections.iter_mut() {
        sect.reldyn_offset = offset;
        offset += sect.num_dynrel * ElfRela::SIZE;
    }
    log::info!(
        "relocations finalized: {} GOT slots, {:#x} bytes of dynamic relocations",
        ctx.got.num_slots(),
        offset
    );
}

/// Patch every section in parallel, then serialize the dynamic relocation
/// records the allocated sections emitted.
pub fn apply_all(
    ctx: &LinkContext,
    sections: &[InputSection],
    image: &mut OutputImage,
) -> crate::Result<()> {
    let ranges: Vec<(usize, usize)> = sections.iter().map(|s| (s.out_offset, s.size)).collect();
    let slices = image.section_slices(&ranges);

    let dynrels: Vec<Vec<ElfRela>> = sections
        .par_iter()
        .zip(slices)
        .map(|(sect, buf)| {
            if sect.alloc {
                Ok(apply_reloc_alloc(ctx, sect, buf))
            } else {
                apply_reloc_nonalloc(ctx, sect, buf).map(|()| Vec::new())
            }
        })
        .collect::<crate::Result<Vec<_>>>()?;

    for (sect, rels) in sections.iter().zip(&dynrels) {
        debug_assert_eq!(rels.len(), sect.num_dynrel);
        let mut offset = ctx.reldyn_offset + sect.reldyn_offset;
        for rel in rels {
            image::write_bytes(&mut image.buf, offset, &rel.encode());
            offset += ElfRela::SIZE;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch;
    use crate::symbol::{Symbol, SymbolId};

    #[test]
    fn reldyn_layout_follows_got_then_sections() {
        let sym = Symbol::new("a", 1, 1, 0x1000);
        let mut ctx = LinkContext::new(vec![sym], Vec::new(), true);
        ctx.got.add_got(SymbolId(0), 4);

        let mut s1 = InputSection::new(".data", 0x1000, 0, 0x10, true);
        s1.num_dynrel = 2;
        let mut s2 = InputSection::new(".data.rel", 0x2000, 0x10, 0x10, true);
        s2.num_dynrel = 1;
        let mut sections = vec![s1, s2];

        finalize(&mut ctx, &mut sections);
        // One Relative GOT record, then the sections' records.
        assert_eq!(sections[0].reldyn_offset, ElfRela::SIZE);
        assert_eq!(sections[1].reldyn_offset, 3 * ElfRela::SIZE);
    }

    #[test]
    fn parallel_scan_matches_serial_scan() {
        let build = || {
            let symbols: Vec<Symbol> = (0..8)
                .map(|i| Symbol::new(&format!("s{i}"), 1, i, 0x1000 * (i as u64 + 1)))
                .collect();
            let ctx = LinkContext::new(symbols, Vec::new(), false);
            let sections: Vec<InputSection> = (0..32)
                .map(|i| {
                    let mut sect =
                        InputSection::new(&format!(".text.{i}"), 0, i * 0x10, 0x10, true);
                    sect.rels = vec![
                        ElfRela {
                            r_offset: 0,
                            r_sym: (i % 8) as u32,
                            r_type: arch::R_MIPS_GOT_DISP,
                            r_addend: (i % 3) as i64 * 8 + 8,
                        },
                        ElfRela {
                            r_offset: 4,
                            r_sym: ((i + 3) % 8) as u32,
                            r_type: arch::R_MIPS_GOT_PAGE,
                            r_addend: 0,
                        },
                    ];
                    sect
                })
                .collect();
            (ctx, sections)
        };

        let (mut par_ctx, mut par_sections) = build();
        scan_all(&par_ctx, &mut par_sections);
        finalize(&mut par_ctx, &mut par_sections);

        let (mut ser_ctx, mut ser_sections) = build();
        for sect in ser_sections.iter_mut() {
            scan_relocations(&ser_ctx, sect);
        }
        finalize(&mut ser_ctx, &mut ser_sections);

        // Sorting and dedup erase any scheduling-dependent request order.
        assert_eq!(par_ctx.got.num_slots(), ser_ctx.got.num_slots());
        for i in 0..8 {
            for addend in [8, 16, 24] {
                let sym = SymbolId(i);
                assert_eq!(
                    par_ctx.got.get_got_addr(&par_ctx.symbols, sym, addend),
                    ser_ctx.got.get_got_addr(&ser_ctx.symbols, sym, addend)
                );
            }
        }
    }

    #[test]
    fn scan_then_apply_over_disjoint_slices() {
        let mut imported = Symbol::new("ext", 2, 1, 0);
        imported.imported = true;
        imported.relative = false;
        imported.undefined = true;
        imported.dynsym_idx = Some(1);
        let local = Symbol::new("local", 1, 1, 0x9000);
        let mut ctx = LinkContext::new(vec![local, imported], Vec::new(), true);

        let mut s1 = InputSection::new(".data.a", 0x1000, 0, 8, true);
        s1.rels = vec![ElfRela {
            r_offset: 0,
            r_sym: 0,
            r_type: arch::R_MIPS_64,
            r_addend: 0,
        }];
        let mut s2 = InputSection::new(".data.b", 0x2000, 8, 8, true);
        s2.rels = vec![ElfRela {
            r_offset: 0,
            r_sym: 1,
            r_type: arch::R_MIPS_64,
            r_addend: 0,
        }];
        let mut sections = vec![s1, s2];

        scan_all(&ctx, &mut sections);
        assert_eq!(sections[0].num_dynrel, 1);
        assert_eq!(sections[1].num_dynrel, 1);

        finalize(&mut ctx, &mut sections);
        ctx.reldyn_offset = 0x10;

        let mut image = OutputImage::new(0x80);
        apply_all(&ctx, &sections, &mut image).unwrap();

        // The local word is written in place; the imported one stays zero.
        assert_eq!(
            u64::from_le_bytes(image.buf[0..8].try_into().unwrap()),
            0x9000
        );
        assert_eq!(u64::from_le_bytes(image.buf[8..16].try_into().unwrap()), 0);

        let rel1 = ElfRela {
            r_offset: 0x1000,
            r_sym: 0,
            r_type: arch::R_DYN_REL,
            r_addend: 0x9000,
        };
        let rel2 = ElfRela {
            r_offset: 0x2000,
            r_sym: 1,
            r_type: arch::R_DYN_REL,
            r_addend: 0,
        };
        assert_eq!(&image.buf[0x10..0x10 + ElfRela::SIZE], rel1.encode());
        assert_eq!(
            &image.buf[0x10 + ElfRela::SIZE..0x10 + 2 * ElfRela::SIZE],
            rel2.encode()
        );
    }
}
