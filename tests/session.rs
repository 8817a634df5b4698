//! End-to-end exercise of a small link session: scan, finalize, apply,
//! GOT serialization, and the diagnostics contract.

use mipsgot::arch;
use mipsgot::elf::ElfRela;
use mipsgot::got::LOADER_MARKER;
use mipsgot::image::OutputImage;
use mipsgot::relocation;
use mipsgot::section::InputSection;
use mipsgot::symbol::{Symbol, SymbolId};
use mipsgot::LinkContext;

fn rela(r_offset: u64, r_sym: u32, r_type: u32, r_addend: i64) -> ElfRela {
    ElfRela {
        r_offset,
        r_sym,
        r_type,
        r_addend,
    }
}

fn word32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes(buf[off..off + 4].try_into().unwrap())
}

fn word64(buf: &[u8], off: usize) -> u64 {
    u64::from_le_bytes(buf[off..off + 8].try_into().unwrap())
}

/// Builds the same shape of session a driver would: two locals, one
/// import, a code section using every GOT access form, and a data section
/// needing dynamic relocations.
fn build_session() -> (LinkContext, Vec<InputSection>) {
    let buffer = Symbol::new("buffer", 1, 5, 0x4_0000);
    let table = Symbol::new("table", 1, 6, 0x4_1000);
    let mut puts = Symbol::new("puts", 2, 1, 0);
    puts.imported = true;
    puts.local = false;
    puts.relative = false;
    puts.undefined = true;
    puts.dynsym_idx = Some(1);

    let ctx = LinkContext::new(vec![buffer, table, puts], vec![SymbolId(2)], true);

    let mut text = InputSection::new(".text", 0x1_0000, 0, 0x20, true);
    text.rels = vec![
        rela(0x00, 2, arch::R_MIPS_CALL16, 0),
        rela(0x04, 0, arch::R_MIPS_GOT_DISP, 0),
        rela(0x08, 0, arch::R_MIPS_GOT_DISP, 8),
        rela(0x0c, 1, arch::R_MIPS_GOT_PAGE, 0x10),
        rela(0x10, 1, arch::R_MIPS_GOT_OFST, 0x10),
    ];

    let mut data = InputSection::new(".data", 0x2_0000, 0x20, 0x10, true);
    data.rels = vec![
        rela(0x0, 2, arch::R_MIPS_64, 0),
        rela(0x8, 0, arch::R_MIPS_64, 4),
    ];

    (ctx, vec![text, data])
}

#[test]
fn full_session_produces_the_documented_image() {
    let (mut ctx, mut sections) = build_session();

    relocation::scan_all(&ctx, &mut sections);
    assert_eq!(sections[0].num_dynrel, 0);
    assert_eq!(sections[1].num_dynrel, 2);

    relocation::finalize(&mut ctx, &mut sections);
    // 2 reserved + 1 quickstart + 1 plain + 1 page.
    assert_eq!(ctx.got.num_slots(), 5);
    assert_eq!(ctx.got.size_in_bytes(), 40);

    // Layout, as the driver's placement pass would do it.
    ctx.got_addr = 0x3_0000;
    ctx.symbols[0].got_idx = Some(0);
    ctx.symbols[2].got_idx = Some(1);
    ctx.got.shdr_addr = 0x3_1000;
    ctx.got.shdr_offset = 0x30;
    ctx.reldyn_offset = 0x60;
    ctx.define_gp();
    assert_eq!(ctx.gp_value(), 0x3_7ff0);

    let mut image = OutputImage::new(0x100);
    // A `ld $t9, 0($gp)` waiting for its CALL16 field.
    image.buf[0..4].copy_from_slice(&0xdf99_0000u32.to_le_bytes());

    relocation::apply_all(&ctx, &sections, &mut image).unwrap();
    ctx.got.copy_buf(&ctx, &mut image);
    ctx.diagnostics.finish().unwrap();

    let buf = &image.buf;

    // Code: every GOT access form got its 16-bit displacement.
    assert_eq!(word32(buf, 0x00), 0xdf99_8018); // puts slot, GP - 0x7fe8
    assert_eq!(word32(buf, 0x04) & 0xffff, 0x8010); // buffer plain slot
    assert_eq!(word32(buf, 0x08) & 0xffff, 0x9028); // buffer+8 table slot
    assert_eq!(word32(buf, 0x0c) & 0xffff, 0x9030); // table+0x10 page slot
    assert_eq!(word32(buf, 0x10) & 0xffff, 0); // offset from the page value

    // Data: link-time value for the local, zero for the import.
    assert_eq!(word64(buf, 0x20), 0);
    assert_eq!(word64(buf, 0x28), 0x4_0004);

    // GOT: reserved slots, untouched quickstart slot, then the entries.
    assert_eq!(word64(buf, 0x30), 0);
    assert_eq!(word64(buf, 0x38), LOADER_MARKER);
    assert_eq!(word64(buf, 0x40), 0); // quickstart slot for the import
    assert_eq!(word64(buf, 0x48), 0x4_0008); // buffer+8
    assert_eq!(word64(buf, 0x50), 0x4_1010); // page value for table+0x10

    // Dynamic relocations: the GOT's records first, then the sections'.
    let expect = [
        rela(0x3_1018, 0, arch::R_DYN_REL, 0x4_0008),
        rela(0x3_1020, 0, arch::R_DYN_REL, 0x4_1010),
        rela(0x2_0000, 1, arch::R_DYN_REL, 0),
        rela(0x2_0008, 0, arch::R_DYN_REL, 0x4_0004),
    ];
    for (i, rel) in expect.iter().enumerate() {
        let off = 0x60 + i * ElfRela::SIZE;
        assert_eq!(
            &buf[off..off + ElfRela::SIZE],
            rel.encode(),
            "record {i}"
        );
    }
}

#[test]
fn errors_accumulate_and_fail_the_link_at_the_end() {
    let mut missing = Symbol::new("missing", 1, 1, 0);
    missing.undefined = true;
    // Symbol so far from GP that its displacement cannot fit.
    let mut distant = Symbol::new("distant", 1, 2, 0);
    distant.got_idx = Some(0x2_0000);
    let ctx = LinkContext::new(vec![missing, distant], Vec::new(), false);

    let mut text = InputSection::new(".text", 0, 0, 0x10, true);
    text.rels = vec![
        rela(0x0, 0, arch::R_MIPS_CALL16, 0),
        rela(0x4, 0, arch::R_MIPS_CALL16, 0),
        rela(0x8, 1, arch::R_MIPS_CALL16, 0),
    ];
    let mut sections = vec![text];

    relocation::scan_all(&ctx, &mut sections);

    let mut ctx = ctx;
    relocation::finalize(&mut ctx, &mut sections);
    ctx.define_gp();

    let mut image = OutputImage::new(0x10);
    relocation::apply_all(&ctx, &sections, &mut image).unwrap();

    // One undefined-symbol report despite two references, plus the
    // out-of-range displacement.
    let err = ctx.diagnostics.finish().unwrap_err();
    assert_eq!(err, mipsgot::Error::LinkFailed { errors: 2 });
    let messages: Vec<String> = ctx
        .diagnostics
        .take()
        .iter()
        .map(|e| e.to_string())
        .collect();
    assert!(messages[0].contains("undefined symbol: missing"));
    assert!(messages[1].contains("recompile with -mxgot"));
}
