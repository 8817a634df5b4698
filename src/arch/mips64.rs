//! MIPS64 relocation types, composite operation decoding and instruction
//! field arithmetic.
//!
//! Unlike other psABIs, a MIPS relocation record can carry up to three
//! types: the base type in the low byte of the packed key, an optional
//! combinator (`R_MIPS_SUB`) in the next byte and an optional high/low
//! field selector in the third. The combination is one logical operation,
//! so everything downstream works on [`RelocKind`], the tagged decode of
//! the whole key, never on the individual bytes.

/// The ELF machine type this back end produces code for.
pub const EM_ARCH: u16 = elf::abi::EM_MIPS;

pub const R_MIPS_NONE: u32 = 0;
pub const R_MIPS_32: u32 = 2;
pub const R_MIPS_REL32: u32 = 3;
pub const R_MIPS_HI16: u32 = 5;
pub const R_MIPS_LO16: u32 = 6;
pub const R_MIPS_GPREL16: u32 = 7;
pub const R_MIPS_CALL16: u32 = 11;
pub const R_MIPS_GPREL32: u32 = 12;
pub const R_MIPS_64: u32 = 18;
pub const R_MIPS_GOT_DISP: u32 = 19;
pub const R_MIPS_GOT_PAGE: u32 = 20;
pub const R_MIPS_GOT_OFST: u32 = 21;
pub const R_MIPS_GOT_HI16: u32 = 22;
pub const R_MIPS_GOT_LO16: u32 = 23;
pub const R_MIPS_SUB: u32 = 24;
pub const R_MIPS_CALL_HI16: u32 = 30;
pub const R_MIPS_CALL_LO16: u32 = 31;
pub const R_MIPS_JALR: u32 = 37;
pub const R_MIPS_TLS_GD: u32 = 42;
pub const R_MIPS_TLS_LDM: u32 = 43;
pub const R_MIPS_TLS_DTPREL_HI16: u32 = 44;
pub const R_MIPS_TLS_DTPREL_LO16: u32 = 45;
pub const R_MIPS_TLS_GOTTPREL: u32 = 46;
pub const R_MIPS_TLS_TPREL_HI16: u32 = 49;
pub const R_MIPS_TLS_TPREL_LO16: u32 = 50;

/// Build a packed composite relocation key from up to three stacked types.
pub const fn composite(t1: u32, t2: u32, t3: u32) -> u32 {
    t1 | t2 << 8 | t3 << 16
}

pub const R_GPREL16_SUB_HI16: u32 = composite(R_MIPS_GPREL16, R_MIPS_SUB, R_MIPS_HI16);
pub const R_GPREL16_SUB_LO16: u32 = composite(R_MIPS_GPREL16, R_MIPS_SUB, R_MIPS_LO16);
pub const R_GPREL32_64: u32 = composite(R_MIPS_GPREL32, R_MIPS_64, R_MIPS_NONE);

/// Raw type of every dynamic fixup this back end emits. The loader treats
/// the composite REL32+64 form as a 64-bit fixup; a zero dynamic-symbol
/// index selects load-bias behaviour, a non-zero one resolves the symbol.
pub const R_DYN_REL: u32 = composite(R_MIPS_REL32, R_MIPS_64, R_MIPS_NONE);

/// Displacement of the GP value into the GOT: GP = GOT + 0x7ff0, placing
/// the 16-bit signed access window over the start of the table.
pub const GP_OFFSET: u64 = 0x7ff0;

/// Compensates for the sign of the low 16-bit field when an address is
/// split across a hi16/lo16 instruction pair.
pub const BIAS: i64 = 0x8000;

/// High half of a split 32-bit displacement. Adding [`BIAS`] first makes
/// the pair recombine exactly once the low half is sign-extended.
pub fn hi16(val: i64) -> u32 {
    ((val.wrapping_add(BIAS) >> 16) & 0xffff) as u32
}

/// Low half of a split 32-bit displacement.
pub fn lo16(val: i64) -> u32 {
    (val & 0xffff) as u32
}

/// One relocation operation, decoded from the packed composite key.
///
/// Every supported combination the compiler emits is its own variant;
/// `GprelSubHi16` is one case, not a chain of three byte checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelocKind {
    /// 64-bit absolute word (`R_MIPS_64`).
    Abs64,
    /// 32-bit absolute word, valid in non-loaded sections only.
    Abs32,
    /// High half of a negated GP-relative offset (GPREL16 ∘ SUB ∘ HI16).
    GprelSubHi16,
    /// Low half of a negated GP-relative offset (GPREL16 ∘ SUB ∘ LO16).
    GprelSubLo16,
    /// 64-bit GP-relative word (GPREL32 ∘ 64).
    Gprel32,
    /// 16-bit offset of a GOT slot; per-addend slot when the addend is
    /// non-zero.
    GotDisp,
    /// High half of a GOT slot offset.
    GotHi16,
    /// Low half of a GOT slot offset.
    GotLo16,
    /// High half of a GOT slot offset for a function call.
    CallHi16,
    /// Low half of a GOT slot offset for a function call.
    CallLo16,
    /// 16-bit GOT slot offset for a function call.
    Call16,
    /// Page-granular GOT slot for a local symbol+addend.
    GotPage,
    /// Offset from the paired GOT_PAGE slot value.
    GotOfst,
    /// Marker on register-indirect calls; no bytes change.
    Jalr,
    /// TLS local-exec, high half of the TP-relative offset.
    TlsTprelHi16,
    /// TLS local-exec, low half of the TP-relative offset.
    TlsTprelLo16,
    /// TLS initial-exec, GOT slot holding the TP-relative offset.
    TlsGottprel,
    /// TLS local-dynamic, high half of the DTP-relative offset.
    TlsDtprelHi16,
    /// TLS local-dynamic, low half of the DTP-relative offset.
    TlsDtprelLo16,
    /// TLS general-dynamic, GOT slot pair for `__tls_get_addr`.
    TlsGd,
    /// TLS local-dynamic, shared GOT slot pair for the module id.
    TlsLdm,
}

impl RelocKind {
    /// Decode a packed composite key. `None` means the combination is not
    /// one a real compiler emits; callers in the scan phase report it,
    /// callers in the apply phase treat it as an internal inconsistency.
    pub fn decode(packed: u32) -> Option<RelocKind> {
        let kind = match packed {
            R_MIPS_64 => RelocKind::Abs64,
            R_MIPS_32 => RelocKind::Abs32,
            R_GPREL16_SUB_HI16 => RelocKind::GprelSubHi16,
            R_GPREL16_SUB_LO16 => RelocKind::GprelSubLo16,
            R_GPREL32_64 => RelocKind::Gprel32,
            R_MIPS_GOT_DISP => RelocKind::GotDisp,
            R_MIPS_GOT_HI16 => RelocKind::GotHi16,
            R_MIPS_GOT_LO16 => RelocKind::GotLo16,
            R_MIPS_CALL_HI16 => RelocKind::CallHi16,
            R_MIPS_CALL_LO16 => RelocKind::CallLo16,
            R_MIPS_CALL16 => RelocKind::Call16,
            R_MIPS_GOT_PAGE => RelocKind::GotPage,
            R_MIPS_GOT_OFST => RelocKind::GotOfst,
            R_MIPS_JALR => RelocKind::Jalr,
            R_MIPS_TLS_TPREL_HI16 => RelocKind::TlsTprelHi16,
            R_MIPS_TLS_TPREL_LO16 => RelocKind::TlsTprelLo16,
            R_MIPS_TLS_GOTTPREL => RelocKind::TlsGottprel,
            R_MIPS_TLS_DTPREL_HI16 => RelocKind::TlsDtprelHi16,
            R_MIPS_TLS_DTPREL_LO16 => RelocKind::TlsDtprelLo16,
            R_MIPS_TLS_GD => RelocKind::TlsGd,
            R_MIPS_TLS_LDM => RelocKind::TlsLdm,
            _ => return None,
        };
        Some(kind)
    }
}

/// Map packed relocation keys to human readable names for diagnostics.
pub fn rel_type_name(packed: u32) -> &'static str {
    match packed {
        R_MIPS_NONE => "R_MIPS_NONE",
        R_MIPS_32 => "R_MIPS_32",
        R_MIPS_64 => "R_MIPS_64",
        R_GPREL16_SUB_HI16 => "R_MIPS_GPREL16+R_MIPS_SUB+R_MIPS_HI16",
        R_GPREL16_SUB_LO16 => "R_MIPS_GPREL16+R_MIPS_SUB+R_MIPS_LO16",
        R_GPREL32_64 => "R_MIPS_GPREL32+R_MIPS_64",
        R_MIPS_GOT_DISP => "R_MIPS_GOT_DISP",
        R_MIPS_GOT_PAGE => "R_MIPS_GOT_PAGE",
        R_MIPS_GOT_OFST => "R_MIPS_GOT_OFST",
        R_MIPS_GOT_HI16 => "R_MIPS_GOT_HI16",
        R_MIPS_GOT_LO16 => "R_MIPS_GOT_LO16",
        R_MIPS_CALL16 => "R_MIPS_CALL16",
        R_MIPS_CALL_HI16 => "R_MIPS_CALL_HI16",
        R_MIPS_CALL_LO16 => "R_MIPS_CALL_LO16",
        R_MIPS_JALR => "R_MIPS_JALR",
        R_MIPS_TLS_GD => "R_MIPS_TLS_GD",
        R_MIPS_TLS_LDM => "R_MIPS_TLS_LDM",
        R_MIPS_TLS_DTPREL_HI16 => "R_MIPS_TLS_DTPREL_HI16",
        R_MIPS_TLS_DTPREL_LO16 => "R_MIPS_TLS_DTPREL_LO16",
        R_MIPS_TLS_GOTTPREL => "R_MIPS_TLS_GOTTPREL",
        R_MIPS_TLS_TPREL_HI16 => "R_MIPS_TLS_TPREL_HI16",
        R_MIPS_TLS_TPREL_LO16 => "R_MIPS_TLS_TPREL_LO16",
        _ => "R_MIPS_UNKNOWN",
    }
}

// We don't support lazy symbol resolution for MIPS. All dynamic symbols
// are resolved eagerly on process startup, so the PLT machinery emits
// nothing at all.

pub const PLT_HDR_SIZE: usize = 0;
pub const PLT_ENTRY_SIZE: usize = 0;

pub fn write_plt_header(_ctx: &crate::LinkContext, _buf: &mut Vec<u8>) {}

pub fn write_plt_entry(_ctx: &crate::LinkContext, _buf: &mut Vec<u8>, _sym: crate::symbol::SymbolId) {
}

pub fn write_pltgot_entry(
    _ctx: &crate::LinkContext,
    _buf: &mut Vec<u8>,
    _sym: crate::symbol::SymbolId,
) {
}

#[cfg(test)]
mod tests {
    use super::*;

    // The hardware recombines the pair in 32-bit registers, so the
    // reference decoder must wrap the same way.
    fn recombine(hi: u32, lo: u32) -> i64 {
        ((hi << 16) as i32).wrapping_add(lo as u16 as i16 as i32) as i64
    }

    #[test]
    fn split_recombines_exactly() {
        for val in [
            0i64,
            1,
            -1,
            4096,
            -4096,
            0x7fff,
            0x8000,
            -0x8000,
            -0x8001,
            0x1234_8000,
            i32::MIN as i64,
            i32::MAX as i64,
        ] {
            assert_eq!(recombine(hi16(val), lo16(val)), val, "val = {val:#x}");
        }
    }

    #[test]
    fn split_example_from_abi() {
        // 4096 fits the low field alone.
        assert_eq!(hi16(4096), 0);
        assert_eq!(lo16(4096), 0x1000);
        assert_eq!(recombine(0, 0x1000), 4096);
    }

    #[test]
    fn composite_keys_decode_as_one_operation() {
        assert_eq!(
            RelocKind::decode(R_GPREL16_SUB_HI16),
            Some(RelocKind::GprelSubHi16)
        );
        // The base type alone means something entirely different and is not
        // in the supported set.
        assert_eq!(RelocKind::decode(R_MIPS_GPREL16), None);
        // Neither is an unknown combinator on a known base type.
        assert_eq!(
            RelocKind::decode(composite(R_MIPS_GOT_DISP, R_MIPS_SUB, R_MIPS_NONE)),
            None
        );
    }

    #[test]
    fn plt_writers_emit_nothing() {
        let symbols = vec![crate::symbol::Symbol::new("imported", 1, 1, 0)];
        let ctx = crate::LinkContext::new(symbols, Vec::new(), true);
        let mut buf = Vec::new();
        write_plt_header(&ctx, &mut buf);
        write_plt_entry(&ctx, &mut buf, crate::symbol::SymbolId(0));
        write_pltgot_entry(&ctx, &mut buf, crate::symbol::SymbolId(0));
        assert!(buf.is_empty());
        assert_eq!(PLT_HDR_SIZE + PLT_ENTRY_SIZE, 0);
    }
}
