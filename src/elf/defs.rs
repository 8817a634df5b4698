//! Relocation records in the MIPS64 layout.
//!
//! MIPS64 deviates from the generic ELF64 `r_info` split. Instead of a
//! 32-bit symbol index and a 32-bit type, the field packs a 32-bit symbol
//! index, a special-symbol byte and three stacked type bytes:
//!
//! ```text
//! bits  0..32   r_sym     symbol index
//! bits 32..40   r_ssym    special symbol (unused by compilers we support)
//! bits 40..48   r_type3   third relocation type
//! bits 48..56   r_type2   second relocation type
//! bits 56..64   r_type    first relocation type
//! ```
//!
//! We re-pack the three type bytes into a single little-endian composite
//! key (`r_type | r_type2 << 8 | r_type3 << 16`) at parse time so nothing
//! downstream ever looks at the bytes individually.

/// A parsed RELA record. `r_type` holds the packed composite key, not a
/// single ELF type value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ElfRela {
    pub r_offset: u64,
    pub r_sym: u32,
    pub r_type: u32,
    pub r_addend: i64,
}

impl ElfRela {
    /// On-disk size of one ELF64 RELA record.
    pub const SIZE: usize = 24;

    /// Parse the raw fields of an ELF64 RELA record, folding the three
    /// MIPS64 type bytes into one composite key.
    pub fn from_raw(r_offset: u64, r_info: u64, r_addend: i64) -> ElfRela {
        let r_type = (r_info >> 56) as u32;
        let r_type2 = (r_info >> 48) as u8 as u32;
        let r_type3 = (r_info >> 40) as u8 as u32;
        ElfRela {
            r_offset,
            r_sym: r_info as u32,
            r_type: r_type | r_type2 << 8 | r_type3 << 16,
            r_addend,
        }
    }

    /// Re-pack the record into the MIPS64 `r_info` layout.
    pub fn to_raw_info(&self) -> u64 {
        let t1 = (self.r_type & 0xff) as u64;
        let t2 = (self.r_type >> 8 & 0xff) as u64;
        let t3 = (self.r_type >> 16 & 0xff) as u64;
        self.r_sym as u64 | t3 << 40 | t2 << 48 | t1 << 56
    }

    /// Serialize as a little-endian ELF64 RELA record.
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..8].copy_from_slice(&self.r_offset.to_le_bytes());
        out[8..16].copy_from_slice(&self.to_raw_info().to_le_bytes());
        out[16..24].copy_from_slice(&self.r_addend.to_le_bytes());
        out
    }
}
