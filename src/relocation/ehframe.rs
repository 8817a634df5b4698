//! `.eh_frame` CIE rewriting.
//!
//! MIPS compilers emit unwind pointers with absolute encodings, which
//! would force one dynamic relocation per frame in position-independent
//! output. Instead of emitting those, we rewrite each CIE's pointer
//! encodings from absolute to PC-relative of the same size, and write the
//! pointer values themselves PC-relative when their relocations are
//! applied. The unwinder never notices; the dynamic section shrinks by
//! one record per FDE.

use crate::arch;
use crate::context::LinkContext;
use crate::elf::abi::*;
use crate::elf::ElfRela;
use crate::error::{Diagnostics, Error};
use crate::image;
use rayon::prelude::*;

/// Fixed CIE prefix: 4-byte length, 4-byte id, 1-byte version.
const AUG_START: usize = 9;

/// One Call frame Information Entry within a `.eh_frame` section, located
/// by the upstream frame parser.
#[derive(Clone, Debug)]
pub struct CieRecord {
    /// Section identity for diagnostics.
    pub section: String,
    /// Byte offset of the CIE within the `.eh_frame` contents.
    pub offset: usize,
    pub size: usize,
}

fn read_uleb(section: &str, buf: &[u8], pos: &mut usize) -> crate::Result<u64> {
    let mut val = 0u64;
    let mut shift = 0;
    loop {
        let byte = *buf.get(*pos).ok_or_else(|| Error::EhFrameTruncated {
            section: section.to_string(),
        })?;
        *pos += 1;
        val |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(val);
        }
        shift += 7;
    }
}

/// Size of the pointer a DWARF exception-header encoding byte describes,
/// and the byte rewritten from absolute to PC-relative addressing. The
/// indirection bit survives the rewrite; other addressing modes pass
/// through untouched.
fn rewrite_ptr_enc(section: &str, enc: u8) -> crate::Result<(u8, usize)> {
    let size = match enc & 0x0f {
        DW_EH_PE_ABSPTR | DW_EH_PE_UDATA8 | DW_EH_PE_SDATA8 => 8,
        DW_EH_PE_UDATA4 | DW_EH_PE_SDATA4 => 4,
        _ => {
            return Err(Error::EhFramePointerSize {
                section: section.to_string(),
            })
        }
    };
    if enc & 0x70 == DW_EH_PE_ABSPTR {
        let data = if size == 4 { DW_EH_PE_SDATA4 } else { DW_EH_PE_SDATA8 };
        Ok((enc & DW_EH_PE_INDIRECT | DW_EH_PE_PCREL | data, size))
    } else {
        Ok((enc, size))
    }
}

/// Rewrite one CIE's pointer encodings in place. `buf` holds exactly the
/// CIE's bytes.
pub fn rewrite_cie(diag: &Diagnostics, cie: &CieRecord, buf: &mut [u8]) -> crate::Result<()> {
    let section = &cie.section;
    // Only 'z' augmentations carry encoding bytes.
    if buf.get(AUG_START) != Some(&b'z') {
        return Ok(());
    }
    let aug_end = buf[AUG_START..]
        .iter()
        .position(|&b| b == 0)
        .map(|i| AUG_START + i)
        .ok_or_else(|| Error::EhFrameTruncated {
            section: section.to_string(),
        })?;
    let aug: Vec<u8> = buf[AUG_START..aug_end].to_vec();

    let mut pos = aug_end + 1;
    read_uleb(section, buf, &mut pos)?; // code alignment factor
    read_uleb(section, buf, &mut pos)?; // data alignment factor
    pos += 1; // return address register, one byte in version 1 CIEs
    read_uleb(section, buf, &mut pos)?; // augmentation data length

    for &ch in &aug[1..] {
        match ch {
            b'L' | b'R' => {
                let enc = *buf.get(pos).ok_or_else(|| Error::EhFrameTruncated {
                    section: section.to_string(),
                })?;
                let (new_enc, _) = rewrite_ptr_enc(section, enc)?;
                buf[pos] = new_enc;
                pos += 1;
            }
            b'P' => {
                let enc = *buf.get(pos).ok_or_else(|| Error::EhFrameTruncated {
                    section: section.to_string(),
                })?;
                let (new_enc, size) = rewrite_ptr_enc(section, enc)?;
                buf[pos] = new_enc;
                pos += 1 + size;
            }
            b'S' | b'B' => {}
            _ => {
                diag.report(Error::EhFrameAugmentation {
                    section: section.to_string(),
                    ch: ch as char,
                });
            }
        }
    }
    Ok(())
}

/// Rewrite every CIE of a `.eh_frame` section in parallel. `buf` holds
/// the whole section's contents.
pub fn rewrite_all(ctx: &LinkContext, cies: &[CieRecord], buf: &mut [u8]) -> crate::Result<()> {
    let ranges: Vec<(usize, usize)> = cies.iter().map(|c| (c.offset, c.size)).collect();
    let slices = image::split_ranges(buf, &ranges);
    cies.par_iter()
        .zip(slices)
        .try_for_each(|(cie, slice)| rewrite_cie(&ctx.diagnostics, cie, slice))
}

/// Apply one relocation landing in `.eh_frame` contents. Pointer values
/// become PC-relative to match the rewritten encodings.
pub fn apply_eh_reloc(
    rel: &ElfRela,
    ehframe_addr: u64,
    offset: u64,
    val: u64,
    buf: &mut [u8],
) -> crate::Result<()> {
    match rel.r_type {
        arch::R_MIPS_NONE => Ok(()),
        arch::R_MIPS_64 => {
            let pcrel = val.wrapping_sub(ehframe_addr).wrapping_sub(offset);
            image::write_u64(buf, offset as usize, pcrel);
            Ok(())
        }
        _ => Err(Error::EhFrameRelocation { r_type: rel.r_type }),
    }
}
