//! DWARF exception-header pointer encodings.
//!
//! The `elf` crate stops at the section level, so the `.eh_frame` encoding
//! bytes live here. Values are from the Linux Standard Base exception
//! frames specification.

pub const DW_EH_PE_ABSPTR: u8 = 0x00;
pub const DW_EH_PE_ULEB128: u8 = 0x01;
pub const DW_EH_PE_UDATA2: u8 = 0x02;
pub const DW_EH_PE_UDATA4: u8 = 0x03;
pub const DW_EH_PE_UDATA8: u8 = 0x04;
pub const DW_EH_PE_SLEB128: u8 = 0x09;
pub const DW_EH_PE_SDATA2: u8 = 0x0a;
pub const DW_EH_PE_SDATA4: u8 = 0x0b;
pub const DW_EH_PE_SDATA8: u8 = 0x0c;

pub const DW_EH_PE_PCREL: u8 = 0x10;
pub const DW_EH_PE_DATREL: u8 = 0x30;

pub const DW_EH_PE_INDIRECT: u8 = 0x80;
pub const DW_EH_PE_OMIT: u8 = 0xff;
